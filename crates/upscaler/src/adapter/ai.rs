use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::RgbImage;
use log::{info, warn};

use super::model::SrModel;
use super::resample::{lanczos, scaled_dims};
use super::AdapterOutput;
use crate::error::AdapterError;

/// Process-scoped handle to the super-resolution model.
///
/// Created once at startup and shared by `Arc` with every worker. The weights
/// are loaded on first use behind a `OnceLock`, so concurrent first calls
/// load the file exactly once. A failed load is cached as well: the adapter
/// stays unavailable instead of re-reading the file for every image.
#[derive(Debug)]
pub struct ModelHandle {
    path: Option<PathBuf>,
    model: OnceLock<Result<Arc<SrModel>, String>>,
}

impl ModelHandle {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            model: OnceLock::new(),
        }
    }

    /// Handle around an already constructed model.
    pub fn preloaded(model: SrModel) -> Self {
        let handle = Self::new(None);
        let _ = handle.model.set(Ok(Arc::new(model)));
        handle
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    pub fn get(&self) -> Result<Arc<SrModel>, AdapterError> {
        self.model
            .get_or_init(|| self.load())
            .clone()
            .map_err(|reason| AdapterError::Unavailable {
                adapter: "ai",
                reason,
            })
    }

    fn load(&self) -> Result<Arc<SrModel>, String> {
        let Some(path) = self.path.as_deref() else {
            return Err("no model path configured".to_string());
        };
        if !path.is_file() {
            warn!("AI model file missing at {}", path.display());
            return Err(format!("model file missing at {}", path.display()));
        }

        let model = SrModel::load(path)?;
        info!(
            "Loaded super-resolution model '{}' ({}x, {} layers)",
            model.name,
            model.scale,
            model.layers.len()
        );
        Ok(Arc::new(model))
    }
}

/// Super-resolution engine with a fixed native multiple.
#[derive(Debug, Clone)]
pub struct AiAdapter {
    handle: Arc<ModelHandle>,
    min_scale: f64,
}

impl AiAdapter {
    pub fn new(handle: Arc<ModelHandle>, min_scale: f64) -> Self {
        Self { handle, min_scale }
    }

    pub fn check_available(&self) -> Result<(), AdapterError> {
        self.handle.get().map(|_| ())
    }

    /// One native pass. Requests above the native multiple get a final
    /// Lanczos resize up to the requested size; requests below keep the
    /// native result, so the effective scale can exceed the request.
    ///
    /// A model whose native multiple is below the minimum scale is rejected
    /// before it runs.
    pub fn upscale(&self, image: &RgbImage, scale: f64) -> Result<AdapterOutput, AdapterError> {
        let model = self.handle.get()?;
        let native = model.scale as f64;
        if native + 1e-9 < self.min_scale {
            return Err(AdapterError::ScaleBelowMinimum {
                adapter: "ai",
                effective: native,
                minimum: self.min_scale,
            });
        }
        let upscaled = model.upsample(image);

        if scale > model.scale as f64 {
            let (width, height) = scaled_dims(image.width(), image.height(), scale);
            let resized = lanczos(&upscaled, width, height);
            return Ok(AdapterOutput::measured(image, resized));
        }

        Ok(AdapterOutput::measured(image, upscaled))
    }
}
