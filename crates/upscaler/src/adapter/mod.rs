//! Upscaling engines and the ordered fallback chain over them.

pub mod ai;
pub mod external;
pub mod model;
pub mod resample;

use std::sync::Arc;

use image::RgbImage;
use log::{debug, warn};

use crate::config::{AdapterConfig, AdapterKind};
use crate::error::AdapterError;

pub use ai::{AiAdapter, ModelHandle};
pub use external::ExternalCliAdapter;
pub use model::SrModel;
pub use resample::ResampleAdapter;

/// Upscaled pixels plus the scale actually achieved.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub image: RgbImage,
    pub effective_scale: f64,
}

impl AdapterOutput {
    /// Effective scale is the smaller of the two axis ratios.
    pub fn measured(source: &RgbImage, image: RgbImage) -> Self {
        let sx = image.width() as f64 / source.width().max(1) as f64;
        let sy = image.height() as f64 / source.height().max(1) as f64;
        Self {
            effective_scale: sx.min(sy),
            image,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Adapter {
    Ai(AiAdapter),
    Resample(ResampleAdapter),
    External(ExternalCliAdapter),
}

impl Adapter {
    pub fn kind(&self) -> AdapterKind {
        match self {
            Adapter::Ai(_) => AdapterKind::Ai,
            Adapter::Resample(_) => AdapterKind::Resample,
            Adapter::External(_) => AdapterKind::External,
        }
    }

    pub fn upscale(&self, image: &RgbImage, scale: f64) -> Result<AdapterOutput, AdapterError> {
        match self {
            Adapter::Ai(a) => a.upscale(image, scale),
            Adapter::Resample(a) => a.upscale(image, scale),
            Adapter::External(a) => a.upscale(image, scale),
        }
    }
}

/// Result of a chain call, with the engine that produced it.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub image: RgbImage,
    pub effective_scale: f64,
    pub adapter: AdapterKind,
    pub notes: Vec<String>,
}

/// Adapters in priority order. Each one is tried at most once per call.
#[derive(Debug, Clone)]
pub struct AdapterChain {
    adapters: Vec<Adapter>,
    min_scale: f64,
}

impl AdapterChain {
    pub fn new(adapters: Vec<Adapter>, min_scale: f64) -> Self {
        Self {
            adapters,
            min_scale,
        }
    }

    /// Resolves the configured priority list. Duplicates are dropped.
    pub fn from_config(config: &AdapterConfig, min_scale: f64, model: Arc<ModelHandle>) -> Self {
        let mut adapters: Vec<Adapter> = Vec::with_capacity(config.priority.len());
        for kind in &config.priority {
            if adapters.iter().any(|a| a.kind() == *kind) {
                continue;
            }
            let adapter = match kind {
                AdapterKind::Ai => Adapter::Ai(AiAdapter::new(Arc::clone(&model), min_scale)),
                AdapterKind::Resample => Adapter::Resample(ResampleAdapter::new()),
                AdapterKind::External => Adapter::External(ExternalCliAdapter::new(
                    config.external_cli_path.clone(),
                    config.external_cli_args.clone(),
                )),
            };
            adapters.push(adapter);
        }
        Self::new(adapters, min_scale)
    }

    pub fn kinds(&self) -> Vec<AdapterKind> {
        self.adapters.iter().map(Adapter::kind).collect()
    }

    pub fn min_scale(&self) -> f64 {
        self.min_scale
    }

    /// Requests below the minimum scale are raised to it.
    pub fn upscale(&self, image: &RgbImage, requested: f64) -> Result<ChainOutput, AdapterError> {
        let scale = if requested.is_finite() {
            requested.max(self.min_scale)
        } else {
            self.min_scale
        };
        let mut failures: Vec<String> = Vec::new();

        for adapter in &self.adapters {
            let kind = adapter.kind();
            let result = adapter.upscale(image, scale).and_then(|out| {
                // Small tolerance for float noise on exact multiples.
                if out.effective_scale + 1e-9 < self.min_scale {
                    Err(AdapterError::ScaleBelowMinimum {
                        adapter: kind.as_str(),
                        effective: out.effective_scale,
                        minimum: self.min_scale,
                    })
                } else {
                    Ok(out)
                }
            });

            match result {
                Ok(out) => {
                    let mut notes = Vec::new();
                    if !failures.is_empty() {
                        notes.push(format!(
                            "fell back to {} adapter ({})",
                            kind,
                            failures.join("; ")
                        ));
                    }
                    debug!(
                        "Upscaled with {} adapter at {:.2}x",
                        kind, out.effective_scale
                    );
                    return Ok(ChainOutput {
                        image: out.image,
                        effective_scale: out.effective_scale,
                        adapter: kind,
                        notes,
                    });
                }
                Err(e) => {
                    warn!("Adapter {} failed, trying next: {}", kind, e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(AdapterError::Exhausted { attempts: failures })
    }
}
