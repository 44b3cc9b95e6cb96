use image::imageops::{self, FilterType};
use image::RgbImage;

use super::AdapterOutput;
use crate::error::AdapterError;

/// Deterministic Lanczos resampling. Supports any scale factor.
#[derive(Debug, Clone, Copy)]
pub struct ResampleAdapter {
    filter: FilterType,
}

impl Default for ResampleAdapter {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl ResampleAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upscale(&self, image: &RgbImage, scale: f64) -> Result<AdapterOutput, AdapterError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(AdapterError::Failed {
                adapter: "resample",
                reason: format!("invalid scale {}", scale),
            });
        }
        let (width, height) = scaled_dims(image.width(), image.height(), scale);
        let resized = imageops::resize(image, width, height, self.filter);
        Ok(AdapterOutput::measured(image, resized))
    }
}

/// Target dimensions for `scale`, rounded up so the result never falls
/// short of `source × scale`.
pub fn scaled_dims(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale_axis = |v: u32| ((v as f64 * scale).ceil() as u32).max(1);
    (scale_axis(width), scale_axis(height))
}

/// Lanczos resize helper shared with the AI engine for its base layer and
/// final adjustment.
pub(crate) fn lanczos(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width, height, FilterType::Lanczos3)
}
