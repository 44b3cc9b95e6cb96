//! Per-file processing: decode, upscale, size-target, write.

pub mod runner;
pub mod source;

use std::path::PathBuf;

use crate::config::Config;

pub use runner::{check_file_type, TaskRunner};
pub use source::{load_source, Source};

/// Growth factor applied to the scale between size passes.
pub const SIZE_PASS_GROWTH: f64 = 1.15;

/// Job-level parameters every file task of a job shares.
#[derive(Debug, Clone)]
pub struct TaskSettings {
    /// Requested scale, already floored to `min_scale`.
    pub scale: f64,
    pub target_bytes: u64,
    pub min_scale: f64,
    pub max_image_pixels: u64,
    pub max_output_pixels: u64,
    pub max_size_passes: u32,
    pub output_dir: PathBuf,
}

impl TaskSettings {
    pub fn from_config(config: &Config, scale: f64, target_bytes: u64, output_dir: PathBuf) -> Self {
        Self {
            scale,
            target_bytes,
            min_scale: config.min_scale,
            max_image_pixels: config.max_image_pixels,
            max_output_pixels: config.max_output_pixels,
            max_size_passes: config.max_size_passes.max(1),
            output_dir,
        }
    }
}
