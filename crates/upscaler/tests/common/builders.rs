//! Builders for test configs and JPEG fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use upscaler::config::{AdapterConfig, AdapterKind, Config, NotifyConfig};
use upscaler::encoder::{encode_at_quality, JpegMetadata};
use upscaler::Upload;

/// Builder for `Config` with small, fast limits.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(work_dir: &Path) -> Self {
        let config = Config {
            work_dir: work_dir.to_path_buf(),
            worker_count: 1,
            task_concurrency: 2,
            task_timeout_secs: 60,
            max_size_passes: 1,
            adapters: AdapterConfig {
                priority: vec![AdapterKind::Resample],
                ..AdapterConfig::default()
            },
            notify: NotifyConfig {
                enabled: false,
                ..NotifyConfig::default()
            },
            ..Config::default()
        };
        Self { config }
    }

    pub fn max_files(mut self, max: usize) -> Self {
        self.config.max_files = max;
        self
    }

    pub fn max_size_passes(mut self, passes: u32) -> Self {
        self.config.max_size_passes = passes;
        self
    }

    pub fn max_output_pixels(mut self, pixels: u64) -> Self {
        self.config.max_output_pixels = pixels;
        self
    }

    pub fn task_timeout_secs(mut self, secs: u64) -> Self {
        self.config.task_timeout_secs = secs;
        self
    }

    pub fn task_concurrency(mut self, lanes: usize) -> Self {
        self.config.task_concurrency = lanes;
        self
    }

    pub fn target_bounds_mb(mut self, min: f64, max: f64) -> Self {
        self.config.min_target_mb = min;
        self.config.max_target_mb = max;
        self
    }

    pub fn adapters(mut self, priority: Vec<AdapterKind>) -> Self {
        self.config.adapters.priority = priority;
        self
    }

    pub fn ai_model(mut self, path: PathBuf) -> Self {
        self.config.adapters.ai_model_path = Some(path);
        self
    }

    pub fn external_cli(mut self, path: &str, args: &[&str]) -> Self {
        self.config.adapters.external_cli_path = Some(PathBuf::from(path));
        self.config.adapters.external_cli_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Deterministic patterned image; gradients plus an xor texture.
pub fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x ^ y) * 9 % 256) as u8,
        ])
    })
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_at_quality(&test_image(width, height), 90, &JpegMetadata::default())
        .expect("encode fixture")
}

pub fn jpeg_upload(name: &str, width: u32, height: u32) -> Upload {
    Upload {
        file_name: name.to_string(),
        data: jpeg_bytes(width, height),
    }
}

/// Starts like a JPEG but cannot be decoded.
pub fn corrupt_upload(name: &str) -> Upload {
    let mut data = jpeg_bytes(32, 32);
    data.truncate(40);
    Upload {
        file_name: name.to_string(),
        data,
    }
}
