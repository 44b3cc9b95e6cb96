use std::path::PathBuf;
use std::process::Command;

use image::{ImageFormat, RgbImage};
use log::debug;

use super::AdapterOutput;
use crate::error::AdapterError;

/// Delegates to an upscaling tool installed on the host.
///
/// The argument template may reference `{input}`, `{output}` and `{scale}`.
/// The tool reads a PNG and must write a PNG.
#[derive(Debug, Clone)]
pub struct ExternalCliAdapter {
    cli_path: Option<PathBuf>,
    args: Vec<String>,
}

impl ExternalCliAdapter {
    pub fn new(cli_path: Option<PathBuf>, args: Vec<String>) -> Self {
        Self { cli_path, args }
    }

    pub fn check_available(&self) -> Result<&PathBuf, AdapterError> {
        match &self.cli_path {
            None => Err(AdapterError::Unavailable {
                adapter: "external",
                reason: "no CLI path configured".to_string(),
            }),
            Some(path) if !path.is_file() => Err(AdapterError::Unavailable {
                adapter: "external",
                reason: format!("CLI not found at {}", path.display()),
            }),
            Some(path) => Ok(path),
        }
    }

    pub fn upscale(&self, image: &RgbImage, scale: f64) -> Result<AdapterOutput, AdapterError> {
        let cli = self.check_available()?;
        let failed = |reason: String| AdapterError::Failed {
            adapter: "external",
            reason,
        };

        let workdir = tempfile::Builder::new()
            .prefix("upscale_cli_")
            .tempdir()
            .map_err(|e| failed(format!("cannot create temp dir: {}", e)))?;
        let input = workdir.path().join("input.png");
        let output = workdir.path().join("output.png");

        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| failed(format!("cannot write input: {}", e)))?;

        let scale_arg = format!("{}", scale);
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{scale}", &scale_arg)
            })
            .collect();

        debug!("Running external upscaler {} {:?}", cli.display(), args);
        let result = Command::new(cli)
            .args(&args)
            .output()
            .map_err(|e| failed(format!("cannot start {}: {}", cli.display(), e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(failed(format!(
                "exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let upscaled = image::open(&output)
            .map_err(|e| failed(format!("cannot read output: {}", e)))?
            .to_rgb8();

        Ok(AdapterOutput::measured(image, upscaled))
    }
}
