use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tracing::info_span;

use crate::adapter::resample::scaled_dims;
use crate::adapter::AdapterChain;
use crate::encoder::{encode_to_target, EncodeOutcome};
use crate::error::{AdapterError, TaskError};
use crate::sanitize;
use crate::worker::job::{Dims, FileTask, TaskStatus};

use super::source::{load_source, Source};
use super::{TaskSettings, SIZE_PASS_GROWTH};

const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg"];

/// Runs a single file task to a terminal state.
pub struct TaskRunner {
    adapters: Arc<AdapterChain>,
}

struct Rendered {
    dims: Dims,
    outcome: EncodeOutcome,
    adapter_notes: Vec<String>,
}

impl TaskRunner {
    pub fn new(adapters: Arc<AdapterChain>) -> Self {
        Self { adapters }
    }

    /// Never fails: any error is recorded on the returned task as
    /// `status = error` with a note.
    pub fn run(&self, mut task: FileTask, settings: &TaskSettings) -> FileTask {
        let _task_span = info_span!("file_task",
            index = task.index,
            filename = %sanitize::base_name(&task.source_name),
        )
        .entered();

        match self.process(&mut task, settings) {
            Ok(()) => info!(
                "Processed {} at quality {:?} ({} bytes)",
                task.source_name,
                task.quality_used,
                task.size_bytes.unwrap_or_default()
            ),
            Err(e) => {
                warn!("Failed to process {}: {}", task.source_name, e);
                task.fail(e.to_string());
            }
        }
        task
    }

    fn process(&self, task: &mut FileTask, settings: &TaskSettings) -> Result<(), TaskError> {
        check_file_type(&task.source_name)?;

        let path = task
            .source_path
            .clone()
            .ok_or_else(|| TaskError::Input("upload was not stored".to_string()))?;

        let source = {
            let _step = info_span!("decode").entered();
            let bytes = std::fs::read(&path)
                .map_err(|e| TaskError::Input(format!("cannot read upload: {}", e)))?;
            load_source(&bytes, settings.max_image_pixels)?
        };
        let source_dims = source.dims();
        task.source_dims = Some(source_dims);

        let mut best: Option<Rendered> = None;
        let mut scale = settings.scale.max(settings.min_scale);

        for pass in 1..=settings.max_size_passes.max(1) {
            let _pass = info_span!("size_pass", pass, scale).entered();

            let (width, height) = scaled_dims(source_dims.width, source_dims.height, scale);
            if Dims::new(width, height).pixels() > settings.max_output_pixels {
                if best.is_none() {
                    return Err(TaskError::Capacity("output exceeds pixel limit".to_string()));
                }
                task.push_note("size passes stopped at output pixel limit");
                break;
            }

            // A failed later pass leaves the previous result in place.
            let rendered = match self.render(&source, scale, settings) {
                Ok(rendered) => rendered,
                Err(e) if best.is_some() => {
                    warn!(
                        "Size pass {} for {} failed, keeping previous result: {}",
                        pass, task.source_name, e
                    );
                    task.push_note(format!("size passes stopped: {}", e));
                    break;
                }
                Err(e) => return Err(e),
            };
            for note in &rendered.adapter_notes {
                task.push_note(note.clone());
            }

            let met = rendered.outcome.target_met;
            best = Some(rendered);
            if met {
                break;
            }
            scale *= SIZE_PASS_GROWTH;
        }

        let Some(best) = best else {
            return Err(TaskError::Capacity("output exceeds pixel limit".to_string()));
        };
        for note in &best.outcome.notes {
            task.push_note(note.clone());
        }

        let output_path = settings.output_dir.join(&task.output_name);
        {
            let _step = info_span!("write", output = %sanitize::redact_path(&output_path)).entered();
            write_output(&output_path, &best.outcome.bytes)?;
        }

        task.status = TaskStatus::Processed;
        task.output_dims = Some(best.dims);
        task.quality_used = Some(best.outcome.quality);
        task.size_bytes = Some(best.outcome.size_bytes());
        task.target_met = best.outcome.target_met;
        task.output_path = Some(output_path);
        Ok(())
    }

    /// One upscale and encode at `scale`.
    fn render(&self, source: &Source, scale: f64, settings: &TaskSettings) -> Result<Rendered, TaskError> {
        let upscaled = {
            let _step = info_span!("upscale").entered();
            self.adapters.upscale(&source.image, scale)?
        };

        let dims = Dims::new(upscaled.image.width(), upscaled.image.height());
        if dims.pixels() > settings.max_output_pixels {
            return Err(TaskError::Capacity("output exceeds pixel limit".to_string()));
        }
        check_min_scale(source.dims(), dims, settings.min_scale, upscaled.adapter.as_str())?;

        let outcome = {
            let _step = info_span!("encode", target = settings.target_bytes).entered();
            encode_to_target(&upscaled.image, settings.target_bytes, &source.metadata)?
        };
        Ok(Rendered {
            dims,
            outcome,
            adapter_notes: upscaled.notes,
        })
    }
}

/// Accepts `.jpg`/`.jpeg` names whose guessed MIME type is `image/jpeg`.
pub fn check_file_type(name: &str) -> Result<(), TaskError> {
    let unsupported = || TaskError::Input("unsupported file type".to_string());

    let ext = sanitize::extension(name).ok_or_else(unsupported)?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(unsupported());
    }
    match mime_guess::from_path(sanitize::base_name(name)).first() {
        Some(mime) if mime.essence_str() == "image/jpeg" => Ok(()),
        _ => Err(unsupported()),
    }
}

fn check_min_scale(
    source: Dims,
    output: Dims,
    min_scale: f64,
    adapter: &'static str,
) -> Result<(), TaskError> {
    let ratio_w = output.width as f64 / source.width.max(1) as f64;
    let ratio_h = output.height as f64 / source.height.max(1) as f64;
    let effective = ratio_w.min(ratio_h);
    if effective + 1e-9 < min_scale {
        return Err(AdapterError::ScaleBelowMinimum {
            adapter,
            effective,
            minimum: min_scale,
        }
        .into());
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), TaskError> {
    std::fs::write(path, bytes).map_err(|source| TaskError::Output {
        path: path.to_path_buf(),
        source,
    })
}
