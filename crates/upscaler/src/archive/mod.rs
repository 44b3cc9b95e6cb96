//! Result archive: every processed image plus the TSV report.

pub mod report;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;
use crate::worker::job::{Job, TaskStatus};

pub use report::{REPORT_FILE_NAME, REPORT_HEADER};

/// `upscaled_<YYYYmmdd_HHMMSS>.zip`
pub fn archive_file_name() -> String {
    format!("upscaled_{}.zip", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Writes the job's archive into `job.work_dir` and returns its path.
///
/// JPEGs are stored without recompression; the report is deflated.
/// A job that already has an archive is refused.
pub fn build_archive(job: &Job) -> Result<PathBuf, ArchiveError> {
    if job.archive_path.is_some() {
        return Err(ArchiveError::AlreadyBuilt(job.id.clone()));
    }

    std::fs::create_dir_all(&job.work_dir).map_err(|source| ArchiveError::Io {
        path: job.work_dir.clone(),
        source,
    })?;
    let path = job.work_dir.join(archive_file_name());
    let file = File::create(&path).map_err(|source| ArchiveError::Io {
        path: path.clone(),
        source,
    })?;

    let mut zip = ZipWriter::new(BufWriter::new(file));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut images = 0usize;
    for task in &job.tasks {
        if task.status != TaskStatus::Processed {
            continue;
        }
        let Some(output_path) = task.output_path.as_deref() else {
            continue;
        };
        let bytes = read(output_path)?;
        zip.start_file(task.output_name.as_str(), stored)?;
        zip.write_all(&bytes).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        images += 1;
    }

    zip.start_file(REPORT_FILE_NAME, deflated)?;
    zip.write_all(report::render(&job.tasks).as_bytes())
        .map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;

    let mut writer = zip.finish()?;
    writer.flush().map_err(|source| ArchiveError::Io {
        path: path.clone(),
        source,
    })?;

    info!(
        "Built archive for job {} with {} images and {} report rows",
        job.id,
        images,
        job.tasks.len()
    );
    Ok(path)
}

fn read(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    std::fs::read(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}
