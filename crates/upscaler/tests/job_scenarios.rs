//! End-to-end job scenarios through the `JobManager`.

mod common;

use std::fs::File;
use std::io::Read;

use common::*;
use upscaler::archive::{REPORT_FILE_NAME, REPORT_HEADER};
use upscaler::config::AdapterKind;
use upscaler::encoder::{encode_at_quality, JpegMetadata, UNREACHABLE_NOTE};
use upscaler::worker::executor::ABANDONED_LIMIT_NOTE;
use upscaler::{JobStatus, SubmitError, SubmitRequest, TaskStatus};

fn read_report(archive: &mut zip::ZipArchive<File>) -> String {
    let mut report = String::new();
    archive
        .by_name(REPORT_FILE_NAME)
        .unwrap()
        .read_to_string(&mut report)
        .unwrap();
    report
}

#[test]
fn three_valid_files_reach_done() {
    let harness = TestHarness::new();
    let id = harness.submit(
        vec![
            jpeg_upload("one.jpg", 64, 64),
            jpeg_upload("two.jpg", 64, 64),
            jpeg_upload("three.jpeg", 64, 64),
        ],
        4.0,
        20.0,
    );

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.progress, 100);
    assert_eq!(summary.download_url, Some(format!("/download/{}", id)));

    let job = harness.manager.job(&id).unwrap();
    for task in &job.tasks {
        assert_eq!(task.status, TaskStatus::Processed);
        let out = task.output_dims.unwrap();
        assert!(out.width >= 256 && out.height >= 256);
        let size = task.size_bytes.unwrap();
        assert!(
            size >= job.target_size_bytes
                || (task.quality_used == Some(100)
                    && task.notes.contains(&UNREACHABLE_NOTE.to_string()))
        );
    }

    let path = harness.manager.archive_path(&id).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    assert_eq!(archive.len(), 4);
    for name in ["one_upscaled.jpg", "two_upscaled.jpg", "three_upscaled.jpg"] {
        let mut entry = archive.by_name(name).unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(img.width() >= 256 && img.height() >= 256);
    }

    let report = read_report(&mut archive);
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], REPORT_HEADER);
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("one.jpg\tone_upscaled.jpg\tprocessed\t64\t64\t"));
    assert!(lines[2].starts_with("two.jpg\t"));
    assert!(lines[3].starts_with("three.jpeg\t"));
}

#[test]
fn corrupt_file_becomes_error_row() {
    let harness = TestHarness::new();
    let id = harness.submit(
        vec![
            jpeg_upload("good1.jpg", 48, 32),
            corrupt_upload("broken.jpg"),
            jpeg_upload("good2.jpg", 32, 48),
        ],
        4.0,
        20.0,
    );

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded + summary.warnings, 2);

    let path = harness.manager.archive_path(&id).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    assert_eq!(archive.len(), 3);
    assert!(archive.by_name("broken_upscaled.jpg").is_err());

    let report = read_report(&mut archive);
    let rows: Vec<Vec<&str>> = report
        .lines()
        .skip(1)
        .map(|l| l.split('\t').collect())
        .collect();
    let statuses: Vec<&str> = rows.iter().map(|r| r[2]).collect();
    assert_eq!(statuses, vec!["processed", "error", "processed"]);
    assert!(rows[1][3..9].iter().all(|c| c.is_empty()));
    assert!(!rows[1][9].is_empty());
}

#[test]
fn zero_files_fail_immediately() {
    let harness = TestHarness::new();
    let id = harness
        .manager
        .submit(SubmitRequest {
            uploads: vec![],
            scale: Some(4.0),
            target_mb: Some(20.0),
        })
        .unwrap();

    let summary = harness.manager.summary(&id).unwrap();
    assert_eq!(summary.status, JobStatus::Failed);
    assert!(summary.download_url.is_none());
    assert!(harness.manager.archive_path(&id).is_none());
    assert_eq!(harness.notifier.messages().len(), 1);
}

#[test]
fn decoded_file_over_output_limit_has_empty_row_fields() {
    let harness = TestHarness::with_config(|c| c.max_output_pixels(63 * 63));
    let id = harness.submit(
        vec![jpeg_upload("in.jpg", 16, 16), jpeg_upload("small.jpg", 8, 8)],
        4.0,
        20.0,
    );

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.failed, 1);

    let path = harness.manager.archive_path(&id).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let report = read_report(&mut archive);
    let rows: Vec<&str> = report.lines().skip(1).collect();
    assert_eq!(
        rows[0],
        "in.jpg\tin_upscaled.jpg\terror\t\t\t\t\t\t\toutput exceeds pixel limit"
    );
    assert!(rows[1].starts_with("small.jpg\tsmall_upscaled.jpg\tprocessed\t8\t8\t32\t32\t"));
}

#[test]
fn all_failing_files_still_reach_done() {
    let harness = TestHarness::new();
    let id = harness.submit(
        vec![
            corrupt_upload("a.jpg"),
            upscaler::Upload {
                file_name: "b.png".to_string(),
                data: vec![0x89, b'P', b'N', b'G'],
            },
        ],
        4.0,
        20.0,
    );

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.failed, 2);

    let job = harness.manager.job(&id).unwrap();
    assert_eq!(job.tasks[1].notes, vec!["unsupported file type".to_string()]);

    let path = harness.manager.archive_path(&id).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(read_report(&mut archive).lines().count(), 3);
}

#[test]
fn many_files_keep_upload_order() {
    let harness = TestHarness::with_config(|c| c.task_concurrency(4));
    let uploads: Vec<_> = (0..8)
        .map(|i| jpeg_upload(&format!("img{:02}.jpg", i), 8 + i, 8))
        .collect();
    let id = harness.submit(uploads, 4.0, 20.0);

    assert_eq!(harness.wait(&id).status, JobStatus::Done);

    let path = harness.manager.archive_path(&id).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let report = read_report(&mut archive);
    let names: Vec<String> = report
        .lines()
        .skip(1)
        .map(|l| l.split('\t').next().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..8).map(|i| format!("img{:02}.jpg", i)).collect();
    assert_eq!(names, expected);
}

#[test]
fn reachable_target_is_tight() {
    // Target bounds in the KiB range so the search has room to work.
    let harness = TestHarness::with_config(|c| c.target_bounds_mb(0.001, 100.0));
    let source = test_image(40, 40);
    let reference = image::imageops::resize(&source, 160, 160, image::imageops::FilterType::Lanczos3);
    let target = encode_at_quality(&reference, 70, &JpegMetadata::default())
        .unwrap()
        .len();
    let target_mb = target as f64 / (1024.0 * 1024.0);

    let id = harness.submit(vec![jpeg_upload("t.jpg", 40, 40)], 4.0, target_mb);
    harness.wait(&id);

    let job = harness.manager.job(&id).unwrap();
    let task = &job.tasks[0];
    assert_eq!(task.status, TaskStatus::Processed);
    assert!(task.target_met, "notes: {:?}", task.notes);
    assert!(task.size_bytes.unwrap() >= job.target_size_bytes);
}

#[test]
fn identical_jobs_produce_identical_results() {
    let harness = TestHarness::new();
    let first = harness.submit(vec![jpeg_upload("same.jpg", 24, 24)], 4.0, 20.0);
    let second = harness.submit(vec![jpeg_upload("same.jpg", 24, 24)], 4.0, 20.0);
    harness.wait(&first);
    harness.wait(&second);

    let a = harness.manager.job(&first).unwrap().tasks.remove(0);
    let b = harness.manager.job(&second).unwrap().tasks.remove(0);
    assert_eq!(a.quality_used, b.quality_used);
    assert_eq!(a.size_bytes, b.size_bytes);
}

#[test]
fn too_many_files_are_rejected() {
    let harness = TestHarness::with_config(|c| c.max_files(2));
    let err = harness
        .manager
        .submit(SubmitRequest {
            uploads: vec![
                jpeg_upload("a.jpg", 8, 8),
                jpeg_upload("b.jpg", 8, 8),
                jpeg_upload("c.jpg", 8, 8),
            ],
            scale: None,
            target_mb: None,
        })
        .unwrap_err();
    assert!(matches!(err, SubmitError::TooManyFiles { got: 3, max: 2 }));
}

#[test]
fn scale_and_target_are_normalized() {
    let harness = TestHarness::new();
    let id = harness.submit(vec![jpeg_upload("a.jpg", 8, 8)], 1.5, 500.0);

    let job = harness.manager.job(&id).unwrap();
    assert_eq!(job.requested_scale, 4.0);
    assert_eq!(job.target_size_bytes, 100 * 1024 * 1024);
    harness.wait(&id);
}

#[test]
fn notification_fires_once_per_job() {
    let harness = TestHarness::new();
    let id = harness.submit(vec![jpeg_upload("a.jpg", 8, 8)], 4.0, 20.0);
    harness.wait(&id);

    // The notification is sent right after the terminal transition.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while harness.notifier.messages().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    std::thread::sleep(std::time::Duration::from_millis(100));

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains(&id));
}

#[test]
fn uploads_are_removed_after_completion() {
    let harness = TestHarness::new();
    let id = harness.submit(vec![jpeg_upload("a.jpg", 8, 8)], 4.0, 20.0);
    harness.wait(&id);

    let job = harness.manager.job(&id).unwrap();
    assert!(!job.work_dir.join("input").exists());
    assert!(!job.work_dir.join("output").exists());
    assert!(job.archive_path.unwrap().is_file());
}

#[cfg(unix)]
#[test]
fn slow_task_times_out_without_failing_job() {
    let harness = TestHarness::with_config(|c| {
        c.task_timeout_secs(1)
            .adapters(vec![AdapterKind::External, AdapterKind::Resample])
            .external_cli("/bin/sh", &["-c", "sleep 3"])
    });
    let id = harness.submit(vec![jpeg_upload("slow.jpg", 8, 8)], 4.0, 20.0);

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.failed, 1);

    let job = harness.manager.job(&id).unwrap();
    assert_eq!(
        job.tasks[0].notes,
        vec!["processing timed out after 1s".to_string()]
    );
}

#[cfg(unix)]
#[test]
fn timed_out_threads_are_capped() {
    // One lane, so the first abandoned thread exhausts the allowance.
    let harness = TestHarness::with_config(|c| {
        c.task_timeout_secs(1)
            .task_concurrency(1)
            .adapters(vec![AdapterKind::External, AdapterKind::Resample])
            .external_cli("/bin/sh", &["-c", "sleep 6"])
    });
    let id = harness.submit(
        vec![jpeg_upload("stuck.jpg", 8, 8), jpeg_upload("next.jpg", 8, 8)],
        4.0,
        20.0,
    );

    let summary = harness.wait(&id);
    assert_eq!(summary.status, JobStatus::Done);
    assert_eq!(summary.failed, 2);

    let job = harness.manager.job(&id).unwrap();
    assert_eq!(
        job.tasks[0].notes,
        vec!["processing timed out after 1s".to_string()]
    );
    assert_eq!(job.tasks[1].notes, vec![ABANDONED_LIMIT_NOTE.to_string()]);
}

#[test]
fn missing_model_falls_back_with_note() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("missing_model.json");
    let harness = TestHarness::with_config(|c| {
        c.adapters(vec![AdapterKind::Ai, AdapterKind::Resample])
            .ai_model(model)
    });
    let id = harness.submit(vec![jpeg_upload("a.jpg", 8, 8)], 4.0, 20.0);
    harness.wait(&id);

    let job = harness.manager.job(&id).unwrap();
    assert_eq!(job.tasks[0].status, TaskStatus::Processed);
    assert!(job.tasks[0]
        .notes
        .iter()
        .any(|n| n.starts_with("fell back to resample adapter")));
    assert!(!harness.manager.model().is_loaded());
}

#[cfg(unix)]
#[test]
fn queued_jobs_fail_at_shutdown() {
    let harness = TestHarness::with_config(|c| {
        c.task_concurrency(1)
            .adapters(vec![AdapterKind::External, AdapterKind::Resample])
            .external_cli("/bin/sh", &["-c", "sleep 2; exit 1"])
    });
    let running = harness.submit(vec![jpeg_upload("first.jpg", 8, 8)], 4.0, 20.0);
    let queued = harness.submit(vec![jpeg_upload("second.jpg", 8, 8)], 4.0, 20.0);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while harness.manager.summary(&running).unwrap().status == JobStatus::Queued
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    harness.manager.shutdown();

    let first = harness.manager.summary(&running).unwrap();
    assert_eq!(first.status, JobStatus::Done);

    let second = harness.manager.summary(&queued).unwrap();
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(second.message, "Service stopped before the job started");
    assert!(harness.manager.archive_path(&queued).is_none());

    let job = harness.manager.job(&queued).unwrap();
    assert!(!job.work_dir.join("input").exists());

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().any(|m| m.contains(&queued)));
}
