//! Shared utilities for upscaler integration tests.
//!
//! - `TestHarness` runs a `JobManager` inside a temporary work directory
//! - builders for configs and synthetic JPEG uploads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingNotifier, TestHarness};
