//! Best-effort completion notifications.
//!
//! Delivery goes to the Telegram Bot API first and falls back to an external
//! messaging command. A failed delivery is logged and otherwise ignored.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::worker::job::{JobStatus, JobSummary};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const TELEGRAM_API: &str = "https://api.telegram.org";

/// What a finished job reports to the outside world.
#[derive(Debug, Clone)]
pub struct Notification {
    pub job_id: String,
    pub status: JobStatus,
    pub total: usize,
    pub succeeded: usize,
    pub warnings: usize,
    pub failed: usize,
}

impl Notification {
    pub fn from_summary(summary: &JobSummary) -> Self {
        Self {
            job_id: summary.job_id.clone(),
            status: summary.status,
            total: summary.total,
            succeeded: summary.succeeded,
            warnings: summary.warnings,
            failed: summary.failed,
        }
    }

    pub fn message(&self) -> String {
        match self.status {
            JobStatus::Done => format!(
                "Photo batch complete. {} met target, {} upscaled below target, {} failed. \
                 ZIP is ready to download (job {}).",
                self.succeeded, self.warnings, self.failed, self.job_id
            ),
            _ => format!(
                "Photo batch failed before completion (job {}). Open the app to retry.",
                self.job_id
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sends `notification` and reports whether any channel accepted it.
pub fn deliver(notifier: &dyn Notifier, notification: &Notification) -> bool {
    match notifier.send(&notification.message()) {
        Ok(()) => {
            info!(
                "Sent {} notification for job {}",
                notifier.name(),
                notification.job_id
            );
            true
        }
        Err(NotifyError::Disabled) => {
            debug!("Notifications disabled, skipping job {}", notification.job_id);
            false
        }
        Err(e) => {
            warn!(
                "Notification for job {} not delivered: {}",
                notification.job_id, e
            );
            false
        }
    }
}

/// Builds the notifier chain described by `config`.
pub fn build_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if !config.enabled {
        return Arc::new(NoopNotifier);
    }

    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    if let (Some(token), Some(chat_id)) = (
        non_empty(config.telegram_bot_token.as_deref()),
        non_empty(config.telegram_chat_id.as_deref()),
    ) {
        channels.push(Box::new(TelegramNotifier::new(
            SecretString::from(token.to_string()),
            chat_id.to_string(),
        )));
    }
    channels.push(Box::new(CommandNotifier::new(
        config.command.clone(),
        config.channel.clone(),
        non_empty(config.target.as_deref()).map(str::to_string),
    )));

    Arc::new(FallbackNotifier::new(channels))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn send(&self, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage`.
///
/// Uses the blocking client; call from worker threads or `spawn_blocking`.
pub struct TelegramNotifier {
    token: SecretString,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(token: SecretString, chat_id: String) -> Self {
        Self {
            token,
            chat_id,
            api_base: TELEGRAM_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()?;
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token.expose_secret()
        );

        let response: TelegramResponse = client
            .post(url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", message)])
            .send()
            .map_err(|e| NotifyError::Http(e.without_url()))?
            .json()
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        if response.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// `<command> message send --channel <c> --target <t> --message <m>`
pub struct CommandNotifier {
    command: String,
    channel: String,
    target: Option<String>,
}

impl CommandNotifier {
    pub fn new(command: String, channel: String, target: Option<String>) -> Self {
        Self {
            command,
            channel,
            target,
        }
    }
}

impl Notifier for CommandNotifier {
    fn name(&self) -> &'static str {
        "command"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let target = self
            .target
            .as_deref()
            .ok_or(NotifyError::NotConfigured("notify target"))?;

        let mut child = Command::new(&self.command)
            .args(["message", "send", "--channel", &self.channel])
            .args(["--target", target, "--message", message])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| NotifyError::Command(format!("cannot run '{}': {}", self.command, e)))?;

        let deadline = Instant::now() + SEND_TIMEOUT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(NotifyError::Command(format!(
                        "'{}' exited with {}",
                        self.command, status
                    )))
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(NotifyError::Command(format!(
                        "'{}' timed out after {}s",
                        self.command,
                        SEND_TIMEOUT.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(NotifyError::Command(e.to_string())),
            }
        }
    }
}

/// Tries each channel in order until one accepts the message.
pub struct FallbackNotifier {
    channels: Vec<Box<dyn Notifier>>,
}

impl FallbackNotifier {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }
}

impl Notifier for FallbackNotifier {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let mut failures = Vec::new();
        for channel in &self.channels {
            match channel.send(message) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("{} notification failed: {}", channel.name(), e);
                    failures.push(format!("{}: {}", channel.name(), e));
                }
            }
        }
        Err(NotifyError::AllFailed(failures))
    }
}
