use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::warn;

use crate::config::schema::{AdapterKind, Config, LogFormat};
use crate::error::ConfigError;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "UPSCALER_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads the process configuration: the JSON file named by `UPSCALER_CONFIG`
/// (if any), overridden by individual environment variables.
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => {
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
                    path: PathBuf::from(&path),
                    source: e,
                })?;
            serde_json::from_str(&content)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies environment overrides through `lookup`. Values that fail to parse
/// are logged and ignored; an unknown adapter name is an error.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    override_parsed(&lookup, "MAX_FILES", &mut config.max_files);
    override_parsed(&lookup, "MAX_UPLOAD_MB", &mut config.max_upload_mb);
    override_parsed(&lookup, "MIN_SCALE", &mut config.min_scale);
    override_parsed(&lookup, "MIN_TARGET_MB", &mut config.min_target_mb);
    override_parsed(&lookup, "MAX_TARGET_MB", &mut config.max_target_mb);
    override_parsed(&lookup, "MAX_IMAGE_PIXELS", &mut config.max_image_pixels);
    override_parsed(&lookup, "MAX_OUTPUT_PIXELS", &mut config.max_output_pixels);
    override_parsed(&lookup, "MAX_SIZE_PASSES", &mut config.max_size_passes);
    override_parsed(&lookup, "WORKER_COUNT", &mut config.worker_count);
    override_parsed(&lookup, "TASK_CONCURRENCY", &mut config.task_concurrency);
    override_parsed(&lookup, "TASK_TIMEOUT_SECS", &mut config.task_timeout_secs);

    if let Some(dir) = non_empty(&lookup, "WORK_DIR") {
        config.work_dir = PathBuf::from(dir);
    }

    if let Some(list) = non_empty(&lookup, "UPSCALE_ADAPTER") {
        config.adapters.priority = AdapterKind::parse_list(&list)?;
    }
    if let Some(path) = non_empty(&lookup, "AI_MODEL_PATH") {
        config.adapters.ai_model_path = Some(PathBuf::from(path));
    }
    if let Some(path) =
        non_empty(&lookup, "EXTERNAL_CLI_PATH").or_else(|| non_empty(&lookup, "TOPAZ_CLI_PATH"))
    {
        config.adapters.external_cli_path = Some(PathBuf::from(path));
    }

    if let Some(value) = lookup("NOTIFY_ON_DONE") {
        config.notify.enabled = parse_bool(&value);
    }
    if let Some(channel) = non_empty(&lookup, "NOTIFY_CHANNEL") {
        config.notify.channel = channel;
    }
    if let Some(target) = non_empty(&lookup, "NOTIFY_TARGET") {
        config.notify.target = Some(target);
    }
    if let Some(token) = non_empty(&lookup, "TELEGRAM_BOT_TOKEN") {
        config.notify.telegram_bot_token = Some(token);
    }
    if let Some(chat_id) = non_empty(&lookup, "TELEGRAM_CHAT_ID") {
        config.notify.telegram_chat_id = Some(chat_id);
    }
    if let Some(command) = non_empty(&lookup, "NOTIFY_COMMAND") {
        config.notify.command = command;
    }

    if let Some(level) = non_empty(&lookup, "LOG_LEVEL") {
        config.log_level = level.to_lowercase();
    }
    if let Some(format) = non_empty(&lookup, "LOG_FORMAT") {
        match format.to_lowercase().as_str() {
            "json" => config.log_format = LogFormat::Json,
            "text" => config.log_format = LogFormat::Text,
            other => warn!("Ignoring LOG_FORMAT='{}', expected 'text' or 'json'", other),
        }
    }
    if let Some(addr) = non_empty(&lookup, "BIND_ADDR") {
        config.bind_addr = addr;
    }

    Ok(())
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_parsed<F, T>(lookup: &F, name: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = non_empty(lookup, name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring {}='{}': not a valid value", name, raw),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if !config.min_scale.is_finite() || config.min_scale < 1.0 {
        return invalid(format!("min_scale must be >= 1.0, got {}", config.min_scale));
    }
    if !(config.min_target_mb > 0.0) || !config.max_target_mb.is_finite() {
        return invalid(format!(
            "min_target_mb must be positive, got {}",
            config.min_target_mb
        ));
    }
    if config.min_target_mb > config.max_target_mb {
        return invalid(format!(
            "min_target_mb ({}) exceeds max_target_mb ({})",
            config.min_target_mb, config.max_target_mb
        ));
    }
    if config.max_files == 0 {
        return invalid("max_files must be > 0".to_string());
    }
    if config.worker_count == 0 {
        return invalid("worker_count must be > 0".to_string());
    }
    if config.task_concurrency == 0 {
        return invalid("task_concurrency must be > 0".to_string());
    }
    if config.max_size_passes == 0 {
        return invalid("max_size_passes must be > 0".to_string());
    }
    if config.task_timeout_secs == 0 {
        return invalid("task_timeout_secs must be > 0".to_string());
    }
    if config.max_image_pixels == 0 || config.max_output_pixels == 0 {
        return invalid("pixel limits must be > 0".to_string());
    }
    if config.adapters.priority.is_empty() {
        return invalid("at least one upscale adapter must be configured".to_string());
    }

    Ok(())
}
