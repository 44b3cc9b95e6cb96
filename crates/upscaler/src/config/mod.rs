pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, load_config, load_config_from_env, load_config_from_str,
    validate_config, CONFIG_PATH_ENV,
};
pub use schema::{AdapterConfig, AdapterKind, Config, LogFormat, NotifyConfig, BYTES_PER_MB};
