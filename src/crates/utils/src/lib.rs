//! Shared error type and configuration-loading helpers.
//!
//! This crate backs the orchestrator's `OrchestratorConfig` loader with
//! environment-variable and file-based configuration utilities. The
//! `server`/`client` HTTP modules are not carried here: they back an
//! outward-facing API/UI surface this repo has no use for.
//!
//! ```rust,ignore
//! use utils::config::{get_env, get_env_parse, load_config_file};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AppConfig {
//!     api_key: String,
//!     port: u16,
//! }
//!
//! let api_key = get_env("API_KEY")?;
//! let port = get_env_parse::<u16>("PORT")?;
//! let config: AppConfig = load_config_file("config.yaml")?;
//! ```

pub mod error;

#[cfg(feature = "config")]
pub mod config;

pub use error::{Result, UtilsError};

#[cfg(feature = "config")]
pub use config::{
    get_env, get_env_bool, get_env_bool_or, get_env_or, get_env_parse, get_env_parse_or,
    load_config_file, load_json_config, load_yaml_config, ConfigBuilder, FromEnv, ValidateConfig,
};

