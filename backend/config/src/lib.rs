//! `apibot-config`: runtime configuration for the apibot pipeline.
//!
//! Provides:
//! - Typed config schema (server, outbound HTTP, logging, Messenger, commands)
//! - YAML/JSON loading
//! - `${ENV_VAR}` substitution
//! - Schema validation

pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config};
pub use schema::{ApiBotConfig, HttpConfig, LoggingConfig, MessengerSection, ServerConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::path::Path;

use anyhow::{Context, Result};

/// Load a config file, substitute env vars, deserialize and validate it.
///
/// Callers decide whether validation errors are fatal.
pub async fn load_and_prepare(path: &Path) -> Result<(ApiBotConfig, ValidationReport)> {
    let raw = load_config(path).await?;
    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;
    let config: ApiBotConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    let report = validate(&config);
    Ok((config, report))
}
