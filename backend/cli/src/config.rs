use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apibot_commands::{http_client, RendererRegistry};
use apibot_config::{config_dir, config_file_path, load_and_prepare, ApiBotConfig, ValidationReport};
use reqwest::Client;

/// Everything a subcommand needs: the prepared config and the compiled commands.
pub struct Runtime {
    pub config: ApiBotConfig,
    pub report: ValidationReport,
    pub client: Client,
    pub registry: Arc<RendererRegistry>,
}

/// `--config` wins; otherwise `config.yaml` in the apibot config directory.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| config_file_path(&config_dir()))
}

/// `APIBOT_BIND` / `APIBOT_PORT` override the file for container deployments.
pub fn apply_env_overrides(config: &mut ApiBotConfig) {
    if let Ok(bind) = std::env::var("APIBOT_BIND") {
        config.server.bind_address = bind;
    }
    if let Some(port) = std::env::var("APIBOT_PORT").ok().and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }
}

/// Read, substitute and validate the config file, then apply env overrides.
pub async fn load_settings(path: &Path) -> Result<(ApiBotConfig, ValidationReport)> {
    let (mut config, report) = load_and_prepare(path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    apply_env_overrides(&mut config);
    Ok((config, report))
}

impl Runtime {
    /// Build the shared HTTP client and compile every command.
    ///
    /// Call after the logger is installed: renderer compile failures are only
    /// reported through the log.
    pub fn build(config: ApiBotConfig, report: ValidationReport) -> Result<Self> {
        let client = http_client(
            Duration::from_secs(config.http.timeout_secs.max(1)),
            &config.http.user_agent,
        )?;
        let registry = Arc::new(RendererRegistry::from_commands(
            client.clone(),
            config.commands.clone(),
        ));
        Ok(Self {
            config,
            report,
            client,
            registry,
        })
    }

    #[cfg(test)]
    pub async fn load(path: &Path) -> Result<Self> {
        let (config, report) = load_settings(path).await?;
        Self::build(config, report)
    }
}
