//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the apibot config directory.
/// Priority: `APIBOT_CONFIG_DIR` env > `~/.apibot/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("APIBOT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".apibot"),
        None => PathBuf::from(".apibot"),
    }
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read a YAML or JSON config file into an untyped tree.
///
/// A missing file yields an empty mapping so first runs start from defaults.
pub async fn load_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    // YAML is a superset of JSON, so one parser covers both formats.
    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_is_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let value = load_config(&dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[tokio::test]
    async fn reads_json_and_yaml() {
        let mut yaml = tempfile::NamedTempFile::new().unwrap();
        writeln!(yaml, "server:\n  port: 9000").unwrap();
        let value = load_config(yaml.path()).await.unwrap();
        assert_eq!(value["server"]["port"], 9000);

        let mut json = tempfile::NamedTempFile::new().unwrap();
        write!(json, r#"{{"http": {{"timeout_secs": 3}}}}"#).unwrap();
        let value = load_config(json.path()).await.unwrap();
        assert_eq!(value["http"]["timeout_secs"], 3);
    }

    #[tokio::test]
    async fn blank_file_is_empty_mapping() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_config(file.path()).await.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn parse_error_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "server: [unclosed").unwrap();
        let err = load_config(file.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn config_file_lives_in_dir() {
        assert_eq!(
            config_file_path(Path::new("/etc/apibot")),
            PathBuf::from("/etc/apibot/config.yaml")
        );
    }
}
