//! apibot runtime configuration schema.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration with no commands.

use std::collections::BTreeMap;

use apibot_core::CommandConfig;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiBotConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Facebook Messenger credentials; required by `serve`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messenger: Option<MessengerSection>,

    /// Command definitions, written either as a list or as a map keyed by command.
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub commands: Vec<CommandConfig>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            webhook_path: "/webhook".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_concurrent_jobs: 16,
            user_agent: concat!("apibot/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily-rolling JSON logs; console only when unset.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerSection {
    pub access_token: String,
    pub verify_token: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

fn default_graph_url() -> String {
    "https://graph.facebook.com/v2.6".to_string()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandsRepr {
    List(Vec<CommandConfig>),
    Map(BTreeMap<String, CommandConfig>),
}

/// Map entries take their key as `cmd`.
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<CommandConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<CommandsRepr>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(CommandsRepr::List(list)) => list,
        Some(CommandsRepr::Map(map)) => map
            .into_iter()
            .map(|(key, mut config)| {
                config.cmd = key;
                config
            })
            .collect(),
    })
}
