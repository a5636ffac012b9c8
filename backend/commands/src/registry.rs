/// Renderer registry: command key → compiled renderer.
///
/// Built once from configuration; `add` may replace entries at runtime while
/// lookups are in flight. Lookups hand out `Arc`s, so a job keeps the renderer
/// it started with even if the key is re-registered mid-flight.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use apibot_core::CommandConfig;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::renderer::{default_client, Renderer};

/// One line of a command listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub cmd: String,
    pub args: Vec<String>,
    pub description: Option<String>,
}

pub struct RendererRegistry {
    renderers: RwLock<HashMap<String, Arc<Renderer>>>,
    client: Client,
}

impl RendererRegistry {
    /// Build a registry from `(key, config)` pairs with a [`default_client`].
    pub fn new<I>(map: I) -> Self
    where
        I: IntoIterator<Item = (String, CommandConfig)>,
    {
        Self::with_client(default_client(), map)
    }

    pub fn with_client<I>(client: Client, map: I) -> Self
    where
        I: IntoIterator<Item = (String, CommandConfig)>,
    {
        let registry = Self {
            renderers: RwLock::new(HashMap::new()),
            client,
        };
        for (key, config) in map {
            registry.add(key, config);
        }
        info!(commands = registry.len(), "Renderer registry built");
        registry
    }

    /// Build from a list of configurations keyed by their own `cmd`.
    pub fn from_commands(client: Client, commands: Vec<CommandConfig>) -> Self {
        Self::with_client(client, commands.into_iter().map(|c| (c.cmd.clone(), c)))
    }

    /// Register or replace the renderer for `key`.
    pub fn add(&self, key: impl Into<String>, config: CommandConfig) {
        let key = key.into();
        let renderer = Arc::new(Renderer::with_client(key.clone(), config, self.client.clone()));
        for error in renderer.compile_errors() {
            warn!(cmd = %key, error = %error, "Command will answer with the fallback reply");
        }
        if self.write().insert(key.clone(), renderer).is_some() {
            warn!(cmd = %key, "Replaced existing command renderer");
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn get_renderer(&self, cmd: &str) -> Option<Arc<Renderer>> {
        self.read().get(cmd).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All registered renderers, sorted by key.
    pub fn renderers(&self) -> Vec<Arc<Renderer>> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.cmd().cmp(b.cmd()));
        all
    }

    pub fn commands(&self) -> Vec<CommandSummary> {
        self.renderers()
            .iter()
            .map(|r| CommandSummary {
                cmd: r.cmd().to_string(),
                args: r.config().args.clone(),
                description: r.config().description.clone(),
            })
            .collect()
    }

    // A panic while holding the lock cannot leave the map half-written, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Renderer>>> {
        self.renderers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Renderer>>> {
        self.renderers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}
