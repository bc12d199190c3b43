//! Configuration for graph construction, identity retry and logging.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecGraphConfig {
    /// Graph builder settings.
    #[serde(default)]
    pub graph: GraphConfig,
    /// Identity retry settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExecGraphConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the graph settings.
    #[must_use]
    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    /// Sets the identity settings.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the logging settings.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

/// Graph builder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// When extending a partial graph, drop records outside its downstream
    /// closure instead of failing on their unresolved parents.
    #[serde(default = "default_drop_unreachable")]
    pub drop_unreachable_in_partial: bool,
    /// Number of graphs kept by [`crate::graph::GraphCache`].
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_drop_unreachable() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    64
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            drop_unreachable_in_partial: default_drop_unreachable(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl GraphConfig {
    /// Sets whether unreachable records are dropped from partial graphs.
    #[must_use]
    pub fn with_drop_unreachable_in_partial(mut self, drop: bool) -> Self {
        self.drop_unreachable_in_partial = drop;
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Identity retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Ignore children superseded by a later retry.
    #[serde(default = "default_skip_old_retries")]
    pub skip_old_retries: bool,
    /// Emit `identity.*` events to the configured sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

fn default_skip_old_retries() -> bool {
    true
}

fn default_emit_events() -> bool {
    true
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            skip_old_retries: default_skip_old_retries(),
            emit_events: default_emit_events(),
        }
    }
}

impl IdentityConfig {
    /// Sets whether old retries are ignored.
    #[must_use]
    pub fn with_skip_old_retries(mut self, skip: bool) -> Self {
        self.skip_old_retries = skip;
        self
    }

    /// Sets whether events are emitted.
    #[must_use]
    pub fn with_emit_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `EXECGRAPH_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Sets the default level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enables or disables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
