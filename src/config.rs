use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

use crate::TableId;
use crate::error::RoutingError;

/// Priority of every routing rule. Load-balancer rules sit above it.
pub const DEFAULT_PRIORITY: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    pub table: TableId,
    #[serde(default = "default_priority")]
    pub priority: u16,
    #[serde(default)]
    pub idle_timeout: Option<u16>, // seconds, None = permanent
    #[serde(default = "default_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_priority() -> u16 {
    DEFAULT_PRIORITY
}

fn default_queue_depth() -> usize {
    1024
}

impl RoutingConfig {
    pub fn new(table: TableId) -> Self {
        Self {
            table,
            priority: DEFAULT_PRIORITY,
            idle_timeout: None,
            event_queue_depth: default_queue_depth(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path))?;
        let config: RoutingConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Builds a config from controller module parameters, e.g. `{"table": "1"}`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, RoutingError> {
        let table = params
            .get("table")
            .ok_or_else(|| RoutingError::InvalidConfig("missing parameter 'table'".to_string()))?
            .trim()
            .parse::<TableId>()
            .map_err(|e| RoutingError::InvalidConfig(format!("table: {}", e)))?;

        let mut config = Self::new(table);

        if let Some(priority) = params.get("priority") {
            config.priority = priority
                .trim()
                .parse()
                .map_err(|e| RoutingError::InvalidConfig(format!("priority: {}", e)))?;
        }

        if let Some(idle) = params.get("idle_timeout") {
            config.idle_timeout = Some(
                idle.trim()
                    .parse()
                    .map_err(|e| RoutingError::InvalidConfig(format!("idle_timeout: {}", e)))?,
            );
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.event_queue_depth == 0 {
            return Err(RoutingError::InvalidConfig(
                "event_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
