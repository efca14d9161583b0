// ABOUTME: Per-source configuration with a type discriminator.
// ABOUTME: Loaded from `[[sources]]` TOML tables and handed to catalog factories as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Source configuration with type discriminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type: "chat", "presence", "mock", etc.
    #[serde(rename = "type")]
    pub source_type: String,

    /// Remaining fields passed to the source factory
    #[serde(flatten)]
    pub config: toml::Table,
}

impl SourceConfig {
    /// Config for a source type with no extra settings
    pub fn of_type(source_type: &str) -> Self {
        Self {
            source_type: source_type.to_string(),
            config: toml::Table::new(),
        }
    }

    /// Parse a single source table from TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse source config TOML")
    }

    /// Get source type name
    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    /// Convert config table to serde_json::Value for the catalog
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::json!({}))
    }
}
