// ABOUTME: Catalog of named source factories for config-driven source selection.
// ABOUTME: Sources register factories, roompoll creates them by type name from config.

use crate::config::SourceConfig;
use crate::sources::chat::ChatStore;
use crate::sources::presence::PresenceBoard;
use crate::traits::EventSource;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared backing stores handed to every factory.
///
/// The transport writes into the same stores (e.g., posting chat messages),
/// so sources and writers must be built from one context.
#[derive(Clone, Default)]
pub struct SourceContext {
    pub chat: ChatStore,
    pub presence: PresenceBoard,
}

impl SourceContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Source types backed by the shared stores in [`SourceContext`].
///
/// Two sources of one of these types would report the same events, so at
/// most one of each may be configured.
pub const SHARED_STORE_SOURCES: &[&str] = &["chat", "presence"];

/// Factory function that creates an event source from config
pub type SourceFactory =
    Box<dyn Fn(&SourceContext, &Value) -> Result<Arc<dyn EventSource>> + Send + Sync>;

/// Catalog for runtime source selection
pub struct SourceCatalog {
    factories: HashMap<String, SourceFactory>,
}

impl SourceCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a source factory by type name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&SourceContext, &Value) -> Result<Arc<dyn EventSource>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a source by type name with the given config
    pub fn create(
        &self,
        name: &str,
        ctx: &SourceContext,
        config: &Value,
    ) -> Result<Arc<dyn EventSource>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown event source: {}", name))?;
        factory(ctx, config)
    }

    /// List available source type names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create a source from a SourceConfig
    pub fn create_from_config(
        &self,
        ctx: &SourceContext,
        config: &SourceConfig,
    ) -> Result<Arc<dyn EventSource>> {
        let json_config = config.to_json_value();
        self.create(config.source_type(), ctx, &json_config)
    }
}

impl Default for SourceCatalog {
    fn default() -> Self {
        use crate::sources::chat::ChatSource;
        use crate::sources::mock::MockSource;
        use crate::sources::presence::PresenceSource;

        Self::new()
            .register("chat", ChatSource::factory())
            .register("presence", PresenceSource::factory())
            .register("mock", MockSource::factory())
    }
}
