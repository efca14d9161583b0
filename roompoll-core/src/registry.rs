// ABOUTME: Ordered, read-only set of initialized event sources shared by all polls.
// ABOUTME: Initializes every candidate exactly once; sources that fail are excluded and reported.

use crate::error::SourceError;
use crate::report::FailureReporter;
use anyhow::{bail, Context, Result};
use roompoll_source::config::SourceConfig;
use roompoll_source::registry::SHARED_STORE_SOURCES;
use roompoll_source::{EventSource, SourceCatalog, SourceContext};
use std::collections::HashSet;
use std::sync::Arc;

/// Registered event sources, in registration order
pub struct SourceRegistry {
    sources: Vec<Arc<dyn EventSource>>,
}

impl SourceRegistry {
    /// Initialize each candidate in order and keep the ones that succeed
    pub async fn build(
        candidates: Vec<Arc<dyn EventSource>>,
        reporter: &dyn FailureReporter,
    ) -> Self {
        let mut sources = Vec::with_capacity(candidates.len());
        for source in candidates {
            match source.initialize().await {
                Ok(()) => {
                    tracing::debug!(source = %source.name(), "Event source registered");
                    sources.push(source);
                }
                Err(error) => {
                    let error = SourceError::Initialization {
                        source_name: source.name().to_string(),
                        error,
                    };
                    reporter.report(&error, None);
                }
            }
        }

        tracing::info!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Source registry ready"
        );
        Self { sources }
    }

    /// Create sources from config through the catalog, then initialize them.
    ///
    /// Unknown source types, invalid source settings, duplicate source names,
    /// and a second source over a shared store are configuration errors and
    /// abort the build. Initialization failures do not.
    pub async fn from_configs(
        catalog: &SourceCatalog,
        ctx: &SourceContext,
        configs: &[SourceConfig],
        reporter: &dyn FailureReporter,
    ) -> Result<Self> {
        let mut candidates = Vec::with_capacity(configs.len());
        let mut shared = HashSet::new();
        let mut names = HashSet::new();
        for config in configs {
            let source_type = config.source_type();
            if SHARED_STORE_SOURCES.contains(&source_type) && !shared.insert(source_type) {
                bail!("Only one '{}' source may be configured", source_type);
            }
            let source = catalog
                .create_from_config(ctx, config)
                .with_context(|| format!("Failed to create '{}' source", source_type))?;
            if !names.insert(source.name().to_string()) {
                bail!("Duplicate event source name: {}", source.name());
            }
            candidates.push(source);
        }
        Ok(Self::build(candidates, reporter).await)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EventSource>> {
        self.sources.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
