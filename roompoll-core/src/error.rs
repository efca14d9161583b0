// ABOUTME: Typed errors raised by event sources at the coordinator boundary.
// ABOUTME: Always scoped to one source; never fails a poll as a whole.

use thiserror::Error;

/// Which stage of a source's lifecycle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    Initialization,
    Runtime,
}

impl FailurePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePhase::Initialization => "initialization",
            FailurePhase::Runtime => "runtime",
        }
    }
}

/// A failure isolated to a single event source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source '{source_name}' failed to initialize: {error:#}")]
    Initialization {
        source_name: String,
        error: anyhow::Error,
    },

    #[error("Source '{source_name}' failed while waiting for events: {error:#}")]
    Runtime {
        source_name: String,
        error: anyhow::Error,
    },

    #[error("Source '{source_name}' panicked while waiting for events: {message}")]
    Panicked {
        source_name: String,
        message: String,
    },
}

impl SourceError {
    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Initialization { source_name, .. }
            | SourceError::Runtime { source_name, .. }
            | SourceError::Panicked { source_name, .. } => source_name,
        }
    }

    pub fn phase(&self) -> FailurePhase {
        match self {
            SourceError::Initialization { .. } => FailurePhase::Initialization,
            SourceError::Runtime { .. } | SourceError::Panicked { .. } => FailurePhase::Runtime,
        }
    }

    /// Build a panic error from the payload caught at the task boundary
    pub fn from_panic(source_name: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        SourceError::Panicked {
            source_name: source_name.to_string(),
            message,
        }
    }
}
