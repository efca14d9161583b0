// ABOUTME: Long-polling wait coordinator for roompoll
// ABOUTME: Fans a poll out to every registered event source and publishes the first batch once

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod report;
pub mod signal;

pub use aggregator::{AppendOutcome, ResultAggregator};
pub use coordinator::{WaitCoordinator, WaitOutcome, WaitResult};
pub use error::{FailurePhase, SourceError};
pub use registry::SourceRegistry;
pub use report::{FailureReporter, RecordingReporter, TracingReporter};
pub use signal::FirstSuccess;

// Re-export roompoll-source types
pub use roompoll_source::{
    Cursor, EventSource, LongPollingEvent, RoomId, SourceCatalog, SourceContext, UserId,
    WaitRequest,
};
