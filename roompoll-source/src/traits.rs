// ABOUTME: Core EventSource trait that every pluggable source implements.
// ABOUTME: Defines one-time initialization and the blocking wait-for-events call.

use crate::event::{LongPollingEvent, WaitRequest};
use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A unit of domain-specific polling logic (chat messages, presence, ...).
///
/// A single instance is shared by every in-flight poll, so implementations
/// must tolerate concurrent calls for different users and for the same room.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Source name for logging, metrics, and event attribution
    fn name(&self) -> &str;

    /// One-time setup, invoked once when the source is registered.
    ///
    /// An error excludes this source from fan-out; other sources are unaffected.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Wait until events newer than `request.since` exist for the request's
    /// room and user, or until the deadline passes or `cancel` fires.
    ///
    /// Returning an empty vector means "nothing new from me" and is not a
    /// failure. A non-empty vector must be a complete batch.
    async fn wait_for_events(
        &self,
        request: &WaitRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<LongPollingEvent>>;
}
