// ABOUTME: Wait coordinator that fans one poll out to every registered source.
// ABOUTME: Races the first-success signal against the deadline and returns whatever was aggregated.

use crate::aggregator::{AppendOutcome, ResultAggregator};
use crate::error::SourceError;
use crate::metrics;
use crate::registry::SourceRegistry;
use crate::report::{FailureReporter, TracingReporter};
use crate::signal::FirstSuccess;
use futures::FutureExt;
use roompoll_source::{Cursor, EventSource, LongPollingEvent, RoomId, UserId, WaitRequest};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline used when the wait timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Why a poll cycle ended. Neither case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one source contributed events
    Signalled,
    /// The wait timeout elapsed first
    DeadlineElapsed,
}

impl WaitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::Signalled => "signalled",
            WaitOutcome::DeadlineElapsed => "deadline",
        }
    }
}

/// The single response of a poll cycle
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Events in the order their batches were appended
    pub events: Vec<LongPollingEvent>,
    /// Cursor the client should send on its next poll.
    ///
    /// This is the later of "now" and the newest returned event. An event
    /// stamped between `since` and this cursor whose source was still
    /// waiting when the response was sealed is not delivered on later polls.
    pub cursor: Cursor,
    pub outcome: WaitOutcome,
}

/// Everything one source task needs, scoped to a single poll
struct PollScope {
    request: WaitRequest,
    aggregator: ResultAggregator,
    signal: FirstSuccess,
    cancel: CancellationToken,
    reporter: Arc<dyn FailureReporter>,
}

/// Orchestrates "wait for events" cycles across the source registry.
///
/// Holds no per-request state; concurrent polls share only the registry.
pub struct WaitCoordinator {
    registry: Arc<SourceRegistry>,
    wait_timeout: Duration,
    reporter: Arc<dyn FailureReporter>,
}

impl WaitCoordinator {
    pub fn new(registry: Arc<SourceRegistry>, wait_timeout: Duration) -> Self {
        Self {
            registry,
            wait_timeout,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the default tracing reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run one poll cycle.
    ///
    /// Returns as soon as any source contributes events, or when the wait
    /// timeout elapses, whichever comes first. Never fails: source errors are
    /// reported and treated as "no events".
    pub async fn handle_poll(&self, user_id: UserId, room_id: RoomId, since: Cursor) -> WaitResult {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.wait_timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let scope = Arc::new(PollScope {
            request: WaitRequest::new(user_id, room_id, since, deadline),
            aggregator: ResultAggregator::new(),
            signal: FirstSuccess::new(),
            cancel: CancellationToken::new(),
            reporter: Arc::clone(&self.reporter),
        });

        // Sources are released even if this future is dropped mid-wait.
        let _release = scope.cancel.clone().drop_guard();

        for source in self.registry.iter() {
            tokio::spawn(run_source(Arc::clone(source), Arc::clone(&scope)));
        }

        let outcome = tokio::select! {
            biased;
            _ = scope.signal.fired() => WaitOutcome::Signalled,
            _ = tokio::time::sleep_until(scope.request.deadline) => WaitOutcome::DeadlineElapsed,
        };

        scope.cancel.cancel();
        let events = scope.aggregator.seal();

        let now = Cursor::now();
        let cursor = events
            .iter()
            .map(|e| e.produced_at)
            .max()
            .map_or(now, |newest| newest.max(now));

        let elapsed = started.elapsed();
        metrics::record_poll(outcome.as_str(), events.len(), elapsed);
        tracing::debug!(
            room_id = %scope.request.room_id,
            user_id = %scope.request.user_id,
            since = %since,
            outcome = outcome.as_str(),
            events = events.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll completed"
        );

        WaitResult {
            events,
            cursor,
            outcome,
        }
    }
}

/// Drive one source for one poll and fold its result into the scope
async fn run_source(source: Arc<dyn EventSource>, scope: Arc<PollScope>) {
    let name = source.name().to_string();
    let wait = AssertUnwindSafe(source.wait_for_events(&scope.request, scope.cancel.clone()))
        .catch_unwind();

    // Polling the source first gives it a chance to finish on cancellation;
    // sources that ignore the token are dropped here.
    let result = tokio::select! {
        biased;
        result = wait => result,
        _ = scope.cancel.cancelled() => {
            tracing::trace!(source = %name, "Source abandoned after poll completed");
            return;
        }
    };

    match result {
        Ok(Ok(events)) if events.is_empty() => {
            tracing::trace!(source = %name, "Source had nothing new");
        }
        Ok(Ok(events)) => {
            let count = events.len();
            match scope.aggregator.append(events) {
                AppendOutcome::Appended => {
                    let first = scope.signal.fire();
                    tracing::debug!(source = %name, events = count, first, "Source contributed events");
                }
                AppendOutcome::Sealed => {
                    metrics::record_late_events(&name, count);
                    tracing::debug!(
                        source = %name,
                        events = count,
                        "Events arrived after the response was taken; dropped"
                    );
                }
            }
        }
        Ok(Err(error)) => {
            let error = SourceError::Runtime {
                source_name: name,
                error,
            };
            scope.reporter.report(&error, Some(&scope.request));
        }
        Err(panic) => {
            let error = SourceError::from_panic(&name, panic);
            scope.reporter.report(&error, Some(&scope.request));
        }
    }
}
