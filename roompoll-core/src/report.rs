// ABOUTME: Side channel for source failures that must never fail a poll.
// ABOUTME: FailureReporter is injected into the registry and coordinator; the default logs and counts.

use crate::error::SourceError;
use crate::metrics;
use roompoll_source::{RoomId, UserId, WaitRequest};
use std::sync::Mutex;

/// Observability collaborator that receives every suppressed source failure
pub trait FailureReporter: Send + Sync {
    /// Called once per failure. `request` is `None` for initialization failures.
    fn report(&self, error: &SourceError, request: Option<&WaitRequest>);
}

/// Default reporter: structured warning plus a failure counter
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, error: &SourceError, request: Option<&WaitRequest>) {
        match request {
            Some(request) => tracing::warn!(
                source = %error.source_name(),
                phase = error.phase().as_str(),
                room_id = %request.room_id,
                user_id = %request.user_id,
                error = %error,
                "Event source failed; continuing without it"
            ),
            None => tracing::warn!(
                source = %error.source_name(),
                phase = error.phase().as_str(),
                error = %error,
                "Event source failed; continuing without it"
            ),
        }
        metrics::record_source_failure(error.source_name(), error.phase().as_str());
    }
}

/// A failure captured by [`RecordingReporter`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedFailure {
    pub source_name: String,
    pub phase: crate::error::FailurePhase,
    pub message: String,
    pub room_id: Option<RoomId>,
    pub user_id: Option<UserId>,
}

/// Reporter that keeps every failure in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<ReportedFailure>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, error: &SourceError, request: Option<&WaitRequest>) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ReportedFailure {
                source_name: error.source_name().to_string(),
                phase: error.phase(),
                message: error.to_string(),
                room_id: request.map(|r| r.room_id.clone()),
                user_id: request.map(|r| r.user_id.clone()),
            });
    }
}
