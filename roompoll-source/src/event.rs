// ABOUTME: Value types shared by every event source and the coordinator.
// ABOUTME: Identifiers, the timestamp cursor, LongPollingEvent, and the per-call WaitRequest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque identifier of the principal that is polling
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier scoping which events are relevant to a poll
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Watermark separating already-seen events from new ones.
///
/// Measured in microseconds since the Unix epoch. The client echoes the
/// cursor from its previous response; anything produced strictly after it
/// is new.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Everything ever produced is newer than this
    pub const ZERO: Cursor = Cursor(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Current wall-clock time as a cursor
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_micros())
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// The smallest cursor strictly greater than this one
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// A single event handed back to a polling client.
///
/// Produced by exactly one source and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LongPollingEvent {
    /// Name of the source that produced this event
    pub source: String,
    /// Source-defined kind (e.g., "chat.message", "presence.joined")
    pub kind: String,
    /// Event payload
    pub payload: Value,
    /// When the event was produced
    pub produced_at: Cursor,
}

impl LongPollingEvent {
    pub fn new(
        source: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
        produced_at: Cursor,
    ) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            payload,
            produced_at,
        }
    }
}

/// Everything a source needs to know about one poll cycle
#[derive(Debug, Clone)]
pub struct WaitRequest {
    pub user_id: UserId,
    pub room_id: RoomId,
    /// Events produced after this cursor are new to the client
    pub since: Cursor,
    /// Shared deadline of the poll cycle
    pub deadline: Instant,
}

impl WaitRequest {
    pub fn new(user_id: UserId, room_id: RoomId, since: Cursor, deadline: Instant) -> Self {
        Self {
            user_id,
            room_id,
            since,
            deadline,
        }
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
