// ABOUTME: Presence source that reports users joining and leaving a room.
// ABOUTME: Polling marks a user as seen; idle users are expired by periodic sweeps.

use crate::event::{Cursor, LongPollingEvent, RoomId, UserId, WaitRequest};
use crate::registry::{SourceContext, SourceFactory};
use crate::traits::EventSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const PRESENCE_JOINED_KIND: &str = "presence.joined";
pub const PRESENCE_LEFT_KIND: &str = "presence.left";

/// Changes retained per room for late pollers
const CHANGE_LOG_LIMIT: usize = 256;

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_millis(1000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Joined,
    Left,
}

impl PresenceKind {
    fn event_kind(&self) -> &'static str {
        match self {
            PresenceKind::Joined => PRESENCE_JOINED_KIND,
            PresenceKind::Left => PRESENCE_LEFT_KIND,
        }
    }
}

/// A user entering or leaving a room
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub kind: PresenceKind,
    pub at: Cursor,
}

#[derive(Default)]
struct PresenceState {
    seen: HashMap<RoomId, HashMap<UserId, Instant>>,
    changes: HashMap<RoomId, VecDeque<PresenceChange>>,
    last_change: Cursor,
}

impl PresenceState {
    fn record(&mut self, room_id: &RoomId, user_id: &UserId, kind: PresenceKind) {
        let at = Cursor::now().max(self.last_change.next());
        self.last_change = at;
        let log = self.changes.entry(room_id.clone()).or_default();
        log.push_back(PresenceChange {
            user_id: user_id.clone(),
            kind,
            at,
        });
        while log.len() > CHANGE_LOG_LIMIT {
            log.pop_front();
        }
    }
}

struct PresenceInner {
    state: Mutex<PresenceState>,
    version: watch::Sender<u64>,
}

/// Cloneable handle to who is currently in which room
#[derive(Clone)]
pub struct PresenceBoard {
    inner: Arc<PresenceInner>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(PresenceInner {
                state: Mutex::new(PresenceState::default()),
                version,
            }),
        }
    }

    /// Mark a user as present. Returns true when this is a new arrival.
    pub fn touch(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let joined = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let previous = state
                .seen
                .entry(room_id.clone())
                .or_default()
                .insert(user_id.clone(), Instant::now());
            if previous.is_none() {
                state.record(room_id, user_id, PresenceKind::Joined);
            }
            previous.is_none()
        };

        if joined {
            tracing::debug!(room_id = %room_id, user_id = %user_id, "User joined");
            self.notify();
        }
        joined
    }

    /// Drop users not seen within `idle_timeout`. Returns how many left.
    pub fn expire(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let left = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut departures = Vec::new();
            for (room_id, users) in state.seen.iter_mut() {
                users.retain(|user_id, last_seen| {
                    let idle = now.saturating_duration_since(*last_seen) >= idle_timeout;
                    if idle {
                        departures.push((room_id.clone(), user_id.clone()));
                    }
                    !idle
                });
            }
            state.seen.retain(|_, users| !users.is_empty());
            for (room_id, user_id) in &departures {
                state.record(room_id, user_id, PresenceKind::Left);
                tracing::debug!(room_id = %room_id, user_id = %user_id, "User left");
            }
            departures.len()
        };

        if left > 0 {
            self.notify();
        }
        left
    }

    /// Users currently present in a room, sorted
    pub fn online(&self, room_id: &RoomId) -> Vec<UserId> {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut users: Vec<UserId> = state
            .seen
            .get(room_id)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Changes in a room recorded strictly after `since`, oldest first
    pub fn changes_since(&self, room_id: &RoomId, since: Cursor) -> Vec<PresenceChange> {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .changes
            .get(room_id)
            .map(|log| log.iter().filter(|c| c.at > since).cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&self) {
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}

impl Default for PresenceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Event source reporting other users joining or leaving the polled room
pub struct PresenceSource {
    name: String,
    board: PresenceBoard,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl PresenceSource {
    pub fn new(board: PresenceBoard) -> Self {
        Self {
            name: "presence".to_string(),
            board,
            idle_timeout: default_idle_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Factory function for the catalog
    pub fn factory() -> SourceFactory {
        Box::new(|ctx: &SourceContext, config: &Value| {
            let mut source = PresenceSource::new(ctx.presence.clone());
            if let Some(secs) = config.get("idle_timeout_secs") {
                let secs = secs
                    .as_u64()
                    .filter(|s| *s > 0)
                    .context("presence idle_timeout_secs must be a positive integer")?;
                source = source.with_idle_timeout(Duration::from_secs(secs));
            }
            if let Some(ms) = config.get("sweep_interval_ms") {
                let ms = ms
                    .as_u64()
                    .filter(|ms| *ms > 0)
                    .context("presence sweep_interval_ms must be a positive integer")?;
                source = source.with_sweep_interval(Duration::from_millis(ms));
            }
            if let Some(name) = config.get("name").and_then(|n| n.as_str()) {
                source = source.with_name(name);
            }
            let source: Arc<dyn EventSource> = Arc::new(source);
            Ok(source)
        })
    }

    fn to_event(&self, change: &PresenceChange) -> LongPollingEvent {
        LongPollingEvent::new(
            self.name.as_str(),
            change.kind.event_kind(),
            json!({ "user_id": change.user_id }),
            change.at,
        )
    }
}

#[async_trait]
impl EventSource for PresenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn wait_for_events(
        &self,
        request: &WaitRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<LongPollingEvent>> {
        let mut changes = self.board.subscribe();
        self.board.touch(&request.room_id, &request.user_id);

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let fresh: Vec<LongPollingEvent> = self
                .board
                .changes_since(&request.room_id, request.since)
                .iter()
                .filter(|c| c.user_id != request.user_id)
                .map(|c| self.to_event(c))
                .collect();
            if !fresh.is_empty() {
                return Ok(fresh);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Vec::new()),
                _ = tokio::time::sleep_until(request.deadline) => return Ok(Vec::new()),
                _ = sweep.tick() => {
                    // A user blocked in a poll is still present.
                    self.board.touch(&request.room_id, &request.user_id);
                    self.board.expire(self.idle_timeout);
                }
                changed = changes.changed() => changed.context("Presence board closed")?,
            }
        }
    }
}
