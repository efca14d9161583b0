// ABOUTME: Chat message source backed by an in-memory, per-room message log.
// ABOUTME: Waits on store change notifications until messages newer than the cursor exist.

use crate::event::{Cursor, LongPollingEvent, RoomId, UserId, WaitRequest};
use crate::registry::{SourceContext, SourceFactory};
use crate::traits::EventSource;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Event kind for chat messages
pub const CHAT_MESSAGE_KIND: &str = "chat.message";

/// Default number of messages retained per room
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// A message posted to a room
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: RoomId,
    pub author: UserId,
    pub text: String,
    pub posted_at: Cursor,
}

impl ChatMessage {
    fn to_event(&self, source: &str) -> LongPollingEvent {
        LongPollingEvent::new(
            source,
            CHAT_MESSAGE_KIND,
            json!({
                "id": self.id,
                "author": self.author,
                "text": self.text,
            }),
            self.posted_at,
        )
    }
}

#[derive(Default)]
struct ChatState {
    rooms: HashMap<RoomId, VecDeque<ChatMessage>>,
    last_posted: Cursor,
}

struct ChatStoreInner {
    state: Mutex<ChatState>,
    history_limit: AtomicUsize,
    version: watch::Sender<u64>,
}

/// Cloneable handle to the shared chat log.
///
/// Writers call [`ChatStore::post`]; the chat source reads from the same
/// handle and is woken whenever anything is posted.
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<ChatStoreInner>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(ChatStoreInner {
                state: Mutex::new(ChatState::default()),
                history_limit: AtomicUsize::new(limit.max(1)),
                version,
            }),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.inner.history_limit.load(Ordering::Relaxed)
    }

    pub fn set_history_limit(&self, limit: usize) {
        self.inner
            .history_limit
            .store(limit.max(1), Ordering::Relaxed);
    }

    /// Append a message to a room and wake every waiting poll.
    ///
    /// Timestamps are strictly increasing across the whole store, even if the
    /// wall clock steps backwards.
    pub fn post(&self, room_id: &RoomId, author: &UserId, text: &str) -> Result<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Message text cannot be empty");
        }

        let message = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let posted_at = Cursor::now().max(state.last_posted.next());
            state.last_posted = posted_at;

            let message = ChatMessage {
                id: uuid::Uuid::new_v4().to_string(),
                room_id: room_id.clone(),
                author: author.clone(),
                text: text.to_string(),
                posted_at,
            };

            let limit = self.history_limit();
            let history = state.rooms.entry(room_id.clone()).or_default();
            history.push_back(message.clone());
            while history.len() > limit {
                history.pop_front();
            }
            message
        };

        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
        tracing::debug!(
            room_id = %room_id,
            author = %author,
            posted_at = %message.posted_at,
            "Chat message posted"
        );
        Ok(message)
    }

    /// Messages in a room posted strictly after `since`, oldest first
    pub fn messages_since(&self, room_id: &RoomId, since: Cursor) -> Vec<ChatMessage> {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .rooms
            .get(room_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|m| m.posted_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Event source that reports new chat messages in the polled room
pub struct ChatSource {
    name: String,
    store: ChatStore,
}

impl ChatSource {
    pub fn new(store: ChatStore) -> Self {
        Self::named("chat", store)
    }

    pub fn named(name: impl Into<String>, store: ChatStore) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Factory function for the catalog.
    ///
    /// Reads an optional `history_limit` and applies it to the shared store.
    pub fn factory() -> SourceFactory {
        Box::new(|ctx: &SourceContext, config: &Value| {
            if let Some(limit) = config.get("history_limit") {
                let limit = limit
                    .as_u64()
                    .filter(|l| *l > 0)
                    .context("chat history_limit must be a positive integer")?;
                ctx.chat.set_history_limit(limit as usize);
            }
            let name = config
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("chat");
            let source: Arc<dyn EventSource> = Arc::new(ChatSource::named(name, ctx.chat.clone()));
            Ok(source)
        })
    }
}

#[async_trait]
impl EventSource for ChatSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        tracing::info!(
            source = %self.name,
            history_limit = self.store.history_limit(),
            "Chat source ready"
        );
        Ok(())
    }

    async fn wait_for_events(
        &self,
        request: &WaitRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<LongPollingEvent>> {
        // Subscribe before the first read so a post between the read and the
        // wait still wakes us.
        let mut changes = self.store.subscribe();

        loop {
            let fresh = self.store.messages_since(&request.room_id, request.since);
            if !fresh.is_empty() {
                return Ok(fresh.iter().map(|m| m.to_event(&self.name)).collect());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Vec::new()),
                _ = tokio::time::sleep_until(request.deadline) => return Ok(Vec::new()),
                changed = changes.changed() => changed.context("Chat store closed")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_rejects_blank_text() {
        let store = ChatStore::new();
        let result = store.post(&RoomId::from("lobby"), &UserId::from("alice"), "   ");
        assert!(result.is_err());
        assert!(store
            .messages_since(&RoomId::from("lobby"), Cursor::ZERO)
            .is_empty());
    }

    #[test]
    fn test_post_timestamps_strictly_increase() {
        let store = ChatStore::new();
        let room = RoomId::from("lobby");
        let alice = UserId::from("alice");
        let first = store.post(&room, &alice, "one").unwrap();
        let second = store.post(&room, &alice, "two").unwrap();
        let third = store.post(&room, &alice, "three").unwrap();
        assert!(first.posted_at < second.posted_at);
        assert!(second.posted_at < third.posted_at);
    }

    #[test]
    fn test_history_limit_trims_oldest() {
        let store = ChatStore::with_history_limit(2);
        let room = RoomId::from("lobby");
        let alice = UserId::from("alice");
        store.post(&room, &alice, "one").unwrap();
        store.post(&room, &alice, "two").unwrap();
        store.post(&room, &alice, "three").unwrap();

        let texts: Vec<_> = store
            .messages_since(&room, Cursor::ZERO)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn test_messages_are_scoped_to_room() {
        let store = ChatStore::new();
        let alice = UserId::from("alice");
        store.post(&RoomId::from("a"), &alice, "in a").unwrap();
        store.post(&RoomId::from("b"), &alice, "in b").unwrap();

        let in_a = store.messages_since(&RoomId::from("a"), Cursor::ZERO);
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].text, "in a");
    }
}
