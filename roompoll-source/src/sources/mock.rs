// ABOUTME: Mock source for testing - replays scripted behaviours per poll.
// ABOUTME: Allows deterministic coordinator tests for delays, failures, hangs, and races.
//!
//! # Example
//!
//! ```no_run
//! use roompoll_source::sources::mock::{MockBehavior, MockSource};
//! use roompoll_source::{Cursor, LongPollingEvent};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let event = LongPollingEvent::new("appointments", "appointment.created", json!({"id": 1}), Cursor::new(10));
//! let source = MockSource::new("appointments")
//!     .once(MockBehavior::RespondAfter(Duration::from_millis(50), vec![event]))
//!     .always(MockBehavior::Empty);
//! ```

use crate::event::{Cursor, LongPollingEvent, WaitRequest};
use crate::registry::{SourceContext, SourceFactory};
use crate::traits::EventSource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

/// What a mock source does on one `wait_for_events` call
#[derive(Clone)]
pub enum MockBehavior {
    /// Return these events immediately
    Respond(Vec<LongPollingEvent>),
    /// Return these events after a delay
    RespondAfter(Duration, Vec<LongPollingEvent>),
    /// Return one freshly stamped event after a delay
    Tick {
        delay: Duration,
        kind: String,
        payload: Value,
    },
    /// Return nothing immediately
    Empty,
    /// Return nothing after a delay
    EmptyAfter(Duration),
    /// Fail with an error immediately
    Fail(String),
    /// Panic inside the source
    Panic(String),
    /// Block until cancelled, then return nothing
    Hang,
    /// Block forever, ignoring cancellation
    Stall,
    /// Wait on a shared barrier, then return these events
    AwaitBarrier(Arc<Barrier>, Vec<LongPollingEvent>),
}

impl std::fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockBehavior::Respond(events) => write!(f, "Respond({} events)", events.len()),
            MockBehavior::RespondAfter(delay, events) => {
                write!(f, "RespondAfter({:?}, {} events)", delay, events.len())
            }
            MockBehavior::Tick { delay, kind, .. } => write!(f, "Tick({:?}, {})", delay, kind),
            MockBehavior::Empty => write!(f, "Empty"),
            MockBehavior::EmptyAfter(delay) => write!(f, "EmptyAfter({:?})", delay),
            MockBehavior::Fail(msg) => write!(f, "Fail({})", msg),
            MockBehavior::Panic(msg) => write!(f, "Panic({})", msg),
            MockBehavior::Hang => write!(f, "Hang"),
            MockBehavior::Stall => write!(f, "Stall"),
            MockBehavior::AwaitBarrier(_, events) => {
                write!(f, "AwaitBarrier({} events)", events.len())
            }
        }
    }
}

#[derive(Default)]
struct MockCounters {
    initialize_calls: AtomicUsize,
    wait_calls: AtomicUsize,
    cancelled_waits: AtomicUsize,
}

/// Mock event source for testing
pub struct MockSource {
    name: String,
    script: Mutex<VecDeque<MockBehavior>>,
    fallback: Mutex<MockBehavior>,
    init_failure: Option<String>,
    counters: Arc<MockCounters>,
}

impl MockSource {
    /// Create a mock source that returns nothing until scripted otherwise
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockBehavior::Empty),
            init_failure: None,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Queue a behaviour for the next unscripted call
    pub fn once(self, behavior: MockBehavior) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(behavior);
        self
    }

    /// Behaviour used once the queued script is exhausted
    pub fn always(self, behavior: MockBehavior) -> Self {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
        self
    }

    /// Make `initialize` fail with the given message
    pub fn fail_init(mut self, message: &str) -> Self {
        self.init_failure = Some(message.to_string());
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.counters.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn wait_calls(&self) -> usize {
        self.counters.wait_calls.load(Ordering::SeqCst)
    }

    /// Waits that ended because the cancellation token fired
    pub fn cancelled_waits(&self) -> usize {
        self.counters.cancelled_waits.load(Ordering::SeqCst)
    }

    /// Build an event attributed to this source
    pub fn event(&self, kind: &str, payload: Value) -> LongPollingEvent {
        LongPollingEvent::new(self.name.as_str(), kind, payload, Cursor::now())
    }

    /// Factory function for the catalog.
    ///
    /// Config keys: `name`, `delay_ms`, `kind`, `payload`, `fail`.
    pub fn factory() -> SourceFactory {
        Box::new(|_ctx: &SourceContext, config: &Value| {
            let name = config
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("mock");
            let delay = Duration::from_millis(
                config.get("delay_ms").and_then(|d| d.as_u64()).unwrap_or(0),
            );

            let behavior = if let Some(message) = config.get("fail").and_then(|f| f.as_str()) {
                MockBehavior::Fail(message.to_string())
            } else if let Some(kind) = config.get("kind").and_then(|k| k.as_str()) {
                MockBehavior::Tick {
                    delay,
                    kind: kind.to_string(),
                    payload: config.get("payload").cloned().unwrap_or(Value::Null),
                }
            } else if delay.is_zero() {
                MockBehavior::Empty
            } else {
                MockBehavior::EmptyAfter(delay)
            };

            let source: Arc<dyn EventSource> = Arc::new(MockSource::new(name).always(behavior));
            Ok(source)
        })
    }

    fn next_behavior(&self) -> MockBehavior {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| {
            self.fallback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        })
    }

    /// Sleep for `delay` unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => {
                self.counters.cancelled_waits.fetch_add(1, Ordering::SeqCst);
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[async_trait]
impl EventSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.counters.initialize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.init_failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    async fn wait_for_events(
        &self,
        _request: &WaitRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<LongPollingEvent>> {
        self.counters.wait_calls.fetch_add(1, Ordering::SeqCst);

        match self.next_behavior() {
            MockBehavior::Respond(events) => Ok(events),
            MockBehavior::RespondAfter(delay, events) => {
                if self.pause(delay, &cancel).await {
                    Ok(events)
                } else {
                    Ok(Vec::new())
                }
            }
            MockBehavior::Tick {
                delay,
                kind,
                payload,
            } => {
                if self.pause(delay, &cancel).await {
                    Ok(vec![self.event(&kind, payload)])
                } else {
                    Ok(Vec::new())
                }
            }
            MockBehavior::Empty => Ok(Vec::new()),
            MockBehavior::EmptyAfter(delay) => {
                self.pause(delay, &cancel).await;
                Ok(Vec::new())
            }
            MockBehavior::Fail(message) => Err(anyhow!("{}", message)),
            MockBehavior::Panic(message) => panic!("{}", message),
            MockBehavior::Hang => {
                cancel.cancelled().await;
                self.counters.cancelled_waits.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
            MockBehavior::Stall => std::future::pending().await,
            MockBehavior::AwaitBarrier(barrier, events) => {
                barrier.wait().await;
                Ok(events)
            }
        }
    }
}

/// Handle that keeps observing a mock source after it is moved into a registry
#[derive(Clone)]
pub struct MockProbe {
    counters: Arc<MockCounters>,
}

impl MockProbe {
    pub fn initialize_calls(&self) -> usize {
        self.counters.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn wait_calls(&self) -> usize {
        self.counters.wait_calls.load(Ordering::SeqCst)
    }

    pub fn cancelled_waits(&self) -> usize {
        self.counters.cancelled_waits.load(Ordering::SeqCst)
    }
}

impl MockSource {
    /// Get a probe sharing this source's call counters
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            counters: Arc::clone(&self.counters),
        }
    }
}
