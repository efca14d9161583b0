// ABOUTME: Per-poll accumulation point for events contributed by concurrent source tasks.
// ABOUTME: Appends are serialized under a lock; sealing takes the final snapshot and rejects late appends.

use roompoll_source::LongPollingEvent;
use std::sync::Mutex;

/// Result of trying to contribute events to an aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Events were added and will be part of the response
    Appended,
    /// The response was already taken; events were discarded
    Sealed,
}

#[derive(Default)]
struct AggregatorState {
    events: Vec<LongPollingEvent>,
    sealed: bool,
}

/// Shared result buffer scoped to a single poll cycle
#[derive(Default)]
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically append a batch. A batch is either included whole or not at all.
    pub fn append(&self, events: Vec<LongPollingEvent>) -> AppendOutcome {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.sealed {
            return AppendOutcome::Sealed;
        }
        state.events.extend(events);
        AppendOutcome::Appended
    }

    /// Copy out everything appended so far
    pub fn snapshot(&self) -> Vec<LongPollingEvent> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .clone()
    }

    /// Take the final contents and refuse any further appends.
    ///
    /// Every append that acquired the lock before this call is included;
    /// every later append returns [`AppendOutcome::Sealed`].
    pub fn seal(&self) -> Vec<LongPollingEvent> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sealed = true;
        std::mem::take(&mut state.events)
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).sealed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roompoll_source::Cursor;
    use serde_json::json;
    use std::sync::Arc;

    fn event(source: &str, n: i64) -> LongPollingEvent {
        LongPollingEvent::new(source, "test.event", json!({ "n": n }), Cursor::new(n))
    }

    #[test]
    fn test_snapshot_does_not_drain() {
        let aggregator = ResultAggregator::new();
        aggregator.append(vec![event("a", 1)]);
        assert_eq!(aggregator.snapshot().len(), 1);
        assert_eq!(aggregator.snapshot().len(), 1);
        assert!(!aggregator.is_sealed());
    }

    #[test]
    fn test_seal_rejects_late_appends() {
        let aggregator = ResultAggregator::new();
        assert_eq!(aggregator.append(vec![event("a", 1)]), AppendOutcome::Appended);

        let sealed = aggregator.seal();
        assert_eq!(sealed, vec![event("a", 1)]);

        assert_eq!(aggregator.append(vec![event("b", 2)]), AppendOutcome::Sealed);
        assert!(aggregator.is_empty());
        assert!(aggregator.is_sealed());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let aggregator = Arc::new(ResultAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let source = format!("s{}", t);
                        aggregator.append(vec![event(&source, i), event(&source, i + 1000)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = aggregator.seal();
        assert_eq!(events.len(), 8 * 100 * 2);

        // Each batch stays contiguous.
        for pair in events.chunks(2) {
            assert_eq!(pair[0].source, pair[1].source);
            assert_eq!(pair[0].produced_at.value() + 1000, pair[1].produced_at.value());
        }
    }
}
