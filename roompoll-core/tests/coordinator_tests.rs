// ABOUTME: Integration tests for the wait coordinator using scripted mock sources
// ABOUTME: Covers first-success, deadline bounds, failure isolation, races, and cancellation

use roompoll_core::{
    Cursor, EventSource, FailurePhase, LongPollingEvent, RecordingReporter, RoomId,
    SourceRegistry, UserId, WaitCoordinator, WaitOutcome,
};
use roompoll_source::sources::chat::{ChatSource, ChatStore};
use roompoll_source::sources::mock::{MockBehavior, MockSource};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(30);

fn event(source: &str, n: u64) -> LongPollingEvent {
    LongPollingEvent::new(source, "test.event", json!({ "n": n }), Cursor::now())
}

async fn coordinator(
    sources: Vec<Arc<dyn EventSource>>,
    timeout: Duration,
) -> (WaitCoordinator, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::new());
    let registry = SourceRegistry::build(sources, reporter.as_ref()).await;
    let coordinator =
        WaitCoordinator::new(Arc::new(registry), timeout).with_reporter(reporter.clone());
    (coordinator, reporter)
}

async fn poll(coordinator: &WaitCoordinator) -> roompoll_core::WaitResult {
    coordinator
        .handle_poll(UserId::from("alice"), RoomId::from("lobby"), Cursor::ZERO)
        .await
}

#[tokio::test(start_paused = true)]
async fn test_first_success_ends_wait_early() {
    let source = MockSource::new("appointments").always(MockBehavior::RespondAfter(
        Duration::from_secs(2),
        vec![event("appointments", 1)],
    ));
    let (coordinator, reporter) = coordinator(vec![Arc::new(source)], TIMEOUT).await;

    let started = Instant::now();
    let result = poll(&coordinator).await;

    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(result.outcome, WaitOutcome::Signalled);
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].source, "appointments");
    assert!(reporter.failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_wait_when_every_source_hangs() {
    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(MockSource::new("stalled").always(MockBehavior::Stall)),
        Arc::new(MockSource::new("hung").always(MockBehavior::Hang)),
    ];
    let (coordinator, _reporter) = coordinator(sources, TIMEOUT).await;

    let started = Instant::now();
    let result = poll(&coordinator).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= TIMEOUT);
    assert!(elapsed < TIMEOUT + Duration::from_millis(50));
    assert_eq!(result.outcome, WaitOutcome::DeadlineElapsed);
    assert!(result.events.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_is_not_early_completion_or_failure() {
    let source = MockSource::new("quiet").always(MockBehavior::Empty);
    let probe = source.probe();
    let (coordinator, reporter) = coordinator(vec![Arc::new(source)], TIMEOUT).await;

    let started = Instant::now();
    let result = poll(&coordinator).await;

    assert_eq!(started.elapsed(), TIMEOUT);
    assert_eq!(result.outcome, WaitOutcome::DeadlineElapsed);
    assert!(result.events.is_empty());
    assert!(reporter.failures().is_empty());
    assert_eq!(probe.wait_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_does_not_block_others() {
    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(MockSource::new("broken").always(MockBehavior::Fail("io error".to_string()))),
        Arc::new(MockSource::new("chat").always(MockBehavior::RespondAfter(
            Duration::from_millis(200),
            vec![event("chat", 1), event("chat", 2)],
        ))),
    ];
    let (coordinator, reporter) = coordinator(sources, TIMEOUT).await;

    let result = poll(&coordinator).await;

    assert_eq!(result.outcome, WaitOutcome::Signalled);
    assert_eq!(result.events.len(), 2);
    assert!(result.events.iter().all(|e| e.source == "chat"));

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source_name, "broken");
    assert_eq!(failures[0].phase, FailurePhase::Runtime);
    assert!(failures[0].message.contains("io error"));
    assert_eq!(failures[0].room_id, Some(RoomId::from("lobby")));
    assert_eq!(failures[0].user_id, Some(UserId::from("alice")));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_source_is_reported_and_isolated() {
    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(MockSource::new("buggy").always(MockBehavior::Panic("index out of range".to_string()))),
        Arc::new(MockSource::new("chat").always(MockBehavior::RespondAfter(
            Duration::from_millis(100),
            vec![event("chat", 1)],
        ))),
    ];
    let (coordinator, reporter) = coordinator(sources, TIMEOUT).await;

    let result = poll(&coordinator).await;

    assert_eq!(result.events.len(), 1);
    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source_name, "buggy");
    assert!(failures[0].message.contains("panicked"));
    assert!(failures[0].message.contains("index out of range"));
}

#[tokio::test]
async fn test_simultaneous_sources_are_both_included() {
    let barrier = Arc::new(Barrier::new(2));
    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(MockSource::new("a").always(MockBehavior::AwaitBarrier(
            Arc::clone(&barrier),
            vec![event("a", 1)],
        ))),
        Arc::new(MockSource::new("b").always(MockBehavior::AwaitBarrier(
            Arc::clone(&barrier),
            vec![event("b", 2)],
        ))),
    ];
    let (coordinator, _reporter) = coordinator(sources, Duration::from_secs(5)).await;

    let result = poll(&coordinator).await;

    assert_eq!(result.outcome, WaitOutcome::Signalled);
    let sources: HashSet<_> = result.events.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, HashSet::from(["a", "b"]));
    assert_eq!(result.events.len(), 2);
}

#[tokio::test]
async fn test_many_concurrent_signals_build_one_consistent_result() {
    let sources: Vec<Arc<dyn EventSource>> = (0..10u64)
        .map(|n| {
            let name = format!("s{}", n);
            let source = MockSource::new(&name)
                .always(MockBehavior::Respond(vec![event(&name, n), event(&name, n + 100)]));
            Arc::new(source) as Arc<dyn EventSource>
        })
        .collect();
    let (coordinator, reporter) = coordinator(sources, Duration::from_secs(5)).await;

    let result = poll(&coordinator).await;

    assert_eq!(result.outcome, WaitOutcome::Signalled);
    assert!(!result.events.is_empty());
    let unique: HashSet<_> = result
        .events
        .iter()
        .map(|e| (e.source.clone(), e.payload["n"].as_u64()))
        .collect();
    assert_eq!(unique.len(), result.events.len());

    // Batches are never torn: each contributing source appears with both events.
    for source in result.events.iter().map(|e| &e.source) {
        let count = result.events.iter().filter(|e| &e.source == source).count();
        assert_eq!(count, 2);
    }
    assert!(reporter.failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remaining_sources_are_cancelled_after_response() {
    let hung = MockSource::new("hung").always(MockBehavior::Hang);
    let hung_probe = hung.probe();
    let sources: Vec<Arc<dyn EventSource>> = vec![
        Arc::new(hung),
        Arc::new(MockSource::new("fast").always(MockBehavior::RespondAfter(
            Duration::from_secs(1),
            vec![event("fast", 1)],
        ))),
    ];
    let (coordinator, _reporter) = coordinator(sources, TIMEOUT).await;

    let result = poll(&coordinator).await;
    assert_eq!(result.events.len(), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(hung_probe.cancelled_waits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_poll_releases_sources() {
    let hung = MockSource::new("hung").always(MockBehavior::Hang);
    let probe = hung.probe();
    let (coordinator, _reporter) = coordinator(vec![Arc::new(hung)], TIMEOUT).await;

    let abandoned = tokio::time::timeout(Duration::from_secs(1), poll(&coordinator)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(probe.cancelled_waits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_registry_waits_out_the_timeout() {
    let (coordinator, _reporter) = coordinator(Vec::new(), Duration::from_secs(3)).await;

    let started = Instant::now();
    let result = poll(&coordinator).await;

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert!(result.events.is_empty());
}

#[tokio::test]
async fn test_cursor_is_not_behind_returned_events() {
    let ahead = LongPollingEvent::new(
        "clock",
        "clock.skew",
        json!({}),
        Cursor::new(Cursor::now().value() + 60_000_000),
    );
    let source = MockSource::new("clock").always(MockBehavior::Respond(vec![ahead.clone()]));
    let (coordinator, _reporter) = coordinator(vec![Arc::new(source)], Duration::from_secs(5)).await;

    let result = poll(&coordinator).await;
    assert!(result.cursor >= ahead.produced_at);
}

#[tokio::test]
async fn test_concurrent_polls_do_not_share_results() {
    let store = ChatStore::new();
    let (coordinator, _reporter) = coordinator(
        vec![Arc::new(ChatSource::new(store.clone()))],
        Duration::from_millis(300),
    )
    .await;
    let since = Cursor::now();

    let writer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer
            .post(&RoomId::from("a"), &UserId::from("bob"), "only for room a")
            .unwrap();
    });

    let (in_a, in_b) = tokio::join!(
        coordinator.handle_poll(UserId::from("alice"), RoomId::from("a"), since),
        coordinator.handle_poll(UserId::from("carol"), RoomId::from("b"), since),
    );

    assert_eq!(in_a.outcome, WaitOutcome::Signalled);
    assert_eq!(in_a.events.len(), 1);
    assert_eq!(in_a.events[0].payload["text"], "only for room a");
    assert_eq!(in_b.outcome, WaitOutcome::DeadlineElapsed);
    assert!(in_b.events.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_each_poll_gets_a_fresh_cycle() {
    let source = MockSource::new("appointments")
        .once(MockBehavior::Respond(vec![event("appointments", 1)]))
        .always(MockBehavior::Empty);
    let probe = source.probe();
    let (coordinator, _reporter) = coordinator(vec![Arc::new(source)], Duration::from_secs(2)).await;

    let first = poll(&coordinator).await;
    let second = poll(&coordinator).await;

    assert_eq!(first.events.len(), 1);
    assert!(second.events.is_empty());
    assert_eq!(second.outcome, WaitOutcome::DeadlineElapsed);
    assert_eq!(probe.wait_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_timeout_still_answers() {
    let source = MockSource::new("appointments").always(MockBehavior::RespondAfter(
        Duration::from_secs(1),
        vec![event("appointments", 1)],
    ));
    let (coordinator, _reporter) =
        coordinator(vec![Arc::new(source)], Duration::from_secs(u64::MAX)).await;

    let result = poll(&coordinator).await;

    assert_eq!(result.outcome, WaitOutcome::Signalled);
    assert_eq!(result.events.len(), 1);
}
