//! Status notifier rate-limiting tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use seipipe::notify::{StatusEvent, StatusLevel, StatusNotifier, StatusPhase, StatusSink};

/// Sink recording every delivered event.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.events.lock().expect("lock").len()
    }

    fn last(&self) -> Option<StatusEvent> {
        self.events.lock().expect("lock").last().cloned()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn emit(&self, event: StatusEvent) -> anyhow::Result<()> {
        self.events.lock().expect("lock").push(event);
        Ok(())
    }
}

/// Sink that always fails, to prove errors are swallowed.
struct FailingSink;

#[async_trait]
impl StatusSink for FailingSink {
    async fn emit(&self, _event: StatusEvent) -> anyhow::Result<()> {
        anyhow::bail!("host callback broke")
    }
}

#[tokio::test]
async fn zero_interval_emits_every_update() {
    let sink = Arc::new(RecordingSink::default());
    let notifier = StatusNotifier::new(sink.clone(), true, Duration::ZERO);

    notifier.notify(StatusLevel::Info, "one", false).await;
    notifier.notify(StatusLevel::Info, "two", false).await;

    assert_eq!(sink.count(), 2);
}

#[tokio::test]
async fn interval_suppresses_rapid_updates() {
    let sink = Arc::new(RecordingSink::default());
    let notifier = StatusNotifier::new(sink.clone(), true, Duration::from_secs(60));

    notifier.notify(StatusLevel::Info, "one", false).await;
    notifier.notify(StatusLevel::Info, "two", false).await;
    notifier.notify(StatusLevel::Info, "three", false).await;

    assert_eq!(sink.count(), 1);
    assert_eq!(sink.last().expect("event").data.description, "one");
}

#[tokio::test]
async fn done_always_emits() {
    let sink = Arc::new(RecordingSink::default());
    let notifier = StatusNotifier::new(sink.clone(), true, Duration::from_secs(60));

    notifier.notify(StatusLevel::Info, "progress", false).await;
    notifier.notify(StatusLevel::Info, "Complete", true).await;

    assert_eq!(sink.count(), 2);
    let last = sink.last().expect("event");
    assert!(last.data.done);
    assert_eq!(last.data.status, StatusPhase::Complete);
}

#[tokio::test]
async fn suppressed_update_does_not_advance_the_clock() {
    let sink = Arc::new(RecordingSink::default());
    let notifier = StatusNotifier::new(sink.clone(), true, Duration::from_millis(200));

    // Emits: nothing has been sent yet.
    notifier.notify(StatusLevel::Info, "one", false).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    // Suppressed: only 150ms since the last emission.
    notifier.notify(StatusLevel::Info, "two", false).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    // 250ms since the last *emission* — must emit even though the
    // suppressed attempt was only 100ms ago.
    notifier.notify(StatusLevel::Info, "three", false).await;

    assert_eq!(sink.count(), 2);
    assert_eq!(sink.last().expect("event").data.description, "three");
}

#[tokio::test]
async fn disabled_notifier_emits_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let notifier = StatusNotifier::new(sink.clone(), false, Duration::ZERO);

    notifier.notify(StatusLevel::Error, "failure", true).await;

    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn sink_errors_are_swallowed() {
    let notifier = StatusNotifier::new(Arc::new(FailingSink), true, Duration::ZERO);

    // Must not panic or propagate.
    notifier.notify(StatusLevel::Info, "one", false).await;
    notifier.notify(StatusLevel::Info, "done", true).await;
}

#[tokio::test]
async fn event_wire_shape_matches_host_contract() {
    let event = StatusEvent::new(StatusLevel::Info, "Working...", false);
    let json = serde_json::to_value(&event).expect("should serialize");

    assert_eq!(json["type"], "status");
    assert_eq!(json["data"]["status"], "in_progress");
    assert_eq!(json["data"]["level"], "info");
    assert_eq!(json["data"]["description"], "Working...");
    assert_eq!(json["data"]["done"], false);

    let done = StatusEvent::new(StatusLevel::Error, "failed", true);
    let json = serde_json::to_value(&done).expect("should serialize");
    assert_eq!(json["data"]["status"], "complete");
    assert_eq!(json["data"]["level"], "error");
    assert_eq!(json["data"]["done"], true);
}
