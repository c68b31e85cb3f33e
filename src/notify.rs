//! Rate-limited status notifications surfaced to the chat-UI host.
//!
//! The host supplies an asynchronous [`StatusSink`]; a pipe reports
//! coarse lifecycle progress through a [`StatusNotifier`], which emits
//! at most one event per configured interval unless the event is
//! terminal (`done`). Sink failures are logged and never propagated —
//! telemetry must not fail an exchange that already succeeded.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Severity of a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    /// Routine progress.
    Info,
    /// Degraded but continuing.
    Warning,
    /// The invocation failed.
    Error,
}

/// Lifecycle phase of the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    /// Work is still underway.
    InProgress,
    /// The invocation finished (successfully or not).
    Complete,
}

/// The payload of a single status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Lifecycle phase, derived from `done`.
    pub status: StatusPhase,
    /// Severity of this update.
    pub level: StatusLevel,
    /// Human-readable progress message.
    pub description: String,
    /// Whether this is the terminal update for the invocation.
    pub done: bool,
}

/// The event envelope delivered to the host callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Event discriminator, always `"status"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Status payload.
    pub data: StatusUpdate,
}

impl StatusEvent {
    /// Build a status event from its parts.
    pub fn new(level: StatusLevel, description: impl Into<String>, done: bool) -> Self {
        Self {
            kind: "status".to_owned(),
            data: StatusUpdate {
                status: if done {
                    StatusPhase::Complete
                } else {
                    StatusPhase::InProgress
                },
                level,
                description: description.into(),
                done,
            },
        }
    }
}

/// Host-supplied asynchronous notification callback.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Deliver one status event to the host UI.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the notifier logs and swallows errors.
    async fn emit(&self, event: StatusEvent) -> anyhow::Result<()>;
}

/// Rate-limited emitter of status events.
///
/// Emits only when notifications are enabled and either the event is
/// terminal or the configured interval has elapsed since the last
/// emission. The last-emission instant advances only on actual emission.
pub struct StatusNotifier {
    sink: Option<Arc<dyn StatusSink>>,
    enabled: bool,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl StatusNotifier {
    /// Create a notifier delivering to `sink`.
    pub fn new(sink: Arc<dyn StatusSink>, enabled: bool, interval: Duration) -> Self {
        Self {
            sink: Some(sink),
            enabled,
            interval,
            last_emit: Mutex::new(None),
        }
    }

    /// Create a notifier that never emits (no host callback supplied).
    pub fn disabled() -> Self {
        Self {
            sink: None,
            enabled: false,
            interval: Duration::ZERO,
            last_emit: Mutex::new(None),
        }
    }

    /// Report progress to the host.
    ///
    /// Emits when a sink is present, notifications are enabled, and
    /// either `done` is set or the interval since the last emission has
    /// elapsed. Sink errors are logged at `warn` and swallowed.
    pub async fn notify(&self, level: StatusLevel, message: impl Into<String>, done: bool) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !self.enabled {
            return;
        }

        let mut last = self.last_emit.lock().await;
        let due = done || last.map_or(true, |t| t.elapsed() >= self.interval);
        if !due {
            return;
        }

        let event = StatusEvent::new(level, message, done);
        if let Err(e) = sink.emit(event).await {
            tracing::warn!(error = %e, "status sink failed to deliver event");
        }
        *last = Some(Instant::now());
    }
}

impl std::fmt::Debug for StatusNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusNotifier")
            .field("enabled", &self.enabled)
            .field("interval", &self.interval)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
