//! Pipe abstraction layer.
//!
//! Defines the [`Pipe`] trait and the shared error and HTTP plumbing
//! used by all adapter implementations.
//!
//! Three pipes are implemented:
//! - [`defi::DefiAgentPipe`] — DeFi agent chat API
//! - [`messaging::MessagingAgentPipe`] — multi-agent messaging server
//! - [`flow::FlowAgentPipe`] — low-code agent-flow server
//!
//! Every failure is caught inside the pipe, converted into an error
//! notification and a structured [`PipeError`] return value; nothing
//! propagates uncaught to the host.

use async_trait::async_trait;

use crate::conversation::{Conversation, RequestContext};
use crate::notify::StatusNotifier;

pub mod defi;
pub mod flow;
pub mod messaging;

/// Canned assistant reply (and error text) when the transcript is empty.
pub const NO_MESSAGES_ERROR: &str = "No messages found in the request body";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by pipe adapters.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// The conversation carried no messages; no backend call was made.
    #[error("No messages found in the request body")]
    NoMessages,
    /// HTTP transport failure (timeout, refused connection, broken stream).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Backend responded with a non-success status.
    #[error("backend returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match any expected shape.
    #[error("unexpected response shape: {0}")]
    Parse(String),
    /// Backend reported a logical failure (e.g. no servers registered).
    #[error("{0}")]
    Backend(String),
}

impl PipeError {
    /// Render the host-facing error object `{"error": <message>}`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

/// Result alias for a pipe invocation: the assistant reply text on success.
pub type PipeResult = Result<String, PipeError>;

// ---------------------------------------------------------------------------
// HTTP helpers (shared by all pipes)
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `PipeError::Request` on transport failure, `PipeError::HttpStatus`
/// on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, PipeError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(PipeError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse and truncate an upstream error body so it is safe to log
/// and surface in a notification.
pub(crate) fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = collapsed
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    collapsed
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core pipe interface invoked by the host once per user turn.
///
/// All implementations must be `Send + Sync` so a shared instance can be
/// held across async task boundaries by the host.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Stable identifier for the host plugin surface.
    fn id(&self) -> &str;

    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// Forward the latest user message to the backend and append the
    /// reply to `conversation`.
    ///
    /// On success the returned text equals the appended assistant
    /// message. On failure the conversation is left unmodified, except
    /// for the empty-transcript case which appends a canned assistant
    /// notice before returning [`PipeError::NoMessages`].
    ///
    /// # Errors
    ///
    /// Returns [`PipeError`] on transport, status, or backend failure.
    async fn run(
        &self,
        conversation: &mut Conversation,
        ctx: &RequestContext,
        notifier: &StatusNotifier,
    ) -> PipeResult;
}

/// Shared empty-transcript handling: notify, append the canned notice,
/// and produce the fixed error.
///
/// Returns the latest message text when the conversation is non-empty.
pub(crate) async fn require_latest_text(
    conversation: &mut Conversation,
    notifier: &StatusNotifier,
) -> Result<String, PipeError> {
    match conversation.latest_text() {
        Some(text) => Ok(text.to_owned()),
        None => {
            notifier
                .notify(crate::notify::StatusLevel::Error, NO_MESSAGES_ERROR, true)
                .await;
            conversation.push_assistant(NO_MESSAGES_ERROR);
            Err(PipeError::NoMessages)
        }
    }
}
