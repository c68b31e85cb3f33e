//! DeFi agent pipe — single-shot chat exchange with the DeFi agent API.
//!
//! Sends `{"messages": [{"role": "user", "content": <text>}]}` to the
//! configured endpoint. The reply is either a single JSON object
//! (non-streaming) or newline-delimited JSON fragments of the form
//! `{"type": "text", "text": ...}` (streaming). A failed streaming
//! attempt falls back to one fresh non-streaming request with a shorter
//! timeout before giving up.

use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::conversation::{Conversation, RequestContext};
use crate::notify::{StatusLevel, StatusNotifier};

use super::{check_http_response, require_latest_text, Pipe, PipeError, PipeResult};

/// Canned reply when the cleaned response is empty.
pub const NO_RESPONSE_MESSAGE: &str = "No response received from the agent.";

/// Terminal characters that suppress the appended period.
const TERMINAL_PUNCTUATION: [char; 6] = ['.', '!', '?', ')', '∞', ':'];

/// Emit a progress notification once per this many stream fragments.
const FRAGMENT_NOTIFY_EVERY: usize = 5;

// ---------------------------------------------------------------------------
// Valves
// ---------------------------------------------------------------------------

/// User-editable connection settings for the DeFi agent pipe.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct DefiValves {
    /// DeFi agent chat endpoint URL.
    pub url: String,
    /// Fallback field name for the reply text when `text` is absent.
    pub response_field: String,
    /// Consume the reply as newline-delimited JSON fragments.
    pub stream: bool,
    /// Request timeout in seconds for the primary exchange.
    pub request_timeout_seconds: u64,
    /// Shorter timeout for the non-streaming fallback request.
    pub fallback_timeout_seconds: u64,
    /// Minimum seconds between status emissions.
    pub emit_interval_seconds: f64,
    /// Enable or disable status emissions.
    pub enable_status_indicator: bool,
}

impl Default for DefiValves {
    fn default() -> Self {
        Self {
            url: "http://seiling-cambrian-agent:3000/api/chat".to_owned(),
            response_field: "data".to_owned(),
            stream: true,
            request_timeout_seconds: 120,
            fallback_timeout_seconds: 30,
            emit_interval_seconds: 2.0,
            enable_status_indicator: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// DeFi agent chat request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct DefiRequest {
    /// Conversation messages (only the latest user message is sent).
    pub messages: Vec<DefiMessage>,
}

/// A message in the DeFi agent wire format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct DefiMessage {
    /// Always `"user"`.
    pub role: String,
    /// Message content.
    pub content: String,
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// DeFi agent pipe adapter.
#[derive(Debug, Clone)]
pub struct DefiAgentPipe {
    valves: DefiValves,
    client: reqwest::Client,
}

impl DefiAgentPipe {
    /// Create a DeFi agent pipe from its valves.
    pub fn new(valves: DefiValves) -> Self {
        Self {
            valves,
            client: reqwest::Client::new(),
        }
    }

    /// The valves this pipe was built with.
    pub fn valves(&self) -> &DefiValves {
        &self.valves
    }

    /// Run one non-streaming exchange and extract the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError`] on transport, status, or parse failure.
    #[doc(hidden)]
    pub async fn non_streaming_exchange(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<String, PipeError> {
        let response = self
            .client
            .post(&self.valves.url)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&build_request(text))
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| PipeError::Parse(format!("invalid JSON reply: {e}")))?;
        Ok(extract_reply_text(&value, &self.valves.response_field))
    }

    /// Consume the reply as newline-delimited JSON fragments.
    ///
    /// Malformed fragments are skipped. Emits a progress notification
    /// every [`FRAGMENT_NOTIFY_EVERY`] text fragments.
    async fn streaming_exchange(
        &self,
        text: &str,
        notifier: &StatusNotifier,
    ) -> Result<String, PipeError> {
        let response = self
            .client
            .post(&self.valves.url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(self.valves.request_timeout_seconds))
            .json(&build_request(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipeError::HttpStatus {
                status: status.as_u16(),
                body: super::sanitize_http_error_body(&body),
            });
        }

        let mut stream = Box::pin(response.bytes_stream());
        let mut buffer = String::new();
        let mut assembled = String::new();
        let mut fragments: usize = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_owned();
                buffer.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if let Some(fragment) = parse_stream_fragment(&line) {
                    assembled.push_str(&fragment);
                    fragments = fragments.saturating_add(1);
                    if fragments % FRAGMENT_NOTIFY_EVERY == 0 {
                        notifier
                            .notify(
                                StatusLevel::Info,
                                format!("Receiving response ({fragments} fragments)..."),
                                false,
                            )
                            .await;
                    }
                }
            }
        }

        // Flush a trailing fragment that arrived without a newline.
        let tail = buffer.trim();
        if !tail.is_empty() {
            if let Some(fragment) = parse_stream_fragment(tail) {
                assembled.push_str(&fragment);
            }
        }

        debug!(fragments, "stream consumed");
        Ok(assembled)
    }

    /// Streaming exchange with non-streaming fallback and cleanup.
    async fn streaming_with_fallback(
        &self,
        text: &str,
        notifier: &StatusNotifier,
    ) -> Result<String, PipeError> {
        let raw = match self.streaming_exchange(text, notifier).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "stream consumption failed, retrying without streaming");
                notifier
                    .notify(
                        StatusLevel::Warning,
                        "Streaming failed, retrying plain request...",
                        false,
                    )
                    .await;
                self.non_streaming_exchange(
                    text,
                    Duration::from_secs(self.valves.fallback_timeout_seconds),
                )
                .await?
            }
        };

        let cleaned = clean_reply(&raw);
        if cleaned.is_empty() {
            return Ok(NO_RESPONSE_MESSAGE.to_owned());
        }
        Ok(cleaned)
    }
}

#[async_trait::async_trait]
impl Pipe for DefiAgentPipe {
    fn id(&self) -> &str {
        "defi_agent_pipe"
    }

    fn name(&self) -> &str {
        "DeFi Agent Pipe"
    }

    async fn run(
        &self,
        conversation: &mut Conversation,
        ctx: &RequestContext,
        notifier: &StatusNotifier,
    ) -> PipeResult {
        notifier
            .notify(StatusLevel::Info, "Calling DeFi agent...", false)
            .await;

        let text = require_latest_text(conversation, notifier).await?;

        debug!(request_id = %ctx.request_id, url = %self.valves.url, "defi exchange starting");

        let result = if self.valves.stream {
            self.streaming_with_fallback(&text, notifier).await
        } else {
            self.non_streaming_exchange(
                &text,
                Duration::from_secs(self.valves.request_timeout_seconds),
            )
            .await
        };

        match result {
            Ok(reply) => {
                conversation.push_assistant(&reply);
                notifier.notify(StatusLevel::Info, "Complete", true).await;
                Ok(reply)
            }
            Err(e) => {
                notifier
                    .notify(
                        StatusLevel::Error,
                        format!("Error during DeFi agent execution: {e}"),
                        true,
                    )
                    .await;
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request / reply helpers (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the chat request body from the latest user message.
#[doc(hidden)]
pub fn build_request(text: &str) -> DefiRequest {
    DefiRequest {
        messages: vec![DefiMessage {
            role: "user".to_owned(),
            content: text.to_owned(),
        }],
    }
}

/// Extract reply text from a non-streaming JSON reply.
///
/// Prefers a non-empty `text` field, then the configured fallback field
/// (stringified when not a string), then the stringified whole value.
#[doc(hidden)]
pub fn extract_reply_text(value: &Value, response_field: &str) -> String {
    match value {
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_owned();
                }
            }
            match map.get(response_field) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => value.to_string(),
            }
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse one stream line into its text fragment, if it is one.
///
/// Returns `None` for malformed lines and for well-formed events that
/// carry no text (e.g. terminators).
#[doc(hidden)]
pub fn parse_stream_fragment(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    if value.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Normalize an assembled reply.
///
/// Unescapes literal `\n` sequences, trims each line, drops empty
/// lines, rejoins, collapses runs of spaces, and appends a period when
/// the text does not already end in terminal punctuation. Applying the
/// pass twice yields the same text.
#[doc(hidden)]
pub fn clean_reply(raw: &str) -> String {
    let unescaped = raw.replace("\\n", "\n");

    let mut text = unescaped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if let Ok(re) = Regex::new(r" {2,}") {
        text = re.replace_all(&text, " ").into_owned();
    }

    let text = text.trim().to_owned();
    if text.is_empty() {
        return text;
    }

    if TERMINAL_PUNCTUATION.iter().any(|&c| text.ends_with(c)) {
        text
    } else {
        format!("{text}.")
    }
}
