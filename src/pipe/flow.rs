//! Agent-flow pipe — single-shot exchange with a low-code flow server.
//!
//! Sends `{<input_field>: <text>}` to the configured prediction endpoint
//! and reads the reply from the configured response field.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::conversation::{Conversation, RequestContext};
use crate::notify::{StatusLevel, StatusNotifier};

use super::{check_http_response, require_latest_text, Pipe, PipeError, PipeResult};

// ---------------------------------------------------------------------------
// Valves
// ---------------------------------------------------------------------------

/// User-editable connection settings for the agent-flow pipe.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct FlowValves {
    /// Flow server prediction endpoint URL (includes the flow id).
    pub url: String,
    /// Field name carrying the user message in the request body.
    pub input_field: String,
    /// Field name carrying the reply text in the response body.
    pub response_field: String,
    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Minimum seconds between status emissions.
    pub emit_interval_seconds: f64,
    /// Enable or disable status emissions.
    pub enable_status_indicator: bool,
}

impl Default for FlowValves {
    fn default() -> Self {
        Self {
            url: "http://localhost:5003/api/v1/prediction/ff3d8e68-c4a9-4bd2-be8e-52f7a4b2d4ce"
                .to_owned(),
            input_field: "question".to_owned(),
            response_field: "text".to_owned(),
            request_timeout_seconds: 120,
            emit_interval_seconds: 2.0,
            enable_status_indicator: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// Agent-flow pipe adapter.
#[derive(Debug, Clone)]
pub struct FlowAgentPipe {
    valves: FlowValves,
    client: reqwest::Client,
}

impl FlowAgentPipe {
    /// Create an agent-flow pipe from its valves.
    pub fn new(valves: FlowValves) -> Self {
        Self {
            valves,
            client: reqwest::Client::new(),
        }
    }

    /// The valves this pipe was built with.
    pub fn valves(&self) -> &FlowValves {
        &self.valves
    }

    async fn exchange(&self, text: &str) -> Result<String, PipeError> {
        let payload = build_request(&self.valves.input_field, text);
        let response = self
            .client
            .post(&self.valves.url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(self.valves.request_timeout_seconds))
            .json(&payload)
            .send()
            .await?;

        let body = check_http_response(response).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| PipeError::Parse(format!("invalid JSON reply: {e}")))?;
        Ok(extract_reply_text(&value, &self.valves.response_field))
    }
}

#[async_trait::async_trait]
impl Pipe for FlowAgentPipe {
    fn id(&self) -> &str {
        "flow_pipe"
    }

    fn name(&self) -> &str {
        "Agent Flow Pipe"
    }

    async fn run(
        &self,
        conversation: &mut Conversation,
        ctx: &RequestContext,
        notifier: &StatusNotifier,
    ) -> PipeResult {
        notifier
            .notify(StatusLevel::Info, "Calling flow agent...", false)
            .await;

        let text = require_latest_text(conversation, notifier).await?;

        debug!(request_id = %ctx.request_id, url = %self.valves.url, "flow exchange starting");

        match self.exchange(&text).await {
            Ok(reply) => {
                conversation.push_assistant(&reply);
                notifier.notify(StatusLevel::Info, "Complete", true).await;
                Ok(reply)
            }
            Err(e) => {
                notifier
                    .notify(
                        StatusLevel::Error,
                        format!("Error during flow execution: {e}"),
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

/// Build the request body `{<input_field>: <text>}`.
#[doc(hidden)]
pub fn build_request(input_field: &str, text: &str) -> Value {
    serde_json::json!({ input_field: text })
}

/// Extract reply text from the flow server reply.
///
/// Reads the configured response field (stringified when not a string),
/// falling back to the stringified whole value.
#[doc(hidden)]
pub fn extract_reply_text(value: &Value, response_field: &str) -> String {
    match value {
        Value::Object(map) => match map.get(response_field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
