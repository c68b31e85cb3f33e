//! Multi-agent messaging pipe — session/channel orchestration.
//!
//! The exchange is a fixed workflow over backend session resources:
//! server discovery, agent discovery, channel lookup or creation,
//! agent-to-channel binding, message submission, a fixed wait, then
//! polling for the reply across fallback read endpoints and heuristic
//! reply classification (see [`classify`]).
//!
//! The three resolved identifiers (server, agent, channel) are cached
//! behind a mutex and reused across invocations; any workflow failure
//! clears all three so the next call re-resolves from scratch. The
//! multi-endpoint polling order is reverse-engineered best effort, not
//! a documented backend contract.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, RequestContext};
use crate::notify::{StatusLevel, StatusNotifier};

use super::{check_http_response, require_latest_text, Pipe, PipeError, PipeResult};

pub mod classify;
pub mod wire;

use wire::{
    agent_ids, build_submit, AgentsData, ChannelCreatedData, ChannelMessage, ChannelsData,
    CreateChannel, Envelope, MessagesData, ServersData,
};

/// Canned soft-success reply when the poll returns no messages.
pub const NO_REPLY_YET_MESSAGE: &str =
    "✅ Message sent successfully, but no response received yet. The agent may be processing your request.";

// ---------------------------------------------------------------------------
// Valves
// ---------------------------------------------------------------------------

/// User-editable connection settings for the messaging pipe.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct MessagingValves {
    /// Messaging server base URL.
    pub url: String,
    /// Name of the relay channel to reuse or create.
    pub channel_name: String,
    /// Seconds to wait before polling for the agent reply.
    pub wait_time_seconds: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Minimum content length for the poll-time reply heuristic.
    pub min_reply_length: usize,
    /// Minimum seconds between status emissions.
    pub emit_interval_seconds: f64,
    /// Enable or disable status emissions.
    pub enable_status_indicator: bool,
}

impl Default for MessagingValves {
    fn default() -> Self {
        Self {
            url: "http://seiling-eliza:3000".to_owned(),
            channel_name: "openwebui_channel".to_owned(),
            wait_time_seconds: 8,
            request_timeout_seconds: 10,
            min_reply_length: 5,
            emit_interval_seconds: 2.0,
            enable_status_indicator: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Session cache
// ---------------------------------------------------------------------------

/// The three identifiers resolved by the discovery workflow.
///
/// Stored as one value so the cache is fully populated or fully empty,
/// never partially valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    /// Central server identifier.
    pub server_id: String,
    /// Agent identifier.
    pub agent_id: String,
    /// Relay channel identifier.
    pub channel_id: String,
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// Multi-agent messaging pipe adapter.
pub struct MessagingAgentPipe {
    valves: MessagingValves,
    client: reqwest::Client,
    session: Mutex<Option<SessionIds>>,
}

impl MessagingAgentPipe {
    /// Create a messaging pipe from its valves.
    pub fn new(valves: MessagingValves) -> Self {
        Self {
            valves,
            client: reqwest::Client::new(),
            session: Mutex::new(None),
        }
    }

    /// The valves this pipe was built with.
    pub fn valves(&self) -> &MessagingValves {
        &self.valves
    }

    /// Snapshot of the cached session ids (for integration testing).
    #[doc(hidden)]
    pub async fn cached_session(&self) -> Option<SessionIds> {
        self.session.lock().await.clone()
    }

    fn base(&self) -> &str {
        self.valves.url.trim_end_matches('/')
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.valves.request_timeout_seconds)
    }

    async fn get_json(&self, url: &str) -> Result<Value, PipeError> {
        let response = self.client.get(url).timeout(self.timeout()).send().await?;
        let body = check_http_response(response).await?;
        serde_json::from_str(&body).map_err(|e| PipeError::Parse(format!("invalid JSON from {url}: {e}")))
    }

    async fn post_json<T: Serialize + Sync>(&self, url: &str, payload: &T) -> Result<Value, PipeError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .timeout(self.timeout())
            .json(payload)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        serde_json::from_str(&body).map_err(|e| PipeError::Parse(format!("invalid JSON from {url}: {e}")))
    }

    /// Step 1: resolve the central server id.
    async fn resolve_server(&self) -> Result<String, PipeError> {
        let value = self
            .get_json(&format!("{}/api/messaging/central-servers", self.base()))
            .await?;
        let envelope: Envelope<ServersData> = serde_json::from_value(value)
            .map_err(|e| PipeError::Parse(format!("malformed server list: {e}")))?;
        if !envelope.success {
            return Err(PipeError::Backend("server list request unsuccessful".to_owned()));
        }
        envelope
            .data
            .map(|d| d.servers)
            .unwrap_or_default()
            .first()
            .map(|s| s.id.clone())
            .ok_or_else(|| PipeError::Backend("No servers found".to_owned()))
    }

    /// Step 2: resolve the agent id.
    async fn resolve_agent(&self) -> Result<String, PipeError> {
        let value = self.get_json(&format!("{}/api/agents", self.base())).await?;
        let envelope: Envelope<AgentsData> = serde_json::from_value(value)
            .map_err(|e| PipeError::Parse(format!("malformed agent list: {e}")))?;
        if !envelope.success {
            return Err(PipeError::Backend("agent list request unsuccessful".to_owned()));
        }
        envelope
            .data
            .map(|d| d.agents)
            .unwrap_or_default()
            .first()
            .map(|a| a.id.clone())
            .ok_or_else(|| PipeError::Backend("No agents found".to_owned()))
    }

    /// Step 3: find the relay channel by name, or create it, and make
    /// sure the agent is bound to it.
    async fn resolve_channel(&self, server_id: &str, agent_id: &str) -> Result<String, PipeError> {
        let value = self
            .get_json(&format!("{}/api/messaging/channels", self.base()))
            .await?;
        let envelope: Envelope<ChannelsData> = serde_json::from_value(value)
            .map_err(|e| PipeError::Parse(format!("malformed channel list: {e}")))?;
        let channels = envelope.data.map(|d| d.channels).unwrap_or_default();

        if let Some(existing) = channels
            .iter()
            .find(|c| c.name.as_deref() == Some(self.valves.channel_name.as_str()))
        {
            debug!(channel_id = %existing.id, "reusing existing relay channel");
            if !self.agent_bound(&existing.id, agent_id).await? {
                self.bind_agent(&existing.id, agent_id).await?;
            }
            return Ok(existing.id.clone());
        }

        let created = self.create_channel(server_id).await?;
        self.bind_agent(&created, agent_id).await?;
        Ok(created)
    }

    /// Whether the agent is already bound to the channel.
    async fn agent_bound(&self, channel_id: &str, agent_id: &str) -> Result<bool, PipeError> {
        let url = format!(
            "{}/api/messaging/central-channels/{channel_id}/agents",
            self.base()
        );
        let value = self.get_json(&url).await?;
        Ok(agent_ids(&value).iter().any(|id| id == agent_id))
    }

    async fn create_channel(&self, server_id: &str) -> Result<String, PipeError> {
        let payload = CreateChannel {
            name: self.valves.channel_name.clone(),
            server_id: server_id.to_owned(),
            description: "Chat UI relay channel".to_owned(),
            channel_type: "text".to_owned(),
        };
        let value = self
            .post_json(&format!("{}/api/messaging/channels", self.base()), &payload)
            .await?;
        let envelope: Envelope<ChannelCreatedData> = serde_json::from_value(value)
            .map_err(|e| PipeError::Parse(format!("malformed channel-create reply: {e}")))?;
        envelope
            .data
            .map(|d| d.channel.id)
            .ok_or_else(|| PipeError::Backend("channel creation returned no channel".to_owned()))
    }

    async fn bind_agent(&self, channel_id: &str, agent_id: &str) -> Result<(), PipeError> {
        let url = format!(
            "{}/api/messaging/central-channels/{channel_id}/agents",
            self.base()
        );
        let payload = serde_json::json!({ "agentId": agent_id });
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(self.timeout())
            .json(&payload)
            .send()
            .await?;
        check_http_response(response).await?;
        debug!(channel_id, agent_id, "agent bound to channel");
        Ok(())
    }

    /// Steps 1–3 executed fresh, with progress notifications.
    async fn resolve_session(&self, notifier: &StatusNotifier) -> Result<SessionIds, PipeError> {
        notifier
            .notify(StatusLevel::Info, "Getting server info...", false)
            .await;
        let server_id = self.resolve_server().await?;

        notifier
            .notify(StatusLevel::Info, "Getting agent list...", false)
            .await;
        let agent_id = self.resolve_agent().await?;

        notifier
            .notify(StatusLevel::Info, "Resolving communication channel...", false)
            .await;
        let channel_id = self.resolve_channel(&server_id, &agent_id).await?;

        info!(%server_id, %agent_id, %channel_id, "messaging session resolved");
        Ok(SessionIds {
            server_id,
            agent_id,
            channel_id,
        })
    }

    /// Step 5: submit the user's message into the channel.
    async fn submit_message(&self, ids: &SessionIds, text: &str) -> Result<(), PipeError> {
        let payload = build_submit(&ids.server_id, &ids.agent_id, &ids.channel_id, text);
        let response = self
            .client
            .post(format!("{}/api/messaging/submit", self.base()))
            .header("content-type", "application/json")
            .timeout(self.timeout())
            .json(&payload)
            .send()
            .await?;
        check_http_response(response).await?;
        Ok(())
    }

    /// Read one candidate endpoint's message list.
    ///
    /// An unsuccessful envelope degrades to an empty list; only
    /// transport/parse failures are errors.
    async fn read_messages(&self, url: &str) -> Result<Vec<ChannelMessage>, PipeError> {
        let value = self.get_json(url).await?;
        let envelope: Envelope<MessagesData> = serde_json::from_value(value)
            .map_err(|e| PipeError::Parse(format!("malformed message list: {e}")))?;
        if !envelope.success {
            return Ok(Vec::new());
        }
        Ok(envelope.data.map(|d| d.messages).unwrap_or_default())
    }

    /// Step 6: poll the candidate read endpoints in priority order.
    ///
    /// The first endpoint whose messages contain a plausible agent
    /// reply wins; otherwise the primary endpoint's result is used.
    /// Best effort — the fallback order mirrors observed server
    /// behavior, not a documented contract.
    async fn fetch_channel_messages(
        &self,
        ids: &SessionIds,
        submitted: &str,
    ) -> Result<Vec<ChannelMessage>, PipeError> {
        let base = self.base();
        let candidates = [
            format!(
                "{base}/api/messaging/central-channels/{}/messages",
                ids.channel_id
            ),
            format!("{base}/api/messaging/channels/{}/messages", ids.channel_id),
            format!("{base}/api/channels/{}/messages", ids.channel_id),
        ];

        let mut primary: Option<Vec<ChannelMessage>> = None;
        for (index, url) in candidates.iter().enumerate() {
            match self.read_messages(url).await {
                Ok(messages) => {
                    let hit = messages.iter().any(|m| {
                        classify::looks_like_agent_reply(
                            m,
                            submitted,
                            &ids.agent_id,
                            self.valves.min_reply_length,
                        )
                    });
                    if hit {
                        debug!(endpoint = index, "agent reply hit");
                        return Ok(messages);
                    }
                    if index == 0 {
                        primary = Some(messages);
                    }
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "candidate read endpoint failed");
                }
            }
        }

        if let Some(messages) = primary {
            return Ok(messages);
        }
        // The primary endpoint failed on the first pass; retry it so the
        // transport error is the one surfaced.
        self.read_messages(&candidates[0]).await
    }

    /// Steps 1–7: the full exchange, returning the assembled reply text.
    async fn exchange(&self, text: &str, notifier: &StatusNotifier) -> Result<String, PipeError> {
        let cached = self.session.lock().await.clone();
        let ids = match cached {
            Some(ids) => {
                debug!("reusing cached session ids");
                ids
            }
            None => {
                let ids = self.resolve_session(notifier).await?;
                *self.session.lock().await = Some(ids.clone());
                ids
            }
        };

        notifier
            .notify(StatusLevel::Info, "Sending message to agent...", false)
            .await;
        self.submit_message(&ids, text).await?;

        notifier
            .notify(
                StatusLevel::Info,
                format!(
                    "Waiting {} seconds for agent response...",
                    self.valves.wait_time_seconds
                ),
                false,
            )
            .await;
        tokio::time::sleep(Duration::from_secs(self.valves.wait_time_seconds)).await;

        notifier
            .notify(StatusLevel::Info, "Retrieving agent response...", false)
            .await;
        let messages = self.fetch_channel_messages(&ids, text).await?;

        if messages.is_empty() {
            return Ok(NO_REPLY_YET_MESSAGE.to_owned());
        }

        match classify::assemble_reply(&messages, text, &ids.agent_id) {
            Some(reply) => Ok(reply),
            None => {
                info!(
                    messages = messages.len(),
                    "no candidate survived classification, surfacing diagnostic dump"
                );
                Ok(classify::render_diagnostic(&messages))
            }
        }
    }

    async fn clear_session(&self) {
        *self.session.lock().await = None;
    }
}

#[async_trait::async_trait]
impl Pipe for MessagingAgentPipe {
    fn id(&self) -> &str {
        "messaging_agent_pipe"
    }

    fn name(&self) -> &str {
        "Messaging Agent Pipe"
    }

    async fn run(
        &self,
        conversation: &mut Conversation,
        ctx: &RequestContext,
        notifier: &StatusNotifier,
    ) -> PipeResult {
        notifier
            .notify(StatusLevel::Info, "Starting messaging workflow...", false)
            .await;

        let text = require_latest_text(conversation, notifier).await?;

        debug!(request_id = %ctx.request_id, url = %self.valves.url, "messaging exchange starting");

        match self.exchange(&text, notifier).await {
            Ok(reply) => {
                conversation.push_assistant(&reply);
                notifier.notify(StatusLevel::Info, "Complete", true).await;
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "messaging workflow failed, clearing session cache");
                self.clear_session().await;
                notifier
                    .notify(
                        StatusLevel::Error,
                        format!("Error in messaging workflow: {e}"),
                        true,
                    )
                    .await;
                Err(e)
            }
        }
    }
}
