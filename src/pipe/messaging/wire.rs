//! Wire types for the messaging server's JSON-over-HTTP API.
//!
//! Responses use a `{"success": bool, "data": {...}}` envelope. Read
//! types are deliberately lenient (optional fields, camelCase aliases)
//! because the channel-message shape varies across server endpoints.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Envelope and discovery responses
// ---------------------------------------------------------------------------

/// Standard response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    /// Backend-reported success flag.
    #[serde(default)]
    pub success: bool,
    /// Payload, absent on some failures.
    pub data: Option<T>,
}

/// Payload of the central-server listing.
#[derive(Debug, Deserialize)]
pub struct ServersData {
    /// Registered servers.
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
}

/// One entry of the central-server listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server identifier.
    pub id: String,
    /// Display name, when present.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of the agent listing.
#[derive(Debug, Deserialize)]
pub struct AgentsData {
    /// Registered agents.
    #[serde(default)]
    pub agents: Vec<AgentInfo>,
}

/// One entry of the agent listing.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentInfo {
    /// Agent identifier.
    pub id: String,
    /// Display name, when present.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of the channel listing.
#[derive(Debug, Deserialize)]
pub struct ChannelsData {
    /// Known channels.
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

/// One channel entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    /// Channel identifier.
    pub id: String,
    /// Channel name, when present.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of a channel-creation reply.
#[derive(Debug, Deserialize)]
pub struct ChannelCreatedData {
    /// The created channel.
    pub channel: ChannelInfo,
}

/// Payload of a channel-message read.
#[derive(Debug, Deserialize)]
pub struct MessagesData {
    /// Messages in the channel.
    #[serde(default)]
    pub messages: Vec<ChannelMessage>,
}

// ---------------------------------------------------------------------------
// Channel messages
// ---------------------------------------------------------------------------

/// A message read back from a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Author identifier.
    #[serde(default, alias = "authorId")]
    pub author_id: Option<String>,
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Backend source-type marker (e.g. `agent_response`).
    #[serde(default, alias = "sourceType")]
    pub source_type: Option<String>,
    /// Creation timestamp — epoch milliseconds or an RFC 3339 string,
    /// depending on the read endpoint.
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<Value>,
}

impl ChannelMessage {
    /// Content as a string slice, empty when absent.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Creation time normalized to epoch milliseconds for ordering.
    ///
    /// Unknown or unparsable timestamps sort first (0).
    pub fn created_at_millis(&self) -> i64 {
        match &self.created_at {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
            _ => 0,
        }
    }
}

/// Extract agent ids from a channel-agents reply, tolerating both
/// `{"data": {"agents": [{"id": ...}]}}` and bare id-string lists.
pub fn agent_ids(value: &Value) -> Vec<String> {
    let agents = value
        .get("data")
        .and_then(|d| d.get("agents"))
        .or_else(|| value.get("agents"))
        .and_then(Value::as_array);

    let Some(agents) = agents else {
        return Vec::new();
    };

    agents
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("agentId"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Channel-creation payload.
#[derive(Debug, Serialize)]
pub struct CreateChannel {
    /// Channel name.
    pub name: String,
    /// Owning server identifier.
    #[serde(rename = "serverId")]
    pub server_id: String,
    /// Channel description.
    pub description: String,
    /// Channel kind, always `"text"`.
    #[serde(rename = "type")]
    pub channel_type: String,
}

/// Message-submission payload with direct-message framing.
#[derive(Debug, Serialize)]
pub struct SubmitMessage {
    /// Target channel.
    pub channel_id: String,
    /// Owning server.
    pub server_id: String,
    /// Author — the server id, matching the stock integration flow.
    pub author_id: String,
    /// The user's message text.
    pub content: String,
    /// Source-type marker, always `"user_message"`.
    pub source_type: String,
    /// Raw message envelope, unused but required by the API.
    pub raw_message: Value,
    /// Direct-message metadata.
    pub metadata: SubmitMetadata,
}

/// Direct-message metadata of a submission.
#[derive(Debug, Serialize)]
pub struct SubmitMetadata {
    /// Channel kind marker.
    #[serde(rename = "channelType")]
    pub channel_type: String,
    /// Direct-message flag.
    #[serde(rename = "isDm")]
    pub is_dm: bool,
    /// The agent the message is addressed to.
    #[serde(rename = "targetUserId")]
    pub target_user_id: String,
}

/// Build the fixed submission payload for a user message.
pub fn build_submit(server_id: &str, agent_id: &str, channel_id: &str, text: &str) -> SubmitMessage {
    SubmitMessage {
        channel_id: channel_id.to_owned(),
        server_id: server_id.to_owned(),
        author_id: server_id.to_owned(),
        content: text.to_owned(),
        source_type: "user_message".to_owned(),
        raw_message: Value::Object(serde_json::Map::new()),
        metadata: SubmitMetadata {
            channel_type: "DM".to_owned(),
            is_dm: true,
            target_user_id: agent_id.to_owned(),
        },
    }
}
