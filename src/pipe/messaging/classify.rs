//! Heuristic classification and cleaning of candidate agent replies.
//!
//! The messaging server echoes submitted user messages back alongside
//! agent replies, with no reliable discriminator between the two. This
//! module keeps the inherited prefix/substring heuristics behind a small
//! set of functions so they can be revised without touching the
//! workflow, and logs every keep/drop decision for observability.
//! False negatives surface the diagnostic dump instead of a reply, so
//! treat these heuristics as best effort, not a contract.

use serde_json::Value;
use tracing::debug;

use super::wire::ChannelMessage;

/// Source-type values marking an agent-authored message.
const AGENT_SOURCE_MARKERS: &[&str] = &["agent_response", "agent"];

/// Affirmative openers that usually start an agent reply.
const REPLY_PREFIXES: &[&str] = &[
    "yes",
    "sure",
    "of course",
    "certainly",
    "absolutely",
    "here",
    "i've",
    "i have",
    "i'll",
    "i can",
    "done",
    "got it",
    "the ",
];

/// Success and transaction markers anywhere in the text.
const REPLY_MARKERS: &[&str] = &[
    "✅",
    "successfully",
    "completed",
    "transaction",
    "tx hash",
    "0x",
    "balance",
    "swap",
];

/// A line containing any of these truncates the message from that point
/// onward (residual prompt-template content leaking out of the agent).
const INSTRUCTION_MARKERS: &[&str] = &[
    "# Instructions",
    "# Task",
    "INSTRUCTIONS:",
    "Response format",
    "IMPORTANT:",
];

/// Whether a candidate's content exactly equals the submitted user text.
///
/// Echoes are always excluded from candidate replies, regardless of any
/// other heuristic match.
pub fn is_echo(message: &ChannelMessage, submitted: &str) -> bool {
    message.content_str() == submitted
}

/// Poll-time hit heuristic: does this message look like an agent reply
/// at all? Used to pick the winning read endpoint.
///
/// A hit is a source-type marker, agent authorship, or content that
/// differs from the submitted text and exceeds the minimum length.
pub fn looks_like_agent_reply(
    message: &ChannelMessage,
    submitted: &str,
    agent_id: &str,
    min_length: usize,
) -> bool {
    if is_echo(message, submitted) {
        return false;
    }
    if has_agent_source(message) || is_agent_author(message, agent_id) {
        return true;
    }
    let content = message.content_str();
    content != submitted && content.len() > min_length
}

/// Classification heuristic: keep this message as part of the reply?
///
/// Agent authorship and source-type markers are strong signals; failing
/// those, a fixed set of textual prefixes and substrings decides.
pub fn is_probable_agent_reply(message: &ChannelMessage, submitted: &str, agent_id: &str) -> bool {
    if is_echo(message, submitted) {
        debug!(id = ?message.id, "drop candidate: echo of submitted text");
        return false;
    }
    if has_agent_source(message) {
        debug!(id = ?message.id, source = ?message.source_type, "keep candidate: agent source type");
        return true;
    }
    if is_agent_author(message, agent_id) {
        debug!(id = ?message.id, "keep candidate: authored by agent");
        return true;
    }

    let lower = message.content_str().trim().to_lowercase();
    if REPLY_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        debug!(id = ?message.id, "keep candidate: affirmative opener");
        return true;
    }
    if REPLY_MARKERS.iter().any(|m| lower.contains(m)) {
        debug!(id = ?message.id, "keep candidate: success/transaction marker");
        return true;
    }

    debug!(id = ?message.id, "drop candidate: no heuristic matched");
    false
}

fn has_agent_source(message: &ChannelMessage) -> bool {
    message
        .source_type
        .as_deref()
        .is_some_and(|s| AGENT_SOURCE_MARKERS.contains(&s))
}

fn is_agent_author(message: &ChannelMessage, agent_id: &str) -> bool {
    message.author_id.as_deref() == Some(agent_id)
}

/// Clean one candidate's content.
///
/// Truncates at the first line containing an instruction marker, then
/// tries JSON extraction of a conventional text-bearing field (`text`,
/// `content`, `message`, `response`, a `follow_ups` list rendered as a
/// numbered list, or `thought`). Non-JSON content passes through
/// trimmed but otherwise unchanged.
pub fn clean_agent_message(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in content.lines() {
        if INSTRUCTION_MARKERS.iter().any(|m| line.contains(m)) {
            break;
        }
        kept.push(line);
    }
    let trimmed = kept.join("\n").trim().to_owned();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&trimmed) {
        for key in ["text", "content", "message", "response"] {
            if let Some(text) = map.get(key).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return text.trim().to_owned();
                }
            }
        }
        if let Some(follow_ups) = map.get("follow_ups").and_then(Value::as_array) {
            let rendered = render_numbered_list(follow_ups);
            if !rendered.is_empty() {
                return rendered;
            }
        }
        if let Some(thought) = map.get("thought").and_then(Value::as_str) {
            if !thought.trim().is_empty() {
                return thought.trim().to_owned();
            }
        }
    }

    trimmed
}

fn render_numbered_list(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(Value::as_str)
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i.saturating_add(1)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the reply from the polled channel messages.
///
/// Excludes echoes, classifies the remainder, sorts survivors by
/// creation time ascending, cleans each, and joins the non-empty
/// results with a blank line. `None` when nothing survives.
pub fn assemble_reply(
    messages: &[ChannelMessage],
    submitted: &str,
    agent_id: &str,
) -> Option<String> {
    let mut candidates: Vec<&ChannelMessage> = messages
        .iter()
        .filter(|m| is_probable_agent_reply(m, submitted, agent_id))
        .collect();
    candidates.sort_by_key(|m| m.created_at_millis());

    let fragments: Vec<String> = candidates
        .iter()
        .map(|m| clean_agent_message(m.content_str()))
        .filter(|text| !text.is_empty())
        .collect();

    if fragments.is_empty() {
        return None;
    }
    Some(fragments.join("\n\n"))
}

/// Render the metadata dump surfaced when no candidate survives
/// classification. Returned as the visible reply, not an error.
pub fn render_diagnostic(messages: &[ChannelMessage]) -> String {
    let mut out = format!(
        "No agent reply identified among {} channel message(s):",
        messages.len()
    );
    for (i, message) in messages.iter().enumerate() {
        let content = message.content_str();
        let snippet: String = content.chars().take(80).collect();
        out.push_str(&format!(
            "\n{}. author={} source={} created={} content={:?}",
            i.saturating_add(1),
            message.author_id.as_deref().unwrap_or("?"),
            message.source_type.as_deref().unwrap_or("?"),
            message.created_at_millis(),
            snippet,
        ));
    }
    out
}
