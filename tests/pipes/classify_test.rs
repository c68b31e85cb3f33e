//! Reply classification and cleaning heuristics tests.

use serde_json::json;

use seipipe::pipe::messaging::classify::{
    assemble_reply, clean_agent_message, is_echo, is_probable_agent_reply, looks_like_agent_reply,
    render_diagnostic,
};
use seipipe::pipe::messaging::wire::ChannelMessage;

fn message(author: &str, source: &str, content: &str, created_at: i64) -> ChannelMessage {
    ChannelMessage {
        id: Some(format!("msg-{created_at}")),
        author_id: Some(author.to_owned()),
        content: Some(content.to_owned()),
        source_type: Some(source.to_owned()),
        created_at: Some(json!(created_at)),
    }
}

const SUBMITTED: &str = "what is my balance";
const AGENT: &str = "agent-1";

// ── Echo exclusion ──────────────────────────────────────────────

#[test]
fn echo_requires_exact_equality() {
    assert!(is_echo(&message("x", "user_message", SUBMITTED, 1), SUBMITTED));
    assert!(!is_echo(
        &message("x", "user_message", "what is my balance?", 1),
        SUBMITTED
    ));
}

#[test]
fn echo_is_excluded_despite_agent_authorship() {
    // Exact echoes lose to every other heuristic signal.
    let echo = message(AGENT, "agent_response", SUBMITTED, 1);
    assert!(!is_probable_agent_reply(&echo, SUBMITTED, AGENT));
    assert!(!looks_like_agent_reply(&echo, SUBMITTED, AGENT, 5));
}

// ── Poll-time hit heuristic ─────────────────────────────────────

#[test]
fn hit_on_agent_source_type() {
    let msg = message("someone", "agent_response", "x", 1);
    assert!(looks_like_agent_reply(&msg, SUBMITTED, AGENT, 5));
}

#[test]
fn hit_on_agent_author() {
    let msg = message(AGENT, "user_message", "x", 1);
    assert!(looks_like_agent_reply(&msg, SUBMITTED, AGENT, 5));
}

#[test]
fn hit_on_long_differing_content() {
    let msg = message("someone", "user_message", "a reasonably long reply", 1);
    assert!(looks_like_agent_reply(&msg, SUBMITTED, AGENT, 5));
}

#[test]
fn no_hit_on_short_content() {
    let msg = message("someone", "user_message", "hey", 1);
    assert!(!looks_like_agent_reply(&msg, SUBMITTED, AGENT, 5));
}

// ── Classification ──────────────────────────────────────────────

#[test]
fn classify_keeps_agent_author_and_source() {
    assert!(is_probable_agent_reply(
        &message(AGENT, "user_message", "x", 1),
        SUBMITTED,
        AGENT
    ));
    assert!(is_probable_agent_reply(
        &message("other", "agent_response", "x", 1),
        SUBMITTED,
        AGENT
    ));
}

#[test]
fn classify_keeps_affirmative_openers_and_markers() {
    for content in [
        "Sure, here you go",
        "I've sent the transaction",
        "✅ swap complete",
        "Transfer executed successfully",
    ] {
        assert!(
            is_probable_agent_reply(&message("other", "message", content, 1), SUBMITTED, AGENT),
            "expected keep for {content:?}"
        );
    }
}

#[test]
fn classify_drops_unmatched_content() {
    let msg = message("other", "message", "random chatter", 1);
    assert!(!is_probable_agent_reply(&msg, SUBMITTED, AGENT));
}

// ── Cleaning ────────────────────────────────────────────────────

#[test]
fn clean_truncates_at_instruction_marker() {
    let content = "Your balance is 5 SEI\n# Instructions\nAlways answer in JSON";
    assert_eq!(clean_agent_message(content), "Your balance is 5 SEI");
}

#[test]
fn clean_extracts_text_field_from_json() {
    let content = r#"{"text": "hello from json", "user": "agent"}"#;
    assert_eq!(clean_agent_message(content), "hello from json");
}

#[test]
fn clean_extracts_fallback_fields_in_order() {
    assert_eq!(
        clean_agent_message(r#"{"message": "from message"}"#),
        "from message"
    );
    assert_eq!(
        clean_agent_message(r#"{"response": "from response"}"#),
        "from response"
    );
    assert_eq!(
        clean_agent_message(r#"{"thought": "from thought"}"#),
        "from thought"
    );
}

#[test]
fn clean_renders_follow_ups_as_numbered_list() {
    let content = r#"{"follow_ups": ["check balance", "swap tokens"]}"#;
    assert_eq!(
        clean_agent_message(content),
        "1. check balance\n2. swap tokens"
    );
}

#[test]
fn clean_passes_non_json_through() {
    assert_eq!(clean_agent_message("  plain reply  "), "plain reply");
}

// ── Assembly ────────────────────────────────────────────────────

#[test]
fn assemble_sorts_by_creation_time_ascending() {
    let messages = vec![
        message(AGENT, "agent_response", "second part", 200),
        message(AGENT, "agent_response", "first part", 100),
        message("user", "user_message", SUBMITTED, 50),
    ];
    let reply = assemble_reply(&messages, SUBMITTED, AGENT).expect("should assemble");
    assert_eq!(reply, "first part\n\nsecond part");
}

#[test]
fn assemble_returns_none_when_nothing_survives() {
    let messages = vec![message("user", "user_message", SUBMITTED, 1)];
    assert!(assemble_reply(&messages, SUBMITTED, AGENT).is_none());
}

#[test]
fn assemble_orders_rfc3339_timestamps() {
    let mut early = message(AGENT, "agent_response", "early", 0);
    early.created_at = Some(json!("2026-01-01T00:00:00Z"));
    let mut late = message(AGENT, "agent_response", "late", 0);
    late.created_at = Some(json!("2026-01-01T00:00:05Z"));

    let reply = assemble_reply(&[late, early], SUBMITTED, AGENT).expect("should assemble");
    assert_eq!(reply, "early\n\nlate");
}

// ── Diagnostic dump ─────────────────────────────────────────────

#[test]
fn diagnostic_enumerates_message_metadata() {
    let messages = vec![
        message("user", "user_message", SUBMITTED, 1),
        message("other", "message", "noise", 2),
    ];
    let dump = render_diagnostic(&messages);
    assert!(dump.contains("2 channel message(s)"));
    assert!(dump.contains("author=user"));
    assert!(dump.contains("source=message"));
    assert!(dump.contains("noise"));
}
