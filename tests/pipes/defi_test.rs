//! DeFi agent pipe wire-format and exchange tests.

use serde_json::json;

use seipipe::conversation::{Conversation, RequestContext, Role};
use seipipe::notify::StatusNotifier;
use seipipe::pipe::defi::{
    build_request, clean_reply, extract_reply_text, parse_stream_fragment, DefiAgentPipe,
    DefiValves, NO_RESPONSE_MESSAGE,
};
use seipipe::pipe::{Pipe, PipeError};

fn test_valves(url: String, stream: bool) -> DefiValves {
    DefiValves {
        url,
        stream,
        request_timeout_seconds: 5,
        fallback_timeout_seconds: 2,
        ..DefiValves::default()
    }
}

// ── Pure helpers ────────────────────────────────────────────────

#[test]
fn build_request_wraps_single_user_message() {
    let req = serde_json::to_value(build_request("what is my balance")).expect("should serialize");
    assert_eq!(
        req,
        json!({"messages": [{"role": "user", "content": "what is my balance"}]})
    );
}

#[test]
fn extract_reply_prefers_text_field() {
    let body = json!({"text": "from text", "data": "from data"});
    assert_eq!(extract_reply_text(&body, "data"), "from text");
}

#[test]
fn extract_reply_skips_empty_text_field() {
    let body = json!({"text": "", "data": "from data"});
    assert_eq!(extract_reply_text(&body, "data"), "from data");
}

#[test]
fn extract_reply_falls_back_to_configured_field() {
    let body = json!({"data": "field value"});
    assert_eq!(extract_reply_text(&body, "data"), "field value");
}

#[test]
fn extract_reply_stringifies_non_string_field() {
    let body = json!({"data": {"nested": 1}});
    assert_eq!(extract_reply_text(&body, "data"), r#"{"nested":1}"#);
}

#[test]
fn extract_reply_stringifies_whole_object_when_field_missing() {
    let body = json!({"other": 1});
    assert_eq!(extract_reply_text(&body, "data"), r#"{"other":1}"#);
}

#[test]
fn extract_reply_handles_non_object_reply() {
    assert_eq!(extract_reply_text(&json!("bare string"), "data"), "bare string");
    assert_eq!(extract_reply_text(&json!(42), "data"), "42");
}

#[test]
fn parse_stream_fragment_reads_text_events() {
    assert_eq!(
        parse_stream_fragment(r#"{"type":"text","text":"Hel"}"#),
        Some("Hel".to_owned())
    );
}

#[test]
fn parse_stream_fragment_skips_other_events() {
    assert_eq!(parse_stream_fragment(r#"{"type":"done"}"#), None);
    assert_eq!(parse_stream_fragment(r#"{"text":"no type"}"#), None);
}

#[test]
fn parse_stream_fragment_skips_malformed_lines() {
    assert_eq!(parse_stream_fragment("not json at all"), None);
    assert_eq!(parse_stream_fragment(""), None);
}

// ── Cleanup pass ────────────────────────────────────────────────

#[test]
fn clean_reply_appends_terminal_punctuation() {
    assert_eq!(clean_reply("Hello"), "Hello.");
}

#[test]
fn clean_reply_keeps_existing_terminal_punctuation() {
    for text in ["Done.", "Really!", "Sure?", "(ok)", "rate: ∞", "note:"] {
        assert_eq!(clean_reply(text), text);
    }
}

#[test]
fn clean_reply_trims_and_drops_empty_lines() {
    let raw = "  first line  \n\n   \n  second line \n";
    assert_eq!(clean_reply(raw), "first line\nsecond line.");
}

#[test]
fn clean_reply_unescapes_literal_newlines() {
    assert_eq!(clean_reply("Line1\\nLine2"), "Line1\nLine2.");
}

#[test]
fn clean_reply_collapses_doubled_spaces() {
    assert_eq!(clean_reply("too   many    spaces"), "too many spaces.");
}

#[test]
fn clean_reply_empty_input_stays_empty() {
    assert_eq!(clean_reply(""), "");
    assert_eq!(clean_reply("  \n  \n"), "");
}

#[test]
fn clean_reply_is_idempotent() {
    for raw in [
        "Hello",
        "  a  \\n  b  ",
        "spaced   out text",
        "multi\nline\n\ntext",
        "Already terminal!",
    ] {
        let once = clean_reply(raw);
        assert_eq!(clean_reply(&once), once, "not idempotent for {raw:?}");
    }
}

// ── HTTP exchanges (with mockito) ───────────────────────────────

#[tokio::test]
async fn non_streaming_success_appends_one_assistant_message() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::Json(json!({
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"text": "All good"}).to_string())
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), false));
    let mut conversation = Conversation::from_user_text("hi");
    let reply = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await
        .expect("should succeed");

    assert_eq!(reply, "All good");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].role, Role::Assistant);
    assert_eq!(conversation.messages[1].content, "All good");
    mock.assert_async().await;
}

#[tokio::test]
async fn streaming_reassembles_fragments_in_order() {
    let body = concat!(
        r#"{"type":"text","text":"Hel"}"#,
        "\n",
        r#"{"type":"text","text":"lo"}"#,
        "\n",
        r#"{"type":"done"}"#,
        "\n",
    );
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), true));
    let mut conversation = Conversation::from_user_text("hi");
    let reply = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await
        .expect("should succeed");

    assert_eq!(reply, "Hello.");
    assert_eq!(conversation.messages[1].content, "Hello.");
    mock.assert_async().await;
}

#[tokio::test]
async fn streaming_skips_malformed_fragments() {
    let body = concat!(
        r#"{"type":"text","text":"ok"}"#,
        "\n",
        "garbage line\n",
        r#"{"type":"text","text":" then"}"#,
        "\n",
    );
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), true));
    let mut conversation = Conversation::from_user_text("hi");
    let reply = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await
        .expect("should succeed");

    assert_eq!(reply, "ok then.");
}

#[tokio::test]
async fn streaming_empty_reply_becomes_canned_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body("{\"type\":\"done\"}\n")
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), true));
    let mut conversation = Conversation::from_user_text("hi");
    let reply = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await
        .expect("should succeed");

    assert_eq!(reply, NO_RESPONSE_MESSAGE);
    assert_eq!(conversation.messages[1].content, NO_RESPONSE_MESSAGE);
}

#[tokio::test]
async fn non_success_status_leaves_conversation_unmodified() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_body("backend exploded")
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), false));
    let mut conversation = Conversation::from_user_text("hi");
    let result = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await;

    match result {
        Err(PipeError::HttpStatus { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected HttpStatus error, got {other:?}"),
    }
    assert_eq!(conversation.messages.len(), 1);
}

#[tokio::test]
async fn empty_conversation_returns_fixed_error_without_backend_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .expect(0)
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), false));
    let mut conversation = Conversation::default();
    let result = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await;

    assert!(matches!(result, Err(PipeError::NoMessages)));
    // The canned assistant notice is the only mutation.
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(
        conversation.messages[0].content,
        "No messages found in the request body"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn streaming_gives_up_after_failed_fallback() {
    // Unroutable endpoint: both the streaming attempt and the
    // non-streaming fallback fail with a transport error.
    let pipe = DefiAgentPipe::new(test_valves("http://127.0.0.1:1/api/chat".to_owned(), true));
    let mut conversation = Conversation::from_user_text("hi");
    let result = pipe
        .run(&mut conversation, &RequestContext::new(), &StatusNotifier::disabled())
        .await;

    assert!(matches!(result, Err(PipeError::Request(_))));
    assert_eq!(conversation.messages.len(), 1);
}

#[tokio::test]
async fn fallback_exchange_extracts_reply_directly() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(json!({"data": "fallback reply"}).to_string())
        .create_async()
        .await;

    let pipe = DefiAgentPipe::new(test_valves(format!("{}/api/chat", server.url()), true));
    let reply = pipe
        .non_streaming_exchange("hi", std::time::Duration::from_secs(2))
        .await
        .expect("should succeed");

    assert_eq!(reply, "fallback reply");
}
