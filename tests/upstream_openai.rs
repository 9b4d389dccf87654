// ABOUTME: Integration tests for the OpenAI-compatible client against a local mock HTTP server.
// ABOUTME: Covers request shape, auth, reply parsing, and non-2xx handling for chat and speech.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nexus::config::{LlmConfig, SpeechConfig};
use nexus::session::{ImageRef, Turn};
use nexus::upstream::{
    GenerationRequest, OpenAiClient, SpeechSynthesizer, TextGenerator, UpstreamError,
};

fn client(server: &MockServer, key: Option<&str>) -> OpenAiClient {
    let llm = LlmConfig {
        system_prompt: "You are NEXUS.".to_string(),
        ..LlmConfig::default()
    };
    OpenAiClient::new(
        &server.uri(),
        key.map(str::to_string),
        llm,
        SpeechConfig::default(),
    )
    .unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
    })
}

fn request(text: &str) -> GenerationRequest {
    GenerationRequest {
        context: vec![Turn::user("earlier"), Turn::assistant("reply")],
        input: Turn::user(text),
        local_time: None,
    }
}

#[tokio::test]
async fn chat_completion_sends_context_and_parses_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "max_tokens": 150,
            "messages": [
                {"role": "system", "content": "You are NEXUS."},
                {"role": "user", "content": "earlier"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "hello"},
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Hi there.  ")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server, Some("sk-test"))
        .generate(&request("hello"))
        .await
        .unwrap();
    assert_eq!(reply, "Hi there.");
}

#[tokio::test]
async fn image_turn_goes_to_the_vision_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("a cat")))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request("what is this");
    req.input = Turn::user("what is this").with_image(ImageRef::from_payload("QUJD"));
    let reply = client(&server, Some("sk-test")).generate(&req).await.unwrap();
    assert_eq!(reply, "a cat");
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .generate(&request("hello"))
        .await
        .unwrap_err();
    match err {
        UpstreamError::Status { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_completion_is_an_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .generate(&request("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::EmptyReply));
}

#[tokio::test]
async fn missing_choices_is_an_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .generate(&request("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::EmptyReply));
}

#[tokio::test]
async fn speech_returns_raw_audio_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "tts-1",
            "voice": "nova",
            "input": "hello",
            "response_format": "mp3",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3\x04\x00".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let audio = client(&server, Some("sk-test"))
        .synthesize("hello")
        .await
        .unwrap();
    assert_eq!(&audio[..], b"ID3\x04\x00");
}

#[tokio::test]
async fn speech_failure_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .synthesize("hello")
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Status { .. }));
}
