// ABOUTME: OpenAI-compatible HTTP client for chat completions and speech synthesis.
// ABOUTME: Switches to the vision model when the new turn carries an image.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{LlmConfig, SpeechConfig};
use crate::session::{Role, Turn};
use crate::upstream::{GenerationRequest, SpeechSynthesizer, TextGenerator, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any server speaking the OpenAI chat-completions and audio-speech APIs.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    llm: LlmConfig,
    speech: SpeechConfig,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        llm: LlmConfig,
        speech: SpeechConfig,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            llm,
            speech,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model used for a request: the vision model when an image is attached.
    pub fn model_for(&self, request: &GenerationRequest) -> &str {
        if request.input.image.is_some() {
            &self.llm.vision_model
        } else {
            &self.llm.model
        }
    }

    /// Build the chat-completions request body.
    pub fn chat_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = Vec::with_capacity(request.context.len() + 3);
        if !self.llm.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.llm.system_prompt}));
        }
        if let Some(local_time) = request.local_time.as_deref().filter(|t| !t.is_empty()) {
            messages.push(json!({
                "role": "system",
                "content": format!("The user's local time is {local_time}."),
            }));
        }
        messages.extend(request.context.iter().map(turn_message));
        messages.push(turn_message(&request.input));

        json!({
            "model": self.model_for(request),
            "messages": messages,
            "max_tokens": self.llm.max_tokens,
            "temperature": self.llm.temperature,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn turn_message(turn: &Turn) -> Value {
    match &turn.image {
        Some(image) => json!({
            "role": role_name(turn.role),
            "content": [
                {"type": "text", "text": turn.content},
                {"type": "image_url", "image_url": {"url": image.data_url()}},
            ],
        }),
        None => json!({"role": role_name(turn.role), "content": turn.content}),
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamError::Status { status, body })
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let body = self.chat_body(request);
        debug!(model = self.model_for(request), turns = request.context.len(), "chat completion");

        let resp = self.post("/chat/completions").json(&body).send().await?;
        let completion: ChatCompletion = check_status(resp).await?.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(UpstreamError::EmptyReply)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError> {
        let body = json!({
            "model": self.speech.model,
            "voice": self.speech.voice,
            "input": text,
            "response_format": self.speech.response_format,
        });
        let resp = self.post("/audio/speech").json(&body).send().await?;
        Ok(check_status(resp).await?.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ImageRef;

    fn client() -> OpenAiClient {
        let llm = LlmConfig {
            system_prompt: "be brief".to_string(),
            ..LlmConfig::default()
        };
        OpenAiClient::new(DEFAULT_BASE_URL, None, llm, SpeechConfig::default()).unwrap()
    }

    fn request(image: Option<ImageRef>) -> GenerationRequest {
        GenerationRequest {
            context: vec![Turn::user("hello"), Turn::assistant("Hi!")],
            input: Turn::user("what is this?").with_image(image),
            local_time: None,
        }
    }

    #[test]
    fn text_request_uses_text_model() {
        let client = client();
        let body = client.chat_body(&request(None));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 150);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "what is this?");
    }

    #[test]
    fn image_request_uses_vision_model_and_content_parts() {
        let client = client();
        let body = client.chat_body(&request(ImageRef::from_payload("QUJD")));
        assert_eq!(body["model"], "gpt-4o");

        let last = body["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["content"][0]["type"], "text");
        assert_eq!(last["content"][1]["type"], "image_url");
        assert_eq!(
            last["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn local_time_becomes_system_context() {
        let client = client();
        let mut req = request(None);
        req.local_time = Some("9:41 PM".to_string());
        let body = client.chat_body(&req);
        assert_eq!(
            body["messages"][1]["content"],
            "The user's local time is 9:41 PM."
        );
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let client =
            OpenAiClient::new(DEFAULT_BASE_URL, None, LlmConfig::default(), SpeechConfig::default())
                .unwrap();
        let body = client.chat_body(&request(None));
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::new(
            "http://localhost:11434/v1/",
            Some(String::new()),
            LlmConfig::default(),
            SpeechConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
    }
}
