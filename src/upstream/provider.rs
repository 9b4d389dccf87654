// ABOUTME: Upstream provider factory — creates the generation and speech clients from config.
// ABOUTME: Supports openai and ollama (any OpenAI-compatible endpoint via base_url).

use std::sync::Arc;

use crate::config::{LlmConfig, SpeechConfig};
use crate::upstream::openai::{DEFAULT_BASE_URL, OpenAiClient};
use crate::upstream::{SpeechSynthesizer, TextGenerator, UpstreamError};

const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Both upstream services, usually backed by the same client.
pub struct Upstreams {
    pub generator: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

/// Create upstream clients based on the provider name in config.
///
/// The API key is read from the environment variable named by `api_key_env`.
pub fn create_clients(llm: &LlmConfig, speech: &SpeechConfig) -> anyhow::Result<Upstreams> {
    let configured_url = llm.base_url.as_deref().filter(|s| !s.is_empty());
    let client = match llm.provider.as_str() {
        "openai" => {
            let api_key = std::env::var(&llm.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| UpstreamError::MissingApiKey(llm.api_key_env.clone()))?;
            OpenAiClient::new(
                configured_url.unwrap_or(DEFAULT_BASE_URL),
                Some(api_key),
                llm.clone(),
                speech.clone(),
            )?
        }
        "ollama" => OpenAiClient::new(
            configured_url.unwrap_or(OLLAMA_BASE_URL),
            std::env::var(&llm.api_key_env).ok(),
            llm.clone(),
            speech.clone(),
        )?,
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Expected: openai, ollama",
            other
        ),
    };
    let client = Arc::new(client);
    Ok(Upstreams {
        generator: client.clone(),
        speech: client,
    })
}
