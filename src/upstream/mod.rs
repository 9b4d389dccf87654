// ABOUTME: Upstream module — the text-generation and speech-synthesis services this server forwards to.
// ABOUTME: Defines the provider traits plus the OpenAI-compatible client, factory, and test doubles.

pub mod mock;
pub mod openai;
pub mod provider;

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::Turn;

pub use openai::OpenAiClient;
pub use provider::create_clients;

/// Everything the generation service needs for one reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prior turns, oldest first.
    pub context: Vec<Turn>,
    /// The new user turn, possibly carrying an image.
    pub input: Turn,
    /// Caller's local time, passed along as extra context.
    pub local_time: Option<String>,
}

/// Errors from an upstream call. The dispatch pool absorbs all of them.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("upstream reply had no text")]
    EmptyReply,
    #[error("missing API key: set {0}")]
    MissingApiKey(String),
    #[error("{0}")]
    Other(String),
}

/// A service that turns a context window plus new input into reply text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
}

/// A service that turns text into encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError>;
}
