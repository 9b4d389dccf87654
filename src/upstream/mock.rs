// ABOUTME: In-process upstream doubles with scripted behavior, for tests.
// ABOUTME: Track call counts and peak concurrency so pool bounds can be asserted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::upstream::{GenerationRequest, SpeechSynthesizer, TextGenerator, UpstreamError};

/// How a mock answers every call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply with fixed text.
    Text(String),
    /// Reply with `"echo: <input text>"`.
    Echo,
    /// Fail with the given message.
    Error(String),
    /// Never complete.
    Hang,
    /// Wait, then behave like the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

#[derive(Default)]
struct CallTracker {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CallTracker {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the in-flight count even when the call is aborted mid-await.
struct InFlight<'a>(&'a CallTracker);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

async fn resolve(reply: &MockReply, input: &str) -> Result<String, UpstreamError> {
    let mut reply = reply;
    loop {
        match reply {
            MockReply::Text(text) => return Ok(text.clone()),
            MockReply::Echo => return Ok(format!("echo: {input}")),
            MockReply::Error(msg) => return Err(UpstreamError::Other(msg.clone())),
            MockReply::Hang => std::future::pending::<()>().await,
            MockReply::Delay(delay, inner) => {
                tokio::time::sleep(*delay).await;
                reply = inner.as_ref();
            }
        }
    }
}

/// Text generator answering every call with the same scripted reply.
pub struct MockGenerator {
    reply: MockReply,
    tracker: CallTracker,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            tracker: CallTracker::default(),
            last_request: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.tracker.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.tracker.peak.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        *self.last_request.lock() = Some(request.clone());
        self.tracker.enter();
        let _guard = InFlight(&self.tracker);
        resolve(&self.reply, &request.input.content).await
    }
}

/// Speech synthesizer answering every call with the same scripted reply.
///
/// Text replies are returned as their UTF-8 bytes.
pub struct MockSpeech {
    reply: MockReply,
    tracker: CallTracker,
}

impl MockSpeech {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            tracker: CallTracker::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.tracker.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError> {
        self.tracker.enter();
        let _guard = InFlight(&self.tracker);
        resolve(&self.reply, text).await.map(Bytes::from)
    }
}
