// ABOUTME: Dispatch pool — bounds concurrent upstream calls and enforces per-call deadlines.
// ABOUTME: Generation failures degrade to fallback text; speech failures degrade to no audio.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::dispatch::phrases::PhraseCache;
use crate::upstream::{GenerationRequest, SpeechSynthesizer, TextGenerator, UpstreamError};

/// Outcome of a generation submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Success(String),
    /// The upstream call failed or timed out; carries the fallback text.
    Failure(String),
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CallFailure {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("upstream call panicked")]
    Panicked,
    #[error("deadline elapsed")]
    TimedOut,
    #[error("dispatch pool is shut down")]
    Closed,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cache_hits: AtomicU64,
}

/// Point-in-time pool counters, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub workers: usize,
    pub speech_workers: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cache_hits: u64,
}

fn busy(slots: &Semaphore, total: usize) -> usize {
    total.saturating_sub(slots.available_permits())
}

/// Bounded executor for outbound generation and speech calls.
///
/// Excess submissions wait for a slot in FIFO order. Each submit carries a deadline
/// covering both the wait and the call; on expiry the call is aborted and the caller
/// gets the degraded result immediately.
pub struct DispatchPool {
    generator: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    generate_slots: Arc<Semaphore>,
    speech_slots: Arc<Semaphore>,
    workers: usize,
    speech_workers: usize,
    phrases: PhraseCache,
    fallback: String,
    tasks: TaskTracker,
    counters: Counters,
}

impl DispatchPool {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        config: &DispatchConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let speech_workers = config.speech_workers.max(1);
        Self {
            generator,
            speech,
            generate_slots: Arc::new(Semaphore::new(workers)),
            speech_slots: Arc::new(Semaphore::new(speech_workers)),
            workers,
            speech_workers,
            phrases: PhraseCache::disabled(),
            fallback: config.fallback_text.clone(),
            tasks: TaskTracker::new(),
            counters: Counters::default(),
        }
    }

    /// Install the canned-reply fast path.
    pub fn with_phrases(mut self, phrases: PhraseCache) -> Self {
        self.phrases = phrases;
        self
    }

    pub fn fallback_text(&self) -> &str {
        &self.fallback
    }

    /// Generate a reply, never failing: errors and timeouts yield the fallback text.
    pub async fn submit_generate(
        &self,
        request: GenerationRequest,
        timeout: Duration,
    ) -> DispatchResult {
        if let Some(reply) = self.phrases.lookup(&request.input.content) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("phrase cache hit");
            return DispatchResult::Success(reply.to_string());
        }

        let generator = Arc::clone(&self.generator);
        let call = async move { generator.generate(&request).await };
        match self.run_bounded(&self.generate_slots, timeout, call).await {
            Ok(text) => DispatchResult::Success(text),
            Err(failure) => {
                warn!(
                    error = %failure,
                    timeout_ms = timeout.as_millis() as u64,
                    "generation failed, using fallback"
                );
                DispatchResult::Failure(self.fallback.clone())
            }
        }
    }

    /// Synthesize speech. Blank text yields empty audio; failure yields `None`.
    pub async fn submit_speech(&self, text: &str, timeout: Duration) -> Option<Bytes> {
        if text.trim().is_empty() {
            return Some(Bytes::new());
        }

        let speech = Arc::clone(&self.speech);
        let text = text.to_string();
        let call = async move { speech.synthesize(&text).await };
        match self.run_bounded(&self.speech_slots, timeout, call).await {
            Ok(audio) => Some(audio),
            Err(failure) => {
                warn!(
                    error = %failure,
                    timeout_ms = timeout.as_millis() as u64,
                    "speech synthesis failed"
                );
                None
            }
        }
    }

    async fn run_bounded<T, F>(
        &self,
        slots: &Arc<Semaphore>,
        timeout: Duration,
        call: F,
    ) -> Result<T, CallFailure>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let deadline = Instant::now() + timeout;
        let result = match timeout_at(deadline, Arc::clone(slots).acquire_owned()).await {
            Err(_) => Err(CallFailure::TimedOut),
            Ok(Err(_)) => Err(CallFailure::Closed),
            Ok(Ok(permit)) => {
                let mut handle = self.tasks.spawn(async move {
                    let _permit = permit;
                    call.await
                });
                match timeout_at(deadline, &mut handle).await {
                    Ok(Ok(result)) => result.map_err(CallFailure::from),
                    Ok(Err(_)) => Err(CallFailure::Panicked),
                    Err(_) => {
                        handle.abort();
                        Err(CallFailure::TimedOut)
                    }
                }
            }
        };

        let counter = match &result {
            Ok(_) => &self.counters.completed,
            Err(CallFailure::TimedOut) => &self.counters.timed_out,
            Err(_) => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            workers: self.workers,
            speech_workers: self.speech_workers,
            in_flight: busy(&self.generate_slots, self.workers)
                + busy(&self.speech_slots, self.speech_workers),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting calls and wait up to `grace` for in-flight ones to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.generate_slots.close();
        self.speech_slots.close();
        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            warn!(remaining = self.tasks.len(), "dispatch pool shut down with calls still running");
        } else {
            info!("dispatch pool drained");
        }
    }
}
