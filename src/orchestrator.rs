// ABOUTME: Turn orchestrator — runs one conversational turn against the session store and dispatch pool.
// ABOUTME: Always records the user turn and the reply (or fallback) so history stays consistent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::dispatch::DispatchPool;
use crate::session::{ImageRef, SessionStore, Turn};
use crate::upstream::GenerationRequest;

/// One incoming user message. `text` must already be validated as non-blank.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_key: String,
    pub text: String,
    pub image: Option<ImageRef>,
    pub local_time: Option<String>,
    pub timeout: Duration,
}

pub struct TurnOrchestrator {
    store: Arc<SessionStore>,
    pool: Arc<DispatchPool>,
}

impl TurnOrchestrator {
    pub fn new(store: Arc<SessionStore>, pool: Arc<DispatchPool>) -> Self {
        Self { store, pool }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<DispatchPool> {
        &self.pool
    }

    /// Run a turn for `session_key` and return the reply text.
    pub async fn handle_turn(
        &self,
        session_key: &str,
        user_text: &str,
        image: Option<ImageRef>,
        timeout: Duration,
    ) -> String {
        self.handle(TurnRequest {
            session_key: session_key.to_string(),
            text: user_text.to_string(),
            image,
            local_time: None,
            timeout,
        })
        .await
    }

    /// Run a turn. Upstream failures are absorbed; the fallback text is returned instead.
    ///
    /// The write slot is reserved before the upstream call, so concurrent turns on one
    /// session land in the order they started even if their replies finish out of order.
    pub async fn handle(&self, request: TurnRequest) -> String {
        let started = Instant::now();
        let key = request.session_key;
        let ticket = self.store.reserve(&key);
        let context = self.store.window(&key, self.store.max_turns());
        let has_image = request.image.is_some();
        let input = Turn::user(request.text).with_image(request.image);

        let result = self
            .pool
            .submit_generate(
                GenerationRequest {
                    context,
                    input: input.clone(),
                    local_time: request.local_time,
                },
                request.timeout,
            )
            .await;
        let success = result.is_success();
        let reply = result.into_text();

        // Images are used for the current request only; history keeps the text.
        ticket
            .commit([input.without_image(), Turn::assistant(reply.clone())])
            .await;

        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "failed to write session snapshot");
        }

        info!(
            session = %key,
            success,
            has_image,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn complete"
        );
        reply
    }
}
