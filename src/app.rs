// ABOUTME: App orchestrator — wires upstream clients, session store, dispatch pool, and HTTP gateway.
// ABOUTME: Restores the session snapshot at startup and drains the pool and flushes on shutdown.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{DispatchPool, PhraseCache};
use crate::orchestrator::TurnOrchestrator;
use crate::server::{self, AppState};
use crate::session::SessionStore;
use crate::upstream::{self, provider::Upstreams};

/// Top-level application that owns every long-lived component.
pub struct App {
    config: Config,
    fresh: bool,
}

impl App {
    /// Create a new app. `fresh` skips restoring the session snapshot.
    pub fn new(config: Config, fresh: bool) -> Self {
        Self { config, fresh }
    }

    /// Build the store, pool, and orchestrator around the given upstreams.
    pub fn build_orchestrator(&self, upstreams: Upstreams) -> Arc<TurnOrchestrator> {
        let session = &self.config.session;
        let mut store = SessionStore::new(session.max_turns, session.retention);
        if let Some(path) = &session.snapshot_path {
            store = store.with_snapshot_path(path.clone());
        }
        if !self.fresh {
            store.load();
        }

        let phrases = if self.config.phrases.enabled {
            PhraseCache::new(self.config.phrases.rules.iter().cloned())
        } else {
            PhraseCache::disabled()
        };
        let pool = DispatchPool::new(upstreams.generator, upstreams.speech, &self.config.dispatch)
            .with_phrases(phrases);

        Arc::new(TurnOrchestrator::new(Arc::new(store), Arc::new(pool)))
    }

    /// Run the server until Ctrl-C or SIGTERM, then shut down cleanly.
    pub async fn run(self) -> anyhow::Result<()> {
        // Load local .env if present, then the per-user secrets file.
        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_path(Config::secrets_env_path());

        let upstreams = upstream::create_clients(&self.config.llm, &self.config.speech)?;
        let orchestrator = self.build_orchestrator(upstreams);
        let router = server::build_router(
            AppState::new(Arc::clone(&orchestrator), &self.config),
            &self.config,
        );

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(
            addr = %listener.local_addr()?,
            provider = %self.config.llm.provider,
            model = %self.config.llm.model,
            sessions = orchestrator.store().session_count(),
            "nexus listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("shutting down");
        orchestrator
            .pool()
            .shutdown(self.config.dispatch.shutdown_grace())
            .await;
        if let Err(e) = orchestrator.store().flush().await {
            warn!(error = %e, "final session snapshot failed");
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
