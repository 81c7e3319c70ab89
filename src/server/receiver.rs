//! Listener lifecycle for the webhook receiver.
//!
//! [`WebhookReceiver::start`] binds a TCP listener and serves the router on a
//! background task. Each connection is handled on its own task, so requests
//! run concurrently. [`WebhookReceiver::stop`] cancels the accept loop and
//! drops the listener at once; requests already in flight are not awaited.

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AppState, WEBHOOK_PATH, build_router};
use crate::config::ReceiverConfig;
use crate::dedupe::SeenSet;
use crate::webhooks::{SignatureError, SignatureVerifier};

/// Errors surfaced to the operator. Request-level failures never appear here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The signing secret cannot be used.
    #[error("invalid webhook configuration: {0}")]
    Signature(#[from] SignatureError),

    /// The listener could not be bound.
    #[error("failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `start` was called on a receiver that has already been started.
    #[error("webhook receiver has already been started")]
    AlreadyStarted,
}

enum Lifecycle {
    Idle,
    Running {
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// A Stripe webhook receiver bound to one seen set.
///
/// Each receiver owns its state, so several can run side by side (for
/// example on ephemeral ports in tests) without sharing accepted events.
pub struct WebhookReceiver {
    config: ReceiverConfig,
    app_state: AppState,
    lifecycle: Lifecycle,
}

impl WebhookReceiver {
    /// Creates a receiver with a fresh seen set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Signature`] if the signing secret is blank.
    pub fn new(config: ReceiverConfig) -> Result<Self, ServerError> {
        Self::with_seen_set(config, SeenSet::new())
    }

    /// Creates a receiver that records accepted events in `seen`.
    pub fn with_seen_set(config: ReceiverConfig, seen: SeenSet) -> Result<Self, ServerError> {
        let verifier = SignatureVerifier::new(config.webhook_secret.expose())?;
        Ok(WebhookReceiver {
            app_state: AppState::with_parts(verifier, seen),
            config,
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Binds `<bind_address>:<port>` and starts serving.
    ///
    /// Port 0 picks an ephemeral port; the bound address is returned.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if called more than once
    /// - [`ServerError::Bind`] if the address cannot be bound
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr, ServerError> {
        if !matches!(self.lifecycle, Lifecycle::Idle) {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = SocketAddr::new(self.config.bind_address, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let shutdown = CancellationToken::new();
        let router = build_router(self.app_state.clone());
        let task = tokio::spawn(serve(listener, router, shutdown.clone()));

        info!(%local_addr, path = WEBHOOK_PATH, "Webhook receiver listening");

        self.lifecycle = Lifecycle::Running {
            local_addr,
            shutdown,
            task,
        };
        Ok(local_addr)
    }

    /// Stops accepting connections and releases the listener.
    ///
    /// Does nothing if the receiver is not running.
    pub async fn stop(&mut self) {
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped);
        match lifecycle {
            Lifecycle::Running {
                local_addr,
                shutdown,
                task,
            } => {
                shutdown.cancel();
                if let Err(e) = task.await {
                    warn!(%local_addr, error = %e, "Webhook listener task ended abnormally");
                }
                info!(
                    %local_addr,
                    accepted_events = self.app_state.seen().len(),
                    "Webhook receiver stopped"
                );
            }
            other => self.lifecycle = other,
        }
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle {
            Lifecycle::Running { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// Whether the receiver is currently serving; `false` before `start`
    /// and after `stop`.
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// The seen set this receiver records into.
    pub fn seen(&self) -> &SeenSet {
        self.app_state.seen()
    }

    #[cfg(test)]
    pub(crate) fn app_state(&self) -> &AppState {
        &self.app_state
    }
}

impl Drop for WebhookReceiver {
    fn drop(&mut self) {
        if let Lifecycle::Running { shutdown, .. } = &self.lifecycle {
            shutdown.cancel();
        }
    }
}

/// Serves `router` until `shutdown` fires.
///
/// Cancellation drops the accept loop (and with it the listener) without
/// waiting for open connections.
async fn serve(listener: TcpListener, router: axum::Router, shutdown: CancellationToken) {
    tokio::select! {
        result = axum::serve(listener, router).into_future() => {
            if let Err(e) = result {
                error!(error = %e, "Webhook listener failed");
            }
        }
        () = shutdown.cancelled() => {
            debug!("Webhook listener cancelled");
        }
    }
}
