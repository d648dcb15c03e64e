//! Connection state machine for the single paired session.

use std::sync::Arc;

use pairlink_core::{
    ConnectionStatus, CredentialRecord, DisconnectReason, ProtocolEvent, SessionConfig,
    SessionSnapshot,
    traits::{ConnectOptions, CredentialStore, PairingRenderer, ProtocolCapability},
};
use tokio::{
    sync::{mpsc, watch},
    time::timeout,
};
use uuid::Uuid;

use crate::{
    QrSvgRenderer,
    state::{SessionContext, SessionHandle, SessionState},
};

struct Inner {
    config: SessionConfig,
    protocol: Arc<dyn ProtocolCapability>,
    store: Arc<dyn CredentialStore>,
    renderer: Arc<dyn PairingRenderer>,
    ctx: Arc<SessionContext>,
}

/// Owns the session lifecycle: start, event handling and logout.
///
/// Cloning is cheap; clones drive the same session.
#[derive(Clone)]
pub struct ConnectionStateMachine {
    inner: Arc<Inner>,
}

impl ConnectionStateMachine {
    /// Create a state machine in `Disconnected`.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        protocol: Arc<dyn ProtocolCapability>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::with_renderer(config, protocol, store, Arc::new(QrSvgRenderer::default()))
    }

    /// Create a state machine with a custom pairing code renderer.
    #[must_use]
    pub fn with_renderer(
        config: SessionConfig,
        protocol: Arc<dyn ProtocolCapability>,
        store: Arc<dyn CredentialStore>,
        renderer: Arc<dyn PairingRenderer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                protocol,
                store,
                renderer,
                ctx: Arc::new(SessionContext::new()),
            }),
        }
    }

    /// Shared context, for the dispatcher.
    #[must_use]
    pub fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.inner.ctx)
    }

    /// Current status and pairing artifact.
    #[must_use]
    pub fn status(&self) -> SessionSnapshot {
        self.inner.ctx.snapshot()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.ctx.subscribe()
    }

    /// Start the session, unless one is live or being built.
    ///
    /// Returns a snapshot taken once the first event lands or the settle
    /// delay passes. It is not a completion signal.
    pub async fn start(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let mut changes = {
            let mut state = inner.ctx.lock().await;

            if state.status == ConnectionStatus::Connected || state.status.is_pending() {
                tracing::debug!(status = %state.status, "start ignored, session already active");
                return state.snapshot();
            }

            let status = state.status;
            inner.ctx.transition(&mut state, status, None);

            if let Err(e) = inner.store.ensure_root().await {
                tracing::error!("Failed to create credential root: {e}");
            }
            let credentials = match inner.store.load().await {
                Ok(creds) => creds,
                Err(e) => {
                    tracing::error!("Failed to load credentials, pairing afresh: {e}");
                    None
                }
            };

            let limit = inner.config.remote_timeout;
            let version = match timeout(limit, inner.protocol.latest_version()).await {
                Ok(Ok(v)) => {
                    tracing::info!(%v, "using protocol version");
                    Some(v)
                }
                Ok(Err(e)) => {
                    tracing::warn!("Protocol version lookup failed, using default: {e}");
                    None
                }
                Err(_) => {
                    tracing::warn!(?limit, "Protocol version lookup timed out, using default");
                    None
                }
            };

            let options = ConnectOptions {
                session_id: inner.config.session_id.clone(),
                version,
            };
            let resumed = credentials.is_some();
            let connection = match timeout(limit, inner.protocol.connect(credentials, options)).await {
                Ok(Ok(c)) => c,
                Ok(Err(e)) => {
                    tracing::error!("Failed to open transport: {e}");
                    inner.ctx.transition(&mut state, ConnectionStatus::Error, None);
                    return state.snapshot();
                }
                Err(_) => {
                    tracing::error!(?limit, "Timed out opening transport");
                    inner.ctx.transition(&mut state, ConnectionStatus::Error, None);
                    return state.snapshot();
                }
            };

            let id = Uuid::new_v4();
            let events_task = tokio::spawn(run_event_loop(
                Arc::clone(&self.inner),
                id,
                connection.events,
            ));
            SessionContext::install(
                &mut state,
                SessionHandle {
                    id,
                    transport: connection.transport,
                    events_task: Some(events_task),
                },
            );
            inner.ctx.transition(&mut state, ConnectionStatus::Connecting, None);
            tracing::info!(handle = %id, resumed, "session transport created");

            inner.ctx.subscribe()
        };

        // Either outcome is fine; callers poll status afterwards.
        let _ = timeout(inner.config.settle_delay, changes.changed()).await;
        inner.ctx.snapshot()
    }

    /// Log out and reset local state.
    ///
    /// Always ends in `LoggedOut` with an empty credential root, even if the
    /// remote logout fails, stalls past `remote_timeout` or there is no
    /// transport.
    pub async fn logout(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let mut state = inner.ctx.lock().await;

        if let Some(handle) = SessionContext::release(&mut state) {
            let limit = inner.config.remote_timeout;
            match timeout(limit, handle.transport.logout()).await {
                Ok(Ok(())) => tracing::info!(handle = %handle.id, "remote logout complete"),
                Ok(Err(e)) => tracing::warn!(handle = %handle.id, "Remote logout failed: {e}"),
                Err(_) => tracing::warn!(handle = %handle.id, ?limit, "Remote logout timed out"),
            }
            handle.retire();
        }

        wipe_credentials(inner.store.as_ref()).await;
        inner.ctx.transition(&mut state, ConnectionStatus::LoggedOut, None);
        tracing::info!("session logged out");
        state.snapshot()
    }
}

async fn wipe_credentials(store: &dyn CredentialStore) {
    if let Err(e) = store.wipe().await {
        tracing::error!("Failed to wipe credentials: {e}");
    }
}

/// Drain one transport's events until it ends or is superseded.
async fn run_event_loop(
    inner: Arc<Inner>,
    id: Uuid,
    mut events: mpsc::UnboundedReceiver<ProtocolEvent>,
) {
    while let Some(event) = events.recv().await {
        let mut state = inner.ctx.lock().await;
        if state.generation != Some(id) {
            tracing::debug!(handle = %id, kind = event.kind(), "dropping event from superseded transport");
            break;
        }
        if state.closed && !matches!(event, ProtocolEvent::CredentialsUpdated(_)) {
            tracing::debug!(handle = %id, kind = event.kind(), "dropping event from closed transport");
            continue;
        }
        tracing::debug!(handle = %id, kind = event.kind(), "protocol event");
        handle_event(&inner, &mut state, event).await;
    }
    tracing::debug!(handle = %id, "event stream ended");
}

async fn handle_event(inner: &Inner, state: &mut SessionState, event: ProtocolEvent) {
    match event {
        ProtocolEvent::PairingCode(payload) => match inner.renderer.render(&payload) {
            Ok(artifact) => {
                inner.ctx.transition(state, ConnectionStatus::NeedsQr, Some(artifact));
                tracing::info!("pairing code ready to scan");
            }
            Err(e) => {
                tracing::error!("Failed to render pairing code: {e}");
                inner.ctx.transition(state, ConnectionStatus::Error, None);
            }
        },
        ProtocolEvent::ConnectionClosed(reason) => on_closed(inner, state, reason).await,
        ProtocolEvent::ConnectionOpened => {
            inner.ctx.transition(state, ConnectionStatus::Connected, None);
            tracing::info!("session connected");
        }
        ProtocolEvent::CredentialsUpdated(record) => persist(inner.store.as_ref(), &record).await,
    }
}

async fn on_closed(inner: &Inner, state: &mut SessionState, reason: DisconnectReason) {
    state.pairing_artifact = None;
    if reason.is_logged_out() {
        drop(SessionContext::release(state));
        wipe_credentials(inner.store.as_ref()).await;
        inner.ctx.transition(state, ConnectionStatus::LoggedOut, None);
        tracing::info!(code = reason.code(), "session revoked remotely, credentials wiped");
    } else {
        drop(SessionContext::close(state));
        inner.ctx.transition(state, ConnectionStatus::Disconnected, None);
        if reason == DisconnectReason::RestartRequired {
            tracing::info!(code = reason.code(), "transport asked for restart, awaiting start");
        } else {
            tracing::info!(code = reason.code(), ?reason, "connection closed");
        }
    }
}

async fn persist(store: &dyn CredentialStore, record: &CredentialRecord) {
    match store.save(record).await {
        Ok(()) => tracing::debug!("credentials persisted"),
        Err(e) => tracing::error!("Failed to persist credentials: {e}"),
    }
}
