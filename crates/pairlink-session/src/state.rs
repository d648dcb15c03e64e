//! Shared session state.
//!
//! `SessionContext` is the single owner of the connection status, the
//! pairing artifact and the live transport. Every mutation happens under
//! its mutex and is published to a `watch` channel, so readers never
//! contend with writers.

use std::sync::Arc;

use pairlink_core::{ConnectionStatus, SessionSnapshot, traits::SessionTransport};
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    task::JoinHandle,
};
use uuid::Uuid;

/// The live transport plus the task draining its event stream.
pub(crate) struct SessionHandle {
    pub(crate) id: Uuid,
    pub(crate) transport: Arc<dyn SessionTransport>,
    pub(crate) events_task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Stop listening to this transport's events.
    pub(crate) fn retire(mut self) {
        if let Some(task) = self.events_task.take() {
            task.abort();
        }
    }
}

/// Mutable session state, only reachable through `SessionContext::lock`.
pub(crate) struct SessionState {
    pub(crate) status: ConnectionStatus,
    pub(crate) pairing_artifact: Option<String>,
    pub(crate) handle: Option<SessionHandle>,
    /// Id of the transport whose events may still drive state.
    pub(crate) generation: Option<Uuid>,
    /// The current transport's stream reported a close; only credential
    /// updates from it are still honored.
    pub(crate) closed: bool,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            pairing_artifact: self.pairing_artifact.clone(),
        }
    }
}

/// Owned context shared by the state machine and the dispatcher.
pub struct SessionContext {
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Create a context in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            state: Mutex::new(SessionState {
                status: ConnectionStatus::Disconnected,
                pairing_artifact: None,
                handle: None,
                generation: None,
                closed: false,
            }),
            snapshots,
        }
    }

    /// Current status and pairing artifact.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.snapshots.borrow().status
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// The transport, if the session is connected right now.
    ///
    /// # Errors
    /// Returns the current status if it is not `Connected`.
    pub async fn live_transport(&self) -> Result<Arc<dyn SessionTransport>, ConnectionStatus> {
        let state = self.state.lock().await;
        match (&state.handle, state.status) {
            (Some(handle), ConnectionStatus::Connected) => Ok(Arc::clone(&handle.transport)),
            (_, status) => Err(status),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Set status and artifact together and publish the result.
    ///
    /// The artifact is dropped unless the new status is `NeedsQr`.
    pub(crate) fn transition(
        &self,
        state: &mut SessionState,
        status: ConnectionStatus,
        pairing_artifact: Option<String>,
    ) {
        state.status = status;
        state.pairing_artifact = if status == ConnectionStatus::NeedsQr {
            pairing_artifact
        } else {
            None
        };
        self.snapshots.send_replace(state.snapshot());
    }

    /// Install a new handle, retiring any previous one.
    pub(crate) fn install(state: &mut SessionState, handle: SessionHandle) {
        state.generation = Some(handle.id);
        state.closed = false;
        if let Some(old) = state.handle.replace(handle) {
            old.retire();
        }
    }

    /// Drop the handle and stop accepting events from it.
    pub(crate) fn release(state: &mut SessionState) -> Option<SessionHandle> {
        state.generation = None;
        state.closed = false;
        state.handle.take()
    }

    /// Drop the handle after a recoverable close.
    ///
    /// The generation is kept so late credential updates still land, but
    /// lifecycle events from that stream no longer drive state.
    pub(crate) fn close(state: &mut SessionState) -> Option<SessionHandle> {
        state.closed = true;
        state.handle.take()
    }
}
