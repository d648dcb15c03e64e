//! In-process protocol capability.
//!
//! Stands in for the real messaging protocol in tests and local demos:
//! counts connects, records sends, and lets the owner inject events or
//! force failures. Clones share state, so a test can keep one handle
//! while the state machine owns another.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    CredentialRecord, DisconnectReason, ProtocolEvent, Recipient,
    traits::{
        ConnectOptions, Connection, ProtocolCapability, ProtocolError, ProtocolVersion,
        SessionTransport,
    },
};

/// Version the loopback advertises.
pub const LOOPBACK_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 1]);

/// A message accepted by a loopback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Full transport address.
    pub to: String,
    /// Message body.
    pub text: String,
}

#[derive(Default)]
struct Shared {
    connects: AtomicUsize,
    logouts: AtomicUsize,
    fail_version: AtomicBool,
    fail_logout: AtomicBool,
    stall_version: AtomicBool,
    stall_logout: AtomicBool,
    manual: AtomicBool,
    connect_delay: Mutex<Duration>,
    auto_pair: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<SentMessage>>,
    events: Mutex<Option<mpsc::UnboundedSender<ProtocolEvent>>>,
    last_options: Mutex<Option<ConnectOptions>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loopback protocol capability.
#[derive(Clone, Default)]
pub struct LoopbackProtocol {
    shared: Arc<Shared>,
}

impl LoopbackProtocol {
    /// Create a loopback that emits a pairing code (no credentials) or
    /// opens immediately (with credentials) on every connect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit nothing on connect; events come only from `emit`.
    #[must_use]
    pub fn manual(self) -> Self {
        self.shared.manual.store(true, Ordering::SeqCst);
        self
    }

    /// Delay every connect, to widen race windows.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *lock(&self.shared.connect_delay) = delay;
        self
    }

    /// Pretend a human scans the pairing code after `delay`.
    #[must_use]
    pub fn with_auto_pair(self, delay: Duration) -> Self {
        *lock(&self.shared.auto_pair) = Some(delay);
        self
    }

    /// Make `latest_version` fail.
    pub fn fail_version_lookup(&self, fail: bool) {
        self.shared.fail_version.store(fail, Ordering::SeqCst);
    }

    /// Make transport `logout` fail.
    pub fn fail_logout(&self, fail: bool) {
        self.shared.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Make `latest_version` never resolve.
    pub fn stall_version_lookup(&self, stall: bool) {
        self.shared.stall_version.store(stall, Ordering::SeqCst);
    }

    /// Make transport `logout` never resolve.
    pub fn stall_logout(&self, stall: bool) {
        self.shared.stall_logout.store(stall, Ordering::SeqCst);
    }

    /// Reject sends to the given digits-only recipient.
    pub fn fail_sends_to(&self, digits: &str) {
        lock(&self.shared.failing).insert(digits.to_string());
    }

    /// Push an event onto the current transport's stream.
    ///
    /// Returns false if no transport is listening.
    pub fn emit(&self, event: ProtocolEvent) -> bool {
        lock(&self.shared.events)
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Simulate a successful scan: new credentials, then connection open.
    pub fn pair(&self) -> bool {
        emit_pairing(&self.shared)
    }

    /// Number of `connect` calls so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of transport `logout` calls so far.
    #[must_use]
    pub fn logout_count(&self) -> usize {
        self.shared.logouts.load(Ordering::SeqCst)
    }

    /// Messages accepted so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.shared.sent).clone()
    }

    /// Options given to the most recent connect.
    #[must_use]
    pub fn last_options(&self) -> Option<ConnectOptions> {
        lock(&self.shared.last_options).clone()
    }
}

fn emit_pairing(shared: &Shared) -> bool {
    let guard = lock(&shared.events);
    let Some(tx) = guard.as_ref() else {
        return false;
    };
    let creds = CredentialRecord::new(json!({
        "me": { "id": format!("loopback-{}", uuid::Uuid::new_v4()) },
        "registered": true,
    }));
    tx.send(ProtocolEvent::CredentialsUpdated(creds)).is_ok()
        && tx.send(ProtocolEvent::ConnectionOpened).is_ok()
}

#[async_trait]
impl ProtocolCapability for LoopbackProtocol {
    async fn latest_version(&self) -> Result<ProtocolVersion, ProtocolError> {
        if self.shared.stall_version.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.shared.fail_version.load(Ordering::SeqCst) {
            return Err(ProtocolError::VersionLookup("loopback lookup disabled".to_string()));
        }
        Ok(LOOPBACK_VERSION)
    }

    async fn connect(
        &self,
        credentials: Option<CredentialRecord>,
        options: ConnectOptions,
    ) -> Result<Connection, ProtocolError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.shared.last_options) = Some(options);

        let delay = *lock(&self.shared.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !self.shared.manual.load(Ordering::SeqCst) {
            let first = if credentials.is_some() {
                ProtocolEvent::ConnectionOpened
            } else {
                ProtocolEvent::PairingCode(format!("2@{}", uuid::Uuid::new_v4().simple()))
            };
            let _ = tx.send(first);
        }
        // Replacing the sender ends the previous transport's stream.
        *lock(&self.shared.events) = Some(tx);

        let auto_pair = *lock(&self.shared.auto_pair);
        if let (None, Some(after)) = (credentials, auto_pair) {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if emit_pairing(&shared) {
                    tracing::info!("loopback: pairing code scanned");
                }
            });
        }

        Ok(Connection {
            transport: Arc::new(LoopbackTransport {
                shared: Arc::clone(&self.shared),
            }),
            events: rx,
        })
    }
}

struct LoopbackTransport {
    shared: Arc<Shared>,
}

#[async_trait]
impl SessionTransport for LoopbackTransport {
    async fn send_text(&self, to: &Recipient, text: &str) -> Result<(), ProtocolError> {
        if lock(&self.shared.failing).contains(to.as_str()) {
            return Err(ProtocolError::Send(format!("recipient {to} rejected")));
        }
        tracing::debug!(to = %to.address(), "loopback: message accepted");
        lock(&self.shared.sent).push(SentMessage {
            to: to.address(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.shared.logouts.fetch_add(1, Ordering::SeqCst);
        if self.shared.stall_logout.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.shared.fail_logout.load(Ordering::SeqCst) {
            return Err(ProtocolError::Logout("loopback logout disabled".to_string()));
        }
        if let Some(tx) = lock(&self.shared.events).as_ref() {
            let _ = tx.send(ProtocolEvent::ConnectionClosed(DisconnectReason::LoggedOut));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_connect_emits_pairing_code() {
        let proto = LoopbackProtocol::new();
        let mut conn = proto.connect(None, ConnectOptions::default()).await.unwrap();
        assert!(matches!(conn.events.recv().await, Some(ProtocolEvent::PairingCode(_))));
        assert_eq!(proto.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_resumed_connect_opens() {
        let proto = LoopbackProtocol::new();
        let creds = CredentialRecord::new(json!({ "registered": true }));
        let mut conn = proto
            .connect(Some(creds), ConnectOptions::default())
            .await
            .unwrap();
        assert_eq!(conn.events.recv().await, Some(ProtocolEvent::ConnectionOpened));
    }

    #[tokio::test]
    async fn test_new_connect_ends_previous_stream() {
        let proto = LoopbackProtocol::new().manual();
        let mut first = proto.connect(None, ConnectOptions::default()).await.unwrap();
        let _second = proto.connect(None, ConnectOptions::default()).await.unwrap();
        assert_eq!(first.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_records_and_rejects() {
        let proto = LoopbackProtocol::new().manual();
        proto.fail_sends_to("222");
        let conn = proto.connect(None, ConnectOptions::default()).await.unwrap();

        let ok = Recipient::normalize("111").unwrap();
        let bad = Recipient::normalize("222").unwrap();
        tokio_test::assert_ok!(conn.transport.send_text(&ok, "hi").await);
        tokio_test::assert_err!(conn.transport.send_text(&bad, "hi").await);

        assert_eq!(
            proto.sent(),
            vec![SentMessage {
                to: "111@s.whatsapp.net".to_string(),
                text: "hi".to_string(),
            }]
        );
    }
}
