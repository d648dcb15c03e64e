//! Single and bulk message dispatch over the live session.

use std::sync::Arc;

use pairlink_core::{
    ConnectionStatus, PacingWindow, Recipient,
    traits::{ProtocolError, SessionTransport},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    pacing::{Pacer, RandomPacer},
    state::SessionContext,
};

/// Reason recorded for recipients that normalise to nothing.
pub const INVALID_RECIPIENT: &str = "invalid recipient";

/// Reason recorded when the session drops mid-broadcast.
pub const SESSION_NOT_CONNECTED: &str = "session not connected";

/// Dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Session not connected (status: {0})")]
    NotConnected(ConnectionStatus),
    #[error("Invalid input: {0}")]
    Validation(&'static str),
    #[error("Invalid recipient: {0:?}")]
    InvalidRecipient(String),
    #[error("Send to {recipient} failed: {source}")]
    SendFailed {
        recipient: Recipient,
        #[source]
        source: ProtocolError,
    },
}

/// Per-recipient outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Sent,
    Failed,
}

/// One entry of a broadcast result, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    /// Recipient as given by the caller.
    pub recipient: String,
    /// What happened.
    pub outcome: Outcome,
    /// Why it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RecipientOutcome {
    fn sent(recipient: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            outcome: Outcome::Sent,
            reason: None,
        }
    }

    fn failed(recipient: &str, reason: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            outcome: Outcome::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Result of a broadcast pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    pub sent_count: usize,
    pub failed_count: usize,
    pub results: Vec<RecipientOutcome>,
}

impl BroadcastReport {
    fn from_results(results: Vec<RecipientOutcome>) -> Self {
        let sent_count = results.iter().filter(|r| r.outcome == Outcome::Sent).count();
        Self {
            sent_count,
            failed_count: results.len() - sent_count,
            results,
        }
    }
}

/// Sends messages through the session's live transport.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    ctx: Arc<SessionContext>,
    pacer: Arc<dyn Pacer>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher with a custom pacer.
    #[must_use]
    pub fn new(ctx: Arc<SessionContext>, pacer: Arc<dyn Pacer>) -> Self {
        Self { ctx, pacer }
    }

    /// Create a dispatcher pausing for a random span of `window` between sends.
    #[must_use]
    pub fn with_pacing(ctx: Arc<SessionContext>, window: PacingWindow) -> Self {
        Self::new(ctx, Arc::new(RandomPacer::new(window)))
    }

    async fn transport(&self) -> Result<Arc<dyn SessionTransport>, DispatchError> {
        self.ctx
            .live_transport()
            .await
            .map_err(DispatchError::NotConnected)
    }

    /// Send one message. No retry.
    ///
    /// # Errors
    /// Returns error if the session is not connected, the input is empty,
    /// the recipient has no digits, or the transport rejects the send.
    pub async fn send_one(&self, recipient: &str, body: &str) -> Result<Recipient, DispatchError> {
        let transport = self.transport().await?;

        if recipient.trim().is_empty() {
            return Err(DispatchError::Validation("recipient is required"));
        }
        if body.trim().is_empty() {
            return Err(DispatchError::Validation("message is required"));
        }
        let to = Recipient::normalize(recipient)
            .ok_or_else(|| DispatchError::InvalidRecipient(recipient.to_string()))?;

        match transport.send_text(&to, body).await {
            Ok(()) => {
                tracing::info!(%to, "message sent");
                Ok(to)
            }
            Err(source) => {
                tracing::warn!(%to, "Send failed: {source}");
                Err(DispatchError::SendFailed { recipient: to, source })
            }
        }
    }

    /// Send `body` to every recipient, one at a time, in order.
    ///
    /// Failures are recorded per recipient and never stop the pass. The
    /// pacer runs after each attempted send, not after skipped recipients.
    ///
    /// # Errors
    /// Returns error if the session is not connected or the input is empty.
    pub async fn broadcast(
        &self,
        recipients: &[String],
        body: &str,
    ) -> Result<BroadcastReport, DispatchError> {
        self.transport().await?;

        if recipients.is_empty() {
            return Err(DispatchError::Validation("recipients must be a non-empty list"));
        }
        if body.trim().is_empty() {
            return Err(DispatchError::Validation("message is required"));
        }

        tracing::info!(count = recipients.len(), "broadcast started");
        let mut results = Vec::with_capacity(recipients.len());

        for raw in recipients {
            let Some(to) = Recipient::normalize(raw) else {
                tracing::debug!(recipient = %raw, "skipping invalid recipient");
                results.push(RecipientOutcome::failed(raw, INVALID_RECIPIENT));
                continue;
            };

            let transport = match self.ctx.live_transport().await {
                Ok(t) => t,
                Err(status) => {
                    tracing::warn!(%to, %status, "session dropped during broadcast");
                    results.push(RecipientOutcome::failed(raw, SESSION_NOT_CONNECTED));
                    continue;
                }
            };

            match transport.send_text(&to, body).await {
                Ok(()) => {
                    tracing::debug!(%to, "broadcast message sent");
                    results.push(RecipientOutcome::sent(raw));
                }
                Err(e) => {
                    tracing::warn!(%to, "Broadcast send failed: {e}");
                    results.push(RecipientOutcome::failed(raw, e.to_string()));
                }
            }

            self.pacer.pause().await;
        }

        let report = BroadcastReport::from_results(results);
        tracing::info!(
            sent = report.sent_count,
            failed = report.failed_count,
            "broadcast finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use pairlink_core::{
        DisconnectReason, ProtocolEvent, SessionConfig,
        loopback::{LoopbackProtocol, SentMessage},
    };

    use super::*;
    use crate::{ConnectionStateMachine, storage::MemoryCredentialStore};

    /// Records how many messages had been sent at each pause.
    struct RecordingPacer {
        proto: LoopbackProtocol,
        pauses: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self) {
            let sent = self.proto.sent().len();
            self.pauses.lock().unwrap().push(sent);
        }
    }

    async fn connected() -> (ConnectionStateMachine, LoopbackProtocol) {
        let proto = LoopbackProtocol::new();
        let m = ConnectionStateMachine::new(
            SessionConfig::new("/unused").with_settle_delay(Duration::from_millis(200)),
            Arc::new(proto.clone()),
            Arc::new(MemoryCredentialStore::new()),
        );
        m.start().await;
        assert!(proto.pair());
        let mut rx = m.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.status == ConnectionStatus::Connected),
        )
        .await
        .unwrap()
        .unwrap();
        (m, proto)
    }

    fn recording(proto: &LoopbackProtocol) -> Arc<RecordingPacer> {
        Arc::new(RecordingPacer {
            proto: proto.clone(),
            pauses: Mutex::new(Vec::new()),
        })
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_send_one_normalizes_recipient() {
        let (m, proto) = connected().await;
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        let to = dispatcher.send_one("+1 (555) 000-1111", "hello").await.unwrap();

        assert_eq!(to.as_str(), "15550001111");
        assert_eq!(
            proto.sent(),
            vec![SentMessage {
                to: "15550001111@s.whatsapp.net".to_string(),
                text: "hello".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_send_one_requires_connected() {
        let proto = LoopbackProtocol::new();
        let m = ConnectionStateMachine::new(
            SessionConfig::new("/unused").with_settle_delay(Duration::from_millis(200)),
            Arc::new(proto.clone()),
            Arc::new(MemoryCredentialStore::new()),
        );
        assert_eq!(m.start().await.status, ConnectionStatus::NeedsQr);
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        let err = dispatcher.send_one("5550001111", "hi").await.unwrap_err();

        assert!(matches!(err, DispatchError::NotConnected(ConnectionStatus::NeedsQr)));
        assert!(proto.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_one_validation() {
        let (m, proto) = connected().await;
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        assert!(matches!(
            dispatcher.send_one("", "hi").await,
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            dispatcher.send_one("5550001111", "  ").await,
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            dispatcher.send_one("abc", "hi").await,
            Err(DispatchError::InvalidRecipient(_))
        ));
        assert!(proto.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_one_surfaces_transport_failure() {
        let (m, proto) = connected().await;
        proto.fail_sends_to("5550001111");
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        let err = dispatcher.send_one("555-000-1111", "hi").await.unwrap_err();

        match err {
            DispatchError::SendFailed { recipient, source } => {
                assert_eq!(recipient.as_str(), "5550001111");
                assert!(matches!(source, ProtocolError::Send(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_mixed_recipients() {
        let (m, proto) = connected().await;
        let pacer = recording(&proto);
        let dispatcher = BroadcastDispatcher::new(m.context(), pacer.clone());

        let report = dispatcher
            .broadcast(&strings(&["+1 (555) 000-1111", "abc", "5550002222"]), "hi")
            .await
            .unwrap();

        assert_eq!(report.sent_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(
            report.results,
            vec![
                RecipientOutcome::sent("+1 (555) 000-1111"),
                RecipientOutcome::failed("abc", INVALID_RECIPIENT),
                RecipientOutcome::sent("5550002222"),
            ]
        );
        // One pause after each attempted send; none for the skipped entry.
        assert_eq!(*pacer.pauses.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failures() {
        let (m, proto) = connected().await;
        proto.fail_sends_to("222");
        let pacer = recording(&proto);
        let dispatcher = BroadcastDispatcher::new(m.context(), pacer.clone());

        let report = dispatcher
            .broadcast(&strings(&["111", "222", "333"]), "hi")
            .await
            .unwrap();

        assert_eq!(report.sent_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.results[1].outcome, Outcome::Failed);
        assert!(report.results[1].reason.as_deref().unwrap().contains("rejected"));
        let sent: Vec<_> = proto.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(sent, vec!["111@s.whatsapp.net", "333@s.whatsapp.net"]);
        assert_eq!(pacer.pauses.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_broadcast_rejects_empty_input() {
        let (m, proto) = connected().await;
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        assert!(matches!(
            dispatcher.broadcast(&[], "hi").await,
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            dispatcher.broadcast(&strings(&["111"]), "").await,
            Err(DispatchError::Validation(_))
        ));
        assert!(proto.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_requires_connected() {
        let (m, proto) = connected().await;
        m.logout().await;
        let dispatcher = BroadcastDispatcher::with_pacing(m.context(), PacingWindow::none());

        let err = dispatcher.broadcast(&strings(&["111"]), "hi").await.unwrap_err();

        assert!(matches!(err, DispatchError::NotConnected(ConnectionStatus::LoggedOut)));
        assert!(proto.sent().is_empty());
    }

    /// Drops the connection on its first pause.
    struct DroppingPacer {
        proto: LoopbackProtocol,
        ctx: Arc<SessionContext>,
    }

    #[async_trait]
    impl Pacer for DroppingPacer {
        async fn pause(&self) {
            if self.ctx.status() == ConnectionStatus::Connected {
                self.proto
                    .emit(ProtocolEvent::ConnectionClosed(DisconnectReason::ConnectionLost));
                let mut rx = self.ctx.subscribe();
                while rx.borrow_and_update().status != ConnectionStatus::Disconnected {
                    rx.changed().await.unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_records_drop_mid_pass() {
        let (m, proto) = connected().await;
        let pacer = Arc::new(DroppingPacer {
            proto: proto.clone(),
            ctx: m.context(),
        });
        let dispatcher = BroadcastDispatcher::new(m.context(), pacer);

        let report = dispatcher
            .broadcast(&strings(&["111", "222", "333"]), "hi")
            .await
            .unwrap();

        assert_eq!(report.sent_count, 1);
        assert_eq!(report.failed_count, 2);
        assert_eq!(
            report.results[2],
            RecipientOutcome::failed("333", SESSION_NOT_CONNECTED)
        );
        assert_eq!(proto.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_report_serializes_camel_case() {
        let report = BroadcastReport::from_results(vec![
            RecipientOutcome::sent("1"),
            RecipientOutcome::failed("x", INVALID_RECIPIENT),
        ]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sentCount": 1,
                "failedCount": 1,
                "results": [
                    { "recipient": "1", "outcome": "sent" },
                    { "recipient": "x", "outcome": "failed", "reason": "invalid recipient" },
                ],
            })
        );
    }
}
