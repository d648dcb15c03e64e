//! Core traits for the protocol capability, credential storage and rendering.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{ProtocolEvent, Recipient};

/// Durable credential material, opaque to everything but the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRecord(pub Value);

impl CredentialRecord {
    /// Wrap a credential blob.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the blob.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Protocol version triple, as advertised by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

/// Options passed to `ProtocolCapability::connect`.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Identity of the session being connected.
    pub session_id: String,
    /// Best-effort version hint; `None` lets the capability pick.
    pub version: Option<ProtocolVersion>,
}

/// Protocol capability error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Logout failed: {0}")]
    Logout(String),
    #[error("Version lookup failed: {0}")]
    VersionLookup(String),
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("Transport closed")]
    Closed,
}

/// A freshly connected transport and its event stream.
pub struct Connection {
    /// The live transport.
    pub transport: Arc<dyn SessionTransport>,
    /// Events emitted by this transport, in order.
    pub events: mpsc::UnboundedReceiver<ProtocolEvent>,
}

/// A single live transport to the messaging provider.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Send a text message to one recipient.
    async fn send_text(&self, to: &Recipient, text: &str) -> Result<(), ProtocolError>;

    /// Revoke the session on the remote side.
    ///
    /// Transports without a remote logout keep the default.
    async fn logout(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::Unsupported("logout"))
    }
}

/// The opaque messaging protocol: version lookup and connect.
#[async_trait]
pub trait ProtocolCapability: Send + Sync {
    /// Look up the latest protocol version. Callers treat failure as non-fatal.
    async fn latest_version(&self) -> Result<ProtocolVersion, ProtocolError>;

    /// Open a new transport bound to the given credentials.
    ///
    /// `None` credentials start a fresh pairing.
    async fn connect(
        &self,
        credentials: Option<CredentialRecord>,
        options: ConnectOptions,
    ) -> Result<Connection, ProtocolError>;
}

/// Credential store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt credential record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for credential storage backends.
///
/// Writes and wipes are serialised against each other by the implementation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create the storage root if it does not exist.
    async fn ensure_root(&self) -> Result<(), StoreError>;

    /// Read one entry.
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write one entry, replacing any previous value.
    async fn write(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Remove everything and recreate the root empty.
    async fn wipe(&self) -> Result<(), StoreError>;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> Result<bool, StoreError>;

    /// Load the session's credential record.
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.read(CREDS_KEY).await?.map(CredentialRecord))
    }

    /// Persist the session's credential record.
    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.write(CREDS_KEY, record.as_value()).await
    }
}

/// Key under which the main credential record lives.
pub const CREDS_KEY: &str = "creds";

/// Renderer error.
#[derive(Debug, Error)]
#[error("Render failed: {0}")]
pub struct RenderError(pub String);

/// Turns a pairing payload into something a human can scan.
pub trait PairingRenderer: Send + Sync {
    /// Render the payload.
    ///
    /// # Errors
    /// Returns error if the payload cannot be rendered.
    fn render(&self, payload: &str) -> Result<String, RenderError>;
}
