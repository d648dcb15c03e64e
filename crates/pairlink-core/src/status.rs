//! Connection status as observed by callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection status of the single messaging session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No transport, or the last one closed recoverably.
    #[default]
    Disconnected,
    /// A transport is under construction.
    Connecting,
    /// Waiting for a human to scan the pairing code.
    NeedsQr,
    /// Live and able to send.
    Connected,
    /// Session revoked locally or remotely; credentials wiped.
    LoggedOut,
    /// The pairing code could not be rendered.
    Error,
}

impl ConnectionStatus {
    /// Whether a transport is being built right now.
    ///
    /// `start()` must not create a second transport while this holds.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::NeedsQr)
    }

    /// Wire name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::NeedsQr => "NEEDS_QR",
            Self::Connected => "CONNECTED",
            Self::LoggedOut => "LOGGED_OUT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the session: status plus the pairing artifact.
///
/// The artifact is only ever present while the status is `NeedsQr`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current status.
    pub status: ConnectionStatus,
    /// Rendered pairing code, if one is waiting to be scanned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_artifact: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot without a pairing artifact.
    #[must_use]
    pub const fn bare(status: ConnectionStatus) -> Self {
        Self {
            status,
            pairing_artifact: None,
        }
    }
}
