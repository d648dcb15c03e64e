//! Events delivered by the protocol capability's event stream.

use serde::{Deserialize, Serialize};

use crate::CredentialRecord;

/// Why a transport closed.
///
/// Codes follow the protocol's close-status numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Session revoked; credentials are no longer valid.
    LoggedOut,
    /// The remote asked for a fresh connection.
    RestartRequired,
    /// Closed without a more specific reason.
    ConnectionClosed,
    /// Connection lost or timed out.
    ConnectionLost,
    /// Another client took over this session.
    ConnectionReplaced,
    /// Stored session material was rejected.
    BadSession,
    /// Multi-device protocol mismatch.
    MultideviceMismatch,
    /// Access forbidden.
    Forbidden,
    /// Service unavailable.
    Unavailable,
    /// Any code not listed above.
    Other(u16),
}

impl DisconnectReason {
    /// Classify a numeric close code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            515 => Self::RestartRequired,
            428 => Self::ConnectionClosed,
            408 => Self::ConnectionLost,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            411 => Self::MultideviceMismatch,
            403 => Self::Forbidden,
            503 => Self::Unavailable,
            other => Self::Other(other),
        }
    }

    /// Numeric close code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::LoggedOut => 401,
            Self::RestartRequired => 515,
            Self::ConnectionClosed => 428,
            Self::ConnectionLost => 408,
            Self::ConnectionReplaced => 440,
            Self::BadSession => 500,
            Self::MultideviceMismatch => 411,
            Self::Forbidden => 403,
            Self::Unavailable => 503,
            Self::Other(code) => code,
        }
    }

    /// Whether this close is terminal and must wipe stored credentials.
    #[must_use]
    pub const fn is_logged_out(self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// One event from a transport's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// A fresh pairing payload to be rendered and scanned.
    PairingCode(String),
    /// The transport closed.
    ConnectionClosed(DisconnectReason),
    /// The transport is live.
    ConnectionOpened,
    /// Credential material changed and must be persisted.
    CredentialsUpdated(CredentialRecord),
}

impl ProtocolEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PairingCode(_) => "pairing_code",
            Self::ConnectionClosed(_) => "connection_closed",
            Self::ConnectionOpened => "connection_opened",
            Self::CredentialsUpdated(_) => "credentials_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_classify() {
        assert_eq!(DisconnectReason::from_code(401), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::from_code(515), DisconnectReason::RestartRequired);
        assert_eq!(DisconnectReason::from_code(440), DisconnectReason::ConnectionReplaced);
        assert!(DisconnectReason::from_code(401).is_logged_out());
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let reason = DisconnectReason::from_code(999);
        assert_eq!(reason, DisconnectReason::Other(999));
        assert_eq!(reason.code(), 999);
        assert!(!reason.is_logged_out());
    }
}
