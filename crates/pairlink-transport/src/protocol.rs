//! Wire types for the HTTP control surface.

use pairlink_core::{ConnectionStatus, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// Body of `POST /messages/send`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    /// Phone number in any formatting.
    #[serde(default, alias = "number")]
    pub recipient: Option<String>,
    /// Message text.
    #[serde(default, alias = "text")]
    pub message: Option<String>,
}

/// Body of `POST /messages/broadcast`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastRequest {
    /// Phone numbers in any formatting, processed in order.
    #[serde(default, alias = "numbers")]
    pub recipients: Option<Vec<String>>,
    /// Message text.
    #[serde(default, alias = "text")]
    pub message: Option<String>,
}

/// Response of `POST /messages/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    /// Normalised recipient.
    pub recipient: String,
}

/// Response of `POST /session/logout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub status: ConnectionStatus,
}

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// `not_connected`, `invalid_input` or `send_failed`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

/// Error response; always carries the session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
    pub session: SessionSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_accepts_aliases() {
        let req: SendRequest =
            serde_json::from_str(r#"{"number":"+1 555","text":"hi"}"#).unwrap();
        assert_eq!(req.recipient.as_deref(), Some("+1 555"));
        assert_eq!(req.message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let req: BroadcastRequest = serde_json::from_str("{}").unwrap();
        assert!(req.recipients.is_none());
        assert!(req.message.is_none());
    }
}
