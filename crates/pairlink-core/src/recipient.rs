//! Recipient identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address suffix for individual accounts on the transport.
pub const USER_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// A normalised, digits-only recipient identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    /// Strip everything but ASCII digits.
    ///
    /// Returns `None` when nothing is left.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits))
        }
    }

    /// The digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full transport address, e.g. `15550001111@s.whatsapp.net`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}{USER_ADDRESS_SUFFIX}", self.0)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_formatting() {
        let r = Recipient::normalize("+1 (555) 000-1111").unwrap();
        assert_eq!(r.as_str(), "15550001111");
        assert_eq!(r.address(), "15550001111@s.whatsapp.net");
    }

    #[test]
    fn test_normalize_rejects_no_digits() {
        assert!(Recipient::normalize("abc").is_none());
        assert!(Recipient::normalize("").is_none());
        assert!(Recipient::normalize(" - ").is_none());
    }
}
