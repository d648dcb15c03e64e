//! Session configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Default session identity keying the credential directory.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Default wait after `start()` for the first event to land.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2500);

/// Default limit on a single remote call made while the session is locked.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Inclusive window an inter-send pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingWindow {
    /// Shortest pause.
    #[serde(with = "millis")]
    pub min: Duration,
    /// Longest pause.
    #[serde(with = "millis")]
    pub max: Duration,
}

impl PacingWindow {
    /// Create a window; the bounds are swapped if given backwards.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A window that never pauses.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

impl Default for PacingWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1500),
            max: Duration::from_millis(3500),
        }
    }
}

/// Settings for the single session this process manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root directory under which credential material is stored.
    pub auth_root: PathBuf,

    /// Identity of the session; names its directory under `auth_root`.
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// How long `start()` waits for the first event before returning.
    #[serde(default = "default_settle_delay", with = "millis")]
    pub settle_delay: Duration,

    /// Pause window between broadcast sends.
    #[serde(default)]
    pub pacing: PacingWindow,

    /// Limit on version lookup, connect and remote logout.
    #[serde(default = "default_remote_timeout", with = "millis")]
    pub remote_timeout: Duration,
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

const fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

const fn default_remote_timeout() -> Duration {
    DEFAULT_REMOTE_TIMEOUT
}

impl SessionConfig {
    /// Create a config with defaults for everything but the storage root.
    #[must_use]
    pub fn new(auth_root: impl Into<PathBuf>) -> Self {
        Self {
            auth_root: auth_root.into(),
            session_id: default_session_id(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            pacing: PacingWindow::default(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Override the session identity.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Override the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Override the pacing window.
    #[must_use]
    pub const fn with_pacing(mut self, pacing: PacingWindow) -> Self {
        self.pacing = pacing;
        self
    }

    /// Override the remote call limit.
    #[must_use]
    pub const fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    /// Directory holding this session's credential material.
    #[must_use]
    pub fn session_dir(&self) -> PathBuf {
        self.auth_root.join(&self.session_id)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dir_joins_identity() {
        let cfg = SessionConfig::new("/tmp/auth").with_session_id("shop");
        assert_eq!(cfg.session_dir(), PathBuf::from("/tmp/auth/shop"));
    }

    #[test]
    fn test_pacing_window_orders_bounds() {
        let w = PacingWindow::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(w.min, Duration::from_secs(1));
        assert_eq!(w.max, Duration::from_secs(3));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: SessionConfig =
            serde_json::from_value(serde_json::json!({ "auth_root": "/var/lib/pairlink" })).unwrap();
        assert_eq!(cfg.session_id, DEFAULT_SESSION_ID);
        assert_eq!(cfg.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(cfg.pacing, PacingWindow::default());
        assert_eq!(cfg.remote_timeout, DEFAULT_REMOTE_TIMEOUT);
    }

    #[test]
    fn test_remote_timeout_reads_millis() {
        let cfg: SessionConfig = serde_json::from_value(serde_json::json!({
            "auth_root": "/var/lib/pairlink",
            "remote_timeout": 250,
        }))
        .unwrap();
        assert_eq!(cfg.remote_timeout, Duration::from_millis(250));
    }
}
