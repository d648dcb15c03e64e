//! Environment configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use pairlink_core::{PacingWindow, SessionConfig, config::DEFAULT_SESSION_ID};

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind: SocketAddr,
    /// Session settings.
    pub session: SessionConfig,
    /// Delay before the loopback protocol pretends the pairing code was scanned.
    pub auto_pair: Option<Duration>,
}

impl ServerConfig {
    /// Read settings from `PAIRLINK_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is set but malformed.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`.
    ///
    /// # Errors
    /// Returns error if a value is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind = lookup("PAIRLINK_BIND")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .context("PAIRLINK_BIND must be host:port")?;

        let auth_root =
            PathBuf::from(lookup("PAIRLINK_AUTH_ROOT").unwrap_or_else(|| "./auth_info".to_string()));
        let session_id =
            lookup("PAIRLINK_SESSION_ID").unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
        if session_id.is_empty() || session_id.contains(['/', '\\']) || session_id == ".." {
            bail!("PAIRLINK_SESSION_ID must be a plain directory name");
        }

        let mut session = SessionConfig::new(auth_root).with_session_id(session_id);

        if let Some(ms) = millis(&lookup, "PAIRLINK_SETTLE_MS")? {
            session = session.with_settle_delay(ms);
        }

        if let Some(ms) = millis(&lookup, "PAIRLINK_REMOTE_TIMEOUT_MS")? {
            session = session.with_remote_timeout(ms);
        }

        let defaults = PacingWindow::default();
        let min = millis(&lookup, "PAIRLINK_PACING_MIN_MS")?.unwrap_or(defaults.min);
        let max = millis(&lookup, "PAIRLINK_PACING_MAX_MS")?.unwrap_or(defaults.max);
        if min > max {
            bail!("PAIRLINK_PACING_MIN_MS must not exceed PAIRLINK_PACING_MAX_MS");
        }
        session = session.with_pacing(PacingWindow::new(min, max));

        let auto_pair = match lookup("PAIRLINK_LOOPBACK_AUTO_PAIR_SECS") {
            None => Some(Duration::from_secs(10)),
            Some(v) if v == "off" => None,
            Some(v) => Some(Duration::from_secs(
                v.parse::<u64>()
                    .with_context(|| format!("PAIRLINK_LOOPBACK_AUTO_PAIR_SECS: invalid value {v:?}"))?,
            )),
        };

        Ok(Self {
            bind,
            session,
            auto_pair,
        })
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<Duration>> {
    lookup(key)
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("{key}: invalid value {v:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.session.session_dir(), PathBuf::from("./auth_info/default"));
        assert_eq!(cfg.session.pacing, PacingWindow::default());
        assert_eq!(cfg.auto_pair, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_overrides() {
        let cfg = ServerConfig::from_lookup(lookup(&[
            ("PAIRLINK_BIND", "0.0.0.0:8080"),
            ("PAIRLINK_AUTH_ROOT", "/data/auth"),
            ("PAIRLINK_SESSION_ID", "shop"),
            ("PAIRLINK_SETTLE_MS", "100"),
            ("PAIRLINK_REMOTE_TIMEOUT_MS", "750"),
            ("PAIRLINK_PACING_MIN_MS", "10"),
            ("PAIRLINK_PACING_MAX_MS", "20"),
            ("PAIRLINK_LOOPBACK_AUTO_PAIR_SECS", "off"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.session.session_dir(), PathBuf::from("/data/auth/shop"));
        assert_eq!(cfg.session.settle_delay, Duration::from_millis(100));
        assert_eq!(cfg.session.remote_timeout, Duration::from_millis(750));
        assert_eq!(
            cfg.session.pacing,
            PacingWindow::new(Duration::from_millis(10), Duration::from_millis(20))
        );
        assert_eq!(cfg.auto_pair, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("PAIRLINK_SETTLE_MS", "soon")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PAIRLINK_BIND", "nowhere")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PAIRLINK_SESSION_ID", "../etc")])).is_err());
        assert!(
            ServerConfig::from_lookup(lookup(&[
                ("PAIRLINK_PACING_MIN_MS", "5000"),
                ("PAIRLINK_PACING_MAX_MS", "100"),
            ]))
            .is_err()
        );
    }
}
