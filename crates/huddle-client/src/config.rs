use std::time::Duration;

use anyhow::Context;
use uuid::Uuid;

use huddle_types::Identity;

use crate::fetcher::DEFAULT_FETCH_TIMEOUT;
use crate::scheduler::DEFAULT_POLL_INTERVAL;
use crate::session::SessionOptions;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Client settings, read from `HUDDLE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_id: None,
            display_name: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(value) => {
                    let ms: u64 = value
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be milliseconds, got {value:?}"))?;
                    anyhow::ensure!(ms > 0, "{key} must be greater than zero");
                    Ok(Duration::from_millis(ms))
                }
                None => Ok(default),
            }
        };

        let user_id = lookup("HUDDLE_USER_ID")
            .map(|value| {
                value
                    .trim()
                    .parse::<Uuid>()
                    .with_context(|| format!("HUDDLE_USER_ID is not a UUID: {value:?}"))
            })
            .transpose()?;

        Ok(Self {
            server_url: lookup("HUDDLE_SERVER_URL").unwrap_or(defaults.server_url),
            poll_interval: millis("HUDDLE_POLL_INTERVAL_MS", defaults.poll_interval)?,
            fetch_timeout: millis("HUDDLE_FETCH_TIMEOUT_MS", defaults.fetch_timeout)?,
            user_id,
            display_name: lookup("HUDDLE_DISPLAY_NAME")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
        }
    }

    /// The configured identity, with a fresh user id if none is set.
    pub fn identity(&self, display_name: &str) -> Identity {
        match self.user_id {
            Some(user_id) => Identity::new(user_id, display_name),
            None => Identity::generate(display_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ClientConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(config(&[]).unwrap(), ClientConfig::default());
        assert_eq!(ClientConfig::default().poll_interval, Duration::from_millis(2000));
    }

    #[test]
    fn reads_every_variable() {
        let user = Uuid::new_v4();
        let cfg = config(&[
            ("HUDDLE_SERVER_URL", "http://chat:4000"),
            ("HUDDLE_POLL_INTERVAL_MS", "500"),
            ("HUDDLE_FETCH_TIMEOUT_MS", "1500"),
            ("HUDDLE_USER_ID", &user.to_string()),
            ("HUDDLE_DISPLAY_NAME", " Alice "),
        ])
        .unwrap();

        assert_eq!(cfg.server_url, "http://chat:4000");
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.fetch_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.identity("Alice"), Identity::new(user, "Alice"));
        assert_eq!(cfg.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("HUDDLE_POLL_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[("HUDDLE_POLL_INTERVAL_MS", "0")]).is_err());
        assert!(config(&[("HUDDLE_USER_ID", "alice")]).is_err());
    }
}
