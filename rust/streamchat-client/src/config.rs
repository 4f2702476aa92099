//! Client endpoints and timeouts.
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST collaborator, without trailing slash.
    pub api_base_url: String,
    /// WebSocket URL of the realtime channel. The bearer token is appended
    /// as the `token` query parameter at connect time.
    pub socket_url: String,
    /// Timeout applied to each REST request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `STREAMCHAT_API_URL`, `STREAMCHAT_SOCKET_URL`
    /// and `STREAMCHAT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("STREAMCHAT_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("STREAMCHAT_SOCKET_URL") {
            config.socket_url = url;
        }
        if let Some(raw) = lookup("STREAMCHAT_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(e) => warn!(value=%raw, %e, "ignoring invalid STREAMCHAT_TIMEOUT_SECS"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STREAMCHAT_API_URL", "https://chat.example.com/api/"),
            ("STREAMCHAT_TIMEOUT_SECS", "3"),
        ]);
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "https://chat.example.com/api");
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        let config = ClientConfig::from_lookup(|k| (k == "STREAMCHAT_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
