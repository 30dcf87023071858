//! Configuration for the Discord client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Default REST endpoint. The trailing slash matters for `Url::join`.
pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10/";

/// Configuration for the `DiscordClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for individual requests.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,

    /// How many times a rate-limited (429) request is retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl DiscordConfig {
    /// Create a config pointing at a different API root (tests, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Parse the base URL, making sure it ends with `/` so relative joins
    /// keep the version segment.
    pub fn api_root(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the rate-limit retry budget.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DISCORD_API_URL") {
            config.base_url = url;
        }

        if let Ok(secs) = std::env::var("DISCORD_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            crate::error::Error::config_error(format!("Failed to parse config: {e}"))
        })
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/lprior-repo/provider-discord, {})",
        env!("CARGO_PKG_VERSION")
    )
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscordConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("DiscordBot"));
    }

    #[test]
    fn test_api_root_gets_trailing_slash() -> Result<()> {
        let config = DiscordConfig::with_base_url("http://127.0.0.1:8080/api");
        assert_eq!(config.api_root()?.as_str(), "http://127.0.0.1:8080/api/");
        Ok(())
    }

    #[test]
    fn test_api_root_rejects_garbage() {
        let config = DiscordConfig::with_base_url("not a url");
        assert!(config.api_root().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = DiscordConfig::with_base_url("http://localhost/")
            .timeout(Duration::from_secs(5))
            .max_retries(0);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_from_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("discord.toml");
        std::fs::write(
            &path,
            "base_url = \"http://localhost:9000/api\"\ntimeout = 7\nmax_retries = 1\n",
        )?;

        let config = DiscordConfig::from_file(&path)?;
        assert_eq!(config.api_root()?.as_str(), "http://localhost:9000/api/");
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.max_retries, 1);
        Ok(())
    }
}
