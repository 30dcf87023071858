//! Controller configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use discord_api::DiscordConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted gap between ticks.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted deadline for one record's pass.
pub const MAX_OPERATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Configuration for the controller and its reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Directory holding the YAML manifests.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,

    /// Interval between reconciliation ticks.
    #[serde(with = "duration_secs", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Deadline for one record's pass.
    #[serde(with = "duration_secs", default = "default_operation_timeout")]
    pub operation_timeout: Duration,

    /// Records reconciled at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// First retry delay after a failed pass.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay cap.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Failed ticks in a row before the loop gives up.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: usize,

    /// Settings for the Discord clients built per record.
    #[serde(default)]
    pub discord: DiscordConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            manifest_dir: default_manifest_dir(),
            poll_interval: default_poll_interval(),
            operation_timeout: default_operation_timeout(),
            max_concurrent: default_max_concurrent(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            discord: DiscordConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load from a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e))?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?,
            _ => toml::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self {
            discord: DiscordConfig::from_env(),
            ..Self::default()
        };

        if let Ok(dir) = std::env::var("DISCORD_MANIFEST_DIR") {
            config.manifest_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_parse::<u64>("DISCORD_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("DISCORD_OPERATION_TIMEOUT_SECS") {
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("DISCORD_MAX_CONCURRENT") {
            config.max_concurrent = n;
        }

        config
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be positive"));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::invalid_config(format!(
                "poll_interval must be at most {}s",
                MAX_POLL_INTERVAL.as_secs()
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::invalid_config("operation_timeout must be positive"));
        }
        if self.operation_timeout > MAX_OPERATION_TIMEOUT {
            return Err(Error::invalid_config(format!(
                "operation_timeout must be at most {}s",
                MAX_OPERATION_TIMEOUT.as_secs()
            )));
        }
        if self.max_concurrent == 0 {
            return Err(Error::invalid_config("max_concurrent must be at least 1"));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(Error::invalid_config(
                "backoff_base_ms must not exceed backoff_max_ms",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("manifests")
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_concurrent() -> usize {
    4
}

const fn default_backoff_base_ms() -> u64 {
    1_000
}

const fn default_backoff_max_ms() -> u64 {
    300_000
}

const fn default_max_consecutive_errors() -> usize {
    10
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
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent, 4);
    }

    #[test]
    fn test_from_toml_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("controller.toml");
        std::fs::write(
            &path,
            r#"
manifest_dir = "/srv/discord"
poll_interval = 15
max_concurrent = 2

[discord]
base_url = "http://localhost:9000/api/"
max_retries = 5
"#,
        )?;

        let config = ControllerConfig::from_file(&path)?;

        assert_eq!(config.manifest_dir, PathBuf::from("/srv/discord"));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
        assert_eq!(config.discord.max_retries, 5);
        Ok(())
    }

    #[test]
    fn test_from_json_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("controller.json");
        std::fs::write(&path, r#"{"poll_interval": 5, "backoff_base_ms": 10}"#)?;

        let config = ControllerConfig::from_file(&path)?;

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.backoff_base_ms, 10);
        Ok(())
    }

    #[test]
    fn test_operation_timeout_bounds() {
        let zero = ControllerConfig {
            operation_timeout: Duration::ZERO,
            ..ControllerConfig::default()
        };
        let huge = ControllerConfig {
            operation_timeout: Duration::from_secs(u64::MAX),
            ..ControllerConfig::default()
        };
        let longest = ControllerConfig {
            operation_timeout: MAX_OPERATION_TIMEOUT,
            ..ControllerConfig::default()
        };

        assert!(matches!(zero.validate(), Err(Error::InvalidConfig { .. })));
        assert!(matches!(huge.validate(), Err(Error::InvalidConfig { .. })));
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_huge_timeout_in_file_is_rejected() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("controller.toml");
        std::fs::write(&path, format!("operation_timeout = {}\n", i64::MAX))?;

        let result = ControllerConfig::from_file(&path);

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        Ok(())
    }

    #[test]
    fn test_huge_poll_interval_is_rejected() {
        let config = ControllerConfig::default().poll_interval(Duration::from_secs(u64::MAX));
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_interval_is_rejected() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("controller.toml");
        std::fs::write(&path, "poll_interval = 0\n")?;

        let result = ControllerConfig::from_file(&path);

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = ControllerConfig::from_file(Path::new("/nonexistent/controller.toml"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }
}
