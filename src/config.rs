//! Configuration types for jobwatch

use crate::error::{Error, Result};
use crate::types::FeedKind;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Environment variable overriding [`ServerConfig::base_url`]
pub const ENV_API_URL: &str = "JOBWATCH_API_URL";
/// Environment variable overriding [`MaterializeConfig::download_dir`]
pub const ENV_DOWNLOAD_DIR: &str = "JOBWATCH_DOWNLOAD_DIR";
/// Environment variable overriding [`PollingConfig::per_page`]
pub const ENV_PER_PAGE: &str = "JOBWATCH_PER_PAGE";

/// Job service location and request settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Service origin; relative resource locators resolve against it (default: "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix of the JSON API (default: "/api")
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Timeout for ordinary requests (default: 30s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Feed polling settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Items per page requested from both feeds (default: 10)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Upper bound the service applies to `per_page` (default: 100)
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,

    /// Poll interval of the session-scoped feed (default: 5s)
    #[serde(default = "default_mine_interval", with = "duration_serde")]
    pub mine_interval: Duration,

    /// Poll interval of the global activity feed (default: 10s)
    #[serde(default = "default_global_interval", with = "duration_serde")]
    pub global_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_per_page: default_max_per_page(),
            mine_interval: default_mine_interval(),
            global_interval: default_global_interval(),
        }
    }
}

impl PollingConfig {
    /// Poll interval for a feed
    pub fn interval(&self, feed: FeedKind) -> Duration {
        match feed {
            FeedKind::Mine => self.mine_interval,
            FeedKind::Global => self.global_interval,
        }
    }

    /// Page size actually requested (clamped to `1..=max_per_page`)
    pub fn effective_per_page(&self) -> u32 {
        self.per_page.clamp(1, self.max_per_page.max(1))
    }
}

/// Cleanup signal settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Upper bound on a detached cleanup signal (default: 5s)
    #[serde(default = "default_signal_timeout", with = "duration_serde")]
    pub signal_timeout: Duration,

    /// Time given to detached signals after teardown before the process exits (default: 500ms)
    #[serde(default = "default_teardown_grace", with = "duration_millis_serde")]
    pub teardown_grace: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            signal_timeout: default_signal_timeout(),
            teardown_grace: default_teardown_grace(),
        }
    }
}

/// Local file save settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Directory saved files land in (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Name used when neither the response nor the caller supplies one (default: "download")
    #[serde(default = "default_file_name")]
    pub default_file_name: String,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            default_file_name: default_file_name(),
        }
    }
}

/// Main configuration for [`JobClient`](crate::JobClient)
///
/// - [`server`](ServerConfig) - service origin, API prefix, timeouts
/// - [`polling`](PollingConfig) - page size and per-feed intervals
/// - [`cleanup`](CleanupConfig) - cleanup signal bounds
/// - [`materialize`](MaterializeConfig) - local save directory and names
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Polling settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Cleanup settings
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Save settings
    #[serde(default)]
    pub materialize: MaterializeConfig,
}

impl Config {
    /// Defaults overlaid with `JOBWATCH_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_API_URL)
            && !url.trim().is_empty()
        {
            config.server.base_url = url.trim().to_string();
        }
        if let Ok(dir) = std::env::var(ENV_DOWNLOAD_DIR)
            && !dir.trim().is_empty()
        {
            config.materialize.download_dir = PathBuf::from(dir.trim());
        }
        if let Ok(per_page) = std::env::var(ENV_PER_PAGE) {
            config.polling.per_page = per_page.trim().parse().map_err(|_| Error::Config {
                message: format!("{} must be a positive integer, got {:?}", ENV_PER_PAGE, per_page),
                key: Some("per_page".to_string()),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        self.origin()?;

        if self.polling.per_page == 0 {
            return Err(Error::Config {
                message: "per_page must be at least 1".to_string(),
                key: Some("per_page".to_string()),
            });
        }
        if self.polling.mine_interval.is_zero() || self.polling.global_interval.is_zero() {
            return Err(Error::Config {
                message: "poll intervals must be non-zero".to_string(),
                key: Some("polling".to_string()),
            });
        }
        if self.materialize.default_file_name.trim().is_empty() {
            return Err(Error::Config {
                message: "default_file_name must not be empty".to_string(),
                key: Some("default_file_name".to_string()),
            });
        }
        Ok(())
    }

    /// Parsed service origin
    pub fn origin(&self) -> Result<Url> {
        let url = Url::parse(&self.server.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url {:?}: {}", self.server.base_url, e),
            key: Some("base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base_url must be http or https, got {}", url.scheme()),
                key: Some("base_url".to_string()),
            });
        }
        Ok(url)
    }

    /// Absolute URL of an API path such as `/downloads/my`
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let prefix = self.server.api_prefix.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = format!("{}/{}", prefix, path);
        self.origin()?
            .join(&joined)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", joined, e)))
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("jobwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_per_page() -> u32 {
    10
}

fn default_max_per_page() -> u32 {
    100
}

fn default_mine_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_global_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_signal_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_teardown_grace() -> Duration {
    Duration::from_millis(500)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_file_name() -> String {
    "download".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
