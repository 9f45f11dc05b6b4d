//! Client configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `SWIFTMEAL_*` environment variables (nested keys use
//! `__`, e.g. `SWIFTMEAL_PAYMENT_POLL__MAX_ATTEMPTS`).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default API location, matching the development backend
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api/v1";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to
    pub api_url: String,

    /// Per-request timeout in seconds (0 disables it)
    pub timeout_secs: u64,

    /// Overrides the default user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Where the fallback redirect sends the user on forced logout
    pub login_path: String,

    /// Polling schedule for payment confirmation
    pub payment_poll: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            user_agent: None,
            login_path: "/login".to_string(),
            payment_poll: BackoffPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Environment variable prefix
    pub const ENV_PREFIX: &'static str = "SWIFTMEAL";

    /// Load defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, Self::environment())
    }

    /// `SWIFTMEAL_API_URL`, `SWIFTMEAL_PAYMENT_POLL__MAX_ATTEMPTS`, ...
    fn environment() -> Environment {
        // The prefix is joined with one underscore; `__` only nests keys.
        Environment::with_prefix(Self::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_from(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder.add_source(environment).build()?.try_deserialize()
    }

    /// Load defaults and the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Request timeout, if enabled
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay after a failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
