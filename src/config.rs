//! Configuration management for Floodgate.
//!
//! Every section has explicit defaults, so an empty file (or no file at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{LeakyBucket, Pacer, PacerConfig, Throttle, TokenBucket};

/// Prefix for environment variable overrides, e.g. `FLOODGATE__THROTTLE__LIMIT=4`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate limiters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Leaky bucket configuration
    #[serde(default)]
    pub leaky_bucket: LeakyBucketConfig,

    /// Token bucket configuration
    #[serde(default)]
    pub token_bucket: TokenBucketConfig,

    /// Fixed-window throttle configuration
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Pacer configuration
    #[serde(default)]
    pub pacer: PacerSettings,
}

/// Leaky bucket configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakyBucketConfig {
    /// Maximum outstanding requests
    #[serde(default = "default_leaky_capacity")]
    pub capacity: u64,

    /// Drain rate; zero disables draining
    #[serde(default = "default_leaky_rate")]
    pub requests_per_second: u32,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_leaky_capacity(),
            requests_per_second: default_leaky_rate(),
        }
    }
}

impl LeakyBucketConfig {
    /// Build a leaky bucket on the system clock.
    pub fn build(&self) -> Result<LeakyBucket> {
        LeakyBucket::new(self.capacity, self.requests_per_second)
    }
}

fn default_leaky_capacity() -> u64 {
    5
}

fn default_leaky_rate() -> u32 {
    2
}

/// Token bucket configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum stored tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: f64,

    /// Tokens added per second
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_rate: default_refill_rate(),
        }
    }
}

impl TokenBucketConfig {
    /// Build a token bucket on the system clock.
    pub fn build(&self) -> Result<TokenBucket> {
        TokenBucket::new(self.max_tokens, self.refill_rate)
    }
}

fn default_max_tokens() -> f64 {
    5.0
}

fn default_refill_rate() -> f64 {
    1.0
}

/// Fixed-window throttle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Callback invocations per second
    #[serde(default = "default_throttle_limit")]
    pub limit: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: default_throttle_limit(),
        }
    }
}

impl ThrottleConfig {
    /// Build a throttle around `task`. Must be called within a Tokio runtime.
    pub fn build<F>(&self, task: F) -> Result<Throttle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Throttle::new(self.limit, task)
    }
}

fn default_throttle_limit() -> u32 {
    1
}

/// Pacer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacerSettings {
    /// Requests per window
    #[serde(default = "default_pacer_rate")]
    pub rate: u32,

    /// Window length in milliseconds
    #[serde(default = "default_pacer_per_ms")]
    pub per_ms: u64,

    /// Requests that may be banked while idle
    #[serde(default = "default_pacer_slack")]
    pub slack: u32,
}

impl Default for PacerSettings {
    fn default() -> Self {
        Self {
            rate: default_pacer_rate(),
            per_ms: default_pacer_per_ms(),
            slack: default_pacer_slack(),
        }
    }
}

impl PacerSettings {
    /// Build a pacer on the system clock.
    pub fn build(&self) -> Result<Pacer> {
        let config = PacerConfig::default()
            .with_slack(self.slack)
            .per(Duration::from_millis(self.per_ms));
        Pacer::with_config(self.rate, config)
    }
}

fn default_pacer_rate() -> u32 {
    100
}

fn default_pacer_per_ms() -> u64 {
    1000
}

fn default_pacer_slack() -> u32 {
    crate::ratelimit::DEFAULT_SLACK
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// Later sources win. Environment variables use the `FLOODGATE` prefix and
    /// `__` between path segments.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .map_err(FloodgateError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FloodgateConfig::default();

        assert_eq!(config.leaky_bucket.capacity, 5);
        assert_eq!(config.leaky_bucket.requests_per_second, 2);
        assert_eq!(config.token_bucket.max_tokens, 5.0);
        assert_eq!(config.token_bucket.refill_rate, 1.0);
        assert_eq!(config.throttle.limit, 1);
        assert_eq!(config.pacer.rate, 100);
        assert_eq!(config.pacer.per_ms, 1000);
        assert_eq!(config.pacer.slack, 10);
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
leaky_bucket:
  capacity: 3
throttle:
  limit: 4
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.leaky_bucket.capacity, 3);
        assert_eq!(config.leaky_bucket.requests_per_second, 2);
        assert_eq!(config.throttle.limit, 4);
        assert_eq!(config.token_bucket, TokenBucketConfig::default());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = FloodgateConfig::from_yaml("{}").unwrap();
        assert_eq!(config, FloodgateConfig::default());
    }

    #[test]
    fn test_parse_invalid_config() {
        let yaml = r#"
leaky_bucket:
  capacity: -3
"#;
        assert!(matches!(
            FloodgateConfig::from_yaml(yaml),
            Err(FloodgateError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            FloodgateConfig::from_file("/nonexistent/floodgate.yaml"),
            Err(FloodgateError::Io(_))
        ));
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let path = std::env::temp_dir().join(format!("floodgate-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "token_bucket:\n  max_tokens: 12.5\npacer:\n  slack: 0").unwrap();

        let config = FloodgateConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.token_bucket.max_tokens, 12.5);
        assert_eq!(config.token_bucket.refill_rate, 1.0);
        assert_eq!(config.pacer.slack, 0);
        assert_eq!(config.pacer.rate, 100);
    }

    #[test]
    fn test_build_limiters_from_config() {
        let config = FloodgateConfig::default();

        let bucket = config.leaky_bucket.build().unwrap();
        assert_eq!(bucket.capacity(), 5);
        assert_eq!(bucket.leak_interval(), Some(Duration::from_millis(500)));

        let tokens = config.token_bucket.build().unwrap();
        assert_eq!(tokens.max_tokens(), 5.0);

        let pacer = config.pacer.build().unwrap();
        assert_eq!(pacer.per_request(), Duration::from_millis(10));
    }

    #[test]
    fn test_build_leaky_bucket_rejects_excessive_rate() {
        let config = LeakyBucketConfig {
            capacity: 5,
            requests_per_second: 2_000_000_000,
        };
        assert!(matches!(config.build(), Err(FloodgateError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_build_throttle_from_config() {
        let config = ThrottleConfig { limit: 4 };
        let throttle = config.build(|| {}).unwrap();
        assert_eq!(throttle.period(), Duration::from_millis(250));
    }
}
