//! Configuration files.

use marketwatch_blocktime::{BlockCache, DiskBucketStore, StoreError, MAX_RESIDENT_BUCKETS};
use marketwatch_chain_state::ChainStateConfig;
use marketwatch_interfaces::{BackoffKind, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Configuration for the marketplace monitor.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Block timestamp cache.
    pub cache: BlockCacheConfig,
    /// Retries of ledger calls.
    pub rpc: RetryConfig,
    /// Background polling.
    pub monitor: MonitorConfig,
    /// Proving period observation.
    pub period: PeriodMonitorConfig,
}

impl Config {
    /// Loads the configuration from a TOML file, creating it with defaults if missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Stores the configuration as a TOML file.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), confy::ConfyError> {
        confy::store_path(path, self)
    }

    /// Settings of the chain state projection.
    pub fn chain_state(&self) -> ChainStateConfig {
        ChainStateConfig {
            retry: self.rpc.into(),
            period_monitoring: self.period.enabled,
            period_step: self.period.step,
        }
    }
}

/// Block timestamp cache configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct BlockCacheConfig {
    /// Directory of the bucket files. The cache is kept in memory only if unset.
    pub dir: Option<PathBuf>,
    /// Number of buckets kept in memory.
    pub max_resident_buckets: usize,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self { dir: None, max_resident_buckets: MAX_RESIDENT_BUCKETS }
    }
}

impl BlockCacheConfig {
    /// Opens the configured cache.
    pub fn open(&self) -> Result<BlockCache, StoreError> {
        let cache = match &self.dir {
            Some(dir) => BlockCache::new(DiskBucketStore::new(dir)?),
            None => BlockCache::in_memory(),
        };
        Ok(cache.with_max_resident_buckets(self.max_resident_buckets))
    }
}

/// Retry configuration of ledger calls.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub max_attempts: usize,
    /// Delay after the first failure.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Upper bound of the delay when backing off exponentially.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Double the delay after every failure.
    pub exponential: bool,
}

impl RetryConfig {
    /// Preset for liveness checks: one retry after a short pause.
    pub const fn fail_fast() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(500),
            exponential: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            exponential: false,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.delay,
            max_delay: config.max_delay.max(config.delay),
            backoff: if config.exponential { BackoffKind::Exponential } else { BackoffKind::Fixed },
        }
    }
}

/// Background polling configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between two updates.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How far before the start time the projection begins.
    #[serde(with = "humantime_serde")]
    pub start_offset: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(10), start_offset: Duration::ZERO }
    }
}

/// Proving period observation configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct PeriodMonitorConfig {
    /// Whether proving periods are followed.
    pub enabled: bool,
    /// Interval at which a period change is checked for.
    #[serde(with = "humantime_serde")]
    pub step: Duration,
}

impl Default for PeriodMonitorConfig {
    fn default() -> Self {
        Self { enabled: true, step: Duration::from_secs(10) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSION: &str = "toml";

    fn with_tempdir(filename: &str, proc: fn(&Path)) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join(filename).with_extension(EXTENSION);

        proc(&config_path);

        temp_dir.close().unwrap()
    }

    #[test]
    fn test_store_config() {
        with_tempdir("config-store-test", |config_path| {
            let config = Config::default();
            config.store(config_path).unwrap();
        })
    }

    #[test]
    fn test_load_config() {
        with_tempdir("config-load-test", |config_path| {
            let mut config = Config::default();
            config.cache.dir = Some(PathBuf::from("/var/cache/marketwatch"));
            config.rpc.exponential = true;
            config.store(config_path).unwrap();

            let loaded_config = Config::load(config_path).unwrap();
            assert_eq!(config, loaded_config);
        })
    }

    #[test]
    fn test_load_missing_config_creates_defaults() {
        with_tempdir("config-missing-test", |config_path| {
            let loaded_config = Config::load(config_path).unwrap();
            assert_eq!(loaded_config, Config::default());
            assert!(config_path.exists());
        })
    }

    #[test]
    fn durations_are_humantime() {
        let config: Config = toml::from_str(
            r#"
            [rpc]
            delay = "750ms"
            max_delay = "1m"

            [monitor]
            poll_interval = "30s"

            [period]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc.delay, Duration::from_millis(750));
        assert_eq!(config.rpc.max_delay, Duration::from_secs(60));
        assert_eq!(config.rpc.max_attempts, 5);
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(30));
        assert_eq!(config.monitor.start_offset, Duration::ZERO);
        assert!(!config.period.enabled);
        assert_eq!(config.period.step, Duration::from_secs(10));

        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("poll_interval = \"30s\""));
    }

    #[test]
    fn converts_to_runtime_types() {
        let policy: RetryPolicy = RetryConfig::default().into();
        assert_eq!(policy, RetryPolicy::default());

        let fail_fast: RetryPolicy = RetryConfig::fail_fast().into();
        assert_eq!(fail_fast, RetryPolicy::fail_fast());

        let exponential: RetryPolicy =
            RetryConfig { exponential: true, ..Default::default() }.into();
        assert_eq!(exponential.backoff, BackoffKind::Exponential);

        let mut config = Config::default();
        config.period.enabled = false;
        let chain_state = config.chain_state();
        assert!(!chain_state.period_monitoring);
        assert_eq!(chain_state.retry, RetryPolicy::default());
    }

    #[test]
    fn opens_disk_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = BlockCacheConfig {
            dir: Some(temp_dir.path().join("blocks")),
            max_resident_buckets: 3,
        };
        config.open().unwrap();
        assert!(temp_dir.path().join("blocks").is_dir());
        assert!(BlockCacheConfig::default().open().is_ok());
    }
}
