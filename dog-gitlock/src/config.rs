use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{LockError, LockResult};

/// Prefix for environment overrides, e.g. `DOG_GITLOCK__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "DOG_GITLOCK__";

/// Configuration for a lock manager.
///
/// A manager guards exactly one repository, identified by `lock_path`.
/// The configuration is fixed once the manager has been started.
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Lock artifact written by git while it mutates the index
    pub lock_path: PathBuf,
    /// Hard deadline for a single attempt
    pub operation_timeout: Duration,
    /// Total attempts per operation, including the first one
    pub max_attempts: u32,
    /// Lock artifacts older than this are considered orphaned
    pub orphan_lock_age: Duration,
    /// Period of the background orphan sweep
    pub sweep_interval: Duration,
    /// Backoff before the first retry
    pub base_backoff: Duration,
    /// Upper bound for the un-jittered backoff
    pub max_backoff: Duration,
    /// Relative jitter applied to every backoff (0.2 = ±20%)
    pub backoff_jitter: f64,
    /// Default deadline for a graceful shutdown
    pub shutdown_timeout: Duration,
    /// How often a graceful shutdown re-checks the queue
    pub shutdown_poll_interval: Duration,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from(".git").join("index.lock"),
            operation_timeout: Duration::from_secs(30),
            max_attempts: 3,
            orphan_lock_age: Duration::from_secs(300), // 5 minutes
            sweep_interval: Duration::from_secs(60),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            backoff_jitter: 0.2,
            shutdown_timeout: Duration::from_secs(30),
            shutdown_poll_interval: Duration::from_millis(100),
        }
    }
}

impl LockManagerConfig {
    /// Default configuration guarding `<repo>/.git/index.lock`
    pub fn for_repository(repo_path: impl AsRef<Path>) -> Self {
        Self {
            lock_path: repo_path.as_ref().join(".git").join("index.lock"),
            ..Self::default()
        }
    }

    pub fn with_lock_path(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = lock_path.into();
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_orphan_lock_age(mut self, age: Duration) -> Self {
        self.orphan_lock_age = age;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = jitter;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval = interval;
        self
    }

    /// Load configuration for `repo_path`, applying `DOG_GITLOCK__*` overrides
    pub fn from_env(repo_path: impl AsRef<Path>) -> LockResult<Self> {
        Self::from_lookup(repo_path, |key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Keys are the environment names without the prefix, e.g. `OPERATION_TIMEOUT_MS`.
    pub fn from_lookup<F>(repo_path: impl AsRef<Path>, lookup: F) -> LockResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));
        let mut config = Self::for_repository(repo_path);

        if let Some(path) = get("LOCK_PATH") {
            config.lock_path = PathBuf::from(path);
        }
        if let Some(ms) = parse_opt::<u64>(&get, "OPERATION_TIMEOUT_MS")? {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_opt::<u32>(&get, "MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }
        if let Some(ms) = parse_opt::<u64>(&get, "ORPHAN_LOCK_AGE_MS")? {
            config.orphan_lock_age = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt::<u64>(&get, "SWEEP_INTERVAL_MS")? {
            config.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt::<u64>(&get, "BASE_BACKOFF_MS")? {
            config.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt::<u64>(&get, "MAX_BACKOFF_MS")? {
            config.max_backoff = Duration::from_millis(ms);
        }
        if let Some(jitter) = parse_opt::<f64>(&get, "BACKOFF_JITTER")? {
            config.backoff_jitter = jitter;
        }
        if let Some(ms) = parse_opt::<u64>(&get, "SHUTDOWN_TIMEOUT_MS")? {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt::<u64>(&get, "SHUTDOWN_POLL_INTERVAL_MS")? {
            config.shutdown_poll_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the manager cannot honour
    pub fn validate(&self) -> LockResult<()> {
        if self.max_attempts == 0 {
            return Err(LockError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("operation_timeout", self.operation_timeout),
            ("sweep_interval", self.sweep_interval),
            ("shutdown_poll_interval", self.shutdown_poll_interval),
        ] {
            if value.is_zero() {
                return Err(LockError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.base_backoff > self.max_backoff {
            return Err(LockError::InvalidConfig(format!(
                "base_backoff ({:?}) exceeds max_backoff ({:?})",
                self.base_backoff, self.max_backoff
            )));
        }
        if !(0.0..1.0).contains(&self.backoff_jitter) {
            return Err(LockError::InvalidConfig(format!(
                "backoff_jitter must be within [0, 1), got {}",
                self.backoff_jitter
            )));
        }
        Ok(())
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> LockResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            LockError::InvalidConfig(format!("{ENV_PREFIX}{key}={raw:?}: {e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_git_conventions() {
        let config = LockManagerConfig::for_repository("/config");
        assert_eq!(config.lock_path, PathBuf::from("/config/.git/index.lock"));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.orphan_lock_age, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.base_backoff, Duration::from_millis(1000));
        assert_eq!(config.max_backoff, Duration::from_millis(10000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = LockManagerConfig::from_lookup(
            "/config",
            lookup(&[("MAX_ATTEMPTS", "5"), ("OPERATION_TIMEOUT_MS", "2500")]),
        )
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.operation_timeout, Duration::from_millis(2500));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn unparseable_values_are_rejected() {
        let err = LockManagerConfig::from_lookup("/config", lookup(&[("MAX_ATTEMPTS", "three")]))
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidConfig(msg) if msg.contains("MAX_ATTEMPTS")));
    }

    #[test]
    fn validation_catches_impossible_settings() {
        let base = LockManagerConfig::default();
        assert!(base.clone().with_max_attempts(0).validate().is_err());
        assert!(base
            .clone()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(base.clone().with_backoff_jitter(1.5).validate().is_err());
        assert!(base.with_operation_timeout(Duration::ZERO).validate().is_err());
    }
}
