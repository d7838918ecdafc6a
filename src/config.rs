use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::reconciler::{JobConfig, RetryPolicy};

const LEASE_TTL_TIMEOUT_FACTOR: u64 = 4;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Unset runs the reconciler against in-memory stores
    pub database_url: Option<String>,
    pub bind_address: String,
    pub poll_interval_ms: u64,
    pub balance_sweep_interval_ms: u64,
    pub batch_limit: i64,
    pub concurrency: usize,
    pub gateway_url: String,
    pub resolver_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub lease_ttl_ms: u64,
    pub job_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(config::Environment::default().try_parsing(true))
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        Self::load(
            config::Environment::default()
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn load(environment: config::Environment) -> Result<Self, config::ConfigError> {
        let settings: Config = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("poll_interval_ms", 30_000i64)?
            .set_default("balance_sweep_interval_ms", 60_000i64)?
            .set_default("batch_limit", 100i64)?
            .set_default("concurrency", 1i64)?
            .set_default("gateway_url", "http://localhost:8545")?
            .set_default("resolver_timeout_ms", 10_000i64)?
            .set_default("max_attempts", 20i64)?
            .set_default("backoff_base_ms", 30_000i64)?
            .set_default("backoff_max_ms", 3_600_000i64)?
            .set_default("lease_ttl_ms", 300_000i64)?
            .set_default("job_name", "transaction-reconciler")?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |message: &str| -> Result<(), config::ConfigError> {
            Err(config::ConfigError::Message(message.to_string()))
        };

        if self.poll_interval_ms == 0 {
            return invalid("POLL_INTERVAL_MS must be greater than zero");
        }
        if self.balance_sweep_interval_ms == 0 {
            return invalid("BALANCE_SWEEP_INTERVAL_MS must be greater than zero");
        }
        if self.batch_limit <= 0 {
            return invalid("BATCH_LIMIT must be greater than zero");
        }
        if self.concurrency == 0 {
            return invalid("CONCURRENCY must be greater than zero");
        }
        if self.max_attempts == 0 {
            return invalid("MAX_ATTEMPTS must be greater than zero");
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return invalid("BACKOFF_BASE_MS cannot exceed BACKOFF_MAX_MS");
        }
        // The lease is renewed after each transaction, so it must outlive the
        // slowest single one: a receipt lookup plus a balance fetch, with room
        // for the store writes around them.
        if self.lease_ttl_ms < self.resolver_timeout_ms.saturating_mul(LEASE_TTL_TIMEOUT_FACTOR) {
            return invalid("LEASE_TTL_MS must be at least 4x RESOLVER_TIMEOUT_MS");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.balance_sweep_interval_ms)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            job_name: self.job_name.clone(),
            batch_limit: self.batch_limit,
            concurrency: self.concurrency,
            lease_ttl: Duration::from_millis(self.lease_ttl_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(HashMap::new()).unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.batch_limit, 100);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.resolver_timeout(), Duration::from_secs(10));
        assert_eq!(config.job_config().lease_ttl, Duration::from_secs(300));
        assert_eq!(config.retry_policy().max_attempts, 20);
        assert_eq!(config.retry_policy().max_delay, Duration::from_secs(3600));
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/reconciler"),
            ("POLL_INTERVAL_MS", "5000"),
            ("BATCH_LIMIT", "25"),
            ("CONCURRENCY", "8"),
            ("JOB_NAME", "reconciler-eu"),
        ]))
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/reconciler")
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        let job = config.job_config();
        assert_eq!(job.batch_limit, 25);
        assert_eq!(job.concurrency, 8);
        assert_eq!(job.job_name, "reconciler-eu");
    }

    #[test]
    fn test_zero_values_are_rejected() {
        for key in [
            "POLL_INTERVAL_MS",
            "BALANCE_SWEEP_INTERVAL_MS",
            "BATCH_LIMIT",
            "CONCURRENCY",
            "MAX_ATTEMPTS",
        ] {
            let result = Config::from_vars(vars(&[(key, "0")]));
            assert!(result.is_err(), "{} = 0 should be rejected", key);
        }
    }

    #[test]
    fn test_non_numeric_interval_is_rejected() {
        assert!(Config::from_vars(vars(&[("POLL_INTERVAL_MS", "soon")])).is_err());
    }

    #[test]
    fn test_lease_ttl_must_cover_slowest_transaction() {
        // 4 x 10s default timeout = 40s minimum
        let result = Config::from_vars(vars(&[("LEASE_TTL_MS", "30000")]));
        assert!(result.is_err());

        let config = Config::from_vars(vars(&[("LEASE_TTL_MS", "40000")])).unwrap();
        assert_eq!(config.job_config().lease_ttl, Duration::from_secs(40));

        // A slower gateway raises the floor
        let result = Config::from_vars(vars(&[
            ("RESOLVER_TIMEOUT_MS", "120000"),
            ("LEASE_TTL_MS", "300000"),
        ]));
        assert!(result.is_err());
    }
}
