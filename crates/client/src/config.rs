use crate::RetryPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;
use vdr_types::{VdrError, VdrResult};

const ENV_PREFIX: &str = "VDR";

/// Client settings, layered as defaults < optional file < `VDR_*` env vars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint_url: String,
    pub chain_id: u64,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8545/".to_string(),
            chain_id: 1337,
            request_timeout_ms: 10_000,
            retry_max_attempts: 5,
            retry_backoff_base_ms: 100,
            retry_backoff_max_ms: 5_000,
            pool_size: 4,
            poll_interval_ms: 250,
            confirmation_timeout_ms: 30_000,
        }
    }
}

/// Ledger node the client talks to. Shared read-only between clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEndpoint {
    pub url: Url,
    pub chain_id: u64,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> VdrResult<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load using a custom environment prefix.
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> VdrResult<Self> {
        let defaults = Config::try_from(&ClientConfig::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(env_prefix).try_parsing(true));

        let config: ClientConfig = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VdrResult<()> {
        if self.retry_max_attempts == 0 {
            return Err(VdrError::Config(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        if self.pool_size == 0 {
            return Err(VdrError::Config("pool_size must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 || self.poll_interval_ms == 0 {
            return Err(VdrError::Config(
                "request_timeout_ms and poll_interval_ms must be positive".into(),
            ));
        }
        if self.retry_backoff_base_ms > self.retry_backoff_max_ms {
            return Err(VdrError::Config(
                "retry_backoff_base_ms exceeds retry_backoff_max_ms".into(),
            ));
        }
        self.endpoint().map(|_| ())
    }

    pub fn endpoint(&self) -> VdrResult<LedgerEndpoint> {
        let url = Url::parse(&self.endpoint_url).map_err(|err| {
            VdrError::Config(format!("invalid endpoint_url `{}`: {err}", self.endpoint_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VdrError::Config(format!(
                "endpoint_url must be http(s), got `{}`",
                url.scheme()
            )));
        }
        Ok(LedgerEndpoint {
            url,
            chain_id: self.chain_id,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_backoff_base_ms),
            max_delay: Duration::from_millis(self.retry_backoff_max_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

fn config_error(err: config::ConfigError) -> VdrError {
    VdrError::Config(err.to_string())
}
