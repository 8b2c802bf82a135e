use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Development ledger settings, layered as defaults < optional file <
/// `VDR_LEDGER_*` env vars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub listen_addr: String,
    pub chain_id: u64,
    /// Interval between produced blocks. Zero disables the producer so
    /// blocks are only mined on demand.
    pub block_time_ms: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8545".to_string(),
            chain_id: 1337,
            block_time_ms: 1_000,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&LedgerConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("VDR_LEDGER").try_parsing(true));
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .context("failed to load ledger configuration")
    }

    /// Loopback config with manual block production, for tests.
    pub fn ephemeral() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            block_time_ms: 0,
            ..Self::default()
        }
    }

    pub fn block_time(&self) -> Option<Duration> {
        (self.block_time_ms > 0).then(|| Duration::from_millis(self.block_time_ms))
    }
}
