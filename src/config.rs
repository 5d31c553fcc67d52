use crate::domain::matching::MatchConfig;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Runtime settings. Every field has a default, so a config file only needs
/// to name what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Attempts after which a failing transaction needs an operator.
    pub max_attempts: u32,
    /// Deadline for a single workflow step.
    pub step_timeout_ms: u64,
    /// Upper bound on transactions processed at once.
    pub max_concurrency: usize,
    /// Commission values above this are percentages.
    pub commission_percent_threshold: Decimal,
    /// Used when a transaction names no underwriter.
    pub default_underwriter_id: Option<String>,
    pub matching: MatchConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step_timeout_ms: 30_000,
            max_concurrency: 8,
            commission_percent_threshold: Decimal::ONE,
            default_underwriter_id: None,
            matching: MatchConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
