//! Runtime configuration.
//!
//! Values are passed explicitly to constructors; nothing here is global.
//! Durations are (de)serialized as integer milliseconds.

use crate::error::{Result, SettlementError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Minimum age of a `PENDING` order before reconciliation may touch it.
    #[serde(with = "millis")]
    pub staleness_threshold: Duration,
    /// Time between reconciliation sweeps.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Deadline the orchestrator puts on a single `charge` call.
    #[serde(with = "millis")]
    pub charge_timeout: Duration,
    pub gateway: SimulatedGatewayConfig,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            charge_timeout: Duration::from_secs(1),
            gateway: SimulatedGatewayConfig::default(),
        }
    }
}

impl SettlementConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(SettlementError::Validation(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.charge_timeout.is_zero() {
            return Err(SettlementError::Validation(
                "charge_timeout must be greater than zero".to_string(),
            ));
        }
        self.gateway.validate()
    }
}

/// Knobs for the simulated gateway. Not used by real gateway clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedGatewayConfig {
    pub success_weight: u32,
    pub decline_weight: u32,
    pub timeout_weight: u32,
    /// Delay before a prompt success or decline.
    #[serde(with = "millis")]
    pub latency: Duration,
    /// How long an ambiguous charge hangs before reporting a transport error.
    #[serde(with = "millis")]
    pub timeout_latency: Duration,
}

impl Default for SimulatedGatewayConfig {
    fn default() -> Self {
        Self {
            success_weight: 70,
            decline_weight: 20,
            timeout_weight: 10,
            latency: Duration::from_millis(100),
            timeout_latency: Duration::from_secs(2),
        }
    }
}

impl SimulatedGatewayConfig {
    pub fn validate(&self) -> Result<()> {
        let total = u64::from(self.success_weight)
            + u64::from(self.decline_weight)
            + u64::from(self.timeout_weight);
        if total == 0 {
            return Err(SettlementError::Validation(
                "at least one gateway outcome weight must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        s.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
