use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::decimal::Rate;
use crate::errors::{BillingError, Result};
use crate::types::SettlementPolicy;

/// default flat interest charged over the life of a loan
pub const DEFAULT_INTEREST_RATE: Rate = Rate::from_decimal(dec!(0.10));
/// default loan duration in weeks
pub const DEFAULT_DURATION_WEEKS: u32 = 50;
/// longest loan the engine will schedule, ten years of weeks
pub const MAX_DURATION_WEEKS: u32 = 520;
/// default currency minor unit (cents)
pub const DEFAULT_MINOR_UNIT_SCALE: u32 = 2;

/// engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub terms: LoanTerms,
    #[serde(default)]
    pub payments: PaymentConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

/// terms applied to every originated loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoanTerms {
    #[serde(default = "default_interest_rate")]
    pub interest_rate: Rate,
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: u32,
    /// decimal places of the currency minor unit
    #[serde(default = "default_minor_unit_scale")]
    pub minor_unit_scale: u32,
}

/// payment allocation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    #[serde(default)]
    pub settlement_policy: SettlementPolicy,
    /// `None` waits for the per-loan lock indefinitely
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: Option<u64>,
    /// idle per-loan locks are pruned once the registry reaches this size
    #[serde(default = "default_lock_registry_capacity")]
    pub lock_registry_capacity: usize,
}

/// in-process event journal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalConfig {
    /// oldest events are dropped once the undrained journal holds this many
    #[serde(default = "default_journal_capacity")]
    pub capacity: usize,
}

impl Default for LoanTerms {
    fn default() -> Self {
        LoanTerms {
            interest_rate: default_interest_rate(),
            duration_weeks: default_duration_weeks(),
            minor_unit_scale: default_minor_unit_scale(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        PaymentConfig {
            settlement_policy: SettlementPolicy::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_registry_capacity: default_lock_registry_capacity(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            capacity: default_journal_capacity(),
        }
    }
}

impl PaymentConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

impl EngineConfig {
    /// parse from json, applying defaults for missing fields
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| BillingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.terms.duration_weeks == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "duration_weeks must be at least 1".to_string(),
            });
        }
        if self.terms.duration_weeks > MAX_DURATION_WEEKS {
            return Err(BillingError::InvalidConfiguration {
                message: format!(
                    "duration_weeks cannot exceed {}: {}",
                    MAX_DURATION_WEEKS, self.terms.duration_weeks
                ),
            });
        }
        if self.terms.interest_rate < Rate::ZERO {
            return Err(BillingError::InvalidConfiguration {
                message: format!("interest_rate cannot be negative: {}", self.terms.interest_rate),
            });
        }
        if self.terms.minor_unit_scale > 8 {
            return Err(BillingError::InvalidConfiguration {
                message: "minor_unit_scale cannot exceed 8 decimal places".to_string(),
            });
        }
        if self.payments.lock_registry_capacity == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "lock_registry_capacity must be at least 1".to_string(),
            });
        }
        if self.journal.capacity == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "journal capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn default_interest_rate() -> Rate {
    DEFAULT_INTEREST_RATE
}

fn default_duration_weeks() -> u32 {
    DEFAULT_DURATION_WEEKS
}

fn default_minor_unit_scale() -> u32 {
    DEFAULT_MINOR_UNIT_SCALE
}

fn default_lock_timeout_ms() -> Option<u64> {
    Some(5_000)
}

fn default_lock_registry_capacity() -> usize {
    10_000
}

fn default_journal_capacity() -> usize {
    1_024
}
