// 2.0 config.rs: operator-tunable settings in one place. the contract payout
// table and the settlement policy are data, not code: operators change them
// without a redeploy, and a reload only affects contracts opened afterwards
// (live contracts keep the terms captured at open).

use crate::types::ContractDuration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// 2.1: payout rate per contract duration. 0.25 = the stake pays 125% on a win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutSchedule {
    rates: Vec<(ContractDuration, Decimal)>,
}

impl Default for PayoutSchedule {
    fn default() -> Self {
        Self {
            rates: vec![
                (ContractDuration::Secs30, dec!(0.20)),
                (ContractDuration::Secs60, dec!(0.25)),
                (ContractDuration::Secs120, dec!(0.50)),
            ],
        }
    }
}

impl PayoutSchedule {
    pub fn rate(&self, duration: ContractDuration) -> Option<Decimal> {
        self.rates
            .iter()
            .find(|(d, _)| *d == duration)
            .map(|(_, r)| *r)
    }

    pub fn set_rate(&mut self, duration: ContractDuration, rate: Decimal) {
        if let Some(entry) = self.rates.iter_mut().find(|(d, _)| *d == duration) {
            entry.1 = rate;
        } else {
            self.rates.push((duration, rate));
        }
    }
}

// 2.2: how expired contracts resolve. Fair compares the settlement price
// against the entry price; the other two are operator overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    Fair,
    AlwaysWin,
    AlwaysLoss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub payouts: PayoutSchedule,
    pub policy: SettlementPolicy,
    // How many times a ConcurrentModification commit is retried with a fresh
    // snapshot before the order fails.
    pub commit_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payouts: PayoutSchedule::default(),
            policy: SettlementPolicy::Fair,
            commit_retries: 3,
        }
    }
}

impl LedgerConfig {
    pub fn with_policy(policy: SettlementPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for duration in ContractDuration::ALL {
            match self.payouts.rate(duration) {
                None => return Err(ConfigError::MissingPayout { duration }),
                Some(rate) => {
                    if rate <= Decimal::ZERO || rate > dec!(10) {
                        return Err(ConfigError::InvalidPayout { duration, rate });
                    }
                }
            }
        }

        if self.commit_retries == 0 {
            return Err(ConfigError::InvalidRetries);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no payout rate configured for {duration}")]
    MissingPayout { duration: ContractDuration },

    #[error("payout rate {rate} for {duration} is out of range")]
    InvalidPayout { duration: ContractDuration, rate: Decimal },

    #[error("commit_retries must be at least 1")]
    InvalidRetries,
}
