use serde::{Deserialize, Serialize};

use crate::{Result, VedistError};

/// Iteration bounds for the ledger and distributors.
///
/// These are **safety bounds**, not economic parameters:
/// - they cap the work a single call may do (week loops, batch sizes)
/// - a long idle period is caught up over several calls instead of one unbounded loop
///
/// They MUST remain bounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeBounds {
    /// Week boundaries a ledger mutation may fill forward across.
    pub max_fill_weeks: u64,
    /// Weeks a single `checkpoint_token` spreads funds over.
    pub max_token_weeks: u64,
    /// Weeks a single `checkpoint_total_supply` caches.
    pub max_supply_weeks: u64,
    /// Weeks a single claim advances a cursor.
    pub max_claim_weeks: u64,
    /// Accounts per `claim_many` / `claim_weeks` call.
    pub max_claim_batch: usize,
}

impl RuntimeBounds {
    pub const HARD_MAX_FILL_WEEKS: u64 = 1_024;
    pub const HARD_MAX_TOKEN_WEEKS: u64 = 256;
    pub const HARD_MAX_SUPPLY_WEEKS: u64 = 256;
    pub const HARD_MAX_CLAIM_WEEKS: u64 = 512;
    pub const HARD_MAX_CLAIM_BATCH: usize = 1_024;

    pub const DEFAULT_MAX_FILL_WEEKS: u64 = 255;
    pub const DEFAULT_MAX_TOKEN_WEEKS: u64 = 20;
    pub const DEFAULT_MAX_SUPPLY_WEEKS: u64 = 20;
    pub const DEFAULT_MAX_CLAIM_WEEKS: u64 = 50;
    pub const DEFAULT_MAX_CLAIM_BATCH: usize = 20;

    pub fn new(
        max_fill_weeks: u64,
        max_token_weeks: u64,
        max_supply_weeks: u64,
        max_claim_weeks: u64,
        max_claim_batch: usize,
    ) -> Result<Self> {
        let b = RuntimeBounds {
            max_fill_weeks,
            max_token_weeks,
            max_supply_weeks,
            max_claim_weeks,
            max_claim_batch,
        };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(self) -> Result<()> {
        check("max_fill_weeks", self.max_fill_weeks, Self::HARD_MAX_FILL_WEEKS)?;
        check("max_token_weeks", self.max_token_weeks, Self::HARD_MAX_TOKEN_WEEKS)?;
        check("max_supply_weeks", self.max_supply_weeks, Self::HARD_MAX_SUPPLY_WEEKS)?;
        check("max_claim_weeks", self.max_claim_weeks, Self::HARD_MAX_CLAIM_WEEKS)?;
        check(
            "max_claim_batch",
            self.max_claim_batch as u64,
            Self::HARD_MAX_CLAIM_BATCH as u64,
        )?;
        Ok(())
    }
}

fn check(name: &str, value: u64, hard_max: u64) -> Result<()> {
    if value == 0 || value > hard_max {
        return Err(VedistError::InvalidInput(format!(
            "{name} out of bounds: {value}"
        )));
    }
    Ok(())
}

impl Default for RuntimeBounds {
    fn default() -> Self {
        Self {
            max_fill_weeks: Self::DEFAULT_MAX_FILL_WEEKS,
            max_token_weeks: Self::DEFAULT_MAX_TOKEN_WEEKS,
            max_supply_weeks: Self::DEFAULT_MAX_SUPPLY_WEEKS,
            max_claim_weeks: Self::DEFAULT_MAX_CLAIM_WEEKS,
            max_claim_batch: Self::DEFAULT_MAX_CLAIM_BATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RuntimeBounds::default().validate().is_ok());
    }

    #[test]
    fn zero_and_oversized_bounds_rejected() {
        assert!(RuntimeBounds::new(0, 20, 20, 50, 20).is_err());
        assert!(RuntimeBounds::new(255, 20, 20, 50, 0).is_err());
        let fill = RuntimeBounds::HARD_MAX_FILL_WEEKS + 1;
        assert!(RuntimeBounds::new(fill, 20, 20, 50, 20).is_err());
        assert!(RuntimeBounds::new(2, 1, 1, 1, 1).is_ok());
    }
}
