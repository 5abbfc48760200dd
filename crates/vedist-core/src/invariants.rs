//! Executable state invariants for the escrow and the weekly distributor.
//!
//! Used by the integration tests and the fuzz target after every operation.

use crate::distributor::WeeklyDistributor;
use crate::escrow::VotingEscrow;
use crate::math::floor_week;
use crate::transfer::TransferService;
use crate::types::{Amount, Timestamp, Weighting, WEEK};
use crate::VedistError;

/// Stable identifiers for ledger and distributor invariants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantId {
    /// Total supply at `t` differs from the sum of account balances at `t`.
    SupplyConservation,

    /// Sum of active account slopes exceeds the global slope.
    SlopeBounded,

    /// Lock amounts, escrow supply and the global underlying supply disagree.
    PrincipalAccounted,

    /// A lock ends off a week boundary.
    LockEndAligned,

    /// Custody holds less than the distributor believes it holds.
    CustodySolvent,

    /// A bucket exists for a week that is not aligned or not yet reached.
    BucketsAligned,

    /// A claim cursor points past the last token checkpoint week.
    CursorBehindTokenTime,

    /// A bucket for a week before the last token checkpoint week changed.
    BucketFinality,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for VedistError {
    fn from(v: InvariantViolation) -> Self {
        VedistError::BoundedValueExceeded(format!("invariant violated: {v}"))
    }
}

fn violation_from(id: InvariantId) -> impl Fn(VedistError) -> InvariantViolation {
    move |e| InvariantViolation::new(id, format!("query failed: {e}"))
}

/// Check every escrow invariant, evaluating balances at `t`.
pub fn check_escrow(escrow: &VotingEscrow, t: Timestamp) -> Result<(), InvariantViolation> {
    let ledger = escrow.ledger();

    for weighting in [Weighting::Unweighted, Weighting::Weighted] {
        let supply = ledger
            .supply_at(t, weighting)
            .map_err(violation_from(InvariantId::SupplyConservation))?;
        let mut sum = Amount::ZERO;
        for account in ledger.accounts() {
            let balance = ledger
                .balance_at(account, t, weighting)
                .map_err(violation_from(InvariantId::SupplyConservation))?;
            sum = sum
                .checked_add(balance)
                .map_err(violation_from(InvariantId::SupplyConservation))?;
        }
        if sum != supply {
            return Err(InvariantViolation::new(
                InvariantId::SupplyConservation,
                format!("{weighting:?} at {t}: supply {supply} != sum of balances {sum}"),
            ));
        }
    }

    let last = ledger.last_point();
    let mut slopes: i128 = 0;
    for account in ledger.accounts() {
        if escrow.locked_end(account) <= last.ts {
            continue;
        }
        let epoch = ledger.user_point_epoch(account);
        if let Some(point) = ledger.user_point(account, epoch) {
            slopes = slopes.saturating_add(point.slope);
        }
    }
    if slopes > last.slope {
        return Err(InvariantViolation::new(
            InvariantId::SlopeBounded,
            format!("account slopes {slopes} > global slope {}", last.slope),
        ));
    }

    let mut locked = Amount::ZERO;
    for (account, lock) in escrow.locks() {
        locked = locked
            .checked_add(lock.amount)
            .map_err(violation_from(InvariantId::PrincipalAccounted))?;
        if !lock.is_empty() && lock.end % WEEK != 0 {
            return Err(InvariantViolation::new(
                InvariantId::LockEndAligned,
                format!("{account} lock ends at {}", lock.end),
            ));
        }
    }
    if locked != escrow.supply() || escrow.supply() != last.underlying_supply {
        return Err(InvariantViolation::new(
            InvariantId::PrincipalAccounted,
            format!(
                "locks {locked}, supply {}, global underlying {}",
                escrow.supply(),
                last.underlying_supply
            ),
        ));
    }

    Ok(())
}

/// Check the distributor's bookkeeping against custody.
pub fn check_distributor(
    dist: &WeeklyDistributor,
    bank: &dyn TransferService,
) -> Result<(), InvariantViolation> {
    let held = bank.balance_of(dist.token(), dist.custody());
    if dist.token_last_balance() > held {
        return Err(InvariantViolation::new(
            InvariantId::CustodySolvent,
            format!(
                "token_last_balance {} > custody balance {held}",
                dist.token_last_balance()
            ),
        ));
    }

    let token_week = floor_week(dist.last_token_time());
    for (week, _) in dist.buckets() {
        if week % WEEK != 0 || *week > token_week {
            return Err(InvariantViolation::new(
                InvariantId::BucketsAligned,
                format!("bucket at {week}, last token week {token_week}"),
            ));
        }
    }

    for (account, cursor) in dist.cursors() {
        if cursor.week_cursor % WEEK != 0 || cursor.week_cursor > token_week {
            return Err(InvariantViolation::new(
                InvariantId::CursorBehindTokenTime,
                format!("{account} cursor at {}, last token week {token_week}", cursor.week_cursor),
            ));
        }
    }

    Ok(())
}

/// Check that `after` kept every bucket `before` had already finalized.
///
/// Buckets for weeks strictly before `floor_week(before.last_token_time())` may
/// not change in any later state.
pub fn check_bucket_finality(
    before: &WeeklyDistributor,
    after: &WeeklyDistributor,
) -> Result<(), InvariantViolation> {
    let token_week = floor_week(before.last_token_time());
    for (week, amount) in before.buckets().take_while(|(w, _)| **w < token_week) {
        let now = after.tokens_per_week(*week);
        if now != *amount {
            return Err(InvariantViolation::new(
                InvariantId::BucketFinality,
                format!("bucket {week} changed from {amount} to {now}"),
            ));
        }
    }
    Ok(())
}
