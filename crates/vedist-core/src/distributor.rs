//! Weekly epoch distributor.
//!
//! Funding lands in custody at arbitrary times. `checkpoint_token` spreads the
//! unassigned balance over the elapsed span by seconds of overlap with each week,
//! and claims pay `bucket[week] * balance_at(account, week) / supply_at(week)` for
//! fully elapsed weeks only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::admin::Ownership;
use crate::bounds::RuntimeBounds;
use crate::config::{PayoutMode, VedistConfig};
use crate::escrow::VotingEscrow;
use crate::events::{Event, EventLog};
use crate::ledger::PointHistoryLedger;
use crate::math::{ceil_week, floor_week, mul_div_floor};
use crate::transfer::TransferService;
use crate::types::{AccountId, Amount, Epoch, Timestamp, TokenId, Weighting, WEEK};
use crate::{Result, VedistError};

/// Per-account claim progress.
///
/// Every week before `week_cursor` has been settled for the account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCursor {
    /// Local epoch of the point that produced the last settled week's balance.
    pub last_claimed_epoch: Epoch,
    /// Start of the next week to settle.
    pub week_cursor: Timestamp,
}

/// Result of a `claim_many` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimBatch {
    pub claimed: Vec<(AccountId, Amount)>,
    pub failed: Vec<(AccountId, VedistError)>,
    pub total: Amount,
}

/// Bucket totals produced by a token checkpoint, not yet committed.
#[derive(Clone, Debug, PartialEq, Eq)]
struct TokenCheckpoint {
    time: Timestamp,
    balance: Amount,
    distributed: Amount,
    // Absolute bucket values after the checkpoint.
    buckets: Vec<(Timestamp, Amount)>,
}

impl TokenCheckpoint {
    fn bucket(&self, week: Timestamp) -> Option<Amount> {
        self.buckets
            .iter()
            .find(|(w, _)| *w == week)
            .map(|(_, a)| *a)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ClaimComputation {
    amount: Amount,
    cursor: Option<ClaimCursor>,
    max_epoch: Epoch,
    first_week: Timestamp,
    last_week: Timestamp,
}

impl ClaimComputation {
    fn nothing() -> Self {
        Self {
            amount: Amount::ZERO,
            cursor: None,
            max_epoch: 0,
            first_week: 0,
            last_week: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WeeklyDistributor {
    token: TokenId,
    custody: AccountId,
    emergency_return: AccountId,
    weighting: Weighting,
    payout: PayoutMode,
    checkpoint_deadline: Timestamp,
    min_lock_duration: Timestamp,
    bounds: RuntimeBounds,
    ownership: Ownership,

    start_time: Timestamp,
    time_cursor: Timestamp,
    last_token_time: Timestamp,
    token_last_balance: Amount,
    can_checkpoint_token: bool,

    tokens_per_week: BTreeMap<Timestamp, Amount>,
    ve_supply: BTreeMap<Timestamp, Amount>,
    cursors: BTreeMap<AccountId, ClaimCursor>,
    events: EventLog,
}

impl WeeklyDistributor {
    /// Creates a distributor whose first claimable week is the one containing `now`.
    pub fn new(
        owner: AccountId,
        token: TokenId,
        custody: AccountId,
        emergency_return: AccountId,
        now: Timestamp,
        config: &VedistConfig,
    ) -> Result<Self> {
        config.validate()?;
        if owner.is_zero() || custody.is_zero() || emergency_return.is_zero() {
            return Err(VedistError::InvalidInput(
                "owner, custody and emergency return must be non-zero".into(),
            ));
        }
        let start = floor_week(now);
        Ok(Self {
            token,
            custody,
            emergency_return,
            weighting: config.distributor.weighting,
            payout: config.distributor.payout,
            checkpoint_deadline: config.distributor.token_checkpoint_deadline,
            min_lock_duration: config.distributor.min_lock_duration,
            bounds: config.bounds,
            ownership: Ownership::new(owner),
            start_time: start,
            time_cursor: start,
            last_token_time: start,
            token_last_balance: Amount::ZERO,
            can_checkpoint_token: config.distributor.allow_checkpoint_public,
            tokens_per_week: BTreeMap::new(),
            ve_supply: BTreeMap::new(),
            cursors: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    // =========================================================================
    // Funding
    // =========================================================================

    /// Move the caller's whole balance of the reward token into custody.
    #[instrument(skip_all, fields(caller = %caller))]
    pub fn burn(
        &mut self,
        bank: &dyn TransferService,
        caller: AccountId,
        token: TokenId,
        now: Timestamp,
    ) -> Result<Amount> {
        if token != self.token {
            return Err(VedistError::InvalidInput(format!(
                "{token} is not the reward token"
            )));
        }
        if caller == self.custody {
            return Err(VedistError::InvalidInput(
                "custody cannot burn into itself".into(),
            ));
        }
        let amount = bank.balance_of(token, caller);
        let plan = if self.public_checkpoint_due(now) {
            let expected = bank.balance_of(token, self.custody).checked_add(amount)?;
            Some(self.plan_token_checkpoint(expected, now)?)
        } else {
            None
        };

        if !amount.is_zero() {
            bank.transfer(token, caller, self.custody, amount)?;
        }

        if let Some(plan) = plan {
            self.commit_token_checkpoint(plan);
        }
        debug!(%amount, "burned into custody");
        Ok(amount)
    }

    fn public_checkpoint_due(&self, now: Timestamp) -> bool {
        self.can_checkpoint_token
            && now > self.last_token_time.saturating_add(self.checkpoint_deadline)
    }

    /// Assign funds received since the last checkpoint to weekly buckets.
    ///
    /// Allowed for the owner at any time, and for anyone once public checkpoints are
    /// enabled and the deadline since the last checkpoint has passed.
    #[instrument(skip_all, fields(caller = %caller, now = now))]
    pub fn checkpoint_token(
        &mut self,
        bank: &dyn TransferService,
        caller: AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        if !(self.ownership.is_owner(caller) || self.public_checkpoint_due(now)) {
            return Err(VedistError::NotAuthorized(
                "token checkpoint is owner-only until the public deadline".into(),
            ));
        }
        let balance = bank.balance_of(self.token, self.custody);
        let plan = self.plan_token_checkpoint(balance, now)?;
        let distributed = plan.distributed;
        self.commit_token_checkpoint(plan);
        Ok(distributed)
    }

    fn plan_token_checkpoint(&self, balance: Amount, now: Timestamp) -> Result<TokenCheckpoint> {
        if now < self.last_token_time {
            return Err(VedistError::InvalidInput(format!(
                "timestamp {now} precedes last token checkpoint {}",
                self.last_token_time
            )));
        }
        let to_distribute = balance.checked_sub(self.token_last_balance)?.get();
        let mut t = self.last_token_time;
        let since_last = now - t;
        let mut this_week = floor_week(t);
        let mut buckets = Vec::new();

        for _ in 0..self.bounds.max_token_weeks {
            let next_week = this_week + WEEK;
            let (share, done) = if now < next_week {
                let share = if since_last == 0 && now == t {
                    to_distribute
                } else {
                    mul_div_floor(to_distribute, (now - t) as u128, since_last as u128)?
                };
                (share, true)
            } else {
                let share = if since_last == 0 && next_week == t {
                    to_distribute
                } else {
                    mul_div_floor(to_distribute, (next_week - t) as u128, since_last as u128)?
                };
                (share, false)
            };
            let total = self.tokens_per_week(this_week).checked_add(Amount::new(share))?;
            buckets.push((this_week, total));
            if done {
                break;
            }
            t = next_week;
            this_week = next_week;
        }

        Ok(TokenCheckpoint {
            time: now,
            balance,
            distributed: Amount::new(to_distribute),
            buckets,
        })
    }

    fn commit_token_checkpoint(&mut self, plan: TokenCheckpoint) {
        for (week, total) in &plan.buckets {
            self.tokens_per_week.insert(*week, *total);
        }
        self.last_token_time = plan.time;
        self.token_last_balance = plan.balance;
        info!(time = plan.time, tokens = %plan.distributed, "token checkpoint");
        self.events.emit(Event::CheckpointToken {
            time: plan.time,
            tokens: plan.distributed,
        });
    }

    /// Cache total supply for elapsed week starts, at most `max_supply_weeks` per call.
    pub fn checkpoint_total_supply(
        &mut self,
        escrow: &VotingEscrow,
        now: Timestamp,
    ) -> Result<Timestamp> {
        let ledger = escrow.ledger();
        let rounded = floor_week(now);
        let mut t = self.time_cursor;
        let mut cached = Vec::new();
        for _ in 0..self.bounds.max_supply_weeks {
            if t > rounded || t >= now {
                break;
            }
            cached.push((t, ledger.supply_at(t, self.weighting)?));
            t += WEEK;
        }

        // Commit after all fallible computations.
        for (week, supply) in cached {
            self.ve_supply.insert(week, supply);
        }
        self.time_cursor = t;
        Ok(t)
    }

    // =========================================================================
    // Claims
    // =========================================================================

    /// Claim every fully elapsed week owed to `account`, up to `max_claim_weeks` weeks.
    #[instrument(skip_all, fields(account = %account, now = now))]
    pub fn claim(
        &mut self,
        escrow: &mut VotingEscrow,
        bank: &dyn TransferService,
        account: AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        let plan = self.plan_auto_checkpoint(bank, now)?;
        self.claim_inner(escrow, bank, account, plan, now)
    }

    /// Claim for several accounts; zero accounts are skipped and a failing account
    /// does not abort the batch.
    #[instrument(skip_all, fields(accounts = accounts.len(), now = now))]
    pub fn claim_many(
        &mut self,
        escrow: &mut VotingEscrow,
        bank: &dyn TransferService,
        accounts: &[AccountId],
        now: Timestamp,
    ) -> Result<ClaimBatch> {
        if accounts.len() > self.bounds.max_claim_batch {
            return Err(VedistError::InvalidInput(format!(
                "batch of {} exceeds max_claim_batch {}",
                accounts.len(),
                self.bounds.max_claim_batch
            )));
        }
        if let Some(plan) = self.plan_auto_checkpoint(bank, now)? {
            self.commit_token_checkpoint(plan);
        }

        let mut batch = ClaimBatch::default();
        for &account in accounts {
            if account.is_zero() {
                continue;
            }
            match self.claim_inner(escrow, bank, account, None, now) {
                Ok(amount) => {
                    batch.total = batch.total.checked_add(amount)?;
                    batch.claimed.push((account, amount));
                }
                Err(e) => {
                    warn!(%account, error = %e, "claim skipped");
                    batch.failed.push((account, e));
                }
            }
        }
        Ok(batch)
    }

    fn plan_auto_checkpoint(
        &self,
        bank: &dyn TransferService,
        now: Timestamp,
    ) -> Result<Option<TokenCheckpoint>> {
        if !self.public_checkpoint_due(now) {
            return Ok(None);
        }
        let balance = bank.balance_of(self.token, self.custody);
        self.plan_token_checkpoint(balance, now).map(Some)
    }

    fn claim_inner(
        &mut self,
        escrow: &mut VotingEscrow,
        bank: &dyn TransferService,
        account: AccountId,
        plan: Option<TokenCheckpoint>,
        now: Timestamp,
    ) -> Result<Amount> {
        self.ensure_lock_duration(escrow, &account, now)?;
        let computed = self.compute_claim(escrow.ledger(), &account, plan.as_ref())?;

        let last_balance = plan
            .as_ref()
            .map(|p| p.balance)
            .unwrap_or(self.token_last_balance);
        let remaining = last_balance.checked_sub(computed.amount)?;

        if !computed.amount.is_zero() {
            match self.payout {
                PayoutMode::Transfer => {
                    bank.transfer(self.token, self.custody, account, computed.amount)?
                }
                PayoutMode::Relock => {
                    if escrow.token() != self.token {
                        return Err(VedistError::InvalidInput(
                            "escrow locks a different token than the reward token".into(),
                        ));
                    }
                    escrow.deposit_for(bank, self.custody, account, computed.amount, now)?;
                }
            }
        }

        // Commit after all fallible computations.
        if let Some(plan) = plan {
            self.commit_token_checkpoint(plan);
        }
        self.token_last_balance = remaining;
        if let Some(cursor) = computed.cursor {
            self.cursors.insert(account, cursor);
            if !computed.amount.is_zero() {
                self.events.emit(Event::Claimed {
                    account,
                    amount: computed.amount,
                    claim_epoch: cursor.last_claimed_epoch,
                    max_epoch: computed.max_epoch,
                    first_week: computed.first_week,
                    last_week: computed.last_week,
                });
            }
        }
        Ok(computed.amount)
    }

    fn compute_claim(
        &self,
        ledger: &PointHistoryLedger,
        account: &AccountId,
        plan: Option<&TokenCheckpoint>,
    ) -> Result<ClaimComputation> {
        let last_token_time = plan.map(|p| p.time).unwrap_or(self.last_token_time);
        let last_week = floor_week(last_token_time);

        let max_epoch = ledger.user_point_epoch(account);
        if max_epoch == 0 {
            return Ok(ClaimComputation::nothing());
        }

        let existing = self.cursors.get(account).copied();
        let mut week_cursor = match existing {
            Some(c) => c.week_cursor,
            None => {
                let first = ledger.user_point(account, 1).ok_or_else(|| {
                    VedistError::InvalidInput("missing first user point".into())
                })?;
                ceil_week(first.ts)?
            }
        };
        if week_cursor < self.start_time {
            week_cursor = self.start_time;
        }
        if week_cursor >= last_week {
            return Ok(ClaimComputation::nothing());
        }

        let first_week = week_cursor;
        let mut last_settled = week_cursor;
        let mut epoch = existing.map(|c| c.last_claimed_epoch).unwrap_or(0);
        let mut total: u128 = 0;

        for _ in 0..self.bounds.max_claim_weeks {
            if week_cursor >= last_week {
                break;
            }
            epoch = ledger.find_user_epoch(account, week_cursor);
            let balance = ledger.balance_at(account, week_cursor, self.weighting)?;
            if balance.is_zero() && epoch >= max_epoch {
                // Lock fully decayed and nothing newer recorded.
                break;
            }
            if !balance.is_zero() {
                let supply = self.supply_for_week(ledger, week_cursor)?;
                if !supply.is_zero() {
                    let bucket = plan
                        .and_then(|p| p.bucket(week_cursor))
                        .unwrap_or_else(|| self.tokens_per_week(week_cursor));
                    let share = mul_div_floor(balance.get(), bucket.get(), supply.get())?;
                    total = total.checked_add(share).ok_or_else(|| {
                        VedistError::BoundedValueExceeded("claim total overflow".into())
                    })?;
                }
            }
            last_settled = week_cursor;
            week_cursor += WEEK;
        }

        let cursor = ClaimCursor {
            last_claimed_epoch: epoch,
            week_cursor,
        };
        Ok(ClaimComputation {
            amount: Amount::new(total),
            cursor: if existing == Some(cursor) { None } else { Some(cursor) },
            max_epoch,
            first_week,
            last_week: last_settled,
        })
    }

    fn supply_for_week(&self, ledger: &PointHistoryLedger, week: Timestamp) -> Result<Amount> {
        match self.ve_supply.get(&week) {
            Some(cached) => Ok(*cached),
            None => ledger.supply_at(week, self.weighting),
        }
    }

    fn ensure_lock_duration(
        &self,
        escrow: &VotingEscrow,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<()> {
        if self.min_lock_duration == 0 {
            return Ok(());
        }
        let required = floor_week(now).saturating_add(self.min_lock_duration);
        if escrow.locked_end(account) < required {
            return Err(VedistError::ClaimNotEligible(
                "User lock time is not enough".into(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Operator
    // =========================================================================

    pub fn toggle_allow_checkpoint_public(&mut self, caller: AccountId) -> Result<bool> {
        self.ownership.ensure_owner(caller)?;
        self.can_checkpoint_token = !self.can_checkpoint_token;
        self.events.emit(Event::ToggleAllowCheckpointToken {
            enabled: self.can_checkpoint_token,
        });
        Ok(self.can_checkpoint_token)
    }

    /// Set the claim gate, rounded down to whole weeks.
    pub fn set_min_lock_duration(
        &mut self,
        caller: AccountId,
        seconds: Timestamp,
    ) -> Result<Timestamp> {
        self.ownership.ensure_owner(caller)?;
        let rounded = floor_week(seconds);
        if rounded == 0 {
            return Err(VedistError::InvalidDuration(
                "Cannot set zero duration".into(),
            ));
        }
        self.min_lock_duration = rounded;
        self.events.emit(Event::MinLockDuration { duration: rounded });
        Ok(rounded)
    }

    /// Send a stray token balance from custody to the emergency-return account.
    pub fn recover_non_reward_token(
        &mut self,
        bank: &dyn TransferService,
        caller: AccountId,
        token: TokenId,
        amount: Amount,
    ) -> Result<()> {
        self.ownership.ensure_owner(caller)?;
        if token == self.token {
            return Err(VedistError::NotAuthorized(
                "Cannot recover the reward token".into(),
            ));
        }
        if amount.is_zero() {
            return Err(VedistError::ZeroAmount);
        }
        bank.transfer(token, self.custody, self.emergency_return, amount)?;
        self.events.emit(Event::TokenRecovered {
            token,
            amount,
            recipient: self.emergency_return,
        });
        Ok(())
    }

    pub fn commit_transfer_ownership(
        &mut self,
        caller: AccountId,
        future_owner: AccountId,
    ) -> Result<()> {
        self.ownership
            .commit_transfer(caller, future_owner, &mut self.events)
    }

    pub fn apply_transfer_ownership(&mut self, caller: AccountId) -> Result<()> {
        self.ownership.apply_transfer(caller, &mut self.events)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn tokens_per_week(&self, week: Timestamp) -> Amount {
        self.tokens_per_week.get(&week).copied().unwrap_or_default()
    }

    /// Cached total supply for a week, if `checkpoint_total_supply` reached it.
    pub fn ve_supply(&self, week: Timestamp) -> Option<Amount> {
        self.ve_supply.get(&week).copied()
    }

    pub fn cursor(&self, account: &AccountId) -> Option<ClaimCursor> {
        self.cursors.get(account).copied()
    }

    pub fn cursors(&self) -> impl Iterator<Item = (&AccountId, &ClaimCursor)> {
        self.cursors.iter()
    }

    /// Balance the distributor would use for `account` at `t`.
    pub fn ve_for_at(
        &self,
        escrow: &VotingEscrow,
        account: &AccountId,
        t: Timestamp,
    ) -> Result<Amount> {
        escrow.ledger().balance_at(account, t, self.weighting)
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn time_cursor(&self) -> Timestamp {
        self.time_cursor
    }

    pub fn last_token_time(&self) -> Timestamp {
        self.last_token_time
    }

    pub fn token_last_balance(&self) -> Amount {
        self.token_last_balance
    }

    pub fn can_checkpoint_token(&self) -> bool {
        self.can_checkpoint_token
    }

    pub fn min_lock_duration(&self) -> Timestamp {
        self.min_lock_duration
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn custody(&self) -> AccountId {
        self.custody
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn owner(&self) -> AccountId {
        self.ownership.owner()
    }

    /// Week buckets in ascending order.
    pub fn buckets(&self) -> impl Iterator<Item = (&Timestamp, &Amount)> {
        self.tokens_per_week.iter()
    }

    pub fn events(&self) -> &[Event] {
        self.events.entries()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::check_bucket_finality;
    use crate::transfer::InMemoryToken;
    use crate::types::DAY;
    use proptest::prelude::*;

    const W1: Timestamp = 2844 * WEEK;

    struct Fixture {
        bank: InMemoryToken,
        ve: VotingEscrow,
        dist: WeeklyDistributor,
        admin: AccountId,
        alice: AccountId,
    }

    fn setup(config: VedistConfig) -> Fixture {
        let bank = InMemoryToken::new();
        let token = TokenId::from_label("PERP");
        let admin = AccountId::from_label("admin");
        let alice = AccountId::from_label("alice");
        bank.mint(token, admin, Amount::from_tokens(1_000_000)).unwrap();
        bank.mint(token, alice, Amount::from_tokens(1_000)).unwrap();
        let ve = VotingEscrow::new(admin, token, AccountId::from_label("ve"), W1 - WEEK, &config)
            .unwrap();
        let dist = WeeklyDistributor::new(
            admin,
            token,
            AccountId::from_label("fee-distributor"),
            AccountId::from_label("treasury"),
            W1 - 100,
            &config,
        )
        .unwrap();
        Fixture {
            bank,
            ve,
            dist,
            admin,
            alice,
        }
    }

    fn fund(f: &Fixture, tokens: u64) {
        f.bank
            .transfer(f.dist.token(), f.admin, f.dist.custody(), Amount::from_tokens(tokens))
            .unwrap();
    }

    #[test]
    fn start_time_is_week_floor() {
        let f = setup(VedistConfig::default());
        assert_eq!(f.dist.start_time(), W1 - WEEK);
        assert_eq!(f.dist.last_token_time(), W1 - WEEK);
    }

    #[test]
    fn lump_sum_splits_by_time_overlap() {
        let mut f = setup(VedistConfig::default());
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        fund(&f, 1_000);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + WEEK + DAY).unwrap();

        assert_eq!(f.dist.tokens_per_week(W1), Amount::from_tokens(875));
        assert_eq!(f.dist.tokens_per_week(W1 + WEEK), Amount::from_tokens(125));
    }

    #[test]
    fn checkpoint_in_same_second_assigns_all_to_current_week() {
        let mut f = setup(VedistConfig::default());
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + 10).unwrap();
        fund(&f, 100);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + 10).unwrap();
        assert_eq!(f.dist.tokens_per_week(W1), Amount::from_tokens(100));
    }

    #[test]
    fn checkpoint_without_new_funds_is_a_noop_on_buckets() {
        let mut f = setup(VedistConfig::default());
        fund(&f, 700);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + DAY).unwrap();
        let before: Vec<_> = f.dist.buckets().map(|(w, a)| (*w, *a)).collect();
        let distributed = f.dist.checkpoint_token(&f.bank, f.admin, W1 + 3 * DAY).unwrap();
        let after: Vec<_> = f.dist.buckets().map(|(w, a)| (*w, *a)).collect();
        assert_eq!(distributed, Amount::ZERO);
        assert_eq!(
            before.iter().map(|(_, a)| *a).fold(Amount::ZERO, |x, y| x.checked_add(y).unwrap()),
            after.iter().map(|(_, a)| *a).fold(Amount::ZERO, |x, y| x.checked_add(y).unwrap())
        );
    }

    #[test]
    fn public_checkpoint_requires_flag_and_deadline() {
        let mut f = setup(VedistConfig::default());
        let err = f.dist.checkpoint_token(&f.bank, f.alice, W1 + 2 * DAY).unwrap_err();
        assert!(matches!(err, VedistError::NotAuthorized(_)));

        assert!(f.dist.toggle_allow_checkpoint_public(f.admin).unwrap());
        f.dist.checkpoint_token(&f.bank, f.alice, W1 + 2 * DAY).unwrap();
        assert!(f.dist.checkpoint_token(&f.bank, f.alice, W1 + 2 * DAY + 10).is_err());
        assert!(f.dist.checkpoint_token(&f.bank, f.alice, W1 + 3 * DAY + 1).is_ok());
    }

    #[test]
    fn token_checkpoint_is_bounded_per_call() {
        let config = VedistConfig::builder()
            .bounds(RuntimeBounds {
                max_token_weeks: 2,
                ..RuntimeBounds::default()
            })
            .build()
            .unwrap();
        let mut f = setup(config);
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        fund(&f, 400);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + 4 * WEEK).unwrap();

        assert_eq!(f.dist.tokens_per_week(W1), Amount::from_tokens(100));
        assert_eq!(f.dist.tokens_per_week(W1 + WEEK), Amount::from_tokens(100));
        assert_eq!(f.dist.tokens_per_week(W1 + 2 * WEEK), Amount::ZERO);
        assert_eq!(f.dist.token_last_balance(), Amount::from_tokens(400));
    }

    #[test]
    fn burn_pulls_whole_balance_and_rejects_other_tokens() {
        let mut f = setup(VedistConfig::default());
        let other = TokenId::from_label("USDC");
        assert!(f.dist.burn(&f.bank, f.alice, other, W1).is_err());

        let burned = f.dist.burn(&f.bank, f.alice, f.dist.token(), W1).unwrap();
        assert_eq!(burned, Amount::from_tokens(1_000));
        assert_eq!(f.bank.balance_of(f.dist.token(), f.alice), Amount::ZERO);
    }

    #[test]
    fn min_lock_duration_rounds_and_rejects_zero() {
        let mut f = setup(VedistConfig::default());
        assert_eq!(
            f.dist.set_min_lock_duration(f.admin, 2 * WEEK + DAY).unwrap(),
            2 * WEEK
        );
        assert!(matches!(
            f.dist.set_min_lock_duration(f.admin, WEEK - 1),
            Err(VedistError::InvalidDuration(_))
        ));
        assert!(f.dist.set_min_lock_duration(f.alice, WEEK).is_err());
    }

    #[test]
    fn recover_rejects_reward_token() {
        let mut f = setup(VedistConfig::default());
        let other = TokenId::from_label("USDC");
        f.bank.mint(other, f.dist.custody(), Amount::new(55)).unwrap();

        let err = f
            .dist
            .recover_non_reward_token(&f.bank, f.admin, f.dist.token(), Amount::new(1))
            .unwrap_err();
        assert!(matches!(err, VedistError::NotAuthorized(_)));

        f.dist
            .recover_non_reward_token(&f.bank, f.admin, other, Amount::new(55))
            .unwrap();
        assert_eq!(
            f.bank.balance_of(other, AccountId::from_label("treasury")),
            Amount::new(55)
        );
    }

    #[test]
    fn claim_in_current_week_pays_nothing() {
        let mut f = setup(VedistConfig::default());
        f.ve.create_lock(&f.bank, f.alice, Amount::from_tokens(100), W1 + 4 * WEEK, W1)
            .unwrap();
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        fund(&f, 1_000);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + DAY).unwrap();

        let log_len = f.bank.get_log().len();
        let paid = f.dist.claim(&mut f.ve, &f.bank, f.alice, W1 + DAY + 1).unwrap();
        assert_eq!(paid, Amount::ZERO);
        assert_eq!(f.bank.get_log().len(), log_len);
        assert!(f.dist.cursor(&f.alice).is_none());
        assert!(!f.dist.events().iter().any(|e| matches!(e, Event::Claimed { .. })));
    }

    #[test]
    fn claim_is_idempotent_within_elapsed_weeks() {
        let mut f = setup(VedistConfig::default());
        f.ve.create_lock(&f.bank, f.alice, Amount::from_tokens(100), W1 + 4 * WEEK, W1 - 10)
            .unwrap();
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        fund(&f, 1_000);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + WEEK).unwrap();

        let first = f.dist.claim(&mut f.ve, &f.bank, f.alice, W1 + WEEK + 5).unwrap();
        assert_eq!(first, Amount::from_tokens(1_000));
        let second = f.dist.claim(&mut f.ve, &f.bank, f.alice, W1 + WEEK + 6).unwrap();
        assert_eq!(second, Amount::ZERO);
        let claimed_events = f
            .dist
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Claimed { .. }))
            .count();
        assert_eq!(claimed_events, 1);
        assert_eq!(
            f.dist.cursor(&f.alice).unwrap().week_cursor,
            W1 + WEEK
        );
    }

    #[test]
    fn min_lock_gate_rejects_short_locks() {
        let config = VedistConfig::builder().min_lock_duration(4 * WEEK).build().unwrap();
        let mut f = setup(config);
        f.ve.create_lock(&f.bank, f.alice, Amount::from_tokens(100), W1 + 2 * WEEK, W1)
            .unwrap();
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        fund(&f, 10);
        f.dist.checkpoint_token(&f.bank, f.admin, W1 + WEEK).unwrap();

        let err = f.dist.claim(&mut f.ve, &f.bank, f.alice, W1 + WEEK).unwrap_err();
        assert_eq!(err, VedistError::ClaimNotEligible("User lock time is not enough".into()));
        assert!(f.dist.cursor(&f.alice).is_none());
    }

    #[test]
    fn claim_many_rejects_oversized_batches_and_skips_zero() {
        let mut f = setup(VedistConfig::default());
        let too_many = vec![f.alice; RuntimeBounds::DEFAULT_MAX_CLAIM_BATCH + 1];
        assert!(f.dist.claim_many(&mut f.ve, &f.bank, &too_many, W1).is_err());

        let batch = f
            .dist
            .claim_many(&mut f.ve, &f.bank, &[AccountId::ZERO, f.alice], W1)
            .unwrap();
        assert_eq!(batch.claimed, vec![(f.alice, Amount::ZERO)]);
        assert!(batch.failed.is_empty());
    }

    #[test]
    fn burn_from_custody_is_rejected() {
        let config = VedistConfig::builder().allow_checkpoint_public(true).build().unwrap();
        let mut f = setup(config);
        fund(&f, 50);
        let custody = f.dist.custody();
        let err = f.dist.burn(&f.bank, custody, f.dist.token(), W1 + 2 * DAY).unwrap_err();
        assert!(matches!(err, VedistError::InvalidInput(_)));
        assert_eq!(f.dist.last_token_time(), W1 - WEEK);
        assert_eq!(f.bank.balance_of(f.dist.token(), custody), Amount::from_tokens(50));
    }

    /// Alice alone holds a lock while weeks `W1..W1 + 5 weeks` get 100 tokens each.
    fn five_funded_weeks(config: VedistConfig) -> Fixture {
        let mut f = setup(config);
        f.ve.create_lock(&f.bank, f.alice, Amount::from_tokens(100), W1 + 20 * WEEK, W1)
            .unwrap();
        f.dist.checkpoint_token(&f.bank, f.admin, W1).unwrap();
        for i in 1..=5 {
            fund(&f, 100);
            f.dist.checkpoint_token(&f.bank, f.admin, W1 + i * WEEK).unwrap();
        }
        f
    }

    #[test]
    fn claim_resumes_from_cursor_when_week_cap_hit() {
        let config = VedistConfig::builder()
            .bounds(RuntimeBounds {
                max_claim_weeks: 2,
                ..RuntimeBounds::default()
            })
            .build()
            .unwrap();
        let mut f = five_funded_weeks(config);
        let now = W1 + 5 * WEEK;

        let mut paid = Vec::new();
        let mut cursors = Vec::new();
        for _ in 0..4 {
            paid.push(f.dist.claim(&mut f.ve, &f.bank, f.alice, now).unwrap());
            cursors.push(f.dist.cursor(&f.alice).unwrap().week_cursor);
        }
        let hundred = |n: u64| Amount::from_tokens(100 * n);
        assert_eq!(paid, vec![hundred(2), hundred(2), hundred(1), Amount::ZERO]);
        assert_eq!(cursors, vec![W1 + 2 * WEEK, W1 + 4 * WEEK, now, now]);
        assert_eq!(f.dist.token_last_balance(), Amount::ZERO);
    }

    #[test]
    fn supply_cache_advances_by_capped_steps() {
        let config = VedistConfig::builder()
            .bounds(RuntimeBounds {
                max_supply_weeks: 2,
                ..RuntimeBounds::default()
            })
            .build()
            .unwrap();
        let mut f = five_funded_weeks(config);
        let now = W1 + 5 * WEEK;

        assert_eq!(f.dist.checkpoint_total_supply(&f.ve, now).unwrap(), W1 + WEEK);
        assert_eq!(
            f.dist.ve_supply(W1),
            Some(f.ve.total_supply_at(W1, Weighting::Unweighted).unwrap())
        );
        assert_eq!(f.dist.ve_supply(W1 + WEEK), None);

        assert_eq!(f.dist.checkpoint_total_supply(&f.ve, now).unwrap(), W1 + 3 * WEEK);
        assert_eq!(f.dist.checkpoint_total_supply(&f.ve, now).unwrap(), now);
        // The week starting at `now` has not elapsed yet.
        assert_eq!(f.dist.checkpoint_total_supply(&f.ve, now).unwrap(), now);
        assert_eq!(f.dist.ve_supply(now), None);
        for week in [W1 + WEEK, W1 + 2 * WEEK, W1 + 4 * WEEK] {
            assert_eq!(
                f.dist.ve_supply(week),
                Some(f.ve.total_supply_at(week, Weighting::Unweighted).unwrap())
            );
        }
    }

    proptest! {
        #[test]
        fn buckets_before_token_week_are_final(
            steps in proptest::collection::vec((0u64..5_000, 1u64..10 * DAY), 1..30),
        ) {
            let mut f = setup(VedistConfig::default());
            let mut now = W1;
            for (tokens, gap) in steps {
                let before = f.dist.clone();
                let finalized: Vec<(Timestamp, Amount)> = before
                    .buckets()
                    .filter(|(w, _)| **w < floor_week(before.last_token_time()))
                    .map(|(w, a)| (*w, *a))
                    .collect();

                fund(&f, tokens);
                now += gap;
                f.dist.checkpoint_token(&f.bank, f.admin, now).unwrap();

                for (week, amount) in finalized {
                    prop_assert_eq!(f.dist.tokens_per_week(week), amount);
                }
                prop_assert_eq!(check_bucket_finality(&before, &f.dist), Ok(()));
            }
        }

        #[test]
        fn checkpoint_never_allocates_more_than_received(
            gaps in proptest::collection::vec(1u64..3 * WEEK, 1..8),
            funds in proptest::collection::vec(0u64..10_000, 1..8),
        ) {
            let mut f = setup(VedistConfig::default());
            let mut now = W1;
            let mut received = 0u128;
            for (gap, tokens) in gaps.iter().zip(funds.iter()) {
                fund(&f, *tokens);
                received += Amount::from_tokens(*tokens).get();
                now += gap;
                f.dist.checkpoint_token(&f.bank, f.admin, now).unwrap();
            }
            let allocated: u128 = f.dist.buckets().map(|(_, a)| a.get()).sum();
            prop_assert!(allocated <= received);
        }
    }
}
