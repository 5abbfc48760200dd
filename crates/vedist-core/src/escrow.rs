use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::admin::Ownership;
use crate::config::VedistConfig;
use crate::events::{Event, EventLog};
use crate::ledger::{CheckpointProgress, PointHistoryLedger};
use crate::math::floor_week;
use crate::transfer::TransferService;
use crate::types::{AccountId, ActionKind, Amount, Epoch, Lock, Timestamp, TokenId, Weighting};
use crate::{Result, VedistError};

/// Lock manager: one lock per account, every change recorded in the point history.
///
/// Locked tokens are held by `custody` through the injected [`TransferService`].
#[derive(Clone, Debug)]
pub struct VotingEscrow {
    token: TokenId,
    custody: AccountId,
    ledger: PointHistoryLedger,
    locked: BTreeMap<AccountId, Lock>,
    supply: Amount,
    emergency_unlock: bool,
    ownership: Ownership,
    events: EventLog,
}

impl VotingEscrow {
    pub fn new(
        owner: AccountId,
        token: TokenId,
        custody: AccountId,
        genesis: Timestamp,
        config: &VedistConfig,
    ) -> Result<Self> {
        config.validate()?;
        if custody.is_zero() || owner.is_zero() {
            return Err(VedistError::InvalidInput(
                "owner and custody must be non-zero".into(),
            ));
        }
        Ok(Self {
            token,
            custody,
            ledger: PointHistoryLedger::new(genesis, &config.escrow, &config.bounds),
            locked: BTreeMap::new(),
            supply: Amount::ZERO,
            emergency_unlock: config.escrow.emergency_unlock,
            ownership: Ownership::new(owner),
            events: EventLog::new(),
        })
    }

    // =========================================================================
    // Lock operations
    // =========================================================================

    /// Lock `amount` until `unlock_time` (rounded down to a week).
    #[instrument(skip_all, fields(account = %account, amount = %amount))]
    pub fn create_lock(
        &mut self,
        bank: &dyn TransferService,
        account: AccountId,
        amount: Amount,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<Epoch> {
        if account.is_zero() {
            return Err(VedistError::InvalidInput("zero account cannot lock".into()));
        }
        if amount.is_zero() {
            return Err(VedistError::ZeroAmount);
        }
        let old = self.locked(&account);
        if !old.is_empty() {
            return Err(VedistError::InvalidLockState(
                "Withdraw old tokens first".into(),
            ));
        }
        let unlock = floor_week(unlock_time);
        if unlock <= now {
            return Err(VedistError::InvalidDuration(
                "Can only lock until time in the future".into(),
            ));
        }
        self.ensure_within_max(unlock, now)?;

        self.deposit(
            bank,
            account,
            account,
            amount,
            unlock,
            old,
            ActionKind::CreateLock,
            now,
        )
    }

    /// Add `amount` paid by `payer` to `target`'s existing lock without changing its end.
    #[instrument(skip_all, fields(payer = %payer, target = %target, amount = %amount))]
    pub fn deposit_for(
        &mut self,
        bank: &dyn TransferService,
        payer: AccountId,
        target: AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Epoch> {
        let old = self.ensure_active_for_deposit(&target, amount, now)?;
        self.deposit(bank, payer, target, amount, 0, old, ActionKind::DepositFor, now)
    }

    /// Add `amount` to the caller's own lock.
    #[instrument(skip_all, fields(account = %account, amount = %amount))]
    pub fn increase_amount(
        &mut self,
        bank: &dyn TransferService,
        account: AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Epoch> {
        let old = self.ensure_active_for_deposit(&account, amount, now)?;
        self.deposit(
            bank,
            account,
            account,
            amount,
            0,
            old,
            ActionKind::IncreaseLockAmount,
            now,
        )
    }

    /// Extend the caller's lock to `unlock_time` (rounded down to a week).
    #[instrument(skip_all, fields(account = %account))]
    pub fn increase_unlock_time(
        &mut self,
        bank: &dyn TransferService,
        account: AccountId,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<Epoch> {
        let old = self.locked(&account);
        if old.is_expired(now) {
            return Err(VedistError::InvalidLockState("Lock expired".into()));
        }
        if old.is_empty() {
            return Err(VedistError::InvalidLockState("Nothing is locked".into()));
        }
        let unlock = floor_week(unlock_time);
        if unlock <= old.end {
            return Err(VedistError::InvalidDuration(
                "Can only increase lock duration".into(),
            ));
        }
        self.ensure_within_max(unlock, now)?;

        self.deposit(
            bank,
            account,
            account,
            Amount::ZERO,
            unlock,
            old,
            ActionKind::IncreaseUnlockTime,
            now,
        )
    }

    /// Release an expired lock (or any lock while the emergency unlock is on).
    #[instrument(skip_all, fields(account = %account))]
    pub fn withdraw(
        &mut self,
        bank: &dyn TransferService,
        account: AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        let old = self.locked(&account);
        if old.is_empty() {
            return Err(VedistError::InvalidLockState("No existing lock found".into()));
        }
        if !old.is_expired(now) && !self.emergency_unlock {
            return Err(VedistError::InvalidLockState("The lock didn't expire".into()));
        }

        let value = old.amount;
        let prev_supply = self.supply;
        let supply = prev_supply.checked_sub(value)?;
        let change = self
            .ledger
            .plan_point_change(Some(account), &old, &Lock::EMPTY, now)?;

        bank.transfer(self.token, self.custody, account, value)?;

        // Commit after all fallible computations.
        self.locked.remove(&account);
        self.supply = supply;
        self.ledger.apply(change);
        self.events.emit(Event::Withdraw {
            account,
            amount: value,
            ts: now,
        });
        self.events.emit(Event::Supply {
            prev_supply,
            supply,
        });
        Ok(value)
    }

    /// Record a global point without a lock change (bounded catch-up).
    pub fn checkpoint(&mut self, now: Timestamp) -> Result<CheckpointProgress> {
        self.ledger.checkpoint(now)
    }

    fn ensure_within_max(&self, unlock: Timestamp, now: Timestamp) -> Result<()> {
        let max_end = now
            .checked_add(self.ledger.max_lock_duration())
            .ok_or_else(|| VedistError::BoundedValueExceeded("timestamp overflow".into()))?;
        if unlock > max_end {
            return Err(VedistError::InvalidDuration(
                "Voting lock can be 1 year max".into(),
            ));
        }
        Ok(())
    }

    fn ensure_active_for_deposit(
        &self,
        account: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Lock> {
        if amount.is_zero() {
            return Err(VedistError::ZeroAmount);
        }
        let old = self.locked(account);
        if old.is_empty() {
            return Err(VedistError::InvalidLockState("No existing lock found".into()));
        }
        if old.is_expired(now) {
            return Err(VedistError::InvalidLockState(
                "Cannot add to expired lock. Withdraw".into(),
            ));
        }
        Ok(old)
    }

    /// Shared path of every lock-growing operation. `unlock == 0` keeps the current end.
    #[allow(clippy::too_many_arguments)]
    fn deposit(
        &mut self,
        bank: &dyn TransferService,
        payer: AccountId,
        account: AccountId,
        value: Amount,
        unlock: Timestamp,
        old: Lock,
        kind: ActionKind,
        now: Timestamp,
    ) -> Result<Epoch> {
        let new = Lock {
            amount: old.amount.checked_add(value)?,
            end: if unlock != 0 { unlock } else { old.end },
        };
        let prev_supply = self.supply;
        let supply = prev_supply.checked_add(value)?;
        let change = self
            .ledger
            .plan_point_change(Some(account), &old, &new, now)?;

        if !value.is_zero() {
            bank.transfer(self.token, payer, self.custody, value)?;
        }

        // Commit after all fallible computations.
        self.locked.insert(account, new);
        self.supply = supply;
        let epoch = self.ledger.apply(change);
        debug!(kind = kind.as_u8(), epoch, end = new.end, "lock updated");
        self.events.emit(Event::Deposit {
            account,
            amount: value,
            locktime: new.end,
            kind,
            ts: now,
        });
        self.events.emit(Event::Supply {
            prev_supply,
            supply,
        });
        Ok(epoch)
    }

    // =========================================================================
    // Operator
    // =========================================================================

    pub fn toggle_emergency_unlock(&mut self, caller: AccountId) -> Result<bool> {
        self.ownership.ensure_owner(caller)?;
        self.emergency_unlock = !self.emergency_unlock;
        info!(enabled = self.emergency_unlock, "emergency unlock toggled");
        self.events.emit(Event::EmergencyUnlockToggled {
            enabled: self.emergency_unlock,
        });
        Ok(self.emergency_unlock)
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

    pub fn locked(&self, account: &AccountId) -> Lock {
        self.locked.get(account).copied().unwrap_or_default()
    }

    pub fn locked_end(&self, account: &AccountId) -> Timestamp {
        self.locked(account).end
    }

    /// Balance at `now`.
    pub fn balance_of(
        &self,
        account: &AccountId,
        now: Timestamp,
        weighting: Weighting,
    ) -> Result<Amount> {
        self.ledger.balance_at(account, now, weighting)
    }

    /// Balance at any past or future timestamp.
    pub fn balance_of_at(
        &self,
        account: &AccountId,
        t: Timestamp,
        weighting: Weighting,
    ) -> Result<Amount> {
        self.ledger.balance_at(account, t, weighting)
    }

    pub fn total_supply(&self, now: Timestamp, weighting: Weighting) -> Result<Amount> {
        self.ledger.supply_at(now, weighting)
    }

    pub fn total_supply_at(&self, t: Timestamp, weighting: Weighting) -> Result<Amount> {
        self.ledger.supply_at(t, weighting)
    }

    /// Total principal escrowed.
    pub fn supply(&self) -> Amount {
        self.supply
    }

    pub fn ledger(&self) -> &PointHistoryLedger {
        &self.ledger
    }

    pub fn locks(&self) -> impl Iterator<Item = (&AccountId, &Lock)> {
        self.locked.iter()
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn custody(&self) -> AccountId {
        self.custody
    }

    pub fn emergency_unlock(&self) -> bool {
        self.emergency_unlock
    }

    pub fn owner(&self) -> AccountId {
        self.ownership.owner()
    }

    pub fn events(&self) -> &[Event] {
        self.events.entries()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
