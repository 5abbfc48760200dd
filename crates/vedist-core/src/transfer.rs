use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::types::{AccountId, Amount, TokenId};
use crate::{Result, VedistError};

/// Value-transfer capability injected into the engines.
///
/// Contract:
/// - `transfer` is synchronous and atomic: `Ok` means the full amount moved,
///   `Err` means nothing did.
/// - `balance_of` reflects every completed transfer.
pub trait TransferService {
    fn transfer(
        &self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()>;

    fn balance_of(&self, token: TokenId, holder: AccountId) -> Amount;
}

// =============================================================================
// InMemoryToken
// =============================================================================

/// Record of a completed transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRecord {
    pub token: TokenId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Default)]
struct Ledger {
    balances: BTreeMap<(TokenId, AccountId), Amount>,
    log: Vec<TransferRecord>,
    blocked_senders: BTreeSet<AccountId>,
    fail_all: bool,
}

/// Multi-token balance book that records every transfer.
///
/// Useful for tests and dry runs; failures can be injected per sender.
#[derive(Debug, Default)]
pub struct InMemoryToken {
    inner: Mutex<Ledger>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Ledger> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Credit `amount` to `to` out of thin air.
    pub fn mint(&self, token: TokenId, to: AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state();
        let entry = state.balances.entry((token, to)).or_default();
        *entry = entry.checked_add(amount)?;
        Ok(())
    }

    /// Make every transfer out of `sender` fail until cleared.
    pub fn block_sender(&self, sender: AccountId) {
        self.state().blocked_senders.insert(sender);
    }

    /// Make every transfer fail until cleared.
    pub fn fail_all(&self, enabled: bool) {
        self.state().fail_all = enabled;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.blocked_senders.clear();
        state.fail_all = false;
    }

    /// Get a copy of the transfer log.
    pub fn get_log(&self) -> Vec<TransferRecord> {
        self.state().log.clone()
    }

    /// Clear the transfer log.
    pub fn clear_log(&self) {
        self.state().log.clear();
    }
}

impl TransferService for InMemoryToken {
    fn transfer(
        &self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        let mut state = self.state();
        if state.fail_all || state.blocked_senders.contains(&from) {
            warn!(%from, %to, %amount, "transfer rejected by injected failure");
            return Err(VedistError::TransferFailure(format!(
                "transfer from {from} rejected"
            )));
        }

        let from_balance = state
            .balances
            .get(&(token, from))
            .copied()
            .unwrap_or_default();
        let new_from = from_balance.checked_sub(amount).map_err(|_| {
            VedistError::TransferFailure(format!(
                "insufficient balance: {from} has {from_balance}, needs {amount}"
            ))
        })?;
        if from == to {
            state.log.push(TransferRecord { token, from, to, amount });
            return Ok(());
        }
        let to_balance = state
            .balances
            .get(&(token, to))
            .copied()
            .unwrap_or_default();
        let new_to = to_balance.checked_add(amount)?;

        state.balances.insert((token, from), new_from);
        state.balances.insert((token, to), new_to);
        state.log.push(TransferRecord { token, from, to, amount });
        debug!(%token, %from, %to, %amount, "transfer");
        Ok(())
    }

    fn balance_of(&self, token: TokenId, holder: AccountId) -> Amount {
        self.state()
            .balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }
}
