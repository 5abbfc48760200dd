use serde::{Deserialize, Serialize};

use crate::events::{Event, EventLog};
use crate::types::AccountId;
use crate::{Result, VedistError};

/// Two-phase ownership: the owner commits a successor, then applies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    owner: AccountId,
    future_owner: Option<AccountId>,
}

impl Ownership {
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            future_owner: None,
        }
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn future_owner(&self) -> Option<AccountId> {
        self.future_owner
    }

    pub fn is_owner(&self, caller: AccountId) -> bool {
        caller == self.owner
    }

    pub fn ensure_owner(&self, caller: AccountId) -> Result<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(VedistError::NotAuthorized(format!("{caller} is not the owner")))
        }
    }

    pub fn commit_transfer(
        &mut self,
        caller: AccountId,
        future_owner: AccountId,
        events: &mut EventLog,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        if future_owner.is_zero() {
            return Err(VedistError::InvalidInput("future owner cannot be zero".into()));
        }
        self.future_owner = Some(future_owner);
        events.emit(Event::OwnershipCommitted { future_owner });
        Ok(())
    }

    pub fn apply_transfer(&mut self, caller: AccountId, events: &mut EventLog) -> Result<()> {
        self.ensure_owner(caller)?;
        let next = self
            .future_owner
            .take()
            .ok_or_else(|| VedistError::InvalidInput("owner not set".into()))?;
        self.owner = next;
        events.emit(Event::OwnershipApplied { owner: next });
        Ok(())
    }
}
