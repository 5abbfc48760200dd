use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AccountId, ActionKind, Amount, Epoch, Timestamp, TokenId};
use crate::Hash32;

/// Structured records emitted by the engines for observability and off-chain reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Lock change.
    Deposit {
        account: AccountId,
        amount: Amount,
        locktime: Timestamp,
        kind: ActionKind,
        ts: Timestamp,
    },
    Withdraw {
        account: AccountId,
        amount: Amount,
        ts: Timestamp,
    },
    /// Total escrowed principal before and after a lock change.
    Supply { prev_supply: Amount, supply: Amount },
    CheckpointToken { time: Timestamp, tokens: Amount },
    Claimed {
        account: AccountId,
        amount: Amount,
        claim_epoch: Epoch,
        max_epoch: Epoch,
        first_week: Timestamp,
        last_week: Timestamp,
    },
    AllocationSeeded {
        week: u64,
        root: Hash32,
        amount: Amount,
    },
    /// Merkle week claimed.
    WeekClaimed {
        account: AccountId,
        week: u64,
        amount: Amount,
    },
    MinLockDuration { duration: Timestamp },
    ToggleAllowCheckpointToken { enabled: bool },
    EmergencyUnlockToggled { enabled: bool },
    OwnershipCommitted { future_owner: AccountId },
    OwnershipApplied { owner: AccountId },
    TokenRecovered {
        token: TokenId,
        amount: Amount,
        recipient: AccountId,
    },
}

/// Append-only event journal owned by one engine.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    entries: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        info!(event = ?event, "event");
        self.entries.push(event);
    }

    pub fn entries(&self) -> &[Event] {
        &self.entries
    }

    /// Take all entries, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_the_log() {
        let mut log = EventLog::new();
        log.emit(Event::MinLockDuration { duration: 7 });
        log.emit(Event::ToggleAllowCheckpointToken { enabled: true });
        assert_eq!(log.len(), 2);

        let taken = log.drain();
        assert_eq!(taken.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&Event::Supply {
            prev_supply: Amount::new(1),
            supply: Amount::new(3),
        })
        .expect("serializes");
        assert!(json.contains(r#""event":"supply""#));
    }
}
