use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{hash, Result, VedistError};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Index into a point history (global or per-account).
pub type Epoch = u64;

pub const DAY: Timestamp = 86_400;
pub const WEEK: Timestamp = 7 * DAY;
pub const YEAR: Timestamp = 365 * DAY;

/// Account identifier (32 bytes, e.g. a public key or address hash).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Placeholder account; skipped by batch claims and never a valid lock owner.
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Deterministic id derived from a human-readable label.
    pub fn from_label(label: &str) -> AccountId {
        AccountId(hash::sha256_domain(hash::ACCOUNT_ID_DOMAIN_V1, label.as_bytes()).0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Identifier of a fungible token moved through a [`crate::TransferService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 32]);

impl TokenId {
    pub fn from_label(label: &str) -> TokenId {
        TokenId(hash::sha256_domain(hash::TOKEN_ID_DOMAIN_V1, label.as_bytes()).0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Token amount in 18-decimal fixed point.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    /// One whole token.
    pub const UNIT: u128 = 1_000_000_000_000_000_000;

    pub fn new(v: u128) -> Amount {
        Amount(v)
    }

    /// `n` whole tokens.
    pub fn from_tokens(n: u64) -> Amount {
        Amount(n as u128 * Self::UNIT)
    }

    pub fn get(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| VedistError::BoundedValueExceeded("amount overflow in add".into()))
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| VedistError::InvalidInput("amount underflow in sub".into()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account's escrowed principal and its week-aligned unlock time.
///
/// `amount == 0` means no active lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub amount: Amount,
    pub end: Timestamp,
}

impl Lock {
    pub const EMPTY: Lock = Lock {
        amount: Amount::ZERO,
        end: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end <= now
    }
}

/// Decay-curve snapshot.
///
/// `bias` is voting power at `ts`, `slope` its per-second decay. `underlying_supply`
/// is the non-decaying principal behind the point (total escrowed for global points,
/// the account's lock amount for user points).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: Timestamp,
    pub underlying_supply: Amount,
}

/// Which balance curve a query or distributor uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Raw linear decay.
    #[default]
    Unweighted,
    /// `multiplier * decaying + principal`.
    Weighted,
}

/// Kind of lock mutation recorded in `Deposit` events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionKind {
    DepositFor = 0,
    CreateLock = 1,
    IncreaseLockAmount = 2,
    IncreaseUnlockTime = 3,
}

impl ActionKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_constants() {
        assert_eq!(WEEK, 604_800);
        assert_eq!(YEAR, 31_536_000);
    }

    #[test]
    fn labels_give_distinct_nonzero_ids() {
        let a = AccountId::from_label("alice");
        let b = AccountId::from_label("bob");
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(AccountId::ZERO.is_zero());
    }

    #[test]
    fn amount_checked_ops() {
        let a = Amount::from_tokens(2);
        let b = Amount::from_tokens(1);
        assert_eq!(a.checked_sub(b).unwrap(), b);
        assert!(b.checked_sub(a).is_err());
        assert!(Amount::new(u128::MAX).checked_add(b).is_err());
    }

    #[test]
    fn action_kind_codes_are_stable() {
        assert_eq!(ActionKind::DepositFor.as_u8(), 0);
        assert_eq!(ActionKind::CreateLock.as_u8(), 1);
        assert_eq!(ActionKind::IncreaseLockAmount.as_u8(), 2);
        assert_eq!(ActionKind::IncreaseUnlockTime.as_u8(), 3);
    }

    #[test]
    fn lock_expiry_is_inclusive_of_end() {
        let lock = Lock {
            amount: Amount::from_tokens(1),
            end: WEEK,
        };
        assert!(!lock.is_expired(WEEK - 1));
        assert!(lock.is_expired(WEEK));
        assert!(Lock::EMPTY.is_empty());
    }
}
