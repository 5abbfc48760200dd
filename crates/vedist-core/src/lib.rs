//! Vote-escrow ledger and weekly epoch reward distribution.
//!
//! The crate is a pure, deterministic state machine:
//! - time (`now`) and caller identity are explicit arguments of every operation
//! - value transfers go through an injected [`transfer::TransferService`]
//! - every mutating operation validates and computes first, then commits
//!
//! Main entry points:
//! - [`escrow::VotingEscrow`]: one lock per account on top of [`ledger::PointHistoryLedger`]
//! - [`distributor::WeeklyDistributor`]: time-overlap weekly buckets and incremental claims
//! - [`merkle::MerkleDistributor`]: off-chain computed weekly allocations claimed with proofs

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod admin;
pub mod bounds;
pub mod config;
pub mod distributor;
pub mod escrow;
pub mod events;
pub mod hash;
pub mod invariants;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod merkle;
pub mod transfer;
pub mod types;

pub use bounds::RuntimeBounds;
pub use config::VedistConfig;
pub use distributor::{ClaimCursor, WeeklyDistributor};
pub use escrow::VotingEscrow;
pub use events::Event;
pub use ledger::PointHistoryLedger;
pub use merkle::MerkleDistributor;
pub use transfer::{InMemoryToken, TransferService};
pub use types::{AccountId, ActionKind, Amount, Epoch, Lock, Point, Timestamp, TokenId, Weighting};

/// 32-byte hash newtype used for merkle roots and identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

/// Unified error type for the ledger and distributors.
///
/// Every operation that returns `Err` leaves the engine it was called on unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VedistError {
    // Lock lifecycle errors
    #[error("Invalid lock state: {0}")]
    InvalidLockState(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Zero amount")]
    ZeroAmount,

    // Access control
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    // Claims
    #[error("Claim not eligible: {0}")]
    ClaimNotEligible(String),

    #[error("Reentrant call or already claimed: {0}")]
    ReentrantOrAlreadyClaimed(String),

    #[error("Invalid merkle proof")]
    InvalidProof,

    // External value transfer
    #[error("Transfer failed: {0}")]
    TransferFailure(String),

    // Bounded iteration
    #[error("Checkpoint backlog: {pending_weeks} weeks pending, at most {max_weeks} per call")]
    CheckpointBacklog { pending_weeks: u64, max_weeks: u64 },

    // Input validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, VedistError>;
