//! Merkle allocation distributor.
//!
//! Weekly rewards are computed off-chain, published as a merkle root per week
//! index, and claimed with inclusion proofs. Claims are paid by topping up the
//! claimant's existing lock.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, instrument};

use crate::admin::Ownership;
use crate::config::VedistConfig;
use crate::escrow::VotingEscrow;
use crate::events::{Event, EventLog};
use crate::hash::{hash_allocation_leaf_v1, hash_merkle_pair_v1};
use crate::transfer::TransferService;
use crate::types::{AccountId, Amount, Timestamp, TokenId};
use crate::{Hash32, Result, VedistError};

// =============================================================================
// Tree
// =============================================================================

/// Binary merkle tree over allocation leaves with sorted-pair hashing.
///
/// An unpaired node at the end of a level is promoted unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: Vec<Hash32>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(VedistError::InvalidInput("merkle tree needs at least one leaf".into()));
        }
        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let next = levels[levels.len() - 1]
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => hash_merkle_pair_v1(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// Tree over `(account, amount)` allocations.
    pub fn from_allocations(allocations: &[(AccountId, Amount)]) -> Result<Self> {
        Self::from_leaves(
            allocations
                .iter()
                .map(|(a, amt)| hash_allocation_leaf_v1(&a.0, amt.get()))
                .collect(),
        )
    }

    pub fn root(&self) -> Hash32 {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn proof(&self, mut index: usize) -> Option<Vec<Hash32>> {
        if index >= self.levels[0].len() {
            return None;
        }
        let mut proof = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = index ^ 1;
            if let Some(node) = level.get(sibling) {
                proof.push(*node);
            }
            index /= 2;
        }
        Some(proof)
    }
}

pub fn verify_proof(proof: &[Hash32], root: &Hash32, leaf: Hash32) -> bool {
    let computed = proof
        .iter()
        .fold(leaf, |acc, node| hash_merkle_pair_v1(&acc, node));
    computed == *root
}

// =============================================================================
// Distributor
// =============================================================================

/// One week's claim in a `claim_weeks` batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeekClaim {
    pub week: u64,
    pub amount: Amount,
    pub proof: Vec<Hash32>,
}

#[derive(Clone, Debug)]
pub struct MerkleDistributor {
    token: TokenId,
    custody: AccountId,
    ownership: Ownership,
    min_lock_duration: Timestamp,
    max_claim_batch: usize,
    roots: BTreeMap<u64, Hash32>,
    // Week indexes in seeding order.
    seeded_weeks: Vec<u64>,
    remaining: BTreeMap<u64, Amount>,
    claimed: BTreeSet<(u64, AccountId)>,
    events: EventLog,
}

impl MerkleDistributor {
    pub fn new(
        owner: AccountId,
        token: TokenId,
        custody: AccountId,
        config: &VedistConfig,
    ) -> Result<Self> {
        config.validate()?;
        if owner.is_zero() || custody.is_zero() {
            return Err(VedistError::InvalidInput(
                "owner and custody must be non-zero".into(),
            ));
        }
        Ok(Self {
            token,
            custody,
            ownership: Ownership::new(owner),
            min_lock_duration: config.distributor.min_lock_duration,
            max_claim_batch: config.bounds.max_claim_batch,
            roots: BTreeMap::new(),
            seeded_weeks: Vec::new(),
            remaining: BTreeMap::new(),
            claimed: BTreeSet::new(),
            events: EventLog::new(),
        })
    }

    /// Publish `root` for `week` and pull `total` from the owner into custody.
    #[instrument(skip_all, fields(week = week, total = %total))]
    pub fn seed_allocations(
        &mut self,
        bank: &dyn TransferService,
        caller: AccountId,
        week: u64,
        root: Hash32,
        total: Amount,
    ) -> Result<()> {
        self.ownership.ensure_owner(caller)?;
        if self.roots.contains_key(&week) {
            return Err(VedistError::InvalidInput("cannot rewrite merkle root".into()));
        }
        if total.is_zero() {
            return Err(VedistError::ZeroAmount);
        }

        bank.transfer(self.token, caller, self.custody, total)?;

        self.roots.insert(week, root);
        self.seeded_weeks.push(week);
        self.remaining.insert(week, total);
        info!(week, "allocation seeded");
        self.events.emit(Event::AllocationSeeded {
            week,
            root,
            amount: total,
        });
        Ok(())
    }

    /// Claim one week's allocation into the account's lock.
    #[allow(clippy::too_many_arguments)]
    pub fn claim_week(
        &mut self,
        escrow: &mut VotingEscrow,
        bank: &dyn TransferService,
        account: AccountId,
        week: u64,
        amount: Amount,
        proof: &[Hash32],
        now: Timestamp,
    ) -> Result<Amount> {
        let claim = WeekClaim {
            week,
            amount,
            proof: proof.to_vec(),
        };
        self.claim_weeks(escrow, bank, account, std::slice::from_ref(&claim), now)
    }

    /// Claim several weeks at once; either every week is paid or none is.
    #[instrument(skip_all, fields(account = %account, weeks = claims.len()))]
    pub fn claim_weeks(
        &mut self,
        escrow: &mut VotingEscrow,
        bank: &dyn TransferService,
        account: AccountId,
        claims: &[WeekClaim],
        now: Timestamp,
    ) -> Result<Amount> {
        if claims.is_empty() || claims.len() > self.max_claim_batch {
            return Err(VedistError::InvalidInput(format!(
                "claim batch size {} outside 1..={}",
                claims.len(),
                self.max_claim_batch
            )));
        }
        if escrow.token() != self.token {
            return Err(VedistError::InvalidInput(
                "escrow locks a different token than the reward token".into(),
            ));
        }
        self.ensure_lock_duration(escrow, &account, now)?;

        let mut seen = BTreeSet::new();
        let mut remaining = Vec::with_capacity(claims.len());
        let mut total = Amount::ZERO;
        for claim in claims {
            if !seen.insert(claim.week) || self.claimed.contains(&(claim.week, account)) {
                return Err(VedistError::ReentrantOrAlreadyClaimed(format!(
                    "week {} already claimed",
                    claim.week
                )));
            }
            if claim.amount.is_zero() {
                return Err(VedistError::ZeroAmount);
            }
            let root = self.roots.get(&claim.week).ok_or_else(|| {
                VedistError::ClaimNotEligible(format!("week {} not seeded", claim.week))
            })?;
            let leaf = hash_allocation_leaf_v1(&account.0, claim.amount.get());
            if !verify_proof(&claim.proof, root, leaf) {
                return Err(VedistError::InvalidProof);
            }
            let left = self
                .remaining
                .get(&claim.week)
                .copied()
                .unwrap_or_default()
                .checked_sub(claim.amount)
                .map_err(|_| {
                    VedistError::InvalidInput(format!(
                        "week {} allocation exhausted",
                        claim.week
                    ))
                })?;
            remaining.push((claim.week, left));
            total = total.checked_add(claim.amount)?;
        }

        escrow.deposit_for(bank, self.custody, account, total, now)?;

        // Commit after all fallible computations.
        for ((week, left), claim) in remaining.into_iter().zip(claims) {
            self.claimed.insert((week, account));
            self.remaining.insert(week, left);
            self.events.emit(Event::WeekClaimed {
                account,
                week,
                amount: claim.amount,
            });
        }
        Ok(total)
    }

    fn ensure_lock_duration(
        &self,
        escrow: &VotingEscrow,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<()> {
        let required = now.saturating_add(self.min_lock_duration);
        if escrow.locked_end(account) < required {
            return Err(VedistError::ClaimNotEligible(
                "less than minLockDuration".into(),
            ));
        }
        Ok(())
    }

    pub fn set_min_lock_duration(&mut self, caller: AccountId, seconds: Timestamp) -> Result<()> {
        self.ownership.ensure_owner(caller)?;
        self.min_lock_duration = seconds;
        self.events.emit(Event::MinLockDuration { duration: seconds });
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

    pub fn verify_claim(
        &self,
        account: &AccountId,
        week: u64,
        amount: Amount,
        proof: &[Hash32],
    ) -> bool {
        match self.roots.get(&week) {
            Some(root) => {
                verify_proof(proof, root, hash_allocation_leaf_v1(&account.0, amount.get()))
            }
            None => false,
        }
    }

    /// Claimed flags for weeks `begin..=end`, at most `max_claim_batch` weeks.
    pub fn claim_status(&self, account: &AccountId, begin: u64, end: u64) -> Result<Vec<bool>> {
        let span = end.checked_sub(begin).and_then(|d| d.checked_add(1)).ok_or_else(|| {
            VedistError::InvalidInput(format!("invalid week range {begin}..={end}"))
        })?;
        if span > self.max_claim_batch as u64 {
            return Err(VedistError::InvalidInput(format!(
                "week range of {span} exceeds max_claim_batch {}",
                self.max_claim_batch
            )));
        }
        Ok((begin..=end)
            .map(|w| self.claimed.contains(&(w, *account)))
            .collect())
    }

    pub fn merkle_root(&self, week: u64) -> Option<Hash32> {
        self.roots.get(&week).copied()
    }

    pub fn seeded_weeks(&self) -> &[u64] {
        &self.seeded_weeks
    }

    pub fn remaining(&self, week: u64) -> Amount {
        self.remaining.get(&week).copied().unwrap_or_default()
    }

    pub fn min_lock_duration(&self) -> Timestamp {
        self.min_lock_duration
    }

    pub fn custody(&self) -> AccountId {
        self.custody
    }

    pub fn events(&self) -> &[Event] {
        self.events.entries()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
