//! Merkle allocation flow: seed roots per week index, claim into locks.

use vedist_core::events::Event;
use vedist_core::invariants::check_escrow;
use vedist_core::merkle::{MerkleTree, WeekClaim};
use vedist_core::types::WEEK;
use vedist_core::{
    AccountId, Amount, InMemoryToken, MerkleDistributor, Timestamp, TokenId, TransferService,
    VedistConfig, VedistError, VotingEscrow,
};

const T0: Timestamp = 2844 * WEEK;

#[test]
fn seeded_weeks_claim_into_locks() {
    let bank = InMemoryToken::new();
    let token = TokenId::from_label("PERP");
    let admin = AccountId::from_label("admin");
    bank.mint(token, admin, Amount::from_tokens(10_000)).unwrap();

    let config = VedistConfig::builder()
        .min_lock_duration(2 * WEEK)
        .build()
        .unwrap();
    let mut ve = VotingEscrow::new(admin, token, AccountId::from_label("ve"), T0, &config).unwrap();
    let mut md =
        MerkleDistributor::new(admin, token, AccountId::from_label("merkle"), &config).unwrap();

    let accounts: Vec<AccountId> = ["a", "b", "c"]
        .iter()
        .map(|l| AccountId::from_label(l))
        .collect();
    for account in &accounts {
        bank.mint(token, *account, Amount::from_tokens(100)).unwrap();
        ve.create_lock(&bank, *account, Amount::from_tokens(100), T0 + 8 * WEEK, T0)
            .unwrap();
    }

    let week_one: Vec<(AccountId, Amount)> = accounts
        .iter()
        .zip([10u64, 20, 30])
        .map(|(a, n)| (*a, Amount::from_tokens(n)))
        .collect();
    let week_two: Vec<(AccountId, Amount)> = accounts
        .iter()
        .zip([5u64, 5, 5])
        .map(|(a, n)| (*a, Amount::from_tokens(n)))
        .collect();
    let tree_one = MerkleTree::from_allocations(&week_one).unwrap();
    let tree_two = MerkleTree::from_allocations(&week_two).unwrap();

    md.seed_allocations(&bank, admin, 1, tree_one.root(), Amount::from_tokens(60))
        .unwrap();
    md.seed_allocations(&bank, admin, 2, tree_two.root(), Amount::from_tokens(15))
        .unwrap();
    assert_eq!(md.seeded_weeks(), &[1, 2]);
    assert_eq!(bank.balance_of(token, md.custody()), Amount::from_tokens(75));

    let now = T0 + WEEK;
    let claims = vec![
        WeekClaim {
            week: 1,
            amount: Amount::from_tokens(20),
            proof: tree_one.proof(1).unwrap(),
        },
        WeekClaim {
            week: 2,
            amount: Amount::from_tokens(5),
            proof: tree_two.proof(1).unwrap(),
        },
    ];
    let paid = md.claim_weeks(&mut ve, &bank, accounts[1], &claims, now).unwrap();
    assert_eq!(paid, Amount::from_tokens(25));
    assert_eq!(ve.locked(&accounts[1]).amount, Amount::from_tokens(125));
    assert_eq!(md.claim_status(&accounts[1], 1, 2).unwrap(), vec![true, true]);
    assert_eq!(
        md.events()
            .iter()
            .filter(|e| matches!(e, Event::WeekClaimed { .. }))
            .count(),
        2
    );

    md.claim_week(
        &mut ve,
        &bank,
        accounts[2],
        1,
        Amount::from_tokens(30),
        &tree_one.proof(2).unwrap(),
        now,
    )
    .unwrap();
    assert_eq!(md.remaining(1), Amount::from_tokens(10));
    check_escrow(&ve, now).unwrap();

    // Within two weeks of the lock end the claim is refused.
    let late = T0 + 7 * WEEK;
    let err = md
        .claim_week(
            &mut ve,
            &bank,
            accounts[0],
            1,
            Amount::from_tokens(10),
            &tree_one.proof(0).unwrap(),
            late,
        )
        .unwrap_err();
    assert!(matches!(err, VedistError::ClaimNotEligible(_)));
    assert_eq!(md.claim_status(&accounts[0], 1, 1).unwrap(), vec![false]);
}

#[test]
fn claim_for_another_account_fails_proof() {
    let bank = InMemoryToken::new();
    let token = TokenId::from_label("PERP");
    let admin = AccountId::from_label("admin");
    let alice = AccountId::from_label("alice");
    let mallory = AccountId::from_label("mallory");
    bank.mint(token, admin, Amount::from_tokens(1_000)).unwrap();
    bank.mint(token, mallory, Amount::from_tokens(10)).unwrap();

    let config = VedistConfig::default();
    let mut ve = VotingEscrow::new(admin, token, AccountId::from_label("ve"), T0, &config).unwrap();
    let mut md =
        MerkleDistributor::new(admin, token, AccountId::from_label("merkle"), &config).unwrap();
    ve.create_lock(&bank, mallory, Amount::from_tokens(10), T0 + 4 * WEEK, T0)
        .unwrap();

    let tree = MerkleTree::from_allocations(&[(alice, Amount::from_tokens(50))]).unwrap();
    md.seed_allocations(&bank, admin, 7, tree.root(), Amount::from_tokens(50))
        .unwrap();

    let err = md
        .claim_week(
            &mut ve,
            &bank,
            mallory,
            7,
            Amount::from_tokens(50),
            &tree.proof(0).unwrap(),
            T0,
        )
        .unwrap_err();
    assert_eq!(err, VedistError::InvalidProof);
    assert_eq!(ve.locked(&mallory).amount, Amount::from_tokens(10));
    assert_eq!(md.remaining(7), Amount::from_tokens(50));
}
