use crate::Hash32;
use sha2::{Digest, Sha256};

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash32(bytes)
}

// =============================================================================
// Domain separation (v1)
// =============================================================================

/// Domain separation tag for deriving account ids from labels.
pub const ACCOUNT_ID_DOMAIN_V1: &[u8] = b"VEDIST_ACCOUNT_ID_V1";

/// Domain separation tag for deriving token ids from labels.
pub const TOKEN_ID_DOMAIN_V1: &[u8] = b"VEDIST_TOKEN_ID_V1";

/// Domain separation tag for merkle allocation leaves.
pub const MERKLE_LEAF_DOMAIN_V1: &[u8] = b"VEDIST_MERKLE_LEAF_V1";

/// Domain separation tag for merkle interior nodes.
pub const MERKLE_NODE_DOMAIN_V1: &[u8] = b"VEDIST_MERKLE_NODE_V1";

/// Hash an allocation leaf: `H(LEAF || account || amount_be)`.
pub fn hash_allocation_leaf_v1(account: &[u8; 32], amount: u128) -> Hash32 {
    let mut preimage = Vec::with_capacity(48);
    preimage.extend_from_slice(account);
    preimage.extend_from_slice(&amount.to_be_bytes());
    sha256_domain(MERKLE_LEAF_DOMAIN_V1, &preimage)
}

/// Hash two merkle children in sorted order so proofs need no direction bits.
pub fn hash_merkle_pair_v1(a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&lo.0);
    preimage[32..].copy_from_slice(&hi.0);
    sha256_domain(MERKLE_NODE_DOMAIN_V1, &preimage)
}
