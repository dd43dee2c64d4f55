//! Merkle root over transaction ids (spec.md §3): pairwise double-SHA-256,
//! duplicating the last element at each odd-sized level. Adapted from the
//! teacher's `crypto::merkle::MerkleTree` construction, but against plain
//! double-SHA-256 over raw hashes rather than domain-tagged SHA-512 — wire
//! compatibility with the reference network requires the exact Satoshi
//! algorithm, not a stronger hash.

use crate::crypto::hash::Hash256;

/// Computes the Merkle root of `txids`, in order.
///
/// Returns the zero hash for an empty list (an unconfirmed header with no
/// attached transactions has nothing to commit to).
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    if txids.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<[u8; 32]> = txids.iter().map(|h| h.0).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                crate::codec::double_sha256(&buf)
            })
            .collect();
    }
    Hash256(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_root_is_the_leaf_itself() {
        let leaf = Hash256::of(b"only-tx");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::zero());
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let a = Hash256::of(b"a");
        let b = Hash256::of(b"b");
        let c = Hash256::of(b"c");
        let with_three = merkle_root(&[a, b, c]);
        let with_duplicate = merkle_root(&[a, b, c, c]);
        assert_eq!(with_three, with_duplicate);
    }

    #[test]
    fn order_is_significant() {
        let a = Hash256::of(b"a");
        let b = Hash256::of(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
