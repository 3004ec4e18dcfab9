use sha3::{Digest as _, Keccak256};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    domain::{TAG_M_DIGEST, TAG_SEED0, TAG_SEED2},
    ecc::{fr_to_bytes_be, g_to_bytes, FieldElement, GroupElement},
    merkle::{build_tree, Tree},
    types::Digest,
};

/// LEAF(g) = Keccak256( compressed(g) )
#[must_use]
pub fn group_leaf(g: &GroupElement) -> Digest {
    Keccak256::digest(g_to_bytes(g)).into()
}

#[must_use]
pub fn group_leaves(points: &[GroupElement]) -> Vec<Digest> {
    #[cfg(feature = "parallel")]
    {
        points.par_iter().map(group_leaf).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        points.iter().map(group_leaf).collect()
    }
}

/// Merkle tree over the commitment keys `k`, flattened row-major.
#[must_use]
pub fn tree_of_k(k: &[GroupElement]) -> Tree {
    build_tree(&group_leaves(k))
}

#[must_use]
pub fn root_of_k(k: &[GroupElement]) -> Digest {
    tree_of_k(k).root()
}

/// M = Keccak256( TAG_M_DIGEST || BE256(m[0]) || BE256(m[1]) || ... )
#[must_use]
pub fn m_digest(m: &[FieldElement]) -> Digest {
    let mut h = Keccak256::new();
    h.update(TAG_M_DIGEST);
    for x in m {
        h.update(fr_to_bytes_be(x));
    }
    h.finalize().into()
}

/// seed2 = Keccak256( TAG_SEED2 || seed2_seed || k_mkl_root || M || BE64(count) )
///
/// Both parties compute this from the response alone, so a receipt can only
/// be produced by someone holding the exact `k` and `m` that were served.
#[must_use]
pub fn derive_seed2(seed2_seed: &Digest, k_mkl_root: &Digest, m_digest: &Digest, count: u64) -> Digest {
    let mut h = Keccak256::new();
    h.update(TAG_SEED2);
    h.update(seed2_seed);
    h.update(k_mkl_root);
    h.update(m_digest);
    h.update(count.to_be_bytes());
    h.finalize().into()
}

/// seed0 = Keccak256( TAG_SEED0 || entropy || seed2_seed )
#[must_use]
pub fn derive_seed0(entropy: &Digest, seed2_seed: &Digest) -> Digest {
    let mut h = Keccak256::new();
    h.update(TAG_SEED0);
    h.update(entropy);
    h.update(seed2_seed);
    h.finalize().into()
}
