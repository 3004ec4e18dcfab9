use std::fmt;

use crate::ecc::{FieldElement, GroupElement};

pub const DIGEST_LEN: usize = 32;      // Keccak-256 width
pub const SCALAR_LEN: usize = 32;      // canonical scalar encoding
pub const POINT_LEN: usize = 32;       // compressed ristretto encoding
pub const RECEIPT_LEN: usize = 32 + 32 + 8;

/// 256-bit hash value: seeds, Merkle nodes and roots.
pub type Digest = [u8; DIGEST_LEN];

/// Sibling digests, leaf to root.
pub type Path = Vec<Digest>;

/// Displays the first four bytes of an identity digest as hex, for log fields.
#[derive(Clone, Copy)]
pub struct ShortId<'a>(pub &'a Digest);

impl fmt::Display for ShortId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A contiguous block of row indices `[start, start + count)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: u64,
    pub count: u64,
}

impl Range {
    #[must_use]
    pub const fn new(start: u64, count: u64) -> Self {
        Self { start, count }
    }

    /// One past the last index. Saturates instead of wrapping so that a
    /// hostile `count` cannot fold back into bounds.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.count)
    }

    #[must_use]
    pub const fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.end()
    }
}

/// Public commitment to the seller's full matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bulletin {
    /// Row count.
    pub n: u64,
    /// Field elements per row.
    pub s: u64,
    /// Merkle root over the per-row commitments `sigma_i`.
    pub sigma_mkl_root: Digest,
}

/// One entry per demanded row, in request order. The position in the
/// mapping list is the session-local row index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub global_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub seed2_seed: Digest,
    pub demands: Vec<Range>,
}

/// `k` and `m` are both `count * s` long, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub k: Vec<GroupElement>,
    pub m: Vec<FieldElement>,
}

/// Payment authorization submitted on-chain by the buyer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub seed2: Digest,
    pub k_mkl_root: Digest,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secret {
    pub seed0: Digest,
}

/// Evidence that leaf `i * s + j` of the key tree disagrees with `seed0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub i: u64,
    pub j: u64,
    pub kij: GroupElement,
    pub mkl_path: Path,
}
