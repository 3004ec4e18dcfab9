use sha3::{Digest as _, Keccak256};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    ecc::{fr_from_digest_be, FieldElement},
    types::Digest,
};

/// v[index] = Keccak256( seed || BE64(index) ) mod q
#[must_use]
pub fn derive(seed: &Digest, index: u64) -> FieldElement {
    let mut hasher = Keccak256::new();
    hasher.update(seed);
    hasher.update(index.to_be_bytes());
    let digest: Digest = hasher.finalize().into();
    fr_from_digest_be(&digest)
}

/// `derive` for every index in `0..count`, fanned out across the thread pool.
#[must_use]
pub fn derive_many(seed: &Digest, count: u64) -> Vec<FieldElement> {
    derive_range(seed, 0, count)
}

/// `derive` for every index in `start..start + count`.
#[must_use]
pub fn derive_range(seed: &Digest, start: u64, count: u64) -> Vec<FieldElement> {
    let end = start.saturating_add(count);
    #[cfg(feature = "parallel")]
    {
        (start..end).into_par_iter().map(|i| derive(seed, i)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (start..end).map(|i| derive(seed, i)).collect()
    }
}

/// Lazy keystream, for callers that consume cells one at a time.
pub struct KeyStream<'a> {
    seed: &'a Digest,
    i: u64,
    end: u64,
}

impl<'a> KeyStream<'a> {
    #[must_use]
    pub const fn new(seed: &'a Digest, count: u64) -> Self {
        Self { seed, i: 0, end: count }
    }
}

impl Iterator for KeyStream<'_> {
    type Item = FieldElement;

    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.end {
            return None;
        }
        let v = derive(self.seed, self.i);
        self.i += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.end - self.i).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}
