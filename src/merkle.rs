//! Binary Merkle commitment with single-leaf and contiguous-range proofs.
//!
//! Conventions shared by every party (the judge recomputes them bit for bit):
//! - `combine(a, b) = Keccak256(a || b)`, left child first.
//! - Leaves are padded on the right with 32 zero bytes up to a power of two.
//! - A one-leaf tree has the leaf itself as root and an empty path.
//! - Sibling paths run from the leaf level upward.

use sha3::{Digest as _, Keccak256};
use subtle::ConstantTimeEq;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    domain::EMPTY_DIGEST,
    types::{Digest, Path, Range},
};

#[inline]
#[must_use]
pub fn combine(left: &Digest, right: &Digest) -> Digest {
    let mut h = Keccak256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// `ceil(log2(n))`, with `log2_ub(0) == log2_ub(1) == 0`.
#[must_use]
pub const fn log2_ub(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// Smallest power of two `>= n` (1 for `n <= 1`).
#[must_use]
pub const fn pow2_ub(n: u64) -> u64 {
    1u64 << log2_ub(n)
}

#[inline]
fn ct_eq(a: &Digest, b: &Digest) -> bool {
    a.ct_eq(b).into()
}

/// A fully materialized tree. `levels[0]` holds the padded leaves and the
/// last level holds the root alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    item_count: u64,
    levels: Vec<Vec<Digest>>,
}

impl Tree {
    /// Number of real (unpadded) leaves.
    #[must_use]
    pub const fn item_count(&self) -> u64 {
        self.item_count
    }

    /// Path length for any leaf.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    #[must_use]
    pub fn root(&self) -> Digest {
        // levels is never empty: build_tree always pushes the leaf level.
        self.levels.last().and_then(|l| l.first()).copied().unwrap_or(EMPTY_DIGEST)
    }

    #[must_use]
    pub fn leaf(&self, index: u64) -> Option<&Digest> {
        if index >= self.item_count {
            return None;
        }
        self.levels[0].get(usize::try_from(index).ok()?)
    }
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    #[cfg(feature = "parallel")]
    {
        level.par_chunks(2).map(|c| combine(&c[0], &c[1])).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        level.chunks(2).map(|c| combine(&c[0], &c[1])).collect()
    }
}

/// Build the tree bottom-up; each level's pairwise combine runs in parallel.
#[must_use]
pub fn build_tree(leaves: &[Digest]) -> Tree {
    let item_count = leaves.len() as u64;
    let padded = usize::try_from(pow2_ub(item_count)).unwrap_or(usize::MAX);
    let mut first = Vec::with_capacity(padded);
    first.extend_from_slice(leaves);
    first.resize(padded.max(1), EMPTY_DIGEST);

    let mut levels = vec![first];
    while levels[levels.len() - 1].len() > 1 {
        let next = next_level(&levels[levels.len() - 1]);
        levels.push(next);
    }
    Tree { item_count, levels }
}

#[must_use]
pub fn root(tree: &Tree) -> Digest {
    tree.root()
}

/// Streaming root over `item_count` items without materializing the tree.
#[must_use]
pub fn calc_root(get_item: impl Fn(u64) -> Digest, item_count: u64) -> Digest {
    let count = pow2_ub(item_count);
    // (digest, height)
    let mut stack: Vec<(Digest, u32)> = Vec::with_capacity(65);
    let mut offset = 0u64;
    loop {
        if stack.len() >= 2 {
            let n = stack.len();
            if stack[n - 1].1 == stack[n - 2].1 {
                let (right, _) = stack[n - 1];
                let (left, height) = stack[n - 2];
                stack.truncate(n - 2);
                stack.push((combine(&left, &right), height + 1));
                continue;
            }
        }
        if offset == count {
            break;
        }
        let item = if offset < item_count { get_item(offset) } else { EMPTY_DIGEST };
        stack.push((item, 0));
        offset += 1;
    }
    stack.first().map_or(EMPTY_DIGEST, |(d, _)| *d)
}

/// Sibling digests for `leaf_index`, `ceil(log2(padded_count))` long.
/// Returns `None` if the index is not a real leaf.
#[must_use]
pub fn path_for_leaf(tree: &Tree, leaf_index: u64) -> Option<Path> {
    if leaf_index >= tree.item_count {
        return None;
    }
    let mut idx = usize::try_from(leaf_index).ok()?;
    let mut path = Vec::with_capacity(tree.depth());
    for level in &tree.levels[..tree.depth()] {
        path.push(level[idx ^ 1]);
        idx >>= 1;
    }
    Some(path)
}

/// Recompute the root from `leaf_value` and its siblings.
#[must_use]
pub fn verify_leaf_path(
    leaf_value: &Digest,
    leaf_index: u64,
    total_count: u64,
    root: &Digest,
    path: &[Digest],
) -> bool {
    if leaf_index >= total_count {
        return false;
    }
    if path.len() != log2_ub(total_count) as usize {
        return false;
    }
    let mut acc = *leaf_value;
    let mut pos = leaf_index;
    for sib in path {
        acc = if pos & 1 == 0 { combine(&acc, sib) } else { combine(sib, &acc) };
        pos >>= 1;
    }
    ct_eq(&acc, root)
}

/// Decompose `range` into maximal aligned power-of-two blocks, greedily
/// from the left: at each step take the largest `2^i` that divides the
/// current start and does not exceed what is left. A range whose end
/// does not fit in a `u64` yields no blocks.
#[must_use]
pub fn split_range(range: &Range) -> Vec<Range> {
    if range.start.checked_add(range.count).is_none() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = range.start;
    let mut count = range.count;
    let max_level = log2_ub(count).min(63);

    while count > 0 {
        let mut size = 1u64;
        for i in (0..=max_level).rev() {
            let d = 1u64 << i;
            if start % d != 0 {
                continue;
            }
            size = d;
            while size > count {
                size /= 2;
            }
            break;
        }
        out.push(Range { start, count: size });
        start += size;
        count -= size;
    }
    out
}

/// Siblings needed above each sub-block of `split_range(range)`, blocks in
/// order, each block's siblings leaf-level first. Blocks carry no internal
/// data: a verifier holding the block's leaves recomputes its local root.
///
/// Returns `None` if `range` is empty or not inside `[0, item_count)`.
#[must_use]
pub fn path_for_range(tree: &Tree, range: &Range) -> Option<Path> {
    let item_count = tree.item_count;
    if range.count == 0 || range.start >= item_count || range.end() > item_count {
        return None;
    }
    let depth = tree.depth();
    let mut path = Vec::new();
    for r in split_range(range) {
        let level = log2_ub(r.count) as usize;
        let mut node = usize::try_from(r.start / r.count).ok()?;
        for nodes in &tree.levels[level..depth] {
            path.push(nodes[node ^ 1]);
            node >>= 1;
        }
    }
    Some(path)
}

/// Verify a range proof produced by [`path_for_range`]. `get_item(i)`
/// yields the leaf at global index `i` for every `i` in `range`.
#[must_use]
pub fn verify_range_path(
    get_item: impl Fn(u64) -> Digest,
    range: &Range,
    item_count: u64,
    root: &Digest,
    path: &[Digest],
) -> bool {
    if range.count == 0 || range.start >= item_count || range.end() > item_count {
        return false;
    }
    if item_count == 1 {
        return path.is_empty() && ct_eq(&get_item(0), root);
    }

    let depth = log2_ub(item_count);
    let blocks = split_range(range);
    if blocks.is_empty() {
        return false;
    }
    let mut expected = 0usize;
    for b in &blocks {
        if !b.count.is_power_of_two() || b.start % b.count != 0 {
            return false;
        }
        expected += (depth - log2_ub(b.count)) as usize;
    }
    if expected != path.len() {
        return false;
    }

    let mut siblings = path.iter();
    for b in &blocks {
        let mut pos = b.start / b.count;
        let mut acc = calc_root(
            |i| {
                let off = b.start + i;
                if off >= item_count { EMPTY_DIGEST } else { get_item(off) }
            },
            b.count,
        );
        for _ in log2_ub(b.count)..depth {
            let Some(sib) = siblings.next() else { return false };
            acc = if pos & 1 == 0 { combine(&acc, sib) } else { combine(sib, &acc) };
            pos >>= 1;
        }
        if !ct_eq(&acc, root) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u64) -> Vec<Digest> {
        (0..n)
            .map(|i| {
                let mut d = [0u8; 32];
                d[..8].copy_from_slice(&i.to_be_bytes());
                d[31] = 0xA5;
                d
            })
            .collect()
    }

    #[test]
    fn log2_and_pow2() {
        assert_eq!(log2_ub(1), 0);
        assert_eq!(log2_ub(2), 1);
        assert_eq!(log2_ub(3), 2);
        assert_eq!(log2_ub(8), 3);
        assert_eq!(log2_ub(9), 4);
        assert_eq!(pow2_ub(5), 8);
        assert_eq!(pow2_ub(1), 1);
    }

    #[test]
    fn single_leaf_tree_is_its_leaf() {
        let l = leaves(1);
        let t = build_tree(&l);
        assert_eq!(t.root(), l[0]);
        assert_eq!(path_for_leaf(&t, 0), Some(vec![]));
        assert!(verify_leaf_path(&l[0], 0, 1, &t.root(), &[]));
    }

    #[test]
    fn padding_uses_zero_digest() {
        let l = leaves(3);
        let t = build_tree(&l);
        let expected = combine(&combine(&l[0], &l[1]), &combine(&l[2], &EMPTY_DIGEST));
        assert_eq!(t.root(), expected);
        assert_eq!(calc_root(|i| l[i as usize], 3), expected);
    }

    #[test]
    fn leaf_paths_verify_and_reject_tampering() {
        let l = leaves(6);
        let t = build_tree(&l);
        let r = t.root();
        for i in 0..6u64 {
            let p = path_for_leaf(&t, i).unwrap();
            assert_eq!(p.len(), 3);
            assert!(verify_leaf_path(&l[i as usize], i, 6, &r, &p));
            assert!(!verify_leaf_path(&l[i as usize], i ^ 1, 6, &r, &p));
            let mut bad = p.clone();
            bad[0][0] ^= 1;
            assert!(!verify_leaf_path(&l[i as usize], i, 6, &r, &bad));
        }
        assert!(path_for_leaf(&t, 6).is_none());
        assert!(!verify_leaf_path(&l[0], 6, 6, &r, &[[0u8; 32]; 3]));
    }

    #[test]
    fn split_range_is_greedy_and_aligned() {
        let r = split_range(&Range::new(3, 10));
        assert_eq!(r, vec![Range::new(3, 1), Range::new(4, 4), Range::new(8, 4), Range::new(12, 1)]);
        assert_eq!(split_range(&Range::new(0, 8)), vec![Range::new(0, 8)]);
        assert_eq!(split_range(&Range::new(0, 5)), vec![Range::new(0, 4), Range::new(4, 1)]);
        assert_eq!(split_range(&Range::new(6, 2)), vec![Range::new(6, 2)]);
    }

    #[test]
    fn split_range_stops_at_the_top_of_u64() {
        assert!(split_range(&Range::new(u64::MAX, 2)).is_empty());
        assert!(split_range(&Range::new(1, u64::MAX)).is_empty());
        assert_eq!(split_range(&Range::new(u64::MAX - 1, 1)), vec![Range::new(u64::MAX - 1, 1)]);
        assert_eq!(
            split_range(&Range::new(u64::MAX - 2, 2)),
            vec![Range::new(u64::MAX - 2, 1), Range::new(u64::MAX - 1, 1)]
        );
        assert!(!verify_range_path(|_| EMPTY_DIGEST, &Range::new(2, u64::MAX), u64::MAX, &EMPTY_DIGEST, &[]));
    }

    #[test]
    fn range_paths_verify() {
        let l = leaves(13);
        let t = build_tree(&l);
        let root = t.root();
        for start in 0..13u64 {
            for count in 1..=(13 - start) {
                let range = Range::new(start, count);
                let p = path_for_range(&t, &range).unwrap();
                assert!(verify_range_path(|i| l[i as usize], &range, 13, &root, &p), "{range:?}");
            }
        }
    }

    #[test]
    fn range_path_rejects_wrong_leaf() {
        let l = leaves(8);
        let t = build_tree(&l);
        let range = Range::new(2, 5);
        let p = path_for_range(&t, &range).unwrap();
        let mut forged = l.clone();
        forged[4][0] ^= 0xFF;
        assert!(!verify_range_path(|i| forged[i as usize], &range, 8, &t.root(), &p));
        assert!(path_for_range(&t, &Range::new(7, 2)).is_none());
    }
}
