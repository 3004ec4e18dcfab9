use crate::{
    errors::PodError,
    types::{Mapping, Range},
};

/// Validate a demand list against a matrix of `n` rows.
///
/// Ranges must be non-empty, inside `[0, n)`, sorted by start, and strictly
/// separated: a range may not start at or before the previous range's end.
///
/// # Errors
/// Returns `PodError::MalformedInput` naming the first violated rule.
pub fn check_demands(n: u64, demands: &[Range]) -> Result<(), PodError> {
    if demands.is_empty() {
        return Err(PodError::MalformedInput("empty demand list"));
    }
    for d in demands {
        if d.count == 0 {
            return Err(PodError::MalformedInput("empty range"));
        }
        if d.start >= n || d.count > n || d.start.checked_add(d.count).map_or(true, |e| e > n) {
            return Err(PodError::MalformedInput("range out of bounds"));
        }
    }
    for w in demands.windows(2) {
        if w[1].start <= w[0].end() {
            return Err(PodError::MalformedInput("ranges unsorted or overlapping"));
        }
    }
    Ok(())
}

/// Total number of rows covered by `demands`.
#[must_use]
pub fn demands_count(demands: &[Range]) -> u64 {
    demands.iter().map(|d| d.count).sum()
}

/// Expand validated demands into one `Mapping` per local row.
///
/// # Errors
/// Propagates [`check_demands`] failures.
pub fn build_mapping(n: u64, demands: &[Range]) -> Result<Vec<Mapping>, PodError> {
    check_demands(n, demands)?;
    let count = usize::try_from(demands_count(demands))
        .map_err(|_| PodError::MalformedInput("demand count exceeds address space"))?;
    let mut mappings = Vec::with_capacity(count);
    for d in demands {
        mappings.extend((d.start..d.end()).map(|global_index| Mapping { global_index }));
    }
    Ok(mappings)
}

/// Local offset of global row `index` within `ranges`.
///
/// # Errors
/// Returns `PodError::OutOfRangeIndex` if no range covers `index`.
pub fn global_to_local_offset(ranges: &[Range], index: u64) -> Result<u64, PodError> {
    let mut offset = 0u64;
    for r in ranges {
        if r.contains(index) {
            return Ok(offset + (index - r.start));
        }
        offset += r.count;
    }
    Err(PodError::OutOfRangeIndex { index, max: ranges.last().map_or(0, Range::end) })
}
