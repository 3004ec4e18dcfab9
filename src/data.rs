//! Read-only access to the published matrix.
//!
//! The engines are generic over these capabilities; the in-memory types
//! below serve tests, benches and small deployments. Loading from disk is
//! the publisher's business.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    ecc::{multi_exp, ColumnGenerators, FieldElement, GroupElement},
    errors::PodError,
    hashers::group_leaves,
    merkle::build_tree,
    types::Bulletin,
};

/// Seller-side view: the bulletin and the plaintext rows.
pub trait SellerData {
    fn bulletin(&self) -> Bulletin;

    /// Row `i`, exactly `bulletin().s` cells. Callers stay below `bulletin().n`.
    fn row(&self, i: u64) -> &[FieldElement];
}

/// Buyer-side view: the bulletin and, when published, the per-row
/// commitments `sigma_i`.
pub trait BuyerData {
    fn bulletin(&self) -> Bulletin;

    fn sigma(&self, _i: u64) -> Option<GroupElement> {
        None
    }
}

/// sigma_i = sum_j m_ij * u_j
#[must_use]
pub fn calc_sigma(cells: &[FieldElement], s: u64, gens: &ColumnGenerators) -> Vec<GroupElement> {
    let width = usize::try_from(s).unwrap_or(usize::MAX).max(1);
    #[cfg(feature = "parallel")]
    {
        cells.par_chunks(width).map(|row| multi_exp(row, gens.as_slice())).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        cells.chunks(width).map(|row| multi_exp(row, gens.as_slice())).collect()
    }
}

#[derive(Clone, Debug)]
pub struct PlainSellerData {
    bulletin: Bulletin,
    s: usize,
    cells: Vec<FieldElement>,
    sigmas: Vec<GroupElement>,
}

impl PlainSellerData {
    /// Wrap an `n x s` row-major matrix and publish its bulletin.
    ///
    /// # Errors
    /// Returns `PodError::MalformedInput` for a zero dimension and
    /// `PodError::InvalidLength` if `cells.len() != n * s`.
    pub fn new(n: u64, s: u64, cells: Vec<FieldElement>) -> Result<Self, PodError> {
        if n == 0 || s == 0 {
            return Err(PodError::MalformedInput("matrix dimensions must be non-zero"));
        }
        let expected = n
            .checked_mul(s)
            .and_then(|x| usize::try_from(x).ok())
            .ok_or(PodError::MalformedInput("matrix too large"))?;
        if cells.len() != expected {
            return Err(PodError::InvalidLength { expected, got: cells.len() });
        }
        let width = usize::try_from(s).map_err(|_| PodError::MalformedInput("row too wide"))?;
        let gens = ColumnGenerators::new(s);
        let sigmas = calc_sigma(&cells, s, &gens);
        let sigma_mkl_root = build_tree(&group_leaves(&sigmas)).root();
        tracing::debug!(n, s, "published matrix bulletin");
        Ok(Self { bulletin: Bulletin { n, s, sigma_mkl_root }, s: width, cells, sigmas })
    }

    #[must_use]
    pub fn sigmas(&self) -> &[GroupElement] {
        &self.sigmas
    }
}

impl SellerData for PlainSellerData {
    fn bulletin(&self) -> Bulletin {
        self.bulletin
    }

    fn row(&self, i: u64) -> &[FieldElement] {
        let start = usize::try_from(i).map_or(usize::MAX, |i| i.saturating_mul(self.s));
        self.cells.get(start..start.saturating_add(self.s)).unwrap_or(&[])
    }
}

#[derive(Clone, Debug)]
pub struct PlainBuyerData {
    bulletin: Bulletin,
    sigmas: Option<Vec<GroupElement>>,
}

impl PlainBuyerData {
    /// Bounds only; no encrypted-data check is possible.
    #[must_use]
    pub const fn new(bulletin: Bulletin) -> Self {
        Self { bulletin, sigmas: None }
    }

    /// Bulletin plus the published row commitments.
    ///
    /// # Errors
    /// Returns `PodError::InvalidLength` if there is not one sigma per row, or
    /// `PodError::SigmaRootMismatch` if they do not hash to the bulletin root.
    pub fn with_sigmas(bulletin: Bulletin, sigmas: Vec<GroupElement>) -> Result<Self, PodError> {
        let n = usize::try_from(bulletin.n).map_err(|_| PodError::MalformedInput("n too large"))?;
        if sigmas.len() != n {
            return Err(PodError::InvalidLength { expected: n, got: sigmas.len() });
        }
        if build_tree(&group_leaves(&sigmas)).root() != bulletin.sigma_mkl_root {
            return Err(PodError::SigmaRootMismatch);
        }
        Ok(Self { bulletin, sigmas: Some(sigmas) })
    }
}

impl BuyerData for PlainBuyerData {
    fn bulletin(&self) -> Bulletin {
        self.bulletin
    }

    fn sigma(&self, i: u64) -> Option<GroupElement> {
        let i = usize::try_from(i).ok()?;
        self.sigmas.as_ref()?.get(i).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::scalar::Scalar;

    fn matrix(n: u64, s: u64) -> Vec<FieldElement> {
        (0..n * s).map(|x| Scalar::from(x * 3 + 1)).collect()
    }

    #[test]
    fn rows_and_bulletin() {
        let a = PlainSellerData::new(3, 2, matrix(3, 2)).unwrap();
        assert_eq!(a.bulletin().n, 3);
        assert_eq!(a.bulletin().s, 2);
        assert_eq!(a.row(1), &[Scalar::from(7u64), Scalar::from(10u64)]);
        assert!(a.row(3).is_empty());
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(matches!(PlainSellerData::new(3, 2, matrix(3, 1)), Err(PodError::InvalidLength { .. })));
        assert!(PlainSellerData::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn buyer_checks_sigma_root() {
        let a = PlainSellerData::new(4, 3, matrix(4, 3)).unwrap();
        let b = PlainBuyerData::with_sigmas(a.bulletin(), a.sigmas().to_vec()).unwrap();
        assert_eq!(b.sigma(2), Some(a.sigmas()[2]));
        assert_eq!(b.sigma(4), None);

        let mut forged = a.sigmas().to_vec();
        forged.swap(0, 1);
        assert!(matches!(
            PlainBuyerData::with_sigmas(a.bulletin(), forged),
            Err(PodError::SigmaRootMismatch)
        ));
        assert_eq!(PlainBuyerData::new(a.bulletin()).sigma(0), None);
    }
}
