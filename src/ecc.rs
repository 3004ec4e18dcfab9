//! Thin layer over the Ristretto255 group and its scalar field.
//!
//! The protocol only needs add/sub/mul on scalars, scalar multiplication
//! and multi-scalar multiplication on points, and canonical 32-byte
//! encodings. Everything else stays inside `curve25519-dalek`.

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::VartimeMultiscalarMul,
};
use sha2::Sha512;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{domain::TAG_U1, types::Digest};

pub type FieldElement = Scalar;
pub type GroupElement = RistrettoPoint;

#[inline]
#[must_use]
pub fn fr_to_bytes(f: &FieldElement) -> [u8; 32] {
    f.to_bytes()
}

/// Big-endian scalar bytes. Every scalar fed into a hash uses this form.
#[must_use]
pub fn fr_to_bytes_be(f: &FieldElement) -> [u8; 32] {
    let mut be = f.to_bytes();
    be.reverse();
    be
}

/// Decode a canonical scalar. Non-reduced encodings are rejected.
#[must_use]
pub fn fr_from_bytes(b: &[u8; 32]) -> Option<FieldElement> {
    Option::from(Scalar::from_canonical_bytes(*b))
}

#[inline]
#[must_use]
pub fn g_to_bytes(g: &GroupElement) -> [u8; 32] {
    g.compress().to_bytes()
}

#[must_use]
pub fn g_from_bytes(b: &[u8; 32]) -> Option<GroupElement> {
    CompressedRistretto(*b).decompress()
}

/// Read a digest as a big-endian integer and reduce it modulo the group order.
#[must_use]
pub fn fr_from_digest_be(d: &Digest) -> FieldElement {
    let mut le = *d;
    le.reverse();
    Scalar::from_bytes_mod_order(le)
}

/// Public generator for column `j`.
#[must_use]
pub fn column_generator(j: u64) -> GroupElement {
    let mut seed = Vec::with_capacity(TAG_U1.len() + 20);
    seed.extend_from_slice(TAG_U1);
    seed.extend_from_slice(j.to_string().as_bytes());
    RistrettoPoint::hash_from_bytes::<Sha512>(&seed)
}

/// `commit(j, v) = v * u_j` with a freshly derived generator. The judge
/// path uses this; the engines use the cached [`ColumnGenerators`].
#[must_use]
pub fn commit(j: u64, v: &FieldElement) -> GroupElement {
    column_generator(j) * v
}

#[must_use]
pub fn multi_exp(scalars: &[FieldElement], points: &[GroupElement]) -> GroupElement {
    debug_assert_eq!(scalars.len(), points.len());
    RistrettoPoint::vartime_multiscalar_mul(scalars, points)
}

/// Generators `u_0 .. u_{s-1}` derived once per session.
#[derive(Clone, Debug)]
pub struct ColumnGenerators {
    u: Vec<GroupElement>,
}

impl ColumnGenerators {
    #[must_use]
    pub fn new(s: u64) -> Self {
        #[cfg(feature = "parallel")]
        let u = (0..s).into_par_iter().map(column_generator).collect();
        #[cfg(not(feature = "parallel"))]
        let u = (0..s).map(column_generator).collect();
        Self { u }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.u.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[GroupElement] {
        &self.u
    }

    /// # Panics
    /// Panics if `j` is not below the column count the set was built for.
    #[inline]
    #[must_use]
    pub fn commit(&self, j: usize, v: &FieldElement) -> GroupElement {
        self.u[j] * v
    }
}
