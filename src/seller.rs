//! Seller (Alice) engine.
//!
//! `Seller` answers exactly one request and becomes a
//! `SellerRequestHandled`, which answers exactly one receipt. The seed that
//! decrypts the response leaves this module only through
//! [`SellerRequestHandled::on_receipt`], after the receipt has been checked
//! against what was actually served.

use std::sync::Arc;

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    data::SellerData,
    ecc::{ColumnGenerators, FieldElement, GroupElement},
    errors::PodError,
    hashers::{derive_seed0, derive_seed2, m_digest, root_of_k},
    keystream::derive_many,
    mapping::build_mapping,
    types::{Digest, Mapping, Range, Receipt, Request, Response, Secret, ShortId},
};

/// Deliberate deviations from the honest protocol, for exercising the
/// buyer's dispute path. `index` is a flattened cell index `r * s + j`
/// and wraps modulo the response length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cheat {
    /// Replace `k[index]` with an unrelated random group element.
    ReplaceKey(u64),
    /// Shift `k[index]` and `m[index]` by the same random amount. The
    /// response stays consistent with the published row commitments, but
    /// the buyer decrypts a wrong cell.
    CorruptCell(u64),
}

pub struct Seller<D> {
    data: Arc<D>,
    self_id: Digest,
    peer_id: Digest,
    n: u64,
    s: u64,
    cheat: Option<Cheat>,
}

impl<D: SellerData + Sync> Seller<D> {
    #[must_use]
    pub fn new(data: Arc<D>, self_id: Digest, peer_id: Digest) -> Self {
        let bulletin = data.bulletin();
        Self { data, self_id, peer_id, n: bulletin.n, s: bulletin.s, cheat: None }
    }

    /// Make this session misbehave. Only meaningful for dispute testing.
    pub fn set_cheat(&mut self, cheat: Cheat) {
        self.cheat = Some(cheat);
    }

    #[must_use]
    pub const fn self_id(&self) -> &Digest {
        &self.self_id
    }

    #[must_use]
    pub const fn peer_id(&self) -> &Digest {
        &self.peer_id
    }

    /// Encrypt and commit the demanded rows.
    ///
    /// # Errors
    /// `MalformedInput` for invalid demands, `InvalidLength` if the data
    /// accessor returns a row of the wrong width.
    pub fn on_request(self, request: Request) -> Result<(SellerRequestHandled, Response), PodError> {
        let mut entropy = [0u8; 32];
        OsRng.fill_bytes(&mut entropy);
        self.on_request_with_entropy(request, &entropy)
    }

    /// [`Self::on_request`] with caller-supplied seller randomness.
    ///
    /// # Errors
    /// Same as [`Self::on_request`].
    #[instrument(skip_all, fields(
        self_id = %ShortId(&self.self_id),
        peer_id = %ShortId(&self.peer_id),
        demands = request.demands.len()
    ))]
    pub fn on_request_with_entropy(
        self,
        request: Request,
        entropy: &Digest,
    ) -> Result<(SellerRequestHandled, Response), PodError> {
        if self.s == 0 {
            return Err(PodError::MalformedInput("bulletin has zero-width rows"));
        }
        let mappings = build_mapping(self.n, &request.demands)?;
        let count = mappings.len() as u64;
        let s = usize::try_from(self.s).map_err(|_| PodError::MalformedInput("row too wide"))?;
        let total = count
            .checked_mul(self.s)
            .ok_or(PodError::MalformedInput("response too large"))?;

        for mp in &mappings {
            let got = self.data.row(mp.global_index).len();
            if got != s {
                return Err(PodError::InvalidLength { expected: s, got });
            }
        }

        let seed0 = derive_seed0(entropy, &request.seed2_seed);
        let v = derive_many(&seed0, total);
        let gens = ColumnGenerators::new(self.s);
        let mut k = build_k(&v, &gens, s);
        let mut m = encrypt_m(self.data.as_ref(), &mappings, &v, s);
        debug!(count, s, "derived keystream and commitment keys");

        if let Some(cheat) = self.cheat {
            apply_cheat(cheat, &mut k, &mut m, &gens, s);
        }

        let k_mkl_root = root_of_k(&k);
        let seed2 = derive_seed2(&request.seed2_seed, &k_mkl_root, &m_digest(&m), count);
        info!(count, cells = total, "request handled");

        let state = SellerRequestHandled {
            self_id: self.self_id,
            peer_id: self.peer_id,
            demands: request.demands,
            mappings,
            seed0,
            seed2,
            k_mkl_root,
            count,
        };
        Ok((state, Response { k, m }))
    }
}

/// k[r*s+j] = v[r*s+j] * u_j
fn build_k(v: &[FieldElement], gens: &ColumnGenerators, s: usize) -> Vec<GroupElement> {
    #[cfg(feature = "parallel")]
    {
        v.par_iter().enumerate().map(|(idx, x)| gens.commit(idx % s, x)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        v.iter().enumerate().map(|(idx, x)| gens.commit(idx % s, x)).collect()
    }
}

/// m'[r*s+j] = m[g(r)][j] + v[r*s+j]
fn encrypt_m<D: SellerData + Sync>(
    data: &D,
    mappings: &[Mapping],
    v: &[FieldElement],
    s: usize,
) -> Vec<FieldElement> {
    let mask_row = |(mp, vr): (&Mapping, &[FieldElement])| {
        data.row(mp.global_index)
            .iter()
            .zip(vr)
            .map(|(a, b)| a + b)
            .collect::<Vec<_>>()
    };
    #[cfg(feature = "parallel")]
    {
        mappings.par_iter().zip(v.par_chunks(s)).flat_map_iter(mask_row).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        mappings.iter().zip(v.chunks(s)).flat_map(mask_row).collect()
    }
}

fn apply_cheat(
    cheat: Cheat,
    k: &mut [GroupElement],
    m: &mut [FieldElement],
    gens: &ColumnGenerators,
    s: usize,
) {
    let len = k.len();
    if len == 0 {
        return;
    }
    let wrap = |i: u64| usize::try_from(i).map_or(0, |i| i % len);
    match cheat {
        Cheat::ReplaceKey(i) => {
            let idx = wrap(i);
            k[idx] = RistrettoPoint::random(&mut OsRng);
            warn!(idx, "serving a replaced commitment key");
        }
        Cheat::CorruptCell(i) => {
            let idx = wrap(i);
            let delta = Scalar::random(&mut OsRng);
            k[idx] += gens.commit(idx % s, &delta);
            m[idx] += delta;
            warn!(idx, "serving a corrupted cell");
        }
    }
}

/// Waiting for the buyer's receipt. Holds the undisclosed `seed0`.
pub struct SellerRequestHandled {
    self_id: Digest,
    peer_id: Digest,
    demands: Vec<Range>,
    mappings: Vec<Mapping>,
    seed0: Digest,
    seed2: Digest,
    k_mkl_root: Digest,
    count: u64,
}

impl SellerRequestHandled {
    #[must_use]
    pub const fn self_id(&self) -> &Digest {
        &self.self_id
    }

    #[must_use]
    pub const fn peer_id(&self) -> &Digest {
        &self.peer_id
    }

    #[must_use]
    pub fn demands(&self) -> &[Range] {
        &self.demands
    }

    #[must_use]
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    #[must_use]
    pub const fn seed2(&self) -> &Digest {
        &self.seed2
    }

    #[must_use]
    pub const fn k_mkl_root(&self) -> &Digest {
        &self.k_mkl_root
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Disclose `seed0` iff the receipt commits to exactly what was served.
    /// The session is consumed either way.
    ///
    /// # Errors
    /// `CommitmentMismatch` if the count, key root or seed2 differ.
    #[instrument(skip_all, fields(
        self_id = %ShortId(&self.self_id),
        peer_id = %ShortId(&self.peer_id),
        count = self.count
    ))]
    pub fn on_receipt(self, receipt: &Receipt) -> Result<Secret, PodError> {
        if receipt.count != self.count {
            warn!(got = receipt.count, "receipt count mismatch");
            return Err(PodError::CommitmentMismatch("count"));
        }
        if !bool::from(receipt.k_mkl_root.ct_eq(&self.k_mkl_root)) {
            warn!("receipt key root mismatch");
            return Err(PodError::CommitmentMismatch("k_mkl_root"));
        }
        if !bool::from(receipt.seed2.ct_eq(&self.seed2)) {
            warn!("receipt seed2 mismatch");
            return Err(PodError::CommitmentMismatch("seed2"));
        }
        info!("receipt accepted, disclosing secret");
        Ok(Secret { seed0: self.seed0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::PlainSellerData, keystream::derive};

    fn seller() -> Seller<PlainSellerData> {
        let cells = (0..12u64).map(Scalar::from).collect();
        let data = Arc::new(PlainSellerData::new(4, 3, cells).unwrap());
        Seller::new(data, [1; 32], [2; 32])
    }

    fn request() -> Request {
        Request { seed2_seed: [5; 32], demands: vec![Range::new(1, 2)] }
    }

    #[test]
    fn response_is_keystream_masked() {
        let (state, resp) = seller().on_request_with_entropy(request(), &[9; 32]).unwrap();
        assert_eq!(resp.k.len(), 6);
        assert_eq!(resp.m.len(), 6);
        let seed0 = derive_seed0(&[9; 32], &[5; 32]);
        // local cell 4 is global row 2, column 1 -> plaintext 7
        assert_eq!(resp.m[4] - derive(&seed0, 4), Scalar::from(7u64));
        assert_eq!(state.count(), 2);
        assert_eq!(state.k_mkl_root(), &root_of_k(&resp.k));
    }

    #[test]
    fn rejects_invalid_demands() {
        let req = Request { seed2_seed: [0; 32], demands: vec![Range::new(3, 2)] };
        assert!(matches!(seller().on_request(req), Err(PodError::MalformedInput(_))));
    }

    #[test]
    fn receipt_must_match() {
        let (state, resp) = seller().on_request_with_entropy(request(), &[9; 32]).unwrap();
        let good = Receipt { seed2: *state.seed2(), k_mkl_root: root_of_k(&resp.k), count: 2 };

        let mut bad = good;
        bad.count = 3;
        let (s2, _) = seller().on_request_with_entropy(request(), &[9; 32]).unwrap();
        assert_eq!(s2.on_receipt(&bad), Err(PodError::CommitmentMismatch("count")));

        let secret = state.on_receipt(&good).unwrap();
        assert_eq!(secret.seed0, derive_seed0(&[9; 32], &[5; 32]));
    }

    #[test]
    fn corrupt_cell_keeps_row_relation() {
        let mut a = seller();
        a.set_cheat(Cheat::CorruptCell(1));
        let (_, resp) = a.on_request_with_entropy(request(), &[9; 32]).unwrap();
        let seed0 = derive_seed0(&[9; 32], &[5; 32]);
        let gens = ColumnGenerators::new(3);
        // k and m are shifted together: m' * u_j - k still equals m * u_j
        let lhs = gens.commit(1, &resp.m[1]) - resp.k[1];
        assert_eq!(lhs, gens.commit(1, &Scalar::from(4u64)));
        assert_ne!(resp.k[1], gens.commit(1, &derive(&seed0, 1)));
    }
}
