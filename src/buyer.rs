//! Buyer (Bob) engine.
//!
//! Each protocol step consumes the previous state, so a response cannot be
//! checked twice and a claim cannot exist without a failed decryption.

use std::{io::Write, sync::Arc};

use curve25519_dalek::traits::IsIdentity;
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    data::BuyerData,
    ecc::{fr_to_bytes, multi_exp, ColumnGenerators, FieldElement, GroupElement},
    errors::PodError,
    hashers::{derive_seed2, m_digest, tree_of_k},
    keystream::derive_many,
    mapping::{build_mapping, demands_count},
    merkle::{path_for_leaf, Tree},
    types::{Claim, Digest, Mapping, Range, Receipt, Request, Response, Secret, ShortId},
};

/// Fresh per-call coefficients for the batched checks.
fn random_coefficients(count: u64) -> Vec<FieldElement> {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    derive_many(&seed, count)
}

pub struct Buyer<D> {
    data: Arc<D>,
    self_id: Digest,
    peer_id: Digest,
    s: u64,
    demands: Vec<Range>,
    mappings: Vec<Mapping>,
}

impl<D: BuyerData + Sync> Buyer<D> {
    /// Start a session for `demands`.
    ///
    /// # Errors
    /// `MalformedInput` if the demands are invalid for the bulletin.
    pub fn new(data: Arc<D>, self_id: Digest, peer_id: Digest, demands: Vec<Range>) -> Result<Self, PodError> {
        let bulletin = data.bulletin();
        if bulletin.s == 0 {
            return Err(PodError::MalformedInput("bulletin has zero-width rows"));
        }
        let mappings = build_mapping(bulletin.n, &demands)?;
        Ok(Self { data, self_id, peer_id, s: bulletin.s, demands, mappings })
    }

    #[must_use]
    pub const fn self_id(&self) -> &Digest {
        &self.self_id
    }

    #[must_use]
    pub const fn peer_id(&self) -> &Digest {
        &self.peer_id
    }

    #[must_use]
    pub fn get_request(self) -> (BuyerRequestSent<D>, Request) {
        let mut seed2_seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed2_seed);
        self.get_request_with_seed(seed2_seed)
    }

    #[must_use]
    pub fn get_request_with_seed(self, seed2_seed: Digest) -> (BuyerRequestSent<D>, Request) {
        let request = Request { seed2_seed, demands: self.demands.clone() };
        debug!(
            self_id = %ShortId(&self.self_id),
            peer_id = %ShortId(&self.peer_id),
            demands = self.demands.len(),
            "request built"
        );
        (BuyerRequestSent { inner: self, seed2_seed }, request)
    }
}

pub struct BuyerRequestSent<D> {
    inner: Buyer<D>,
    seed2_seed: Digest,
}

impl<D: BuyerData + Sync> BuyerRequestSent<D> {
    /// Check the response's shape (and, when the buyer holds the published
    /// row commitments, its consistency with them) and produce the receipt.
    /// No secret is needed for this step.
    ///
    /// # Errors
    /// `InvalidLength` on a wrong-sized `k` or `m`; `EncryptedDataMismatch`
    /// if `m` and `k` do not open the published row commitments.
    #[instrument(skip_all, fields(
        self_id = %ShortId(&self.inner.self_id),
        peer_id = %ShortId(&self.inner.peer_id),
        count = self.inner.mappings.len()
    ))]
    pub fn on_response(self, response: Response) -> Result<(BuyerResponseChecked, Receipt), PodError> {
        let Buyer { data, self_id, peer_id, s, demands, mappings } = self.inner;
        let count = demands_count(&demands);
        let total = count
            .checked_mul(s)
            .and_then(|t| usize::try_from(t).ok())
            .ok_or(PodError::MalformedInput("response too large"))?;
        if response.k.len() != total {
            return Err(PodError::InvalidLength { expected: total, got: response.k.len() });
        }
        if response.m.len() != total {
            return Err(PodError::InvalidLength { expected: total, got: response.m.len() });
        }

        let gens = ColumnGenerators::new(s);
        let sigmas: Option<Vec<GroupElement>> =
            mappings.iter().map(|mp| data.sigma(mp.global_index)).collect();
        if let Some(sigmas) = sigmas {
            check_encrypted_m(&response, &sigmas, &gens)?;
            debug!("encrypted data matches row commitments");
        }

        let k_tree = tree_of_k(&response.k);
        let k_mkl_root = k_tree.root();
        let seed2 = derive_seed2(&self.seed2_seed, &k_mkl_root, &m_digest(&response.m), count);
        let receipt = Receipt { seed2, k_mkl_root, count };
        info!(count, cells = total, "response checked, receipt issued");

        let state = BuyerResponseChecked {
            self_id,
            peer_id,
            s,
            demands,
            mappings,
            gens,
            k: response.k,
            m: response.m,
            k_tree,
            receipt,
        };
        Ok((state, receipt))
    }
}

/// sum_j m'_rj * u_j == sigma_g(r) + sum_j k_rj for every row, as one random
/// linear combination over rows.
fn check_encrypted_m(
    response: &Response,
    sigmas: &[GroupElement],
    gens: &ColumnGenerators,
) -> Result<(), PodError> {
    let s = gens.len();
    let coef = random_coefficients(sigmas.len() as u64);

    let mut col = vec![FieldElement::ZERO; s];
    for (r, c) in coef.iter().enumerate() {
        for (j, acc) in col.iter_mut().enumerate() {
            *acc += c * response.m[r * s + j];
        }
    }

    let mut scalars = Vec::with_capacity(s + sigmas.len() * (s + 1));
    let mut points = Vec::with_capacity(scalars.capacity());
    scalars.extend_from_slice(&col);
    points.extend_from_slice(gens.as_slice());
    for (r, c) in coef.iter().enumerate() {
        let neg = -c;
        scalars.push(neg);
        points.push(sigmas[r]);
        for j in 0..s {
            scalars.push(neg);
            points.push(response.k[r * s + j]);
        }
    }

    if multi_exp(&scalars, &points).is_identity() {
        Ok(())
    } else {
        warn!("encrypted data does not open the published row commitments");
        Err(PodError::EncryptedDataMismatch)
    }
}

/// Receipt issued; waiting for the seller's secret.
pub struct BuyerResponseChecked {
    self_id: Digest,
    peer_id: Digest,
    s: u64,
    demands: Vec<Range>,
    mappings: Vec<Mapping>,
    gens: ColumnGenerators,
    k: Vec<GroupElement>,
    m: Vec<FieldElement>,
    k_tree: Tree,
    receipt: Receipt,
}

impl BuyerResponseChecked {
    #[must_use]
    pub const fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    #[must_use]
    pub const fn peer_id(&self) -> &Digest {
        &self.peer_id
    }

    /// Batched check: one multi-scalar multiplication over all `count * s`
    /// cells plus `s` generator terms, with fresh random coefficients.
    ///
    /// # Errors
    /// `InvalidLength` if `v` does not cover every committed cell,
    /// `BatchCheckFailed` if some `k[idx] != v[idx] * u_j` (with
    /// overwhelming probability).
    pub fn check_k_batched(&self, v: &[FieldElement]) -> Result<(), PodError> {
        self.check_keystream_len(v)?;
        let s = self.gens.len();
        let coef = random_coefficients(v.len() as u64);

        let mut col = vec![FieldElement::ZERO; s];
        for (idx, (c, x)) in coef.iter().zip(v).enumerate() {
            col[idx % s] += c * x;
        }

        let mut scalars = coef;
        let mut points = self.k.clone();
        scalars.extend(col.iter().map(|x| -x));
        points.extend_from_slice(self.gens.as_slice());

        if multi_exp(&scalars, &points).is_identity() {
            Ok(())
        } else {
            Err(PodError::BatchCheckFailed)
        }
    }

    fn check_keystream_len(&self, v: &[FieldElement]) -> Result<(), PodError> {
        if v.len() == self.k.len() {
            Ok(())
        } else {
            Err(PodError::InvalidLength { expected: self.k.len(), got: v.len() })
        }
    }

    /// Direct check: first flattened index whose key disagrees with `v`.
    ///
    /// # Errors
    /// `InvalidLength` if `v` does not cover every committed cell.
    pub fn find_mismatch(&self, v: &[FieldElement]) -> Result<Option<u64>, PodError> {
        self.check_keystream_len(v)?;
        let s = self.gens.len();
        let bad = |(idx, (k, x)): (usize, (&GroupElement, &FieldElement))| *k != self.gens.commit(idx % s, x);
        #[cfg(feature = "parallel")]
        let pos = self.k.par_iter().zip(v.par_iter()).enumerate().position_first(bad);
        #[cfg(not(feature = "parallel"))]
        let pos = self.k.iter().zip(v.iter()).enumerate().position(bad);
        Ok(pos.map(|p| p as u64))
    }

    /// Decrypt with the disclosed seed, or localize the first bad cell.
    ///
    /// # Errors
    /// `LocalizationFailed` if the batched check failed but every cell
    /// checks out individually.
    #[instrument(skip_all, fields(
        self_id = %ShortId(&self.self_id),
        peer_id = %ShortId(&self.peer_id),
        count = self.receipt.count
    ))]
    pub fn on_secret(self, secret: &Secret) -> Result<SecretOutcome, PodError> {
        let v = derive_many(&secret.seed0, self.k.len() as u64);

        match self.check_k_batched(&v) {
            Ok(()) => {
                let plaintext = decrypt_m(&self.m, &v);
                info!(cells = plaintext.len(), "secret verified, data decrypted");
                Ok(SecretOutcome::Decrypted(BuyerDecrypted {
                    s: self.s,
                    demands: self.demands,
                    mappings: self.mappings,
                    plaintext,
                }))
            }
            Err(e) => {
                warn!(error = %e, "falling back to per-cell key check");
                let Some(idx) = self.find_mismatch(&v)? else {
                    return Err(PodError::LocalizationFailed);
                };
                let mkl_path = path_for_leaf(&self.k_tree, idx).ok_or(PodError::LocalizationFailed)?;
                let (i, j) = (idx / self.s, idx % self.s);
                warn!(i, j, "seller committed a key that does not match the secret");
                let kij = self.k[usize::try_from(idx).map_err(|_| PodError::LocalizationFailed)?];
                Ok(SecretOutcome::Disputed(BuyerDisputed { claim: Claim { i, j, kij, mkl_path } }))
            }
        }
    }
}

/// m[idx] = m'[idx] - v[idx]
fn decrypt_m(m: &[FieldElement], v: &[FieldElement]) -> Vec<FieldElement> {
    #[cfg(feature = "parallel")]
    {
        m.par_iter().zip(v.par_iter()).map(|(a, b)| a - b).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        m.iter().zip(v).map(|(a, b)| a - b).collect()
    }
}

pub enum SecretOutcome {
    Decrypted(BuyerDecrypted),
    Disputed(BuyerDisputed),
}

impl SecretOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Decrypted(_))
    }
}

pub struct BuyerDecrypted {
    s: u64,
    demands: Vec<Range>,
    mappings: Vec<Mapping>,
    plaintext: Vec<FieldElement>,
}

impl BuyerDecrypted {
    /// Recovered cells, row-major in request order.
    #[must_use]
    pub fn plaintext(&self) -> &[FieldElement] {
        &self.plaintext
    }

    #[must_use]
    pub fn demands(&self) -> &[Range] {
        &self.demands
    }

    /// `(global_row, cells)` for every demanded row.
    pub fn rows(&self) -> impl Iterator<Item = (u64, &[FieldElement])> + '_ {
        let width = usize::try_from(self.s).unwrap_or(usize::MAX);
        self.mappings.iter().map(|mp| mp.global_index).zip(self.plaintext.chunks(width))
    }

    /// Write every recovered cell as its 32-byte encoding, row-major.
    ///
    /// # Errors
    /// `Io` if the sink fails.
    pub fn save_decrypted<W: Write>(&self, mut out: W) -> Result<(), PodError> {
        for x in &self.plaintext {
            out.write_all(&fr_to_bytes(x))?;
        }
        out.flush()?;
        Ok(())
    }
}

pub struct BuyerDisputed {
    claim: Claim,
}

impl BuyerDisputed {
    /// Local row and column of the mismatching cell.
    #[must_use]
    pub const fn mismatch(&self) -> (u64, u64) {
        (self.claim.i, self.claim.j)
    }

    #[must_use]
    pub fn generate_claim(&self) -> Claim {
        self.claim.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{PlainBuyerData, PlainSellerData, SellerData},
        ecc::commit,
        keystream::derive,
    };
    use curve25519_dalek::scalar::Scalar;

    fn seller_data() -> PlainSellerData {
        let cells = (0..20u64).map(|x| Scalar::from(x + 100)).collect();
        PlainSellerData::new(5, 4, cells).unwrap()
    }

    fn honest_response(seed0: &Digest, a: &PlainSellerData, rows: &[u64]) -> Response {
        let s = 4usize;
        let v = derive_many(seed0, (rows.len() * s) as u64);
        let k = v.iter().enumerate().map(|(i, x)| commit((i % s) as u64, x)).collect();
        let m = rows
            .iter()
            .flat_map(|r| a.row(*r).to_vec())
            .zip(&v)
            .map(|(p, x)| p + x)
            .collect();
        Response { k, m }
    }

    fn checked(resp: Response) -> BuyerResponseChecked {
        let a = seller_data();
        let b = Arc::new(PlainBuyerData::new(a.bulletin()));
        let bob = Buyer::new(b, [2; 32], [1; 32], vec![Range::new(2, 2)]).unwrap();
        let (sent, _) = bob.get_request_with_seed([3; 32]);
        sent.on_response(resp).unwrap().0
    }

    #[test]
    fn rejects_wrong_lengths() {
        let a = seller_data();
        let b = Arc::new(PlainBuyerData::new(a.bulletin()));
        let bob = Buyer::new(b, [2; 32], [1; 32], vec![Range::new(2, 2)]).unwrap();
        let (sent, _) = bob.get_request();
        let mut resp = honest_response(&[7; 32], &a, &[2, 3]);
        resp.m.pop();
        assert!(matches!(sent.on_response(resp), Err(PodError::InvalidLength { expected: 8, got: 7 })));
    }

    #[test]
    fn batched_and_direct_checks_agree_on_honest_keys() {
        let a = seller_data();
        let state = checked(honest_response(&[7; 32], &a, &[2, 3]));
        let v = derive_many(&[7; 32], 8);
        assert!(state.check_k_batched(&v).is_ok());
        assert_eq!(state.find_mismatch(&v), Ok(None));
    }

    #[test]
    fn batched_check_fails_and_direct_check_localizes() {
        let a = seller_data();
        let mut resp = honest_response(&[7; 32], &a, &[2, 3]);
        resp.k[6] = commit(2, &Scalar::from(99u64));
        let state = checked(resp);
        let v = derive_many(&[7; 32], 8);
        assert_eq!(state.check_k_batched(&v), Err(PodError::BatchCheckFailed));
        assert_eq!(state.find_mismatch(&v), Ok(Some(6)));
    }

    #[test]
    fn checks_reject_short_keystream() {
        let a = seller_data();
        let mut resp = honest_response(&[7; 32], &a, &[2, 3]);
        resp.k[7] = commit(3, &Scalar::from(99u64));
        let state = checked(resp);
        let short = derive_many(&[7; 32], 7);
        let err = PodError::InvalidLength { expected: 8, got: 7 };
        assert_eq!(state.check_k_batched(&short), Err(err.clone()));
        // the bad cell sits past the end of `short` and must not be hidden
        assert_eq!(state.find_mismatch(&short), Err(err));
        assert!(state.find_mismatch(&derive_many(&[7; 32], 9)).is_err());
    }

    #[test]
    fn identities_survive_the_response_step() {
        let a = seller_data();
        let state = checked(honest_response(&[7; 32], &a, &[2, 3]));
        assert_eq!(state.peer_id(), &[1; 32]);
    }

    #[test]
    fn decrypts_with_right_seed() {
        let a = seller_data();
        let state = checked(honest_response(&[7; 32], &a, &[2, 3]));
        let SecretOutcome::Decrypted(done) = state.on_secret(&Secret { seed0: [7; 32] }).unwrap() else {
            panic!("expected decryption");
        };
        let rows: Vec<_> = done.rows().collect();
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[1].1, a.row(3));
        let mut sink = Vec::new();
        done.save_decrypted(&mut sink).unwrap();
        assert_eq!(sink.len(), 8 * 32);
        assert_eq!(&sink[..32], &fr_to_bytes(&Scalar::from(108u64)));
    }

    #[test]
    fn wrong_seed_is_disputed() {
        let a = seller_data();
        let state = checked(honest_response(&[7; 32], &a, &[2, 3]));
        let SecretOutcome::Disputed(d) = state.on_secret(&Secret { seed0: [8; 32] }).unwrap() else {
            panic!("expected dispute");
        };
        assert_eq!(d.mismatch(), (0, 0));
        let claim = d.generate_claim();
        assert_ne!(claim.kij, commit(0, &derive(&[8; 32], 0)));
        assert_eq!(claim.mkl_path.len(), 3);
    }

    #[test]
    fn sigma_check_rejects_forged_keys() {
        let a = seller_data();
        let b = Arc::new(PlainBuyerData::with_sigmas(a.bulletin(), a.sigmas().to_vec()).unwrap());

        let bob = Buyer::new(b.clone(), [2; 32], [1; 32], vec![Range::new(2, 2)]).unwrap();
        let (sent, _) = bob.get_request();
        assert!(sent.on_response(honest_response(&[7; 32], &a, &[2, 3])).is_ok());

        let bob = Buyer::new(b, [2; 32], [1; 32], vec![Range::new(2, 2)]).unwrap();
        let (sent, _) = bob.get_request();
        let mut resp = honest_response(&[7; 32], &a, &[2, 3]);
        resp.k[1] = commit(1, &Scalar::from(5u64));
        assert!(matches!(sent.on_response(resp), Err(PodError::EncryptedDataMismatch)));
    }
}
