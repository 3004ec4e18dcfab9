//! Judge-side claim verification.
//!
//! Everything here is a pure function of `receipt`, `secret` and `claim`,
//! all of which are public once the seller has disclosed its secret.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    ecc::commit,
    errors::ClaimRejection,
    hashers::group_leaf,
    keystream::derive,
    merkle::verify_leaf_path,
    types::{Claim, Receipt, Secret},
};

/// `true` iff the claim proves the seller committed a key for cell
/// `(claim.i, claim.j)` that disagrees with the disclosed seed.
#[must_use]
pub fn verify_claim(s: u64, receipt: &Receipt, secret: &Secret, claim: &Claim) -> bool {
    verify_claim_detailed(s, receipt, secret, claim).is_ok()
}

/// [`verify_claim`] with the reason for rejection.
///
/// # Errors
/// `IndexOutOfRange` if `(i, j)` does not address a committed cell,
/// `PathInvalid` if the path does not authenticate `kij` under
/// `receipt.k_mkl_root`, `KeyMatches` if the committed key is correct.
pub fn verify_claim_detailed(
    s: u64,
    receipt: &Receipt,
    secret: &Secret,
    claim: &Claim,
) -> Result<(), ClaimRejection> {
    if claim.j >= s {
        return Err(ClaimRejection::IndexOutOfRange);
    }
    let index = claim
        .i
        .checked_mul(s)
        .and_then(|x| x.checked_add(claim.j))
        .ok_or(ClaimRejection::IndexOutOfRange)?;
    let total = receipt.count.checked_mul(s).ok_or(ClaimRejection::IndexOutOfRange)?;
    if index >= total {
        return Err(ClaimRejection::IndexOutOfRange);
    }

    let leaf = group_leaf(&claim.kij);
    if !verify_leaf_path(&leaf, index, total, &receipt.k_mkl_root, &claim.mkl_path) {
        return Err(ClaimRejection::PathInvalid);
    }

    let expected = commit(claim.j, &derive(&secret.seed0, index));
    if expected == claim.kij {
        return Err(ClaimRejection::KeyMatches);
    }
    Ok(())
}

/// Verify independent claims against one session, in input order.
#[must_use]
pub fn verify_claims_batch(s: u64, receipt: &Receipt, secret: &Secret, claims: &[Claim]) -> Vec<bool> {
    #[cfg(feature = "parallel")]
    {
        claims.par_iter().map(|c| verify_claim(s, receipt, secret, c)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        claims.iter().map(|c| verify_claim(s, receipt, secret, c)).collect()
    }
}
