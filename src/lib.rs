#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::cast_possible_truncation)]

//! Complaint-based proof of delivery.
//!
//! A seller sells rows of a published `n x s` matrix of field elements. It
//! serves the rows masked by a keystream together with a per-cell
//! commitment to that keystream; the buyer pays by issuing a receipt bound
//! to exactly what it received; the seller then discloses the keystream
//! seed. If any committed key disagrees with the seed, the buyer extracts a
//! short claim that any third party can check from public data alone.
//!
//! Fixed cryptographic choices:
//! - Group: Ristretto255, scalars mod its prime order
//! - Hash: Keccak-256 (32-byte output) for the keystream, seeds and Merkle nodes
//! - Column generators: hash-to-group with SHA-512
//! - Merkle tree: binary, padded to a power of two with zero digests

pub mod types;
pub mod errors;
pub mod domain;
pub mod ecc;
pub mod keystream;
pub mod mapping;
pub mod merkle;
pub mod hashers;
pub mod data;
pub mod seller;
pub mod buyer;
pub mod dispute;
pub mod ser;

pub use types::*;
pub use errors::{ClaimRejection, PodError};
pub use ecc::{FieldElement, GroupElement};
pub use data::{BuyerData, PlainBuyerData, PlainSellerData, SellerData};
pub use seller::{Cheat, Seller, SellerRequestHandled};
pub use buyer::{Buyer, BuyerDecrypted, BuyerDisputed, BuyerRequestSent, BuyerResponseChecked, SecretOutcome};
pub use dispute::{verify_claim, verify_claim_detailed, verify_claims_batch};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub use domain::PROTOCOL_VERSION;
