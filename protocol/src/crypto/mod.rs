//! # Cryptographic Primitives for veilmint
//!
//! The only cryptography a collection needs is a binding, hiding hash
//! commitment over its final metadata location. Everything here is a thin,
//! type-safe wrapper around the audited `sha3` implementation of Keccak-256.
//!
//! - [`hash`] — raw Keccak-256 digests.
//! - [`commitment`] — the commitment type and the one canonical preimage
//!   construction shared by the commit side and the reveal side.

pub mod commitment;
pub mod hash;

pub use commitment::{
    commitment_preimage, generate_secret, Commitment, CommitmentError, RevealPayload,
};
pub use hash::keccak256;
