//! # Metadata Commitments
//!
//! A commitment binds the collection owner to a final metadata location
//! before anyone can see it. The owner publishes
//!
//! ```text
//! commitment = keccak256( utf8(secret) ‖ utf8(base_uri) )
//! ```
//!
//! while minting is open, and later reveals `(secret, base_uri)`. Anyone can
//! recompute the digest; a reveal whose digest differs from the published
//! commitment is rejected, so the owner cannot pick the metadata after
//! seeing demand.
//!
//! ## One preimage, not two
//!
//! [`commitment_preimage`] is the single definition of what gets hashed. It
//! is used by [`Commitment::compute`] (the operator's side) and by
//! [`Commitment::verify`] (the registry's side), so the two can never drift
//! apart. The secret may be empty: an empty secret makes the preimage equal
//! to the bare base URI, which is how a commitment over the URI alone is
//! expressed. It is the same construction with a degenerate secret, not a
//! second scheme.
//!
//! A non-empty secret is what makes the commitment *hiding* in practice. A
//! bare IPFS gateway URI is guessable once the content is pinned.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::hash::keccak256;
use crate::config::COMMITMENT_LENGTH;

/// Errors that can occur when parsing a commitment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitmentError {
    /// The hex string could not be decoded.
    #[error("invalid hex in commitment: {0}")]
    InvalidHex(String),

    /// The decoded value is not 32 bytes long.
    #[error("invalid commitment length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

/// The values an owner discloses to open a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealPayload {
    /// Blinding secret chosen at commit time. May be empty.
    #[serde(default)]
    pub secret: String,
    /// The final metadata base URI.
    pub base_uri: String,
}

impl RevealPayload {
    /// Creates a payload with a blinding secret.
    pub fn new(secret: impl Into<String>, base_uri: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_uri: base_uri.into(),
        }
    }

    /// Creates a payload that commits to the base URI alone.
    pub fn uri_only(base_uri: impl Into<String>) -> Self {
        Self::new(String::new(), base_uri)
    }

    /// The commitment this payload opens.
    pub fn commitment(&self) -> Commitment {
        Commitment::compute(&self.secret, &self.base_uri)
    }
}

/// Generates a fresh blinding secret: 32 random bytes as 64 hex characters.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Builds the canonical commitment preimage: `utf8(secret) ‖ utf8(base_uri)`.
pub fn commitment_preimage(secret: &str, base_uri: &str) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(secret.len() + base_uri.len());
    preimage.extend_from_slice(secret.as_bytes());
    preimage.extend_from_slice(base_uri.as_bytes());
    preimage
}

/// A 32-byte Keccak-256 commitment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment([u8; COMMITMENT_LENGTH]);

impl Commitment {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; COMMITMENT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Computes the commitment for a secret and base URI.
    ///
    /// # Example
    ///
    /// ```
    /// use veilmint_protocol::crypto::Commitment;
    ///
    /// let c = Commitment::compute("s3cret", "ipfs://final/");
    /// assert!(c.verify("s3cret", "ipfs://final/"));
    /// assert!(!c.verify("s3cret", "ipfs://other/"));
    /// ```
    pub fn compute(secret: &str, base_uri: &str) -> Self {
        Self(keccak256(&commitment_preimage(secret, base_uri)))
    }

    /// Returns `true` if `(secret, base_uri)` opens this commitment.
    pub fn verify(&self, secret: &str, base_uri: &str) -> bool {
        Self::compute(secret, base_uri) == *self
    }

    /// Returns `true` if the payload opens this commitment.
    pub fn verify_payload(&self, payload: &RevealPayload) -> bool {
        self.verify(&payload.secret, &payload.base_uri)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex, the form EVM tooling prints.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = CommitmentError;

    /// Parses 64 hex characters, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| CommitmentError::InvalidHex(e.to_string()))?;
        let bytes: [u8; COMMITMENT_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CommitmentError::InvalidLength {
                    expected: COMMITMENT_LENGTH,
                    got: bytes.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
