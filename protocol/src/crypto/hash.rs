//! # Hashing Utilities
//!
//! Keccak-256 is the only hash function veilmint uses. It is the function
//! EVM tooling (`ethers.keccak256`, `cast keccak`) applies when an operator
//! prepares a commitment off-chain, so a digest computed here can be
//! compared byte-for-byte with one computed by those tools.
//!
//! Note that Keccak-256 is *not* NIST SHA3-256: the two differ in padding and
//! produce different digests for the same input.

use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 hash of the input data.
///
/// # Example
///
/// ```
/// use veilmint_protocol::crypto::keccak256;
///
/// let hash = keccak256(b"ipfs://final/");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty_vector() {
        // Keccak-256 of the empty string. SHA3-256 of "" starts with a7ffc6f8,
        // so this also guards against accidentally using the NIST variant.
        let expected = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(hex::encode(keccak256(b"")), expected);
    }

    #[test]
    fn test_keccak256_known_vector() {
        let expected = "47173285a8d7341e5e972fc677286384f802f8ef42a5ec5f03bbfa254cb01fad";
        assert_eq!(hex::encode(keccak256(b"hello world")), expected);
    }

    #[test]
    fn test_different_inputs_differ() {
        assert_ne!(keccak256(b"ipfs://final/"), keccak256(b"ipfs://wrong/"));
    }
}
