// src/hash.rs

//! Content digests for template objects
//!
//! Objects are identified and verified by the SHA-256 of their content,
//! rendered as lowercase hex.

use std::fmt;

use sha2::{Digest, Sha256};

/// Number of hex characters used when a digest is embedded in a name
pub const SHORT_DIGEST_LEN: usize = 7;

/// Compute the lowercase hex SHA-256 of `data`
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Leading characters of a digest, as used in generated object names
pub fn short_digest(digest: &str) -> &str {
    digest.get(..SHORT_DIGEST_LEN).unwrap_or(digest)
}

/// Checksum verification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sha256 mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Verify bytes match an expected SHA-256 digest (case-insensitive)
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<(), VerifyError> {
    let actual = sha256(data);
    if actual == expected.trim().to_ascii_lowercase() {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_values() {
        assert_eq!(
            sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            sha256(b"xyz"),
            "3608bca1e44ea6c4d268eb6db02260269892c0b42b86bbf1e77a6fa16c3c9282"
        );
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest("ba7816bf8f01"), "ba7816b");
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn test_verify() {
        let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert!(verify_sha256(b"abc", upper).is_ok());
        let err = verify_sha256(b"xyz", upper).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }
}
