use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Maps the hashAlgorithm OID carried in the LDS Security Object
    /// (spec §4.1 `parse_lds_security_object`) to a concrete algorithm.
    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            "1.3.14.3.2.26" => Some(DigestAlgorithm::Sha1),
            "2.16.840.1.101.3.4.2.1" => Some(DigestAlgorithm::Sha256),
            "2.16.840.1.101.3.4.2.2" => Some(DigestAlgorithm::Sha384),
            "2.16.840.1.101.3.4.2.3" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }
}

pub fn compute_digest(algorithm: DigestAlgorithm, bytes: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
        DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
        DigestAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
    }
}

/// SHA-256 fingerprint as lowercase hex, the canonical certificate/CRL/
/// upload identity hash used throughout the directory and repositories.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Constant-time comparison for digest equality checks (PA Verifier step 6,
/// CRL serial checks) — these are cryptographic comparisons, not plain
/// equality on untrusted-length strings.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex(b"hello world");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_algorithm_resolves_known_oids() {
        assert_eq!(
            DigestAlgorithm::from_oid("2.16.840.1.101.3.4.2.1"),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(DigestAlgorithm::from_oid("9.9.9"), None);
    }

    #[test]
    fn digests_equal_rejects_different_lengths() {
        assert!(!digests_equal(&[1, 2, 3], &[1, 2]));
        assert!(digests_equal(&[1, 2, 3], &[1, 2, 3]));
        assert!(!digests_equal(&[1, 2, 3], &[1, 2, 4]));
    }

    proptest::proptest! {
        /// Boundary (spec §8): fingerprint hex strings are always lowercase,
        /// 64 chars, for any input bytes.
        #[test]
        fn sha256_hex_always_64_lowercase_hex(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
            let h = sha256_hex(&bytes);
            proptest::prop_assert_eq!(h.len(), 64);
            proptest::prop_assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }

        /// `digests_equal` must agree with plain slice equality — it only
        /// changes the timing characteristics of the comparison, not the
        /// result.
        #[test]
        fn digests_equal_agrees_with_plain_eq(
            a in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
            b in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
        ) {
            proptest::prop_assert_eq!(digests_equal(&a, &b), a == b);
        }
    }
}
