//! Primitive cryptographic types

use crate::error::{Error, Result};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Unkeyed BLAKE2b with a 32-byte output, the hash used by every proof step.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(data));
    out
}

/// A 32-byte digest.
///
/// Used for caller-supplied leaf hashes as well as for Merkle nodes and the
/// raw (prefix-stripped) chain hashes that proofs terminate at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

/// The caller-supplied content hash being timestamped.
pub type LeafHash = Digest;

// Serialized as hex for readability
impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

impl Digest {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes with BLAKE2b-256
    pub fn hash(data: &[u8]) -> Self {
        Self(blake2b_256(data))
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != Self::LEN {
            return Err(Error::InvalidDigestLength {
                expected: Self::LEN,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash a pair of nodes: H(left || right)
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Digest::hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_digest_roundtrip() {
        let digest = Digest::new([42u8; 32]);
        let hex = digest.to_hex();
        let parsed = Digest::from_hex(&hex).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn test_blake2b_empty_vector() {
        // BLAKE2b-256 of the empty string
        assert_eq!(
            hex::encode(blake2b_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_hash_pair_matches_concatenation() {
        let a = Digest::new([1u8; 32]);
        let b = Digest::new([2u8; 32]);
        let mut joined = a.to_vec();
        joined.extend_from_slice(b.as_bytes());
        assert_eq!(hash_pair(&a, &b), Digest::hash(&joined));
    }

    prop_compose! {
        fn arb_digest()(bytes in prop::array::uniform32(any::<u8>())) -> Digest {
            Digest::new(bytes)
        }
    }

    proptest! {
        #[test]
        fn prop_digest_serde_roundtrip(d in arb_digest()) {
            let json = serde_json::to_string(&d).unwrap();
            let parsed: Digest = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(d, parsed);
        }

        #[test]
        fn prop_hash_pair_non_commutative(a in arb_digest(), b in arb_digest()) {
            prop_assume!(a != b);
            prop_assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
        }

        #[test]
        fn prop_digest_from_slice_validates_len(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            if bytes.len() != 32 {
                prop_assert!(Digest::from_slice(&bytes).is_err());
            } else {
                prop_assert!(Digest::from_slice(&bytes).is_ok());
            }
        }

        #[test]
        fn prop_digest_from_hex_validates(s in "[0-9a-fA-F]{0,100}") {
            match Digest::from_hex(&s) {
                Ok(_) => prop_assert_eq!(s.len(), 64),
                Err(_) => prop_assert_ne!(s.len(), 64),
            }
        }
    }
}
