//! Binary codecs shared by the proof builders
//!
//! Base58Check with a version prefix, fixed-width big-endian integers,
//! Zarith natural numbers and length-prefixed byte arrays.

use crate::error::{Error, Result};

/// A Base58Check version prefix together with the payload length it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    /// Human-readable leading characters of the encoded form
    pub name: &'static str,
    /// Version bytes prepended before Base58Check encoding
    pub bytes: &'static [u8],
    /// Length of the payload after the version bytes
    pub payload_len: usize,
}

pub const BLOCK_HASH: Prefix = Prefix { name: "B", bytes: &[1, 52], payload_len: 32 };
pub const OPERATION_HASH: Prefix = Prefix { name: "o", bytes: &[5, 116], payload_len: 32 };
pub const OPERATION_LIST_LIST_HASH: Prefix =
    Prefix { name: "LLo", bytes: &[29, 159, 109], payload_len: 32 };
pub const CONTEXT_HASH: Prefix = Prefix { name: "Co", bytes: &[79, 199], payload_len: 32 };
pub const PROTOCOL_HASH: Prefix = Prefix { name: "P", bytes: &[2, 170], payload_len: 32 };
pub const CHAIN_ID: Prefix = Prefix { name: "Net", bytes: &[87, 82, 0], payload_len: 4 };
pub const PAYLOAD_HASH: Prefix = Prefix { name: "vh", bytes: &[1, 106, 242], payload_len: 32 };
pub const NONCE_HASH: Prefix = Prefix { name: "nce", bytes: &[69, 220, 169], payload_len: 32 };

pub const ED25519_PUBLIC_KEY_HASH: Prefix =
    Prefix { name: "tz1", bytes: &[6, 161, 159], payload_len: 20 };
pub const SECP256K1_PUBLIC_KEY_HASH: Prefix =
    Prefix { name: "tz2", bytes: &[6, 161, 161], payload_len: 20 };
pub const P256_PUBLIC_KEY_HASH: Prefix =
    Prefix { name: "tz3", bytes: &[6, 161, 164], payload_len: 20 };
pub const CONTRACT_HASH: Prefix = Prefix { name: "KT1", bytes: &[2, 90, 121], payload_len: 20 };

pub const ED25519_PUBLIC_KEY: Prefix =
    Prefix { name: "edpk", bytes: &[13, 15, 37, 217], payload_len: 32 };
pub const SECP256K1_PUBLIC_KEY: Prefix =
    Prefix { name: "sppk", bytes: &[3, 254, 226, 86], payload_len: 33 };
pub const P256_PUBLIC_KEY: Prefix =
    Prefix { name: "p2pk", bytes: &[3, 178, 139, 127], payload_len: 33 };

pub const GENERIC_SIGNATURE: Prefix = Prefix { name: "sig", bytes: &[4, 130, 43], payload_len: 64 };
pub const ED25519_SIGNATURE: Prefix =
    Prefix { name: "edsig", bytes: &[9, 245, 205, 134, 18], payload_len: 64 };
pub const SECP256K1_SIGNATURE: Prefix =
    Prefix { name: "spsig1", bytes: &[13, 115, 101, 19, 63], payload_len: 64 };
pub const P256_SIGNATURE: Prefix =
    Prefix { name: "p2sig", bytes: &[54, 240, 44, 52], payload_len: 64 };

const SIGNATURE_PREFIXES: [Prefix; 4] =
    [SECP256K1_SIGNATURE, ED25519_SIGNATURE, P256_SIGNATURE, GENERIC_SIGNATURE];

/// Decode a Base58Check string, verify its version prefix and return the bare payload.
pub fn decode_check(input: &str, prefix: &Prefix) -> Result<Vec<u8>> {
    let raw = bs58::decode(input).with_check(None).into_vec()?;

    let payload = raw.strip_prefix(prefix.bytes).ok_or_else(|| Error::PrefixMismatch {
        expected: prefix.name,
        input: input.to_string(),
    })?;

    if payload.len() != prefix.payload_len {
        return Err(Error::InvalidPayloadLength {
            kind: prefix.name,
            expected: prefix.payload_len,
            actual: payload.len(),
        });
    }

    Ok(payload.to_vec())
}

/// Prepend the version prefix and Base58Check-encode a payload.
pub fn encode_check(payload: &[u8], prefix: &Prefix) -> String {
    let mut versioned = Vec::with_capacity(prefix.bytes.len() + payload.len());
    versioned.extend_from_slice(prefix.bytes);
    versioned.extend_from_slice(payload);
    bs58::encode(versioned).with_check().into_string()
}

/// Decode any supported signature encoding to its raw 64 bytes.
pub fn decode_signature(signature: &str) -> Result<Vec<u8>> {
    let prefix = SIGNATURE_PREFIXES
        .iter()
        .find(|p| signature.starts_with(p.name))
        .ok_or_else(|| Error::UnsupportedSignature(signature.to_string()))?;
    decode_check(signature, prefix)
}

/// Encode an unsigned integer in the Zarith variable-length format:
/// little-endian groups of 7 bits, high bit set on every byte but the last.
pub fn encode_zarith(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    let mut remainder = value;
    loop {
        let byte = (remainder & 0x7f) as u8;
        remainder >>= 7;
        if remainder == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Parse a decimal string field (the node reports mutez and counters as strings)
/// and Zarith-encode it.
pub fn encode_zarith_str(field: &'static str, value: &str) -> Result<Vec<u8>> {
    let parsed = value.parse::<u64>().map_err(|_| Error::InvalidNumber {
        field,
        value: value.to_string(),
    })?;
    Ok(encode_zarith(parsed))
}

/// Prefix a byte array with its length as a 4-byte big-endian integer.
pub fn encode_variable(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

/// Boolean as the chain encodes it.
pub fn encode_bool(value: bool) -> u8 {
    if value {
        0xff
    } else {
        0x00
    }
}

/// Decode a hex-encoded field.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(value)?)
}

/// Find the single occurrence of `needle` in `haystack`.
///
/// Returns the offset and the number of occurrences seen, so callers can
/// distinguish "absent" from "ambiguous".
pub fn find_unique(haystack: &[u8], needle: &[u8]) -> (Option<usize>, usize) {
    if needle.is_empty() || needle.len() > haystack.len() {
        return (None, 0);
    }
    let mut first = None;
    let mut count = 0;
    for (offset, window) in haystack.windows(needle.len()).enumerate() {
        if window == needle {
            count += 1;
            first.get_or_insert(offset);
        }
    }
    (first, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zarith_vectors() {
        assert_eq!(encode_zarith(0), vec![0x00]);
        assert_eq!(encode_zarith(1), vec![0x01]);
        assert_eq!(encode_zarith(127), vec![0x7f]);
        assert_eq!(encode_zarith(128), vec![0x80, 0x01]);
        assert_eq!(encode_zarith(300), vec![0xac, 0x02]);
        assert_eq!(encode_zarith(10_000), vec![0x90, 0x4e]);
    }

    #[test]
    fn test_zarith_rejects_non_numeric() {
        assert!(encode_zarith_str("fee", "12a").is_err());
        assert!(encode_zarith_str("fee", "-1").is_err());
        assert_eq!(encode_zarith_str("fee", "1420").unwrap(), encode_zarith(1420));
    }

    #[test]
    fn test_encode_variable() {
        assert_eq!(encode_variable(&[]), vec![0, 0, 0, 0]);
        assert_eq!(encode_variable(&[0xaa, 0xbb]), vec![0, 0, 0, 2, 0xaa, 0xbb]);
    }

    #[test]
    fn test_block_hash_roundtrip() {
        let payload = [7u8; 32];
        let encoded = encode_check(&payload, &BLOCK_HASH);
        assert!(encoded.starts_with('B'));
        assert_eq!(decode_check(&encoded, &BLOCK_HASH).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_known_prefix_leading_characters() {
        assert!(encode_check(&[0u8; 32], &OPERATION_HASH).starts_with('o'));
        assert!(encode_check(&[0u8; 32], &OPERATION_LIST_LIST_HASH).starts_with("LLo"));
        assert!(encode_check(&[0u8; 32], &CONTEXT_HASH).starts_with("Co"));
        assert!(encode_check(&[0u8; 20], &ED25519_PUBLIC_KEY_HASH).starts_with("tz1"));
        assert!(encode_check(&[0u8; 20], &CONTRACT_HASH).starts_with("KT1"));
        assert!(encode_check(&[0u8; 64], &GENERIC_SIGNATURE).starts_with("sig"));
        assert!(encode_check(&[0u8; 64], &ED25519_SIGNATURE).starts_with("edsig"));
        assert!(encode_check(&[0u8; 4], &CHAIN_ID).starts_with("Net"));
    }

    #[test]
    fn test_decode_rejects_wrong_prefix() {
        let encoded = encode_check(&[1u8; 32], &OPERATION_HASH);
        let err = decode_check(&encoded, &BLOCK_HASH).unwrap_err();
        assert!(matches!(err, Error::PrefixMismatch { expected: "B", .. }));
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut encoded = encode_check(&[1u8; 32], &BLOCK_HASH).into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'1' { b'2' } else { b'1' };
        let corrupted = String::from_utf8(encoded).unwrap();
        assert!(matches!(
            decode_check(&corrupted, &BLOCK_HASH),
            Err(Error::Base58(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let encoded = encode_check(&[1u8; 31], &BLOCK_HASH);
        assert!(matches!(
            decode_check(&encoded, &BLOCK_HASH),
            Err(Error::InvalidPayloadLength { expected: 32, actual: 31, .. })
        ));
    }

    #[test]
    fn test_decode_signature_variants() {
        for prefix in [GENERIC_SIGNATURE, ED25519_SIGNATURE, SECP256K1_SIGNATURE, P256_SIGNATURE] {
            let encoded = encode_check(&[9u8; 64], &prefix);
            assert_eq!(decode_signature(&encoded).unwrap(), vec![9u8; 64]);
        }
        assert!(matches!(
            decode_signature("xyz123"),
            Err(Error::UnsupportedSignature(_))
        ));
    }

    #[test]
    fn test_find_unique() {
        assert_eq!(find_unique(b"abcdef", b"cd"), (Some(2), 1));
        assert_eq!(find_unique(b"abcdef", b"xy"), (None, 0));
        assert_eq!(find_unique(b"abab", b"ab"), (Some(0), 2));
        assert_eq!(find_unique(b"ab", b"abc"), (None, 0));
    }

    proptest! {
        #[test]
        fn prop_zarith_terminates_and_is_minimal(v in any::<u64>()) {
            let bytes = encode_zarith(v);
            prop_assert!(!bytes.is_empty());
            prop_assert!(bytes.len() <= 10);
            let (last, rest) = bytes.split_last().unwrap();
            prop_assert_eq!(last & 0x80, 0);
            prop_assert!(rest.iter().all(|b| b & 0x80 != 0));
            if bytes.len() > 1 {
                prop_assert_ne!(*last, 0);
            }
        }

        #[test]
        fn prop_zarith_decodes_back(v in any::<u64>()) {
            let bytes = encode_zarith(v);
            let decoded = bytes
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, b)| acc | (((b & 0x7f) as u64) << (7 * i)));
            prop_assert_eq!(decoded, v);
        }

        #[test]
        fn prop_decode_check_never_panics(s in "[1-9A-HJ-NP-Za-km-z]{0,80}") {
            let _ = decode_check(&s, &BLOCK_HASH);
            let _ = decode_signature(&s);
        }
    }
}
