//! Proptest-based fuzzing for input parsers in cst-types.
//!
//! These tests exercise deserialization and decoding paths with arbitrary or
//! malformed inputs to verify they never panic, only return errors.

use cst_types::codec::{self, BLOCK_HASH, OPERATION_HASH};
use cst_types::{AnyProof, BlockData, Digest, SerializedProof, StampRequest};
use proptest::prelude::*;

proptest! {
    // === JSON deserialization fuzzing (should never panic) ===

    #[test]
    fn fuzz_digest_from_json(s in "\\PC{0,200}") {
        let json = format!("\"{}\"", s);
        let _ = serde_json::from_str::<Digest>(&json);
    }

    #[test]
    fn fuzz_serialized_proof_from_json(json in "\\PC{0,1000}") {
        if let Ok(proof) = serde_json::from_str::<SerializedProof>(&json) {
            let _ = AnyProof::try_from(proof);
        }
    }

    #[test]
    fn fuzz_block_from_json(json in "\\PC{0,1000}") {
        let _ = serde_json::from_str::<BlockData>(&json);
    }

    #[test]
    fn fuzz_stamp_request_from_json(json in "\\PC{0,300}") {
        let _ = serde_json::from_str::<StampRequest>(&json);
    }

    // === Base58Check decoding ===

    #[test]
    fn fuzz_decode_check(s in "[1-9A-HJ-NP-Za-km-z]{0,80}") {
        let _ = codec::decode_check(&s, &BLOCK_HASH);
        let _ = codec::decode_check(&s, &OPERATION_HASH);
        let _ = codec::decode_signature(&s);
    }

    #[test]
    fn fuzz_decode_check_arbitrary(s in "\\PC{0,120}") {
        prop_assert!(codec::decode_check(&s, &BLOCK_HASH).is_err() || s.starts_with('B'));
    }

    // === Numeric and hex parsing ===

    #[test]
    fn fuzz_zarith_from_str(s in "\\PC{0,40}") {
        let _ = codec::encode_zarith_str("fee", &s);
    }

    #[test]
    fn fuzz_decode_hex(s in "\\PC{0,100}") {
        let _ = codec::decode_hex(&s);
    }

    #[test]
    fn fuzz_digest_from_slice(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Digest::from_slice(&bytes);
    }

    // === Structured proof JSON with random operation lists ===

    #[test]
    fn fuzz_operation_lists(
        hash in "[0-9a-f]{0,80}",
        kinds in prop::collection::vec(prop_oneof![Just("join"), Just("hash2b"), Just("concat")], 0..8),
        payload in "[0-9a-g]{0,16}",
    ) {
        let ops: Vec<String> = kinds
            .iter()
            .map(|kind| format!(r#"{{"type":"{}","prepend":"{}"}}"#, kind, payload))
            .collect();
        let json = format!(r#"{{"version":1,"hash":"{}","operations":[{}]}}"#, hash, ops.join(","));
        if let Ok(proof) = serde_json::from_str::<SerializedProof>(&json) {
            if let Ok(any) = AnyProof::try_from(proof) {
                let _ = any.derivation();
            }
        }
    }
}
