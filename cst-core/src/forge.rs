//! Canonical binary encoding of manager operations
//!
//! Produces the bytes the chain hashes an operation group with: the branch
//! followed by each content, without the signature.

use cst_types::block::{OperationContent, OperationEntry, Parameters, RevealContent, TransactionContent};
use cst_types::codec::{
    decode_check, decode_hex, encode_variable, encode_zarith_str, Prefix, BLOCK_HASH, CONTRACT_HASH,
    ED25519_PUBLIC_KEY, ED25519_PUBLIC_KEY_HASH, P256_PUBLIC_KEY, P256_PUBLIC_KEY_HASH,
    SECP256K1_PUBLIC_KEY, SECP256K1_PUBLIC_KEY_HASH,
};
use cst_types::{Error, Result};

pub const REVEAL_TAG: u8 = 107;
pub const TRANSACTION_TAG: u8 = 108;

const ADDRESS_TAGS: [(u8, Prefix); 3] = [
    (0, ED25519_PUBLIC_KEY_HASH),
    (1, SECP256K1_PUBLIC_KEY_HASH),
    (2, P256_PUBLIC_KEY_HASH),
];

const PUBLIC_KEY_TAGS: [(u8, Prefix); 3] = [
    (0, ED25519_PUBLIC_KEY),
    (1, SECP256K1_PUBLIC_KEY),
    (2, P256_PUBLIC_KEY),
];

/// Entrypoints with a reserved one-byte tag.
const NAMED_ENTRYPOINTS: [(&str, u8); 5] = [
    ("default", 0),
    ("root", 1),
    ("do", 2),
    ("set_delegate", 3),
    ("remove_delegate", 4),
];

const MICHELINE_STRING: u8 = 0x01;
const MICHELINE_BYTES: u8 = 0x0a;

fn tagged(input: &str, table: &[(u8, Prefix)]) -> Option<Result<Vec<u8>>> {
    let (tag, prefix) = table.iter().find(|(_, prefix)| input.starts_with(prefix.name))?;
    Some(decode_check(input, prefix).map(|payload| {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(*tag);
        out.extend_from_slice(&payload);
        out
    }))
}

/// Implicit account address (`tz1`/`tz2`/`tz3`) as tag byte plus 20-byte hash.
pub fn encode_address(address: &str) -> Result<Vec<u8>> {
    tagged(address, &ADDRESS_TAGS).unwrap_or_else(|| Err(Error::UnsupportedAddress(address.to_string())))
}

/// Contract id: `0x00 ‖ address` for implicit accounts, `0x01 ‖ hash ‖ 0x00` for originated ones.
pub fn encode_contract_id(destination: &str) -> Result<Vec<u8>> {
    if destination.starts_with(CONTRACT_HASH.name) {
        let hash = decode_check(destination, &CONTRACT_HASH)?;
        let mut out = Vec::with_capacity(22);
        out.push(0x01);
        out.extend_from_slice(&hash);
        out.push(0x00);
        return Ok(out);
    }
    let mut out = vec![0x00];
    out.extend(encode_address(destination)?);
    Ok(out)
}

pub fn encode_public_key(public_key: &str) -> Result<Vec<u8>> {
    tagged(public_key, &PUBLIC_KEY_TAGS)
        .unwrap_or_else(|| Err(Error::UnsupportedPublicKey(public_key.to_string())))
}

pub fn encode_entrypoint(name: &str) -> Result<Vec<u8>> {
    if let Some((_, tag)) = NAMED_ENTRYPOINTS.iter().find(|(known, _)| *known == name) {
        return Ok(vec![*tag]);
    }
    let len = u8::try_from(name.len())
        .map_err(|_| Error::UnsupportedParameters(format!("entrypoint name too long: {}", name.len())))?;
    let mut out = vec![0xff, len];
    out.extend_from_slice(name.as_bytes());
    Ok(out)
}

/// Encode a Micheline literal. Only `bytes` and `string` primitives are supported.
pub fn encode_micheline(value: &serde_json::Value) -> Result<Vec<u8>> {
    if let Some(bytes) = value.get("bytes").and_then(|v| v.as_str()) {
        let mut out = vec![MICHELINE_BYTES];
        out.extend(encode_variable(&decode_hex(bytes)?));
        return Ok(out);
    }
    if let Some(string) = value.get("string").and_then(|v| v.as_str()) {
        let mut out = vec![MICHELINE_STRING];
        out.extend(encode_variable(string.as_bytes()));
        return Ok(out);
    }
    Err(Error::UnsupportedParameters(value.to_string()))
}

fn encode_parameters(parameters: Option<&Parameters>) -> Result<Vec<u8>> {
    let Some(parameters) = parameters else {
        return Ok(vec![0x00]);
    };
    let mut out = vec![0xff];
    out.extend(encode_entrypoint(&parameters.entrypoint)?);
    out.extend(encode_variable(&encode_micheline(&parameters.value)?));
    Ok(out)
}

fn encode_manager_fields(
    out: &mut Vec<u8>,
    source: &str,
    fee: &str,
    counter: &str,
    gas_limit: &str,
    storage_limit: &str,
) -> Result<()> {
    out.extend(encode_address(source)?);
    out.extend(encode_zarith_str("fee", fee)?);
    out.extend(encode_zarith_str("counter", counter)?);
    out.extend(encode_zarith_str("gas_limit", gas_limit)?);
    out.extend(encode_zarith_str("storage_limit", storage_limit)?);
    Ok(())
}

pub fn forge_reveal(reveal: &RevealContent) -> Result<Vec<u8>> {
    let mut out = vec![REVEAL_TAG];
    encode_manager_fields(
        &mut out,
        &reveal.source,
        &reveal.fee,
        &reveal.counter,
        &reveal.gas_limit,
        &reveal.storage_limit,
    )?;
    out.extend(encode_public_key(&reveal.public_key)?);
    Ok(out)
}

pub fn forge_transaction(tx: &TransactionContent) -> Result<Vec<u8>> {
    let mut out = vec![TRANSACTION_TAG];
    encode_manager_fields(&mut out, &tx.source, &tx.fee, &tx.counter, &tx.gas_limit, &tx.storage_limit)?;
    out.extend(encode_zarith_str("amount", &tx.amount)?);
    out.extend(encode_contract_id(&tx.destination)?);
    out.extend(encode_parameters(tx.parameters.as_ref())?);
    Ok(out)
}

/// Forge an operation group: branch followed by an optional reveal and a transaction.
pub fn forge_operation_group(entry: &OperationEntry) -> Result<Vec<u8>> {
    let mut out = decode_check(&entry.branch, &BLOCK_HASH)?;
    match entry.contents.as_slice() {
        [OperationContent::Transaction(tx)] => out.extend(forge_transaction(tx)?),
        [OperationContent::Reveal(reveal), OperationContent::Transaction(tx)] => {
            out.extend(forge_reveal(reveal)?);
            out.extend(forge_transaction(tx)?);
        }
        [_] => return Err(Error::UnsupportedOperationKind { position: 0 }),
        [OperationContent::Reveal(_), _] => return Err(Error::UnsupportedOperationKind { position: 1 }),
        [_, _] => return Err(Error::UnsupportedOperationKind { position: 0 }),
        contents => return Err(Error::MalformedOperationGroup { count: contents.len() }),
    }
    Ok(out)
}
