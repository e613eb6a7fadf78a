//! Block header encoding, split around the `operations_hash` field
//!
//! The shell header fields are common to every protocol; the protocol data
//! that follows `context` depends on the consensus era the block was baked
//! under. The era is chosen from the block's declared protocol hash and
//! unknown protocols are rejected.

use cst_types::block::{BlockData, BlockHeader};
use cst_types::codec::{
    decode_check, decode_hex, decode_signature, encode_bool, encode_variable, BLOCK_HASH, CONTEXT_HASH,
    NONCE_HASH, PAYLOAD_HASH,
};
use cst_types::{Error, Result};

/// Protocol data layout, keyed by protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEra {
    /// Priority-based baking: `priority`, nonce, seed nonce, escape vote
    Emmy,
    /// Round-based baking: payload hash and round replace `priority`
    Ithaca,
    /// Ithaca layout with the escape vote replaced by a three-way toggle vote
    Jakarta,
}

const PROTOCOLS: [(&str, HeaderEra); 4] = [
    ("PtGRANADsDU8R9daYKAgWnQYAJ64omN1o3KMGVCykShA97vQbvV", HeaderEra::Emmy),
    ("PtHangz2aRngywmSRGGvrwTyMbbdpWdpFKuS4uMWxg2RaH9i1qx", HeaderEra::Emmy),
    ("Psithaca2MLRFYargivpo7YvUr7wUDqyxrdhC5CQq78mRvimz6A", HeaderEra::Ithaca),
    ("PtJakart2xVj7pYXJBXrqHgd82rdkLey5ZeeGikDY4uMvsLGBm2", HeaderEra::Jakarta),
];

impl HeaderEra {
    pub fn for_protocol(protocol: &str) -> Result<Self> {
        PROTOCOLS
            .iter()
            .find(|(hash, _)| *hash == protocol)
            .map(|(_, era)| *era)
            .ok_or_else(|| Error::UnsupportedProtocol(protocol.to_string()))
    }

    pub fn supported_protocols() -> impl Iterator<Item = &'static str> {
        PROTOCOLS.iter().map(|(hash, _)| *hash)
    }

    fn encode_protocol_data(self, header: &BlockHeader, out: &mut Vec<u8>) -> Result<()> {
        match self {
            HeaderEra::Emmy => {
                let priority = header.priority.ok_or(Error::MissingHeaderField("priority"))?;
                out.extend_from_slice(&priority.to_be_bytes());
            }
            HeaderEra::Ithaca | HeaderEra::Jakarta => {
                let payload_hash = header
                    .payload_hash
                    .as_deref()
                    .ok_or(Error::MissingHeaderField("payload_hash"))?;
                let payload_round = header.payload_round.ok_or(Error::MissingHeaderField("payload_round"))?;
                out.extend(decode_check(payload_hash, &PAYLOAD_HASH)?);
                out.extend_from_slice(&payload_round.to_be_bytes());
            }
        }
        out.extend(decode_hex(&header.proof_of_work_nonce)?);
        out.extend(encode_seed_nonce(header.seed_nonce_hash.as_deref())?);
        match self {
            HeaderEra::Emmy | HeaderEra::Ithaca => {
                let vote = header
                    .liquidity_baking_escape_vote
                    .ok_or(Error::MissingHeaderField("liquidity_baking_escape_vote"))?;
                out.push(encode_bool(vote));
            }
            HeaderEra::Jakarta => {
                let vote = header
                    .liquidity_baking_toggle_vote
                    .ok_or(Error::MissingHeaderField("liquidity_baking_toggle_vote"))?;
                out.push(vote.tag());
            }
        }
        Ok(())
    }
}

fn encode_seed_nonce(seed_nonce_hash: Option<&str>) -> Result<Vec<u8>> {
    match seed_nonce_hash {
        None => Ok(vec![0x00]),
        Some(hash) => {
            let mut out = vec![0xff];
            out.extend(decode_check(hash, &NONCE_HASH)?);
            Ok(out)
        }
    }
}

/// Fitness as a length-prefixed list of length-prefixed byte arrays.
pub fn encode_fitness(fitness: &[String]) -> Result<Vec<u8>> {
    let mut inner = Vec::new();
    for element in fitness {
        inner.extend(encode_variable(&decode_hex(element)?));
    }
    Ok(encode_variable(&inner))
}

/// Header bytes before and after `operations_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSplit {
    pub era: HeaderEra,
    pub prepend: Vec<u8>,
    pub append: Vec<u8>,
}

/// Encode a block's header into the bytes surrounding its `operations_hash`.
pub fn split_header(block: &BlockData) -> Result<HeaderSplit> {
    let era = HeaderEra::for_protocol(&block.protocol)?;
    let header = &block.header;

    let mut prepend = Vec::with_capacity(46);
    prepend.extend_from_slice(&header.level.to_be_bytes());
    prepend.push(header.proto);
    prepend.extend(decode_check(&header.predecessor, &BLOCK_HASH)?);
    prepend.extend_from_slice(&header.timestamp.timestamp().to_be_bytes());
    prepend.push(header.validation_pass);

    let mut append = encode_fitness(&header.fitness)?;
    append.extend(decode_check(&header.context, &CONTEXT_HASH)?);
    era.encode_protocol_data(header, &mut append)?;
    append.extend(decode_signature(&header.signature)?);

    Ok(HeaderSplit { era, prepend, append })
}
