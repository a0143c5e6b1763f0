//! Minimal Contract ABI Codec
//!
//! Covers what the traceability contract needs: `address`, `string`,
//! `uint256` and `bool` parameters, head/tail encoded, and a word reader
//! for decoding return tuples.

use sha3::{Digest, Keccak256};

use super::error::LedgerError;
use super::types::{Address, CallArg, CallDescriptor};

const WORD: usize = 32;

/// First four bytes of keccak-256 over the canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Encode calldata (selector + arguments) for a call descriptor
pub fn encode_call(call: &CallDescriptor) -> Result<Vec<u8>, LedgerError> {
    let body = encode_values(call.args())?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&selector(&call.signature()));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Head/tail encode a value tuple (arguments or return data)
pub fn encode_values(values: &[CallArg]) -> Result<Vec<u8>, LedgerError> {
    let head_len = values.len() * WORD;

    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for value in values {
        match value {
            CallArg::Address(raw) => {
                let addr: Address = raw.parse()?;
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(addr.as_bytes());
            }
            CallArg::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            CallArg::Bool(b) => head.extend_from_slice(&uint_word(u128::from(*b))),
            CallArg::Str(s) => {
                let offset = (head_len + tail.len()) as u128;
                head.extend_from_slice(&uint_word(offset));
                encode_bytes(s.as_bytes(), &mut tail);
            }
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&v.to_be_bytes());
    word
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&uint_word(bytes.len() as u128));
    out.extend_from_slice(bytes);
    let rem = bytes.len() % WORD;
    if rem != 0 {
        out.resize(out.len() + (WORD - rem), 0);
    }
}

/// Reads head words (and the dynamic tails they point to) from return data
pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], LedgerError> {
        let end = offset
            .checked_add(WORD)
            .ok_or_else(|| LedgerError::Decode("offset overflow".into()))?;
        self.data.get(offset..end).ok_or_else(|| {
            LedgerError::Decode(format!(
                "return data too short: need {} bytes, have {}",
                end,
                self.data.len()
            ))
        })
    }

    fn usize_at(&self, offset: usize) -> Result<usize, LedgerError> {
        let word = self.word_at(offset)?;
        if word[..24].iter().any(|&b| b != 0) {
            return Err(LedgerError::Decode(format!(
                "value at byte {} does not fit in 64 bits",
                offset
            )));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(buf))
            .map_err(|_| LedgerError::Decode("value exceeds usize".into()))
    }

    pub fn read_bool(&self, index: usize) -> Result<bool, LedgerError> {
        let word = self.word_at(index * WORD)?;
        if word[..31].iter().any(|&b| b != 0) {
            return Err(LedgerError::Decode(format!("word {} is not a bool", index)));
        }
        match word[31] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LedgerError::Decode(format!(
                "word {} is not a bool ({})",
                index, other
            ))),
        }
    }

    pub fn read_address(&self, index: usize) -> Result<Address, LedgerError> {
        let word = self.word_at(index * WORD)?;
        if word[..12].iter().any(|&b| b != 0) {
            return Err(LedgerError::Decode(format!(
                "word {} is not an address",
                index
            )));
        }
        let mut bytes = [0u8; Address::LEN];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address::from_bytes(bytes))
    }

    /// `uint256` that must fit into 64 bits (timestamps, counters)
    pub fn read_u64(&self, index: usize) -> Result<u64, LedgerError> {
        self.usize_at(index * WORD).map(|v| v as u64)
    }

    pub fn read_string(&self, index: usize) -> Result<String, LedgerError> {
        let offset = self.usize_at(index * WORD)?;
        let len = self.usize_at(offset)?;
        let start = offset + WORD;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                LedgerError::Decode(format!("string at word {} runs past end of data", index))
            })?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LedgerError::Decode(format!("string at word {}: {}", index, e)))
    }
}

/// Decode `0x`-prefixed hex returned by the node
pub fn decode_hex(s: &str) -> Result<Vec<u8>, LedgerError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| LedgerError::Decode(format!("invalid hex: {}", e)))
}
