//! Transport encodings for certificates, signatures and log entries.
//!
//! Signature and certificate files are distributed base64 encoded, usually
//! with a trailing newline and sometimes wrapped at a fixed width, so the
//! base64 decoder skips line breaks and trims surrounding ASCII whitespace.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard-alphabet base64. `what` names the payload in errors.
pub fn decode_base64(input: impl AsRef<[u8]>, what: &str) -> Result<Vec<u8>> {
    let unwrapped: Vec<u8> = input
        .as_ref()
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();
    STANDARD
        .decode(unwrapped.trim_ascii())
        .map_err(|e| Error::malformed_with(format!("invalid base64 in {what}"), e))
}

pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn decode_hex(input: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(input.trim())
        .map_err(|e| Error::malformed_with(format!("invalid hex in {what}"), e))
}
