//! Base64 conventions of the protocol.
//!
//! Keys and encrypted blobs travel as URL-safe base64 without padding. Some
//! fields (fingerprints) use the standard alphabet with padding, so decoding
//! accepts either form.

use {
    anyhow::{Context, Result},
    base64::{
        Engine,
        prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD},
    },
};

#[must_use]
#[inline]
pub fn encode(data: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

#[must_use]
#[inline]
pub fn encode_standard(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Decodes URL-safe or standard base64, padded or not.
#[inline]
pub fn decode(value: &str) -> Result<Vec<u8>> {
    let normalized: String = value
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    BASE64_URL_SAFE_NO_PAD
        .decode(normalized)
        .with_context(|| format!("invalid base64 value `{value}`"))
}
