//! Transport decoding for inbound audio payloads.
//!
//! Browsers send recorded clips as base64 strings, usually wrapped in a
//! data URL (`data:audio/webm;codecs=opus;base64,<payload>`). This module
//! strips the scheme segment when present and decodes the remainder into
//! the raw encoded container bytes the transcoder consumes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors produced while decoding the transport wrapping.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid base64.
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(String),

    /// The payload decoded to zero bytes.
    #[error("audio payload decoded to zero bytes")]
    Empty,
}

/// Decode a transport payload into raw encoded audio bytes.
///
/// A data-URL prefix, when present, ends at the first comma; everything
/// after it is the base64 body. Payloads without a comma are treated as
/// bare base64, matching what the browser client actually sends in both
/// of its recording modes.
pub fn decode_transport(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body = match payload.split_once(',') {
        Some((_scheme, body)) => body,
        None => payload,
    };

    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(bytes)
}
