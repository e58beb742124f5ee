//! Structural checks applied to every token and QR payload before any lookup.
//!
//! Anything that looks like markup or a script URI is rejected as
//! [`AppError::InvalidFormat`]; at this layer corruption and malice are
//! indistinguishable.

use crate::error::AppError;

pub const MIN_TOKEN_LENGTH: usize = 10;
pub const MAX_TOKEN_LENGTH: usize = 512;

const INJECTION_MARKERS: &[&str] = &[
    "<",
    ">",
    "javascript:",
    "vbscript:",
    "data:",
    "script",
    "onerror=",
    "onload=",
    "&#",
    "%3c",
    "%3e",
];

pub fn validate_token(raw: &str) -> Result<&str, AppError> {
    let len = raw.chars().count();
    if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&len) {
        return Err(AppError::InvalidFormat);
    }
    if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(AppError::InvalidFormat);
    }

    let lowered = raw.to_ascii_lowercase();
    if INJECTION_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Err(AppError::InvalidFormat);
    }

    Ok(raw)
}

/// Validates a JSON value that is expected to carry a token string.
pub fn validate_token_value(value: &serde_json::Value) -> Result<&str, AppError> {
    value.as_str().ok_or(AppError::InvalidFormat).and_then(validate_token)
}

/// A scan nonce is the hex encoding of a fixed-length secret.
pub fn validate_nonce(raw: &str, expected_bytes: usize) -> Result<&str, AppError> {
    let raw = validate_token(raw)?;
    if raw.len() != expected_bytes * 2 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::InvalidFormat);
    }
    Ok(raw)
}
