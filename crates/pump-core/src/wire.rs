//! Pump wire vocabulary — what both announcement generations share.
//!
//! Two generations of the announcement protocol are in service at once:
//!
//!   legacy  — single-line body `<pubTime> <baseUrl> <relPath>` plus a flat
//!             set of string headers (`sum`, `parts`, `mtime`, ...)
//!   current — one JSON object carrying every field by name
//!
//! The descriptor codecs (partition, integrity) and the translator build on
//! the pieces here: the generation tag, the timestamp transform, the path
//! escaping rules, and the error taxonomy. Nothing in this module performs I/O.

use serde::{Deserialize, Serialize};

// ── Generation ────────────────────────────────────────────────────────────────

/// Protocol generation an encoded value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// Single-line body, flat string headers, hex digests, no date separator.
    Legacy,
    /// JSON body, structured fields, base64 digests, `T` date separator.
    Current,
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Generation::Legacy => f.write_str("legacy"),
            Generation::Current => f.write_str("current"),
        }
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Literal separator between the date and time portions of a current timestamp.
pub const TIME_SEPARATOR: char = 'T';

/// Number of leading digits (`YYYYMMDD`) before the separator position.
pub const DATE_DIGITS: usize = 8;

/// Field dropped on re-post unless the message says otherwise.
pub const DEFAULT_DELETE_ON_POST: &str = "topic";

// ── Timestamps ────────────────────────────────────────────────────────────────

/// `YYYYMMDDhhmmss[.ffffff]` → `YYYYMMDDThhmmss[.ffffff]`.
///
/// Only the separator is inserted; the digits are not interpreted. A value that
/// already carries the separator is returned unchanged.
pub fn timestamp_to_current(legacy: &str) -> Result<String, WireError> {
    let date = legacy
        .get(..DATE_DIGITS)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| WireError::BadTimestamp(legacy.to_string()))?;
    let rest = &legacy[DATE_DIGITS..];
    if rest.starts_with(TIME_SEPARATOR) {
        return Ok(legacy.to_string());
    }
    if rest.is_empty() {
        return Err(WireError::BadTimestamp(legacy.to_string()));
    }
    Ok(format!("{date}{TIME_SEPARATOR}{rest}"))
}

/// `YYYYMMDDThhmmss[.ffffff]` → `YYYYMMDDhhmmss[.ffffff]`.
///
/// Inverse of [`timestamp_to_current`]. Values without the separator at the
/// expected position are returned unchanged.
pub fn timestamp_to_legacy(current: &str) -> String {
    match current.get(DATE_DIGITS..) {
        Some(rest) if rest.starts_with(TIME_SEPARATOR) => {
            format!("{}{}", &current[..DATE_DIGITS], &rest[1..])
        }
        _ => current.to_string(),
    }
}

// ── Path escaping ─────────────────────────────────────────────────────────────

/// Escape the characters that would break a single-line legacy body.
///
/// Space separates body fields and `#` starts a URL fragment.
pub fn escape_path(path: &str) -> String {
    path.replace(' ', "%20").replace('#', "%23")
}

/// Reverse [`escape_path`]. Other percent sequences are left alone.
pub fn unescape_path(path: &str) -> String {
    path.replace("%20", " ").replace("%23", "#")
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while decoding or encoding announcement data.
///
/// Two families: format errors (the text is malformed) and protocol errors
/// (the text is well formed but names something this side does not know).
/// Both abort processing of the message that carried them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected {expected} comma-separated fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {field} is not a non-negative integer: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("partition style must be a single character, got {0:?}")]
    BadStyle(String),

    #[error("incoherent partition: {0}")]
    Incoherent(String),

    #[error("malformed {method} digest: {reason}")]
    BadDigest { method: String, reason: String },

    #[error("malformed timestamp: {0:?}")]
    BadTimestamp(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed message: {0}")]
    BadJson(String),

    #[error("unknown integrity tag: {0:?}")]
    UnknownTag(String),

    #[error("unknown integrity method: {0:?}")]
    UnknownMethod(String),

    #[error("integrity method {method} cannot carry a {value} value")]
    MethodMismatch { method: String, value: &'static str },
}

impl WireError {
    /// True for errors naming an unknown algorithm or method (protocol mismatch),
    /// false for malformed text.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            WireError::UnknownTag(_) | WireError::UnknownMethod(_) | WireError::MethodMismatch { .. }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
