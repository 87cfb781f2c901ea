//! Lookup key resolution.
//!
//! # Responsibilities
//! - Percent-decode the path segment past the location prefix
//! - Turn the decoded text into a typed [`ObjectKey`] per the location's key type
//!
//! # Design Decisions
//! - Decoding is strict: a truncated or non-hex escape is rejected, never guessed
//! - `+` stays literal (this is a path, not a query string)
//! - Resolution failures are client errors and never reach the backend

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::KeyType;

/// Why a path segment could not become a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedKeyError {
    #[error("empty key")]
    Empty,

    #[error("truncated percent-escape at byte {0}")]
    TruncatedEscape(usize),

    #[error("invalid percent-escape at byte {0}")]
    InvalidEscape(usize),

    #[error("decoded key is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid object id '{0}' (expected 24 hex characters)")]
    InvalidObjectId(String),

    #[error("invalid integer key '{0}'")]
    InvalidInt(String),
}

/// A 12-byte document identifier, written as 24 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }
}

/// Parsed here rather than through the driver's `ObjectId` so key
/// resolution stays independent of the backend.
impl FromStr for ObjectId {
    type Err = MalformedKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MalformedKeyError::InvalidObjectId(s.to_string());
        let raw = s.as_bytes();
        if raw.len() != 24 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, pair) in raw.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or_else(invalid)?;
            let lo = hex_value(pair[1]).ok_or_else(invalid)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Typed lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    ObjectId(ObjectId),
    String(String),
    Int(i64),
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::ObjectId(oid) => write!(f, "ObjectId({oid})"),
            ObjectKey::String(s) => write!(f, "{s:?}"),
            ObjectKey::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Decode `%XX` escapes in a path segment.
pub fn percent_decode(segment: &str) -> Result<String, MalformedKeyError> {
    let raw = segment.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'%' {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        if i + 2 >= raw.len() {
            return Err(MalformedKeyError::TruncatedEscape(i));
        }
        let hi = hex_value(raw[i + 1]).ok_or(MalformedKeyError::InvalidEscape(i))?;
        let lo = hex_value(raw[i + 2]).ok_or(MalformedKeyError::InvalidEscape(i))?;
        out.push((hi << 4) | lo);
        i += 3;
    }
    String::from_utf8(out).map_err(|_| MalformedKeyError::InvalidUtf8)
}

/// Resolve a raw (still percent-encoded) path segment into a key.
pub fn resolve(segment: &str, key_type: KeyType) -> Result<ObjectKey, MalformedKeyError> {
    let decoded = percent_decode(segment)?;
    if decoded.is_empty() {
        return Err(MalformedKeyError::Empty);
    }
    match key_type {
        KeyType::ObjectId => decoded.parse().map(ObjectKey::ObjectId),
        KeyType::String => Ok(ObjectKey::String(decoded)),
        KeyType::Int => decoded
            .parse()
            .map(ObjectKey::Int)
            .map_err(|_| MalformedKeyError::InvalidInt(decoded)),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
