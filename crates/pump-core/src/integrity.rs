//! Integrity descriptors — checksum method plus value.
//!
//! Wire form `<tag>,<value>` with the tag drawn from a fixed table:
//!
//!   arbitrary a   md5 d   sha512 s   md5name n
//!   random    0   link L  remove R   cod     z
//!
//! The value depends on the method:
//!   random  — opaque token, passed through untouched
//!   cod     — another method (checksum-on-download), written as its tag in
//!             legacy text and as its name in current text
//!   others  — binary digest; lowercase hex in legacy text, base64 in current
//!
//! The in-memory descriptor holds the decoded value, never the text, so moving
//! between generations re-encodes the same bytes instead of rewriting strings.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::wire::{Generation, WireError};

// ── Method table ──────────────────────────────────────────────────────────────

/// Checksum method named by an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityMethod {
    Arbitrary,
    Md5,
    Sha512,
    Md5Name,
    Random,
    Link,
    Remove,
    Cod,
}

/// (method, legacy tag, current name). Both directions read this one table.
const METHODS: [(IntegrityMethod, char, &str); 8] = [
    (IntegrityMethod::Arbitrary, 'a', "arbitrary"),
    (IntegrityMethod::Md5, 'd', "md5"),
    (IntegrityMethod::Sha512, 's', "sha512"),
    (IntegrityMethod::Md5Name, 'n', "md5name"),
    (IntegrityMethod::Random, '0', "random"),
    (IntegrityMethod::Link, 'L', "link"),
    (IntegrityMethod::Remove, 'R', "remove"),
    (IntegrityMethod::Cod, 'z', "cod"),
];

impl IntegrityMethod {
    pub const ALL: [IntegrityMethod; 8] = [
        IntegrityMethod::Arbitrary,
        IntegrityMethod::Md5,
        IntegrityMethod::Sha512,
        IntegrityMethod::Md5Name,
        IntegrityMethod::Random,
        IntegrityMethod::Link,
        IntegrityMethod::Remove,
        IntegrityMethod::Cod,
    ];

    fn entry(self) -> (IntegrityMethod, char, &'static str) {
        // The table is exhaustive over the enum.
        METHODS
            .iter()
            .copied()
            .find(|(m, _, _)| *m == self)
            .unwrap_or((self, '?', "?"))
    }

    pub fn tag(self) -> char {
        self.entry().1
    }

    pub fn name(self) -> &'static str {
        self.entry().2
    }

    pub fn from_tag(tag: &str) -> Result<Self, WireError> {
        let mut chars = tag.chars();
        let c = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(WireError::UnknownTag(tag.to_string())),
        };
        METHODS
            .iter()
            .find(|(_, t, _)| *t == c)
            .map(|(m, _, _)| *m)
            .ok_or_else(|| WireError::UnknownTag(tag.to_string()))
    }

    pub fn from_name(name: &str) -> Result<Self, WireError> {
        METHODS
            .iter()
            .find(|(_, _, n)| *n == name)
            .map(|(m, _, _)| *m)
            .ok_or_else(|| WireError::UnknownMethod(name.to_string()))
    }

    /// Whether the value for this method is binary digest data.
    pub fn carries_digest(self) -> bool {
        !matches!(self, IntegrityMethod::Random | IntegrityMethod::Cod)
    }

    /// Method identifier as written in the given generation.
    pub fn label(self, generation: Generation) -> String {
        match generation {
            Generation::Legacy => self.tag().to_string(),
            Generation::Current => self.name().to_string(),
        }
    }

    /// Inverse of [`IntegrityMethod::label`].
    pub fn from_label(label: &str, generation: Generation) -> Result<Self, WireError> {
        match generation {
            Generation::Legacy => Self::from_tag(label),
            Generation::Current => Self::from_name(label),
        }
    }
}

impl fmt::Display for IntegrityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntegrityMethod {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

// ── Descriptor ────────────────────────────────────────────────────────────────

/// Decoded integrity value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntegrityValue {
    /// Raw digest bytes.
    Digest(Vec<u8>),
    /// Opaque marker (`random`).
    Token(String),
    /// Deferred method (`cod`).
    Method(IntegrityMethod),
}

/// Checksum method and its decoded value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIntegrity", into = "RawIntegrity")]
pub struct Integrity {
    method: IntegrityMethod,
    value: IntegrityValue,
}

impl Integrity {
    /// Descriptor for a digest-carrying method.
    pub fn digest(method: IntegrityMethod, bytes: impl Into<Vec<u8>>) -> Result<Self, WireError> {
        if !method.carries_digest() {
            return Err(WireError::MethodMismatch {
                method: method.name().to_string(),
                value: "digest",
            });
        }
        Ok(Self {
            method,
            value: IntegrityValue::Digest(bytes.into()),
        })
    }

    /// `random` descriptor with an opaque token.
    pub fn random(token: impl Into<String>) -> Self {
        Self {
            method: IntegrityMethod::Random,
            value: IntegrityValue::Token(token.into()),
        }
    }

    /// Checksum-on-download descriptor deferring to `method`.
    pub fn cod(method: IntegrityMethod) -> Self {
        Self {
            method: IntegrityMethod::Cod,
            value: IntegrityValue::Method(method),
        }
    }

    pub fn method(&self) -> IntegrityMethod {
        self.method
    }

    pub fn value(&self) -> &IntegrityValue {
        &self.value
    }

    /// Digest bytes, if this method carries one.
    pub fn digest_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            IntegrityValue::Digest(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Build a descriptor from a method and a value written in `generation`.
    pub fn from_parts(
        method: IntegrityMethod,
        value: &str,
        generation: Generation,
    ) -> Result<Self, WireError> {
        let value = match method {
            IntegrityMethod::Random => IntegrityValue::Token(value.to_string()),
            IntegrityMethod::Cod => {
                IntegrityValue::Method(IntegrityMethod::from_label(value.trim(), generation)?)
            }
            _ => IntegrityValue::Digest(decode_digest(method, value, generation)?),
        };
        Ok(Self { method, value })
    }

    /// Value text as written in `generation`.
    pub fn encoded_value(&self, generation: Generation) -> String {
        match &self.value {
            IntegrityValue::Token(token) => token.clone(),
            IntegrityValue::Method(m) => m.label(generation),
            IntegrityValue::Digest(bytes) => match generation {
                Generation::Legacy => hex::encode(bytes),
                Generation::Current => BASE64.encode(bytes),
            },
        }
    }

    /// `<tag>,<value>` with the value written in `generation`.
    pub fn encode(&self, generation: Generation) -> String {
        format!("{},{}", self.method.tag(), self.encoded_value(generation))
    }

    /// Parse `<tag>,<value>` whose value is written in `generation`.
    ///
    /// The tag must be in the method table; anything else is a protocol error.
    pub fn decode(text: &str, generation: Generation) -> Result<Self, WireError> {
        let (tag, value) = text.split_once(',').ok_or(WireError::FieldCount {
            expected: 2,
            found: 1,
        })?;
        let method = IntegrityMethod::from_tag(tag.trim())?;
        Self::from_parts(method, value, generation)
    }
}

fn decode_digest(
    method: IntegrityMethod,
    value: &str,
    generation: Generation,
) -> Result<Vec<u8>, WireError> {
    let text = value.trim();
    let decoded = match generation {
        Generation::Legacy => hex::decode(text).map_err(|e| e.to_string()),
        Generation::Current => BASE64.decode(text).map_err(|e| e.to_string()),
    };
    decoded.map_err(|reason| WireError::BadDigest {
        method: method.name().to_string(),
        reason,
    })
}

// ── Current-generation form ───────────────────────────────────────────────────

/// `integrity` object as it appears in a current JSON message.
#[derive(Serialize, Deserialize)]
struct RawIntegrity {
    method: String,
    value: String,
}

impl TryFrom<RawIntegrity> for Integrity {
    type Error = WireError;

    fn try_from(raw: RawIntegrity) -> Result<Self, Self::Error> {
        let method = IntegrityMethod::from_name(&raw.method)?;
        Integrity::from_parts(method, &raw.value, Generation::Current)
    }
}

impl From<Integrity> for RawIntegrity {
    fn from(i: Integrity) -> Self {
        Self {
            method: i.method.name().to_string(),
            value: i.encoded_value(Generation::Current),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
