//! Generation translation — legacy announcements to and from [`Message`].
//!
//! Legacy side: a body line `<pubTime> <baseUrl> <relPath>` and flat string
//! headers. Current side: the canonical message. Translation is lossless for
//! every semantic field; only representation changes (timestamp separator,
//! digest encoding, descriptor shape).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::integrity::Integrity;
use crate::message::{Content, Message, DELETE_ON_POST_HEADER};
use crate::partition::Partition;
use crate::wire::{
    escape_path, timestamp_to_current, timestamp_to_legacy, unescape_path, Generation, WireError,
};

/// Flat legacy header set.
pub type LegacyHeaders = BTreeMap<String, String>;

pub const SUM_HEADER: &str = "sum";
pub const PARTS_HEADER: &str = "parts";
pub const CONTENT_HEADER: &str = "content";

/// Headers holding timestamps that change form between generations.
pub const TIME_HEADERS: [&str; 2] = ["mtime", "atime"];

/// A legacy announcement as it travels: topic, body line, headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAnnouncement {
    pub topic: String,
    pub body: String,
    #[serde(default)]
    pub headers: LegacyHeaders,
}

impl LegacyAnnouncement {
    pub fn to_current(&self) -> Result<Message, WireError> {
        to_current(&self.body, &self.headers, &self.topic)
    }

    pub fn from_message(msg: &Message) -> Self {
        to_legacy(msg)
    }
}

// ── Legacy → current ──────────────────────────────────────────────────────────

/// Build a canonical message from a legacy body, headers, and topic.
///
/// The body must hold at least three whitespace-separated fields; anything
/// after the third is ignored. `sum` is decoded from hex, `parts` becomes a
/// `blocks` descriptor for ranged styles and a plain `size` otherwise, and
/// every other header is carried by name.
pub fn to_current(body: &str, headers: &LegacyHeaders, topic: &str) -> Result<Message, WireError> {
    let mut fields = body.split_whitespace();
    let pub_time = fields.next().ok_or(WireError::MissingField("pubTime"))?;
    let base_url = fields.next().ok_or(WireError::MissingField("baseUrl"))?;
    let rel_path = fields.next().ok_or(WireError::MissingField("relPath"))?;

    let mut msg = Message::new(
        timestamp_to_current(pub_time)?,
        base_url,
        unescape_path(rel_path),
        topic,
    );

    for (key, value) in headers {
        match key.as_str() {
            SUM_HEADER => {
                msg.integrity = Some(Integrity::decode(value, Generation::Legacy)?);
            }
            PARTS_HEADER => {
                let partition = Partition::decode(value)?;
                if partition.style.is_ranged() {
                    partition.check()?;
                    msg.partition = Some(partition);
                } else {
                    msg.size = Some(partition.chunk_size);
                }
            }
            DELETE_ON_POST_HEADER => {
                msg.delete_on_post = field_list(value);
            }
            CONTENT_HEADER => {
                let content = serde_json::from_str::<Content>(value)
                    .unwrap_or_else(|_| Content::text(value.clone()));
                msg.content = Some(content);
            }
            k if TIME_HEADERS.contains(&k) => {
                msg.headers
                    .insert(key.clone(), Value::String(timestamp_to_current(value)?));
            }
            _ => {
                msg.headers.insert(key.clone(), header_value(value));
            }
        }
    }

    Ok(msg)
}

/// Field names as a JSON list, or comma separated.
fn field_list(text: &str) -> BTreeSet<String> {
    match serde_json::from_str::<Vec<String>>(text) {
        Ok(names) => names.into_iter().collect(),
        Err(_) => text
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect(),
    }
}

/// Structured values folded to JSON text on the way out are restored; any
/// other header stays a string.
fn header_value(text: &str) -> Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str(text) {
            return v;
        }
    }
    Value::String(text.to_string())
}

// ── Current → legacy ──────────────────────────────────────────────────────────

/// Render a canonical message as a legacy announcement.
///
/// `size` becomes a whole-file `parts` header, digests are re-encoded as hex,
/// and fields whose name starts with `_` are never emitted. Inline content has
/// no legacy form and is dropped.
pub fn to_legacy(msg: &Message) -> LegacyAnnouncement {
    let body = format!(
        "{} {} {}",
        timestamp_to_legacy(&msg.pub_time),
        msg.base_url,
        escape_path(&msg.rel_path)
    );

    let mut headers = LegacyHeaders::new();
    if let Some(integrity) = &msg.integrity {
        headers.insert(SUM_HEADER.into(), integrity.encode(Generation::Legacy));
    }
    let parts = match (&msg.partition, msg.size) {
        (Some(p), _) => Some(*p),
        (None, Some(size)) => Some(Partition::whole(size)),
        (None, None) => None,
    };
    if let Some(p) = parts {
        headers.insert(PARTS_HEADER.into(), p.encode());
    }

    for (key, value) in &msg.headers {
        if key.starts_with('_') {
            continue;
        }
        let text = match value {
            Value::String(s) if TIME_HEADERS.contains(&key.as_str()) => timestamp_to_legacy(s),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        headers.insert(key.clone(), text);
    }

    LegacyAnnouncement {
        topic: msg.topic.clone(),
        body,
        headers,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
