//! Announcement message — the canonical in-memory form.
//!
//! A message describes where a file can be fetched and how to check it, not
//! the file itself. Both protocol generations decode into this one shape; the
//! current-generation JSON form maps onto it field for field, the legacy form
//! goes through `translate`.

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::integrity::Integrity;
use crate::partition::{Partition, PartitionStyle};
use crate::wire::{escape_path, timestamp_to_current, WireError, DEFAULT_DELETE_ON_POST};

/// Header naming the local file name to use instead of `relPath`.
pub const RENAME_HEADER: &str = "rename";

/// Field listing what is removed before the message is posted onward.
pub const DELETE_ON_POST_HEADER: &str = "_deleteOnPost";

/// Inline content encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

/// Small file body carried inside the announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub encoding: ContentEncoding,
    pub value: String,
}

impl Content {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            encoding: ContentEncoding::Utf8,
            value: value.into(),
        }
    }

    /// Decoded body bytes.
    pub fn bytes(&self) -> Result<Vec<u8>, WireError> {
        match self.encoding {
            ContentEncoding::Utf8 => Ok(self.value.clone().into_bytes()),
            ContentEncoding::Base64 => BASE64
                .decode(self.value.trim())
                .map_err(|e| WireError::BadJson(format!("inline content: {e}"))),
        }
    }
}

/// One announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Publication time, `YYYYMMDDThhmmss[.ffffff]`.
    pub pub_time: String,
    pub base_url: String,
    pub rel_path: String,

    /// Routing classification. Not interpreted here.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,

    /// Whole-file size when the file is not partitioned.
    #[serde(
        default,
        deserialize_with = "de_opt_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,

    #[serde(default, rename = "blocks", skip_serializing_if = "Option::is_none")]
    pub partition: Option<Partition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Fields removed before the message is posted onward.
    #[serde(
        default,
        rename = "_deleteOnPost",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub delete_on_post: BTreeSet<String>,

    /// Extension fields: `mtime`, `atime`, `rename`, and anything else.
    #[serde(flatten)]
    pub headers: BTreeMap<String, Value>,
}

impl Message {
    /// Fresh message with the default deletion hint.
    pub fn new(
        pub_time: impl Into<String>,
        base_url: impl Into<String>,
        rel_path: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            pub_time: pub_time.into(),
            base_url: base_url.into(),
            rel_path: rel_path.into(),
            topic: topic.into(),
            size: None,
            partition: None,
            integrity: None,
            content: None,
            delete_on_post: BTreeSet::from([DEFAULT_DELETE_ON_POST.to_string()]),
            headers: BTreeMap::new(),
        }
    }

    /// Parse a current-generation JSON message.
    ///
    /// The timestamp is normalised to the current form, a whole-file `blocks`
    /// object is folded into `size`, and ranged partitions must be coherent.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        let mut msg: Message =
            serde_json::from_str(text).map_err(|e| WireError::BadJson(e.to_string()))?;
        msg.pub_time = timestamp_to_current(&msg.pub_time)?;
        msg.headers.remove(DELETE_ON_POST_HEADER);
        if let Some(p) = msg.partition {
            if p.style == PartitionStyle::Whole {
                msg.partition = None;
                msg.size = Some(p.file_size());
            } else {
                p.check()?;
            }
        }
        Ok(msg)
    }

    /// Current-generation JSON text, every field included.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|e| WireError::BadJson(e.to_string()))
    }

    /// JSON value for onward posting: fields named by the deletion hint and the
    /// hint itself are dropped.
    pub fn to_post_json(&self) -> Result<Value, WireError> {
        let mut value = serde_json::to_value(self).map_err(|e| WireError::BadJson(e.to_string()))?;
        if let Some(obj) = value.as_object_mut() {
            for key in &self.delete_on_post {
                obj.remove(key);
            }
            obj.remove(DELETE_ON_POST_HEADER);
        }
        Ok(value)
    }

    /// `baseUrl` and `relPath` joined with one slash, path characters that
    /// cannot appear raw in a URL escaped.
    pub fn fetch_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let rel = self.rel_path.trim_start_matches('/');
        format!("{base}/{}", escape_path(rel))
    }

    /// Relative path of the local file: the `rename` header when present.
    pub fn local_rel_path(&self) -> &str {
        self.header_str(RENAME_HEADER).unwrap_or(&self.rel_path)
    }

    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(Value::as_str)
    }

    /// Size of the announced file, from whichever field carries it.
    pub fn file_size(&self) -> Option<u64> {
        match (&self.partition, self.size) {
            (Some(p), _) => Some(p.file_size()),
            (None, size) => size,
        }
    }

    /// Block this message describes; a whole-file block when unpartitioned.
    pub fn block(&self) -> Option<Partition> {
        self.partition
            .or_else(|| self.size.map(Partition::whole))
    }
}

/// `size` arrives as a number from current producers and as a string when it
/// was lifted out of a legacy descriptor.
fn de_opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
