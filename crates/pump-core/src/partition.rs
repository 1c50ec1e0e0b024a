//! Partition descriptors — how a file is split into independently fetched blocks.
//!
//! Legacy wire form (the `parts` header), five comma-separated fields:
//!
//!   <style>,<chunkSize>,<blockCount>,<remainder>,<blockIndex>
//!
//!   style  `i` inplace, `p` partitioned, anything else (conventionally `1`)
//!          a whole-file transfer described as a single block
//!
//! Current wire form is the `blocks` object of a JSON message:
//! `{"method": "inplace", "size": "...", "count": "...", "remainder": "...", "number": "..."}`.
//!
//! Invariants for a coherent descriptor of a file of `f` bytes with chunk `c`:
//! `blockCount == ceil(f / c)`, `remainder == f mod c`, `blockIndex < blockCount`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::wire::WireError;

/// Number of fields in the legacy descriptor string.
pub const PARTITION_FIELDS: usize = 5;

// ── Style ─────────────────────────────────────────────────────────────────────

/// How the blocks of a partitioned file are materialised locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStyle {
    /// One block covering the whole file; fetched with a plain GET.
    Whole,
    /// Every block is written at its offset into one pre-allocated file.
    Inplace,
    /// Every block lands in its own segment, reassembled once all are present.
    Partitioned,
}

impl PartitionStyle {
    /// Single-character legacy tag.
    pub fn tag(self) -> char {
        match self {
            PartitionStyle::Whole => '1',
            PartitionStyle::Inplace => 'i',
            PartitionStyle::Partitioned => 'p',
        }
    }

    /// Legacy tag → style. Unknown tags describe a whole-file transfer.
    pub fn from_tag(tag: char) -> Self {
        match tag {
            'i' => PartitionStyle::Inplace,
            'p' => PartitionStyle::Partitioned,
            _ => PartitionStyle::Whole,
        }
    }

    /// Current-generation method name.
    pub fn name(self) -> &'static str {
        match self {
            PartitionStyle::Whole => "whole",
            PartitionStyle::Inplace => "inplace",
            PartitionStyle::Partitioned => "partitioned",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "whole" => Some(PartitionStyle::Whole),
            "inplace" => Some(PartitionStyle::Inplace),
            "partitioned" => Some(PartitionStyle::Partitioned),
            _ => None,
        }
    }

    /// Whether a block of this style is fetched with a byte-range request.
    pub fn is_ranged(self) -> bool {
        self != PartitionStyle::Whole
    }
}

// ── Block span ────────────────────────────────────────────────────────────────

/// Byte range `[offset, offset + length)` of one block within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub offset: u64,
    pub length: u64,
}

impl BlockSpan {
    /// Inclusive HTTP `Range` value, `bytes=<start>-<end>`.
    /// None for an empty span, which no range can express.
    pub fn range_header(&self) -> Option<String> {
        if self.length == 0 {
            return None;
        }
        Some(format!(
            "bytes={}-{}",
            self.offset,
            self.offset.saturating_add(self.length - 1)
        ))
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

// ── Descriptor ────────────────────────────────────────────────────────────────

/// One block of a file, as announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBlocks", into = "RawBlocks")]
pub struct Partition {
    pub style: PartitionStyle,
    pub chunk_size: u64,
    pub block_count: u64,
    pub remainder: u64,
    pub block_index: u64,
}

impl Partition {
    /// Single block covering a file of `file_size` bytes.
    pub fn whole(file_size: u64) -> Self {
        Self {
            style: PartitionStyle::Whole,
            chunk_size: file_size,
            block_count: 1,
            remainder: 0,
            block_index: 0,
        }
    }

    /// Legacy descriptor string.
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.style.tag(),
            self.chunk_size,
            self.block_count,
            self.remainder,
            self.block_index
        )
    }

    /// Parse a legacy descriptor string.
    ///
    /// Fails on a wrong field count, a non-numeric size field, or a style
    /// field that is not exactly one character. Coherence of the numbers is
    /// not checked here; see [`Partition::check`].
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let fields: Vec<&str> = text.trim().split(',').collect();
        if fields.len() != PARTITION_FIELDS {
            return Err(WireError::FieldCount {
                expected: PARTITION_FIELDS,
                found: fields.len(),
            });
        }

        let style_field = fields[0].trim();
        let mut chars = style_field.chars();
        let tag = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(WireError::BadStyle(style_field.to_string())),
        };

        Ok(Self {
            style: PartitionStyle::from_tag(tag),
            chunk_size: parse_field("chunkSize", fields[1])?,
            block_count: parse_field("blockCount", fields[2])?,
            remainder: parse_field("remainder", fields[3])?,
            block_index: parse_field("blockIndex", fields[4])?,
        })
    }

    /// Total size of the file this block belongs to. Saturates at
    /// `u64::MAX` for a descriptor whose numbers overflow; [`Partition::check`]
    /// rejects those.
    pub fn file_size(&self) -> u64 {
        self.checked_file_size().unwrap_or(u64::MAX)
    }

    fn checked_file_size(&self) -> Option<u64> {
        match self.style {
            PartitionStyle::Whole => Some(self.chunk_size),
            _ if self.block_count == 0 => Some(0),
            _ if self.remainder > 0 => (self.block_count - 1)
                .checked_mul(self.chunk_size)?
                .checked_add(self.remainder),
            _ => self.block_count.checked_mul(self.chunk_size),
        }
    }

    /// Byte range this block covers. The last block is short when the file
    /// size is not a multiple of the chunk size.
    pub fn span(&self) -> BlockSpan {
        let is_last = self.block_index + 1 == self.block_count;
        let length = if is_last && self.remainder > 0 {
            self.remainder
        } else {
            self.chunk_size
        };
        BlockSpan {
            offset: self.block_index.saturating_mul(self.chunk_size),
            length,
        }
    }

    pub fn is_last(&self) -> bool {
        self.block_index + 1 == self.block_count
    }

    /// Validate the descriptor invariants.
    pub fn check(&self) -> Result<(), WireError> {
        if self.block_count == 0 {
            return Err(WireError::Incoherent("block count is zero".into()));
        }
        if self.block_index >= self.block_count {
            return Err(WireError::Incoherent(format!(
                "block index {} outside 0..{}",
                self.block_index, self.block_count
            )));
        }
        if self.style == PartitionStyle::Whole {
            if self.block_count != 1 || self.remainder != 0 {
                return Err(WireError::Incoherent(
                    "whole-file descriptor must be a single block with no remainder".into(),
                ));
            }
            return Ok(());
        }
        if self.chunk_size == 0 {
            return Err(WireError::Incoherent("chunk size is zero".into()));
        }
        if self.remainder >= self.chunk_size {
            return Err(WireError::Incoherent(format!(
                "remainder {} not below chunk size {}",
                self.remainder, self.chunk_size
            )));
        }
        let size = self.checked_file_size().ok_or_else(|| {
            WireError::Incoherent(format!(
                "{} blocks of {} overflow the file size",
                self.block_count, self.chunk_size
            ))
        })?;
        if block_count(size, self.chunk_size) != self.block_count {
            return Err(WireError::Incoherent(format!(
                "{} blocks of {} cannot cover {} bytes",
                self.block_count, self.chunk_size, size
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Partition {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Partition::decode(s)
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<u64, WireError> {
    value.trim().parse::<u64>().map_err(|_| WireError::NotNumeric {
        field,
        value: value.to_string(),
    })
}

// ── Sizing ────────────────────────────────────────────────────────────────────

/// Pick the chunk size used to partition a file.
///
/// A request of one byte or less, or one at least as large as the file,
/// selects the whole file as a single block.
pub fn choose_chunk_size(requested: i64, file_size: u64) -> u64 {
    if requested <= 1 || requested as u64 >= file_size {
        file_size
    } else {
        requested as u64
    }
}

/// `ceil(file_size / chunk_size)`, never less than one block.
pub fn block_count(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 1;
    }
    file_size.div_ceil(chunk_size).max(1)
}

/// `file_size mod chunk_size`, zero when there is no chunking.
pub fn remainder(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size % chunk_size
}

/// Every descriptor needed to announce a file, in block order.
///
/// When the chosen chunk covers the file a single whole-file descriptor is
/// returned. Otherwise one descriptor per block with the given style
/// (`Whole` falls back to `Inplace`).
pub fn plan(file_size: u64, requested: i64, style: PartitionStyle) -> Vec<Partition> {
    let chunk_size = choose_chunk_size(requested, file_size);
    if chunk_size == file_size {
        return vec![Partition::whole(file_size)];
    }

    let style = if style == PartitionStyle::Whole {
        PartitionStyle::Inplace
    } else {
        style
    };
    let count = block_count(file_size, chunk_size);
    let rem = remainder(file_size, chunk_size);
    (0..count)
        .map(|block_index| Partition {
            style,
            chunk_size,
            block_count: count,
            remainder: rem,
            block_index,
        })
        .collect()
}

// ── Current-generation form ───────────────────────────────────────────────────

/// `blocks` object as it appears in a current JSON message. Numbers are
/// written as strings and accepted either way.
#[derive(Serialize, Deserialize)]
struct RawBlocks {
    method: String,
    size: Count,
    count: Count,
    remainder: Count,
    number: Count,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn value(self, field: &'static str) -> Result<u64, WireError> {
        match self {
            Count::Number(n) => Ok(n),
            Count::Text(s) => parse_field(field, &s),
        }
    }
}

impl TryFrom<RawBlocks> for Partition {
    type Error = WireError;

    fn try_from(raw: RawBlocks) -> Result<Self, Self::Error> {
        let style = PartitionStyle::from_name(&raw.method)
            .ok_or_else(|| WireError::BadStyle(raw.method.clone()))?;
        Ok(Self {
            style,
            chunk_size: raw.size.value("size")?,
            block_count: raw.count.value("count")?,
            remainder: raw.remainder.value("remainder")?,
            block_index: raw.number.value("number")?,
        })
    }
}

impl From<Partition> for RawBlocks {
    fn from(p: Partition) -> Self {
        Self {
            method: p.style.name().to_string(),
            size: Count::Text(p.chunk_size.to_string()),
            count: Count::Text(p.block_count.to_string()),
            remainder: Count::Text(p.remainder.to_string()),
            number: Count::Text(p.block_index.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
