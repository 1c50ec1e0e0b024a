//! Block transfer — turn one announcement into one local write.
//!
//! Resolves where the announced block lands locally and hands the fetch to
//! [`RangeDownloader`]:
//!
//!   whole        plain GET into the target file at offset 0
//!   inplace      ranged GET into the target file at the block offset; the
//!                file is grown to its full size first, never shrunk
//!   partitioned  ranged GET into `<file>.<blockIndex>.part`; once every
//!                segment is present the file is reassembled in block order
//!
//! Segment files make partitioned completion visible across processes.
//! Inplace completion is tracked per transfer instance only.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use pump_core::config::TransferSettings;
use pump_core::message::Message;
use pump_core::partition::{Partition, PartitionStyle};

use crate::download::{Credentials, Outcome, RangeDownloader};

/// Result of transferring one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub outcome: Outcome,
    /// Target file the block belongs to.
    pub path: PathBuf,
    pub block: Partition,
    /// True once the whole file is present at `path`.
    pub complete: bool,
}

pub struct BlockTransfer {
    downloader: RangeDownloader,
    destination: PathBuf,
    inplace: bool,
    /// Inplace blocks received so far, per target file.
    received: Arc<Mutex<HashMap<PathBuf, BTreeSet<u64>>>>,
}

impl BlockTransfer {
    pub fn new(settings: &TransferSettings) -> Result<Self> {
        Ok(Self::with_downloader(RangeDownloader::new(settings)?, settings))
    }

    pub fn with_downloader(downloader: RangeDownloader, settings: &TransferSettings) -> Self {
        Self {
            downloader,
            destination: settings.destination.clone(),
            inplace: settings.inplace,
            received: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Local file a message's block is written to, always under the
    /// destination. Paths climbing out of it with `..` are rejected.
    pub fn local_path(&self, msg: &Message) -> Result<PathBuf> {
        let rel = msg.local_rel_path();
        let mut path = self.destination.clone();
        for component in Path::new(rel.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => bail!("local path {rel:?} escapes {}", self.destination.display()),
            }
        }
        if path == self.destination {
            bail!("local path {rel:?} names no file");
        }
        Ok(path)
    }

    /// Fetch the block `msg` describes.
    ///
    /// Errors are local preparation failures (directories, pre-sizing,
    /// reassembly). A failed fetch is not an error; it is reported through
    /// the outcome.
    pub async fn run(&self, msg: &Message, credentials: Option<&Credentials>) -> Result<TransferReport> {
        let path = self.local_path(msg)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if let Some(content) = &msg.content {
            return self.write_inline(msg, &path, content.bytes()?).await;
        }

        let block = msg.block().unwrap_or(Partition::whole(0));
        let url = msg.fetch_url();

        let (outcome, complete) = match self.effective_style(block.style) {
            PartitionStyle::Whole => {
                let outcome = self.downloader.fetch(&url, credentials, &block, &path, 0).await;
                if outcome.is_success() {
                    truncate_to(&path, outcome.bytes).await?;
                }
                (outcome, outcome.is_success())
            }
            PartitionStyle::Inplace => {
                presize(&path, block.file_size()).await?;
                let span = block.span();
                let outcome = self
                    .downloader
                    .fetch(&url, credentials, &block, &path, span.offset)
                    .await;
                let complete = outcome.is_success() && self.record_inplace(&path, &block).await;
                (outcome, complete)
            }
            PartitionStyle::Partitioned => {
                let segment = segment_path(&path, block.block_index);
                let outcome = self.downloader.fetch(&url, credentials, &block, &segment, 0).await;
                let complete = if outcome.is_success() {
                    truncate_to(&segment, outcome.bytes).await?;
                    reassemble(&path, &block).await?
                } else {
                    false
                };
                (outcome, complete)
            }
        };

        Ok(TransferReport {
            outcome,
            path,
            block,
            complete,
        })
    }

    /// Partitioned blocks go straight into the target when configured inplace.
    fn effective_style(&self, style: PartitionStyle) -> PartitionStyle {
        match style {
            PartitionStyle::Partitioned if self.inplace => PartitionStyle::Inplace,
            other => other,
        }
    }

    async fn record_inplace(&self, path: &Path, block: &Partition) -> bool {
        let mut received = self.received.lock().await;
        let seen = received.entry(path.to_path_buf()).or_default();
        seen.insert(block.block_index);
        if seen.len() as u64 >= block.block_count {
            received.remove(path);
            tracing::info!(path = %path.display(), blocks = block.block_count, "all blocks written in place");
            return true;
        }
        false
    }

    async fn write_inline(&self, msg: &Message, path: &Path, body: Vec<u8>) -> Result<TransferReport> {
        tokio::fs::write(path, &body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = body.len(), "inline content written");
        Ok(TransferReport {
            outcome: Outcome::success(body.len() as u64),
            path: path.to_path_buf(),
            block: msg.block().unwrap_or(Partition::whole(body.len() as u64)),
            complete: true,
        })
    }
}

// ── Local file helpers ────────────────────────────────────────────────────────

/// `<file>.<blockIndex>.part`
pub fn segment_path(path: &Path, block_index: u64) -> PathBuf {
    sibling_path(path, &format!("{block_index}.part"))
}

/// Create `path` if needed and grow it to `size`. Never shrinks.
async fn presize(path: &Path, size: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let current = file.metadata().await?.len();
    if current < size {
        file.set_len(size).await?;
    }
    Ok(())
}

async fn truncate_to(path: &Path, size: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.set_len(size).await?;
    Ok(())
}

/// Concatenate every segment of the file `block` belongs to into `path`, in
/// block order, then remove the segments.
///
/// Returns false, leaving everything in place, while any segment is missing
/// or short. One caller claims the reassembly through `<file>.claim`; it
/// stitches the segments into `<file>.<pid>.tmp` and renames that over the
/// target, so the target is either absent or complete. Every other caller
/// gets false.
pub async fn reassemble(path: &Path, block: &Partition) -> Result<bool> {
    let segments: Vec<(PathBuf, u64)> = (0..block.block_count)
        .map(|index| {
            let sibling = Partition {
                block_index: index,
                ..*block
            };
            (segment_path(path, index), sibling.span().length)
        })
        .collect();

    for (segment, expected) in &segments {
        match tokio::fs::metadata(segment).await {
            Ok(meta) if meta.len() == *expected => {}
            _ => return Ok(false),
        }
    }

    let claim = sibling_path(path, "claim");
    match OpenOptions::new().write(true).create_new(true).open(&claim).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("failed to create {}", claim.display())),
    }

    let result = stitch_and_replace(path, &segments).await;
    let _ = tokio::fs::remove_file(&claim).await;
    if !result? {
        return Ok(false);
    }

    tracing::info!(
        path = %path.display(),
        blocks = block.block_count,
        bytes = block.file_size(),
        "file reassembled from segments"
    );
    Ok(true)
}

/// `<file>.<suffix>`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Stitch `segments` into a staging file, move it over `path`, drop the
/// segments. False when a segment vanished, meaning an earlier claim
/// already finished the file.
async fn stitch_and_replace(path: &Path, segments: &[(PathBuf, u64)]) -> Result<bool> {
    let staging = sibling_path(path, &format!("{}.tmp", std::process::id()));
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staging)
        .await
        .with_context(|| format!("failed to open {}", staging.display()))?;

    for (segment, _) in segments {
        let data = match tokio::fs::read(segment).await {
            Ok(data) => data,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Ok(false);
                }
                return Err(e).with_context(|| format!("failed to read {}", segment.display()));
            }
        };
        out.write_all(&data).await?;
    }
    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    tokio::fs::rename(&staging, path)
        .await
        .with_context(|| format!("failed to move {} into place", staging.display()))?;
    for (segment, _) in segments {
        let _ = tokio::fs::remove_file(segment).await;
    }
    Ok(true)
}
