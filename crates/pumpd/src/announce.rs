//! Announce mode — describe a local file as the blocks subscribers fetch.
//!
//! The file is split with the configured `block_size`; every block becomes
//! one message. Blocks are announced inplace or partitioned following the
//! `inplace` transfer setting.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use pump_core::config::TransferSettings;
use pump_core::message::Message;
use pump_core::partition::{plan, PartitionStyle};

/// Topic every announcement starts with; directories of the path follow.
pub const TOPIC_PREFIX: &str = "v03.post";

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// `YYYYMMDDThhmmss.fff` in UTC.
pub fn stamp(time: DateTime<Utc>) -> String {
    time.format(STAMP_FORMAT).to_string()
}

/// `v03.post.<dir>.<dir>` for the directories of `rel_path`.
pub fn topic_for(rel_path: &str) -> String {
    let dirs: Vec<&str> = rel_path
        .trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty())
        .collect();
    match dirs.split_last() {
        Some((_, parents)) if !parents.is_empty() => format!("{TOPIC_PREFIX}.{}", parents.join(".")),
        _ => TOPIC_PREFIX.to_string(),
    }
}

/// Messages announcing a file of `file_size` bytes, in block order.
pub fn announcements(
    file_size: u64,
    settings: &TransferSettings,
    base_url: &str,
    rel_path: &str,
    pub_time: &str,
) -> Vec<Message> {
    let style = if settings.inplace {
        PartitionStyle::Inplace
    } else {
        PartitionStyle::Partitioned
    };
    let topic = topic_for(rel_path);

    plan(file_size, settings.block_size, style)
        .into_iter()
        .map(|block| {
            let mut msg = Message::new(pub_time, base_url, rel_path, topic.clone());
            if block.style.is_ranged() {
                msg.partition = Some(block);
            } else {
                msg.size = Some(block.file_size());
            }
            msg
        })
        .collect()
}

/// Announce the local file at `path`, stamped now, carrying its `mtime`.
pub async fn announce_file(
    path: &Path,
    settings: &TransferSettings,
    base_url: &str,
    rel_path: &str,
) -> Result<Vec<Message>> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    let mut messages = announcements(meta.len(), settings, base_url, rel_path, &stamp(Utc::now()));
    let mtime = Value::String(stamp(DateTime::<Utc>::from(mtime)));
    for msg in &mut messages {
        msg.headers.insert("mtime".into(), mtime.clone());
    }
    tracing::info!(
        path = %path.display(),
        bytes = meta.len(),
        blocks = messages.len(),
        "file announced"
    );
    Ok(messages)
}
