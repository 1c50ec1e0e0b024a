//! Pump integration test harness.
//!
//! Every test runs against an in-process HTTP origin bound to an ephemeral
//! loopback port, so nothing outside the test process is needed:
//!
//!   cargo test --test integration
//!
//! Each test works in its own scratch directory under the system temp dir and
//! removes it when done.

use std::path::PathBuf;

use anyhow::Result;

use pump_core::config::TransferSettings;
use pump_core::message::Message;
use pump_core::partition::Partition;

mod infra;
mod transfer;
mod translation;

pub use infra::{serve, Origin, OriginOptions};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Deterministic, non-repeating-looking file body.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 251) as u8).collect()
}

/// Fresh scratch directory for one test.
pub fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pump-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

pub fn settings(destination: PathBuf) -> TransferSettings {
    TransferSettings {
        destination,
        buffer_size: 100,
        timeout_secs: 5,
        ..TransferSettings::default()
    }
}

/// Announcement for one block of `rel_path` on `origin`.
pub fn announce(origin: &Origin, rel_path: &str, block: Partition) -> Message {
    let mut msg = Message::new("20240102T030405.25", origin.base_url.clone(), rel_path, "v03.post.it");
    msg.partition = Some(block);
    msg
}

/// A few arrival orders for `n` blocks: forward, reverse, odd-then-even, and
/// a rotation.
pub fn permutations(n: u64) -> Vec<Vec<u64>> {
    let forward: Vec<u64> = (0..n).collect();
    let reverse: Vec<u64> = (0..n).rev().collect();
    let interleaved: Vec<u64> = (0..n).filter(|i| i % 2 == 1).chain((0..n).filter(|i| i % 2 == 0)).collect();
    let rotated: Vec<u64> = (n / 2..n).chain(0..n / 2).collect();
    vec![forward, reverse, interleaved, rotated]
}

pub fn cleanup(dir: &PathBuf) -> Result<()> {
    std::fs::remove_dir_all(dir)?;
    Ok(())
}
