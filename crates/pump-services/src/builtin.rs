//! Built-in plugins.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use pump_core::extension::ExtensionPoint;
use pump_core::integrity::IntegrityMethod;

use crate::plugin::{HookContext, Plugin};

// ── log ───────────────────────────────────────────────────────────────────────

/// Logs every message at every stage. Never vetoes.
pub struct LogPlugin {
    capabilities: [ExtensionPoint; 4],
}

impl LogPlugin {
    pub const NAME: &'static str = "log";

    pub fn new() -> Self {
        Self {
            capabilities: ExtensionPoint::STAGES,
        }
    }

    fn log(&self, ctx: &HookContext<'_>) -> Result<bool> {
        tracing::info!(
            point = %ctx.point,
            instance = ctx.instance,
            url = %ctx.msg.fetch_url(),
            path = ctx.msg.local_rel_path(),
            "message"
        );
        Ok(true)
    }
}

impl Default for LogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> &[ExtensionPoint] {
        &self.capabilities
    }

    fn on_message(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        self.log(ctx)
    }

    fn on_part(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        self.log(ctx)
    }

    fn on_file(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        self.log(ctx)
    }

    fn on_post(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        self.log(ctx)
    }
}

// ── skip_unfetchable ──────────────────────────────────────────────────────────

/// Vetoes announcements of removals and links, which have nothing to fetch.
pub struct SkipUnfetchable;

impl SkipUnfetchable {
    pub const NAME: &'static str = "skip_unfetchable";
}

impl Plugin for SkipUnfetchable {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> &[ExtensionPoint] {
        &[ExtensionPoint::OnMessage]
    }

    fn on_message(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        let method = ctx.msg.integrity.as_ref().map(|i| i.method());
        if matches!(method, Some(IntegrityMethod::Remove | IntegrityMethod::Link)) {
            tracing::debug!(path = %ctx.msg.rel_path, ?method, "skipping unfetchable announcement");
            return Ok(false);
        }
        Ok(true)
    }
}

// ── total ─────────────────────────────────────────────────────────────────────

/// Counts messages seen and bytes of completed files.
#[derive(Default)]
pub struct TotalPlugin {
    messages: AtomicU64,
    files: AtomicU64,
    bytes: AtomicU64,
}

impl TotalPlugin {
    pub const NAME: &'static str = "total";

    /// (messages, files, bytes)
    pub fn totals(&self) -> (u64, u64, u64) {
        (
            self.messages.load(Ordering::Relaxed),
            self.files.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
        )
    }
}

impl Plugin for TotalPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> &[ExtensionPoint] {
        &[ExtensionPoint::OnMessage, ExtensionPoint::OnFile]
    }

    fn on_message(&self, _ctx: &mut HookContext<'_>) -> Result<bool> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn on_file(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        let size = ctx.msg.file_size().unwrap_or(0);
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        let (messages, files, bytes) = self.totals();
        tracing::info!(messages, files, bytes, "running totals");
        Ok(true)
    }
}
