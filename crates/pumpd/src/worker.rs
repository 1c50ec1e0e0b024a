//! Per-message processing loop body.
//!
//! translate → on_message → transfer → on_part / on_file → on_post → re-post

use anyhow::Result;

use pump_core::extension::ExtensionPoint;
use pump_core::message::Message;
use pump_core::translate::to_legacy;
use pump_core::wire::Generation;
use pump_services::{BlockTransfer, PluginPipeline};

use crate::ingest;

/// How far one input line got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Blank line.
    Empty,
    /// The line did not decode.
    Malformed,
    /// A hook at this point vetoed the message.
    Rejected(ExtensionPoint),
    /// The fetch failed; the outcome was logged by the downloader.
    FetchFailed,
    /// Block written. `post` holds the re-post line when posting is enabled.
    Done { complete: bool, post: Option<String> },
}

pub struct Worker {
    transfer: BlockTransfer,
    pipeline: PluginPipeline,
    post_generation: Option<Generation>,
}

impl Worker {
    pub fn new(
        transfer: BlockTransfer,
        pipeline: PluginPipeline,
        post_generation: Option<Generation>,
    ) -> Self {
        Self {
            transfer,
            pipeline,
            post_generation,
        }
    }

    /// Process one input line. Never fails; every problem is logged and
    /// reflected in the disposition.
    pub async fn process_line(&self, line: &str) -> Disposition {
        let mut msg = match ingest::parse_line(line) {
            Ok(Some((generation, msg))) => {
                tracing::debug!(%generation, path = %msg.rel_path, "announcement received");
                msg
            }
            Ok(None) => return Disposition::Empty,
            Err(e) => {
                tracing::error!(error = %e, protocol = e.is_protocol(), "rejecting malformed announcement");
                return Disposition::Malformed;
            }
        };

        match self.process(&mut msg).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(path = %msg.rel_path, error = %e, "transfer preparation failed");
                Disposition::FetchFailed
            }
        }
    }

    async fn process(&self, msg: &mut Message) -> Result<Disposition> {
        if !self.pipeline.dispatch(ExtensionPoint::OnMessage, msg) {
            return Ok(Disposition::Rejected(ExtensionPoint::OnMessage));
        }

        let report = self.transfer.run(msg, None).await?;
        if !report.outcome.is_success() {
            return Ok(Disposition::FetchFailed);
        }

        if report.block.style.is_ranged() && !self.pipeline.dispatch(ExtensionPoint::OnPart, msg) {
            return Ok(Disposition::Rejected(ExtensionPoint::OnPart));
        }
        if report.complete && !self.pipeline.dispatch(ExtensionPoint::OnFile, msg) {
            return Ok(Disposition::Rejected(ExtensionPoint::OnFile));
        }
        if !self.pipeline.dispatch(ExtensionPoint::OnPost, msg) {
            return Ok(Disposition::Rejected(ExtensionPoint::OnPost));
        }

        tracing::info!(
            path = %report.path.display(),
            code = report.outcome.code,
            bytes = report.outcome.bytes,
            complete = report.complete,
            "block processed"
        );
        Ok(Disposition::Done {
            complete: report.complete,
            post: self.post_line(msg)?,
        })
    }

    fn post_line(&self, msg: &Message) -> Result<Option<String>> {
        self.post_generation
            .map(|generation| render(msg, generation))
            .transpose()
    }
}

/// One output line carrying `msg` in `generation` form.
pub fn render(msg: &Message, generation: Generation) -> Result<String> {
    Ok(match generation {
        Generation::Current => serde_json::to_string(&msg.to_post_json()?)?,
        Generation::Legacy => serde_json::to_string(&to_legacy(msg))?,
    })
}
