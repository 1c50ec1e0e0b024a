//! pump-services — block transfer engine and plugin pipeline.

pub mod builtin;
pub mod download;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod transfer;

pub use download::{Credentials, FetchError, Outcome, RangeDownloader};
pub use pipeline::PluginPipeline;
pub use plugin::{Hook, HookContext, Plugin, PluginError};
pub use registry::PluginRegistry;
pub use transfer::{BlockTransfer, TransferReport};
