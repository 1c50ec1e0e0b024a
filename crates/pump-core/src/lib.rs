//! pump-core — announcement wire formats, descriptor codecs, and translation
//! between protocol generations. All other pump crates depend on this one.

pub mod config;
pub mod extension;
pub mod integrity;
pub mod message;
pub mod partition;
pub mod translate;
pub mod wire;

pub use extension::ExtensionPoint;
pub use integrity::{Integrity, IntegrityMethod, IntegrityValue};
pub use message::{Content, ContentEncoding, Message};
pub use partition::{BlockSpan, Partition, PartitionStyle};
pub use translate::{LegacyAnnouncement, LegacyHeaders};
pub use wire::{Generation, WireError};
