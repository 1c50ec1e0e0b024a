//! Extension points — the fixed set of stages external hooks attach to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named stage in a message's processing lifecycle.
///
/// `Plugin` is not a stage: loading a plugin at this point binds every stage
/// the plugin declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionPoint {
    Plugin,
    OnMessage,
    OnPart,
    OnFile,
    OnPost,
}

impl ExtensionPoint {
    /// Stages in the order a message passes through them.
    pub const STAGES: [ExtensionPoint; 4] = [
        ExtensionPoint::OnMessage,
        ExtensionPoint::OnPart,
        ExtensionPoint::OnFile,
        ExtensionPoint::OnPost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtensionPoint::Plugin => "plugin",
            ExtensionPoint::OnMessage => "on_message",
            ExtensionPoint::OnPart => "on_part",
            ExtensionPoint::OnFile => "on_file",
            ExtensionPoint::OnPost => "on_post",
        }
    }

    pub fn is_stage(self) -> bool {
        self != ExtensionPoint::Plugin
    }
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown extension point: {0:?}")]
pub struct UnknownExtensionPoint(pub String);

impl FromStr for ExtensionPoint {
    type Err = UnknownExtensionPoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        std::iter::once(ExtensionPoint::Plugin)
            .chain(ExtensionPoint::STAGES)
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownExtensionPoint(s.to_string()))
    }
}
