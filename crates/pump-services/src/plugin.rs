//! Hook and plugin contracts.
//!
//! A [`Hook`] is one callable attached to one extension point. A [`Plugin`]
//! is a named unit that declares which extension points it serves and
//! implements a method for each; loading it binds those methods as hooks.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use pump_core::extension::ExtensionPoint;
use pump_core::message::Message;

/// Execution context handed to every hook.
pub struct HookContext<'a> {
    pub msg: &'a mut Message,
    pub point: ExtensionPoint,
    /// Daemon instance number.
    pub instance: u32,
    pub cache_dir: &'a Path,
}

/// One step at an extension point. `Ok(false)` vetoes the message; an error
/// counts as a veto too.
pub trait Hook: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn call(&self, ctx: &mut HookContext<'_>) -> Result<bool>;
}

impl<F> Hook for F
where
    F: Fn(&mut HookContext<'_>) -> Result<bool> + Send + Sync,
{
    fn call(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        self(ctx)
    }
}

/// A loadable unit of message-processing logic.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Extension points this plugin binds to when loaded.
    fn capabilities(&self) -> &[ExtensionPoint];

    fn on_message(&self, _ctx: &mut HookContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn on_part(&self, _ctx: &mut HookContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn on_file(&self, _ctx: &mut HookContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn on_post(&self, _ctx: &mut HookContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// A plugin's method for one extension point, as a hook.
pub(crate) struct PluginHook {
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) point: ExtensionPoint,
}

impl Hook for PluginHook {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn call(&self, ctx: &mut HookContext<'_>) -> Result<bool> {
        match self.point {
            ExtensionPoint::OnMessage => self.plugin.on_message(ctx),
            ExtensionPoint::OnPart => self.plugin.on_part(ctx),
            ExtensionPoint::OnFile => self.plugin.on_file(ctx),
            ExtensionPoint::OnPost => self.plugin.on_post(ctx),
            ExtensionPoint::Plugin => Ok(true),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("no plugin named {0:?}")]
    UnknownSource(String),

    #[error("plugin {plugin:?} has no {point} binding")]
    MissingBinding { plugin: String, point: ExtensionPoint },
}
