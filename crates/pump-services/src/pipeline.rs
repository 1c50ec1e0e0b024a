//! Plugin pipeline — ordered hooks per extension point.
//!
//! Each extension point owns an append-only list of hooks; insertion order is
//! invocation order. Dispatch stops at the first hook that vetoes. A hook
//! that errors or panics vetoes that message only; nothing escapes into the
//! caller's loop.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use pump_core::config::{DaemonSettings, PluginSpec};
use pump_core::extension::ExtensionPoint;
use pump_core::message::Message;

use crate::plugin::{Hook, HookContext, PluginError, PluginHook};
use crate::registry::PluginRegistry;

/// Source names that clear an extension point instead of loading anything.
pub const RESET_SENTINELS: [&str; 3] = ["none", "off", "None"];

pub struct PluginPipeline {
    registry: PluginRegistry,
    hooks: BTreeMap<ExtensionPoint, Vec<Arc<dyn Hook>>>,
    instance: u32,
    cache_dir: PathBuf,
}

impl PluginPipeline {
    pub fn new(registry: PluginRegistry, daemon: &DaemonSettings) -> Self {
        Self {
            registry,
            hooks: BTreeMap::new(),
            instance: daemon.instance,
            cache_dir: daemon.cache_dir.clone(),
        }
    }

    /// Append `hook` to the list for `point`.
    pub fn register(&mut self, point: ExtensionPoint, hook: impl Hook + 'static) {
        self.register_shared(point, Arc::new(hook));
    }

    pub fn register_shared(&mut self, point: ExtensionPoint, hook: Arc<dyn Hook>) {
        if !point.is_stage() {
            tracing::warn!(hook = hook.name(), "hooks cannot be registered at the plugin point");
            return;
        }
        self.hooks.entry(point).or_default().push(hook);
    }

    /// Remove every hook at `point`; at the plugin point, at every stage.
    pub fn clear(&mut self, point: ExtensionPoint) {
        if point.is_stage() {
            self.hooks.remove(&point);
        } else {
            self.hooks.clear();
        }
    }

    pub fn hook_count(&self, point: ExtensionPoint) -> usize {
        self.hooks.get(&point).map_or(0, Vec::len)
    }

    /// Resolve `source` and bind it at `point`.
    ///
    /// At a stage the plugin must declare that stage; at the plugin point
    /// every stage it declares is bound. On error nothing is registered.
    pub fn try_load(&mut self, point: ExtensionPoint, source: &str) -> Result<(), PluginError> {
        if RESET_SENTINELS.contains(&source) {
            tracing::debug!(%point, source, "clearing hooks");
            self.clear(point);
            return Ok(());
        }

        let plugin = self.registry.construct(source)?;
        let points: Vec<ExtensionPoint> = if point.is_stage() {
            vec![point]
        } else {
            plugin
                .capabilities()
                .iter()
                .copied()
                .filter(|p| p.is_stage())
                .collect()
        };

        let missing = points.is_empty()
            || points
                .iter()
                .any(|p| !plugin.capabilities().contains(p));
        if missing {
            return Err(PluginError::MissingBinding {
                plugin: plugin.name().to_string(),
                point,
            });
        }

        for p in points {
            let hook = PluginHook {
                plugin: Arc::clone(&plugin),
                point: p,
            };
            self.hooks.entry(p).or_default().push(Arc::new(hook));
        }
        tracing::debug!(%point, source, "plugin loaded");
        Ok(())
    }

    /// [`try_load`](Self::try_load), with failure logged and returned as false.
    pub fn load(&mut self, point: ExtensionPoint, source: &str) -> bool {
        match self.try_load(point, source) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%point, source, error = %e, "plugin load failed");
                false
            }
        }
    }

    /// Load every configured plugin in order. True when all loaded.
    pub fn load_all(&mut self, specs: &[PluginSpec]) -> bool {
        specs
            .iter()
            .fold(true, |ok, spec| self.load(spec.point, &spec.source) && ok)
    }

    /// Run the hooks registered at `point` over `msg`, in order.
    ///
    /// Returns false as soon as one hook vetoes, errors, or panics; true when
    /// every hook accepted (or none is registered).
    pub fn dispatch(&self, point: ExtensionPoint, msg: &mut Message) -> bool {
        let Some(hooks) = self.hooks.get(&point) else {
            return true;
        };
        let mut ctx = HookContext {
            msg,
            point,
            instance: self.instance,
            cache_dir: &self.cache_dir,
        };

        for hook in hooks {
            match catch_unwind(AssertUnwindSafe(|| hook.call(&mut ctx))) {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    tracing::debug!(%point, hook = hook.name(), "message vetoed");
                    return false;
                }
                Ok(Err(e)) => {
                    tracing::warn!(%point, hook = hook.name(), error = %e, "hook failed");
                    return false;
                }
                Err(panic) => {
                    tracing::error!(
                        %point,
                        hook = hook.name(),
                        panic = panic_message(panic.as_ref()),
                        "hook panicked"
                    );
                    return false;
                }
            }
        }
        true
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
