//! Plugin registry — source names to constructors.
//!
//! Names are resolved once, when a pipeline loads a plugin. An unknown name
//! is a load error, never a runtime lookup at dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::builtin::{LogPlugin, SkipUnfetchable, TotalPlugin};
use crate::plugin::{Plugin, PluginError};

type Constructor = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LogPlugin::NAME, || Arc::new(LogPlugin::new()) as Arc<dyn Plugin>);
        registry.register(SkipUnfetchable::NAME, || Arc::new(SkipUnfetchable) as Arc<dyn Plugin>);
        registry.register(TotalPlugin::NAME, || {
            Arc::new(TotalPlugin::default()) as Arc<dyn Plugin>
        });
        registry
    }

    /// Add or replace the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn construct(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.constructors
            .get(name)
            .map(|make| make())
            .ok_or_else(|| PluginError::UnknownSource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}
