//! Process-lifetime table of registered module drivers.

use std::collections::HashMap;
use std::sync::Arc;

use super::{InputModule, Module, ModuleRole, OutputModule, ProcessorModule, QueueModule};
use crate::error::{Error, Result};

/// Table of module instances keyed by driver name.
///
/// Populated during component initialization and handed to the
/// orchestrator, which treats it as read-only from the moment it starts
/// configuring modules. Registration mistakes are programmer errors and
/// panic.
#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Module>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module instance under a driver name.
    ///
    /// # Panics
    ///
    /// Panics on an empty name or a name that is already registered.
    pub fn register(&mut self, name: impl Into<String>, module: Module) {
        let name = name.into();
        assert!(!name.is_empty(), "cannot register a module with an empty name");
        assert!(
            !self.modules.contains_key(&name),
            "module '{name}' registered twice"
        );
        self.modules.insert(name, module);
    }

    /// Looks up a registered module by driver name.
    pub fn get(&self, name: &str) -> Result<&Module> {
        self.modules.get(name).ok_or_else(|| Error::ModuleNotFound {
            name: name.to_string(),
        })
    }

    /// Iterates over the registered driver names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Resolves an input module.
    pub fn input(&self, name: &str) -> Result<Arc<dyn InputModule>> {
        match self.get(name)? {
            Module::Input(module) => Ok(Arc::clone(module)),
            _ => Err(self.wrong_role(name, ModuleRole::Input)),
        }
    }

    /// Resolves a processor module.
    pub fn processor(&self, name: &str) -> Result<Arc<dyn ProcessorModule>> {
        match self.get(name)? {
            Module::Processor(module) => Ok(Arc::clone(module)),
            _ => Err(self.wrong_role(name, ModuleRole::Processor)),
        }
    }

    /// Resolves an output module.
    pub fn output(&self, name: &str) -> Result<Arc<dyn OutputModule>> {
        match self.get(name)? {
            Module::Output(module) => Ok(Arc::clone(module)),
            _ => Err(self.wrong_role(name, ModuleRole::Output)),
        }
    }

    /// Resolves a queue module.
    pub fn queue(&self, name: &str) -> Result<Arc<dyn QueueModule>> {
        match self.get(name)? {
            Module::Queue(module) => Ok(Arc::clone(module)),
            _ => Err(self.wrong_role(name, ModuleRole::Queue)),
        }
    }

    fn wrong_role(&self, name: &str, expected: ModuleRole) -> Error {
        Error::WrongRole {
            name: name.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::Document;
    use crate::module::ModuleConfig;

    struct NoopProcessor;

    #[async_trait]
    impl ProcessorModule for NoopProcessor {
        async fn configure(&self, _config: &ModuleConfig) -> Result<()> {
            Ok(())
        }

        async fn process(&self, _document: &mut Document) -> Result<()> {
            Ok(())
        }
    }

    fn registry_with_processor() -> Registry {
        let mut registry = Registry::new();
        registry.register("noop", Module::Processor(Arc::new(NoopProcessor)));
        registry
    }

    #[test]
    fn resolves_by_role() {
        let registry = registry_with_processor();
        assert!(registry.processor("noop").is_ok());
        assert_eq!(registry.get("noop").unwrap().role(), ModuleRole::Processor);
    }

    #[test]
    fn wrong_role_is_an_error() {
        let registry = registry_with_processor();
        assert!(matches!(
            registry.input("noop"),
            Err(Error::WrongRole { expected: ModuleRole::Input, .. })
        ));
    }

    #[test]
    fn missing_module_is_an_error() {
        let registry = registry_with_processor();
        assert!(matches!(
            registry.queue("ghost"),
            Err(Error::ModuleNotFound { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut registry = registry_with_processor();
        registry.register("noop", Module::Processor(Arc::new(NoopProcessor)));
    }

    #[test]
    #[should_panic(expected = "empty name")]
    fn empty_name_panics() {
        let mut registry = Registry::new();
        registry.register("", Module::Processor(Arc::new(NoopProcessor)));
    }
}
