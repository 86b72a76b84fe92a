// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Module factory registry and discovery.
//!
//! - [`ModuleRegistry`]: central registry of all available module types
//! - [`ModuleDefinition`]: serializable module metadata for listing
//!
//! Hosts use the registry to implement `create_module` from the container
//! callback table; tests use it to build topologies by name.

use crate::error::{CycleKitError, Result};
use crate::module::{Module, ModuleInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function creating a module from optional JSON parameters.
pub type ModuleFactory =
    Arc<dyn Fn(Option<&serde_json::Value>) -> Result<Box<dyn Module>> + Send + Sync>;

/// A serializable representation of a module type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Description of a default instance.
    pub info: ModuleInfo,
    /// Hierarchical categories for grouping (e.g., `["audio", "filters"]`)
    pub categories: Vec<String>,
}

#[derive(Clone)]
struct Registration {
    factory: ModuleFactory,
    categories: Vec<String>,
    description: Option<String>,
}

/// The ModuleRegistry holds all module types a host can construct.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    info: HashMap<String, Registration>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.info.keys().collect();
        kinds.sort();
        f.debug_struct("ModuleRegistry").field("kinds", &kinds).finish()
    }
}

impl ModuleRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module type. A later registration under the same name replaces the earlier one.
    pub fn register<F>(&mut self, name: &str, factory: F, categories: Vec<String>)
    where
        F: Fn(Option<&serde_json::Value>) -> Result<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.info.insert(
            name.to_string(),
            Registration { factory: Arc::new(factory), categories, description: None },
        );
    }

    /// Registers a module type with a human-readable description.
    pub fn register_with_description<F>(
        &mut self,
        name: &str,
        factory: F,
        categories: Vec<String>,
        description: impl Into<String>,
    ) where
        F: Fn(Option<&serde_json::Value>) -> Result<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.info.insert(
            name.to_string(),
            Registration {
                factory: Arc::new(factory),
                categories,
                description: Some(description.into()),
            },
        );
    }

    /// Creates an instance of a module by its registered name.
    ///
    /// # Errors
    ///
    /// Returns `CycleKitError::NotFound` if the type is unknown, or whatever the
    /// factory returns when the parameters are rejected.
    pub fn create_module(
        &self,
        name: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Module>> {
        self.info.get(name).map_or_else(
            || Err(CycleKitError::NotFound(format!("Module type '{name}' not found in registry"))),
            |reg| (reg.factory)(params),
        )
    }

    /// Returns definitions for all registered modules, sorted by kind.
    pub fn definitions(&self) -> Vec<ModuleDefinition> {
        let mut defs = Vec::new();
        for (kind, reg) in &self.info {
            match (reg.factory)(None) {
                Ok(instance) => defs.push(ModuleDefinition {
                    kind: kind.clone(),
                    description: reg.description.clone(),
                    info: instance.info(),
                    categories: reg.categories.clone(),
                }),
                Err(e) => {
                    tracing::error!(kind = %kind, error = %e, "Failed to create default module instance for definition");
                },
            }
        }
        defs.sort_by(|a, b| a.kind.cmp(&b.kind));
        defs
    }

    /// Returns true if a definition with the provided name was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.info.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::module::{ModuleKind, ProcessContext};

    struct Dummy;

    impl Module for Dummy {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(ModuleKind::Generic, 1, 1)
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn create_known_and_unknown() {
        let mut registry = ModuleRegistry::new();
        registry.register("dummy", |_| Ok(Box::new(Dummy)), vec!["test".to_string()]);
        assert!(registry.contains("dummy"));
        assert!(registry.create_module("dummy", None).is_ok());

        let Err(err) = registry.create_module("missing", None) else {
            panic!("missing kind must fail");
        };
        assert_eq!(err.kind(), "not_found");

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].info.max_inputs, 1);

        assert!(registry.unregister("dummy"));
        assert!(!registry.contains("dummy"));
    }
}
