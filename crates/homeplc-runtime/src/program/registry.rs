//! Name-keyed registry of native programs.

use std::collections::BTreeMap;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::table::VariableTable;

use super::{BlindLogic, GroundLogic, Program};

pub type ProgramConstructor = fn(Arc<VariableTable>) -> Result<Box<dyn Program>, RuntimeError>;

/// Native program constructors by exact name.
pub struct ProgramRegistry {
    entries: BTreeMap<SmolStr, ProgramConstructor>,
}

impl std::fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}

impl ProgramRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with the built-in native programs.
    #[must_use]
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        registry.register("BlindLogic", create_blind_logic);
        registry.register("GroundLogic", create_ground_logic);
        registry
    }

    pub fn register(&mut self, name: impl Into<SmolStr>, constructor: ProgramConstructor) {
        self.entries.insert(name.into(), constructor);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(SmolStr::as_str)
    }

    /// Construct `name`; unknown names fail without constructing anything.
    pub fn create(
        &self,
        name: &str,
        table: Arc<VariableTable>,
    ) -> Result<Box<dyn Program>, RuntimeError> {
        let Some(constructor) = self.entries.get(name) else {
            tracing::error!(program = name, "unknown program requested");
            return Err(RuntimeError::UnknownProgram(name.into()));
        };
        constructor(table)
    }
}

fn create_ground_logic(table: Arc<VariableTable>) -> Result<Box<dyn Program>, RuntimeError> {
    Ok(Box::new(GroundLogic::new(table)?))
}

fn create_blind_logic(table: Arc<VariableTable>) -> Result<Box<dyn Program>, RuntimeError> {
    Ok(Box::new(BlindLogic::new(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_recoverable() {
        let registry = ProgramRegistry::default_registry();
        let table = Arc::new(VariableTable::new());
        let err = registry.create("NoSuchLogic", table).err();
        assert_eq!(err, Some(RuntimeError::UnknownProgram("NoSuchLogic".into())));
        assert!(registry.contains("GroundLogic"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["BlindLogic", "GroundLogic"]);
        assert!(!registry.contains("groundlogic"));
    }
}
