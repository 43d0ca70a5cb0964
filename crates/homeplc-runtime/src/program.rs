//! Programs executed once per task cycle.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use smol_str::SmolStr;

mod blind;
mod ground;
mod registry;
mod script;

pub use blind::BlindLogic;
pub use ground::GroundLogic;
pub use registry::{ProgramConstructor, ProgramRegistry};
pub use script::ScriptProgram;

use crate::error::RuntimeError;
use crate::table::VariableTable;
use crate::value::Duration;

/// Per-cycle execution contract shared by native and script programs.
///
/// Programs talk to the rest of the system only through the variable table.
pub trait Program: Send {
    fn name(&self) -> &str;

    /// Run one cycle at timestamp `now`.
    fn execute(&mut self, now: Duration) -> Result<(), RuntimeError>;

    /// Output names this program may write.
    fn written_outputs(&self) -> Vec<SmolStr> {
        Vec::new()
    }
}

/// Where a program comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    /// Compiled-in program looked up in the registry.
    Native(SmolStr),
    /// Script file interpreted at runtime.
    Script(PathBuf),
}

impl fmt::Display for ProgramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(name) => write!(f, "native:{name}"),
            Self::Script(path) => write!(f, "script:{}", path.display()),
        }
    }
}

/// Creates programs from their source, native or script.
#[derive(Debug, Default)]
pub struct ProgramFactory {
    registry: ProgramRegistry,
}

impl ProgramFactory {
    #[must_use]
    pub fn new(registry: ProgramRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    pub fn create(
        &self,
        source: &ProgramSource,
        table: &Arc<VariableTable>,
    ) -> Result<Box<dyn Program>, RuntimeError> {
        match source {
            ProgramSource::Native(name) => self.registry.create(name, Arc::clone(table)),
            ProgramSource::Script(path) => {
                let program = ScriptProgram::load(path, Arc::clone(table))?;
                Ok(Box::new(program))
            }
        }
    }
}
