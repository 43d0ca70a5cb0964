//! Runtime errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised while configuring or running the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Name is not bound in the variable table.
    #[error("variable '{0}' not found")]
    NotFound(SmolStr),

    /// Value kind differs from the kind the name is bound to.
    #[error("variable '{name}' is {expected}, got {found}")]
    KindMismatch {
        name: SmolStr,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Variable declared twice in the same namespace.
    #[error("duplicate variable '{0}'")]
    DuplicateVariable(SmolStr),

    /// Two modules registered at the same bus address.
    #[error("duplicate bus address {address:#04x} on '{bus}'")]
    DuplicateAddress { bus: SmolStr, address: u16 },

    /// One bus path used by I/O of more than one task.
    #[error("bus '{bus}' is used by tasks '{first}' and '{second}'")]
    SharedBus {
        bus: SmolStr,
        first: SmolStr,
        second: SmolStr,
    },

    /// Module registration or init attempted on an opened bus.
    #[error("bus '{0}' is already initialized")]
    BusInitialized(SmolStr),

    /// Transaction attempted before `init`.
    #[error("bus '{0}' is not initialized")]
    BusNotInitialized(SmolStr),

    /// Pin outside the module's pin range.
    #[error("pin {pin} out of range for {component} ({pins} pins)")]
    InvalidPin {
        component: SmolStr,
        pin: u32,
        pins: u8,
    },

    /// Unknown I/O subsystem type.
    #[error("unsupported io type '{0}'")]
    UnsupportedIoType(SmolStr),

    /// Unknown component type for the requested direction.
    #[error("unsupported {direction} component type '{component}'")]
    UnsupportedComponentType {
        component: SmolStr,
        direction: SmolStr,
    },

    /// Component direction other than `input`/`output`.
    #[error("invalid component direction '{0}'")]
    InvalidDirection(SmolStr),

    /// Binding or script references a variable that is not declared.
    #[error("unbound variable '{0}'")]
    UnboundVariable(SmolStr),

    /// Binding references a variable of a kind the binding cannot carry.
    #[error("variable '{name}' has unsupported kind {kind}")]
    UnsupportedVariableKind { name: SmolStr, kind: ValueKind },

    /// Native program name not present in the registry.
    #[error("unknown program '{0}'")]
    UnknownProgram(SmolStr),

    /// Task name installed twice.
    #[error("duplicate task '{0}'")]
    DuplicateTask(SmolStr),

    /// Task name not installed.
    #[error("undefined task '{0}'")]
    UndefinedTask(SmolStr),

    /// Task installation or mutation after `start`.
    #[error("scheduler already started")]
    SchedulerStarted,

    /// A table entry has more than one writing task.
    #[error("variable '{name}' is written by tasks '{first}' and '{second}'")]
    WriteOverlap {
        name: SmolStr,
        first: SmolStr,
        second: SmolStr,
    },

    /// Script could not be read, parsed or resolved.
    #[error("script '{program}': {message}")]
    ScriptLoad { program: SmolStr, message: SmolStr },

    /// Script fault during execution.
    #[error("script runtime error: {0}")]
    ScriptRuntime(SmolStr),

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Modulo by zero.
    #[error("modulo by zero")]
    ModuloByZero,

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,

    /// Bus transaction failure.
    #[error("bus transaction failed: {0}")]
    BusTransaction(SmolStr),

    /// Invalid configuration.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Failed to spawn a task thread.
    #[error("failed to spawn task thread '{0}'")]
    ThreadSpawn(SmolStr),
}

impl RuntimeError {
    /// True for defects that must abort startup.
    #[must_use]
    pub fn is_config_defect(&self) -> bool {
        matches!(
            self,
            Self::DuplicateVariable(_)
                | Self::DuplicateAddress { .. }
                | Self::InvalidPin { .. }
                | Self::UnsupportedIoType(_)
                | Self::UnsupportedComponentType { .. }
                | Self::InvalidDirection(_)
                | Self::UnboundVariable(_)
                | Self::UnsupportedVariableKind { .. }
                | Self::UnknownProgram(_)
                | Self::DuplicateTask(_)
                | Self::WriteOverlap { .. }
                | Self::ScriptLoad { .. }
                | Self::InvalidConfig(_)
        )
    }
}
