//! The variable table shared by tasks, programs and I/O bindings.
//!
//! The table is declared once during configuration and then frozen behind an
//! `Arc`. Each entry is an atomic slot whose kind never changes, so readers
//! and writers on different task threads need no lock.

#![allow(missing_docs)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::value::{Value, ValueKind};

/// One of the two table namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Signals pulled from hardware.
    Inputs,
    /// Signals pushed to hardware.
    Outputs,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inputs => "inputs",
            Self::Outputs => "outputs",
        })
    }
}

/// Stable address of a table entry, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarKey {
    namespace: Namespace,
    index: usize,
}

impl VarKey {
    #[must_use]
    pub fn namespace(self) -> Namespace {
        self.namespace
    }
}

#[derive(Debug)]
struct Slot {
    kind: ValueKind,
    bits: AtomicU64,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            kind: value.kind(),
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    fn load(&self) -> Value {
        Value::from_bits(self.kind, self.bits.load(Ordering::Acquire))
    }

    fn store(&self, value: Value) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// Typed, name-keyed store of input and output signals.
#[derive(Debug, Default)]
pub struct VariableTable {
    inputs: IndexMap<SmolStr, Slot>,
    outputs: IndexMap<SmolStr, Slot>,
}

impl VariableTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input; its initial value fixes the kind.
    pub fn declare_input(
        &mut self,
        name: impl Into<SmolStr>,
        initial: impl Into<Value>,
    ) -> Result<VarKey, RuntimeError> {
        self.declare(Namespace::Inputs, name.into(), initial.into())
    }

    /// Declare an output; its initial value fixes the kind.
    pub fn declare_output(
        &mut self,
        name: impl Into<SmolStr>,
        initial: impl Into<Value>,
    ) -> Result<VarKey, RuntimeError> {
        self.declare(Namespace::Outputs, name.into(), initial.into())
    }

    fn declare(
        &mut self,
        namespace: Namespace,
        name: SmolStr,
        initial: Value,
    ) -> Result<VarKey, RuntimeError> {
        let slots = self.slots_mut(namespace);
        if slots.contains_key(&name) {
            return Err(RuntimeError::DuplicateVariable(qualified(namespace, &name)));
        }
        let (index, _) = slots.insert_full(name, Slot::new(initial));
        Ok(VarKey { namespace, index })
    }

    /// Resolve a name to its stable key.
    pub fn key(&self, namespace: Namespace, name: &str) -> Result<VarKey, RuntimeError> {
        self.slots(namespace)
            .get_index_of(name)
            .map(|index| VarKey { namespace, index })
            .ok_or_else(|| RuntimeError::NotFound(qualified(namespace, name)))
    }

    pub fn get(&self, namespace: Namespace, name: &str) -> Result<Value, RuntimeError> {
        self.slots(namespace)
            .get(name)
            .map(Slot::load)
            .ok_or_else(|| RuntimeError::NotFound(qualified(namespace, name)))
    }

    pub fn set(&self, namespace: Namespace, name: &str, value: Value) -> Result<(), RuntimeError> {
        let slot = self
            .slots(namespace)
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(qualified(namespace, name)))?;
        check_kind(slot, value, || qualified(namespace, name))?;
        slot.store(value);
        Ok(())
    }

    pub fn input(&self, name: &str) -> Result<Value, RuntimeError> {
        self.get(Namespace::Inputs, name)
    }

    pub fn output(&self, name: &str) -> Result<Value, RuntimeError> {
        self.get(Namespace::Outputs, name)
    }

    pub fn set_input(&self, name: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        self.set(Namespace::Inputs, name, value.into())
    }

    pub fn set_output(&self, name: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        self.set(Namespace::Outputs, name, value.into())
    }

    pub fn get_by_key(&self, key: VarKey) -> Result<Value, RuntimeError> {
        self.slot(key).map(Slot::load)
    }

    pub fn set_by_key(&self, key: VarKey, value: Value) -> Result<(), RuntimeError> {
        let slot = self.slot(key)?;
        check_kind(slot, value, || self.qualified_key(key))?;
        slot.store(value);
        Ok(())
    }

    /// Read a boolean entry; the hot path of I/O bindings.
    pub fn get_bool(&self, key: VarKey) -> Result<bool, RuntimeError> {
        match self.get_by_key(key)? {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::KindMismatch {
                name: self.qualified_key(key),
                expected: ValueKind::Bool,
                found: other.kind(),
            }),
        }
    }

    pub fn set_bool(&self, key: VarKey, value: bool) -> Result<(), RuntimeError> {
        self.set_by_key(key, Value::Bool(value))
    }

    pub fn kind_of(&self, namespace: Namespace, name: &str) -> Result<ValueKind, RuntimeError> {
        self.slots(namespace)
            .get(name)
            .map(|slot| slot.kind)
            .ok_or_else(|| RuntimeError::NotFound(qualified(namespace, name)))
    }

    pub fn kind_of_key(&self, key: VarKey) -> Result<ValueKind, RuntimeError> {
        self.slot(key).map(|slot| slot.kind)
    }

    /// Name of the entry behind `key`.
    #[must_use]
    pub fn name_of(&self, key: VarKey) -> Option<&SmolStr> {
        self.slots(key.namespace)
            .get_index(key.index)
            .map(|(name, _)| name)
    }

    /// Declared names of a namespace, in declaration order.
    pub fn names(&self, namespace: Namespace) -> impl Iterator<Item = &SmolStr> + '_ {
        self.slots(namespace).keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered dump of every entry, inputs first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Namespace, SmolStr, Value)> {
        let inputs = self
            .inputs
            .iter()
            .map(|(name, slot)| (Namespace::Inputs, name.clone(), slot.load()));
        let outputs = self
            .outputs
            .iter()
            .map(|(name, slot)| (Namespace::Outputs, name.clone(), slot.load()));
        inputs.chain(outputs).collect()
    }

    /// `namespace.name` for diagnostics.
    #[must_use]
    pub fn qualified_key(&self, key: VarKey) -> SmolStr {
        match self.name_of(key) {
            Some(name) => qualified(key.namespace, name),
            None => SmolStr::new(format!("{}#{}", key.namespace, key.index)),
        }
    }

    fn slot(&self, key: VarKey) -> Result<&Slot, RuntimeError> {
        self.slots(key.namespace)
            .get_index(key.index)
            .map(|(_, slot)| slot)
            .ok_or_else(|| RuntimeError::NotFound(self.qualified_key(key)))
    }

    fn slots(&self, namespace: Namespace) -> &IndexMap<SmolStr, Slot> {
        match namespace {
            Namespace::Inputs => &self.inputs,
            Namespace::Outputs => &self.outputs,
        }
    }

    fn slots_mut(&mut self, namespace: Namespace) -> &mut IndexMap<SmolStr, Slot> {
        match namespace {
            Namespace::Inputs => &mut self.inputs,
            Namespace::Outputs => &mut self.outputs,
        }
    }
}

fn check_kind(
    slot: &Slot,
    value: Value,
    name: impl FnOnce() -> SmolStr,
) -> Result<(), RuntimeError> {
    if slot.kind == value.kind() {
        return Ok(());
    }
    Err(RuntimeError::KindMismatch {
        name: name(),
        expected: slot.kind,
        found: value.kind(),
    })
}

fn qualified(namespace: Namespace, name: &str) -> SmolStr {
    SmolStr::new(format!("{namespace}.{name}"))
}
