//! I/O subsystem factory keyed by the `type` of a `[[tasks.io]]` entry.

use std::collections::BTreeSet;
use std::collections::HashMap;

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::table::VariableTable;

use super::channel::ChannelProvider;
use super::i2c::create_i2c;
use super::IoSubsystem;

/// What a subsystem constructor may use: the table to bind against and the
/// provider for bus channels.
#[derive(Clone, Copy)]
pub struct IoContext<'a> {
    pub table: &'a VariableTable,
    pub channels: &'a dyn ChannelProvider,
}

type IoCreate = fn(&toml::Value, &IoContext<'_>) -> Result<Box<dyn IoSubsystem>, RuntimeError>;

#[derive(Clone)]
struct IoFactoryEntry {
    canonical: SmolStr,
    create: IoCreate,
}

pub struct IoFactory {
    entries: HashMap<SmolStr, IoFactoryEntry>,
}

impl Default for IoFactory {
    fn default() -> Self {
        Self::default_registry()
    }
}

impl IoFactory {
    /// Empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Factory with the built-in subsystem types.
    #[must_use]
    pub fn default_registry() -> Self {
        let mut factory = Self::new();
        factory.register("i2c", create_i2c);
        factory
    }

    pub fn register(&mut self, name: impl Into<SmolStr>, create: IoCreate) {
        let canonical = normalize_name(&name.into());
        let entry = IoFactoryEntry {
            canonical: canonical.clone(),
            create,
        };
        self.entries.insert(canonical, entry);
    }

    pub fn register_alias(&mut self, alias: impl Into<SmolStr>, target: &str) {
        let alias = normalize_name(&alias.into());
        if let Some(entry) = self.entries.get(&normalize_name(target)).cloned() {
            self.entries.insert(alias, entry);
        }
    }

    /// Build one subsystem from its configuration entry.
    pub fn build(
        &self,
        params: &toml::Value,
        ctx: &IoContext<'_>,
    ) -> Result<Box<dyn IoSubsystem>, RuntimeError> {
        let kind = params
            .get("type")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| RuntimeError::InvalidConfig("io entry requires 'type'".into()))?;
        let entry = self
            .entries
            .get(&normalize_name(kind))
            .ok_or_else(|| RuntimeError::UnsupportedIoType(kind.into()))?;
        tracing::debug!(io_type = %entry.canonical, "building io subsystem");
        (entry.create)(params, ctx)
    }

    /// Canonical type names (stable sorted).
    #[must_use]
    pub fn canonical_names(&self) -> Vec<String> {
        let names: BTreeSet<_> = self
            .entries
            .values()
            .map(|entry| entry.canonical.to_string())
            .collect();
        names.into_iter().collect()
    }
}

fn normalize_name(name: &str) -> SmolStr {
    SmolStr::new(name.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::channel::SimulatedChannels;

    fn entry(text: &str) -> toml::Value {
        toml::Value::Table(toml::from_str(text).unwrap())
    }

    #[test]
    fn unknown_type_is_rejected() {
        let factory = IoFactory::default_registry();
        let table = VariableTable::new();
        let channels = SimulatedChannels::new();
        let ctx = IoContext {
            table: &table,
            channels: &channels,
        };
        let err = factory.build(&entry("type = \"spi\""), &ctx).err().unwrap();
        assert_eq!(err, RuntimeError::UnsupportedIoType("spi".into()));
    }

    #[test]
    fn aliases_resolve_case_insensitively() {
        let mut factory = IoFactory::default_registry();
        factory.register_alias("I2C-Bus", "i2c");
        let table = VariableTable::new();
        let channels = SimulatedChannels::new();
        let ctx = IoContext {
            table: &table,
            channels: &channels,
        };
        let subsystem = factory
            .build(&entry("type = \" i2c-bus \"\nbus = \"/dev/i2c-1\""), &ctx)
            .unwrap();
        assert_eq!(subsystem.name(), "i2c:/dev/i2c-1");
        assert_eq!(factory.canonical_names(), vec!["i2c"]);
    }
}
