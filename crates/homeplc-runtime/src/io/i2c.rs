//! I2C subsystem: one bus plus the copy bindings between its pins and the table.

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::table::{Namespace, VarKey, VariableTable};
use crate::value::ValueKind;

use super::bus::{check_pin, Bus, InputHandle, OutputHandle};
use super::expander::{Direction, ExpanderKind};
use super::registry::IoContext;
use super::{BusClaim, IoHealth, IoSubsystem};

/// Copies one input pin into a table input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    pub module: InputHandle,
    pub key: VarKey,
    pub pin: u8,
}

/// Copies one table output onto an output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBinding {
    pub module: OutputHandle,
    pub key: VarKey,
    pub pin: u8,
}

#[derive(Debug)]
pub struct I2cLogic {
    name: SmolStr,
    bus: Bus,
    inputs: Vec<InputBinding>,
    outputs: Vec<OutputBinding>,
    last_error: Option<SmolStr>,
}

impl I2cLogic {
    #[must_use]
    pub fn new(bus: Bus, inputs: Vec<InputBinding>, outputs: Vec<OutputBinding>) -> Self {
        Self {
            name: SmolStr::new(format!("i2c:{}", bus.path())),
            bus,
            inputs,
            outputs,
            last_error: None,
        }
    }

    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    #[must_use]
    pub fn input_bindings(&self) -> &[InputBinding] {
        &self.inputs
    }

    #[must_use]
    pub fn output_bindings(&self) -> &[OutputBinding] {
        &self.outputs
    }

    fn track<T>(&mut self, result: Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => self.last_error = Some(SmolStr::new(err.to_string())),
        }
        result
    }

    fn copy_inputs(&mut self, table: &VariableTable) -> Result<(), RuntimeError> {
        self.bus.read_inputs()?;
        for binding in &self.inputs {
            let level = self.bus.get_input(binding.module, binding.pin)?;
            table.set_bool(binding.key, level)?;
        }
        Ok(())
    }

    fn copy_outputs(&mut self, table: &VariableTable) -> Result<(), RuntimeError> {
        for binding in &self.outputs {
            let level = table.get_bool(binding.key)?;
            self.bus.set_output(binding.module, binding.pin, level)?;
        }
        self.bus.write_outputs()
    }
}

impl IoSubsystem for I2cLogic {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), RuntimeError> {
        self.bus.init()
    }

    fn before(&mut self, table: &VariableTable) -> Result<(), RuntimeError> {
        let result = self.copy_inputs(table);
        self.track(result)
    }

    fn after(&mut self, table: &VariableTable) -> Result<(), RuntimeError> {
        let result = self.copy_outputs(table);
        self.track(result)
    }

    fn shutdown(&mut self) {
        self.bus.close();
    }

    fn input_keys(&self) -> Vec<VarKey> {
        self.inputs.iter().map(|binding| binding.key).collect()
    }

    fn output_keys(&self) -> Vec<VarKey> {
        self.outputs.iter().map(|binding| binding.key).collect()
    }

    fn bus_claim(&self) -> Option<BusClaim> {
        Some(BusClaim {
            bus: SmolStr::new(self.bus.path()),
            addresses: self.bus.addresses().collect(),
        })
    }

    fn health(&self) -> IoHealth {
        match &self.last_error {
            None => IoHealth::Ok,
            Some(error) => IoHealth::Degraded {
                error: error.clone(),
            },
        }
    }
}

/// Build an I2C subsystem from a `[[tasks.io]]` entry with `type = "i2c"`.
///
/// Nothing is opened here; the bus is opened by `init` on the task thread.
pub(super) fn create_i2c(
    params: &toml::Value,
    ctx: &IoContext<'_>,
) -> Result<Box<dyn IoSubsystem>, RuntimeError> {
    let table = params
        .as_table()
        .ok_or_else(|| invalid_i2c("io entry must be a table"))?;
    let path = table
        .get("bus")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| invalid_i2c("i2c io entry requires 'bus'"))?;
    let components = match table.get("components") {
        None => toml::Table::new(),
        Some(value) => value
            .as_table()
            .cloned()
            .ok_or_else(|| invalid_i2c("i2c 'components' must be a table"))?,
    };

    let mut bus = Bus::new(path, ctx.channels.channel(path)?);
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for (address_text, component) in &components {
        let address = parse_address(address_text)?;
        let component = component.as_table().ok_or_else(|| {
            invalid_i2c(format!("component '{address_text}' must be a table"))
        })?;
        let direction_text = component
            .get("direction")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| {
                invalid_i2c(format!("component '{address_text}' requires 'direction'"))
            })?;
        let direction = Direction::parse(direction_text)
            .ok_or_else(|| RuntimeError::InvalidDirection(direction_text.into()))?;
        let type_text = component
            .get("type")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| invalid_i2c(format!("component '{address_text}' requires 'type'")))?;
        let kind = ExpanderKind::parse(type_text, direction).ok_or_else(|| {
            RuntimeError::UnsupportedComponentType {
                component: type_text.into(),
                direction: SmolStr::new(direction.to_string()),
            }
        })?;
        let invert = match component.get("invert") {
            None => false,
            Some(value) => value
                .as_bool()
                .ok_or_else(|| invalid_i2c(format!("component '{address_text}' invert must be a bool")))?,
        };

        match direction {
            Direction::Input => {
                let pins = pin_map(component, "inputs", address_text)?;
                let module = bus.register_input(address, kind, invert)?;
                for (pin, name) in pins {
                    let pin = bind_pin(kind, pin, address)?;
                    let key = resolve_bool(ctx.table, Namespace::Inputs, &name)?;
                    inputs.push(InputBinding { module, key, pin });
                }
            }
            Direction::Output => {
                let pins = pin_map(component, "outputs", address_text)?;
                let module = bus.register_output(address, kind, invert)?;
                for (pin, name) in pins {
                    let pin = bind_pin(kind, pin, address)?;
                    let key = resolve_bool(ctx.table, Namespace::Outputs, &name)?;
                    outputs.push(OutputBinding { module, key, pin });
                }
            }
        }
    }
    tracing::debug!(
        bus = path,
        modules = bus.module_count(),
        inputs = inputs.len(),
        outputs = outputs.len(),
        "i2c subsystem built"
    );
    Ok(Box::new(I2cLogic::new(bus, inputs, outputs)))
}

/// `"0x20"` (or bare hex `"20"`) to a 7-bit address.
fn parse_address(text: &str) -> Result<u16, RuntimeError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    match u16::from_str_radix(digits, 16) {
        Ok(address) if address <= 0x7F => Ok(address),
        _ => Err(invalid_i2c(format!("invalid i2c address '{text}'"))),
    }
}

fn pin_map(
    component: &toml::Table,
    key: &str,
    address_text: &str,
) -> Result<Vec<(u32, SmolStr)>, RuntimeError> {
    let Some(value) = component.get(key) else {
        return Ok(Vec::new());
    };
    let map = value
        .as_table()
        .ok_or_else(|| invalid_i2c(format!("component '{address_text}' {key} must be a table")))?;
    let mut pins = Vec::with_capacity(map.len());
    for (pin_text, name) in map {
        let pin: u32 = pin_text.trim().parse().map_err(|_| {
            invalid_i2c(format!("component '{address_text}' has invalid pin '{pin_text}'"))
        })?;
        let name = name.as_str().ok_or_else(|| {
            invalid_i2c(format!(
                "component '{address_text}' pin {pin} must name a variable"
            ))
        })?;
        pins.push((pin, SmolStr::new(name)));
    }
    Ok(pins)
}

fn bind_pin(kind: ExpanderKind, pin: u32, address: u16) -> Result<u8, RuntimeError> {
    match u8::try_from(pin) {
        Ok(pin) => check_pin(kind, pin, address).map(|()| pin),
        Err(_) => Err(RuntimeError::InvalidPin {
            component: format!("{kind}@{address:#04x}").into(),
            pin,
            pins: kind.pin_count(),
        }),
    }
}

fn resolve_bool(
    table: &VariableTable,
    namespace: Namespace,
    name: &str,
) -> Result<VarKey, RuntimeError> {
    let key = table
        .key(namespace, name)
        .map_err(|_| RuntimeError::UnboundVariable(SmolStr::new(format!("{namespace}.{name}"))))?;
    let kind = table.kind_of_key(key)?;
    if kind != ValueKind::Bool {
        return Err(RuntimeError::UnsupportedVariableKind {
            name: table.qualified_key(key),
            kind,
        });
    }
    Ok(key)
}

fn invalid_i2c(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidConfig(SmolStr::new(msg.into()))
}
