//! Ground floor lighting, the built-in native program.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::library::{Light, RTrig};
use crate::table::{Namespace, VarKey, VariableTable};
use crate::value::Duration;

use super::Program;

/// Push-button lights: a press toggles the light of the same name.
const TOGGLED: [&str; 5] = [
    "stairs_light",
    "kitchen_light",
    "charger",
    "deck_light",
    "u_light",
];

/// Switch-driven light: the output follows the input level.
const FOLLOWED: &str = "ground_office_light";

#[derive(Debug)]
struct ToggledLight {
    input: VarKey,
    output: VarKey,
    edge: RTrig,
    light: Light,
}

#[derive(Debug)]
pub struct GroundLogic {
    table: Arc<VariableTable>,
    toggled: Vec<ToggledLight>,
    followed: (VarKey, VarKey),
}

impl GroundLogic {
    /// Bind to the table; every light needs a bool input and output of its
    /// name.
    pub fn new(table: Arc<VariableTable>) -> Result<Self, RuntimeError> {
        let toggled = TOGGLED
            .iter()
            .map(|name| -> Result<ToggledLight, RuntimeError> {
                Ok(ToggledLight {
                    input: bind(&table, Namespace::Inputs, name)?,
                    output: bind(&table, Namespace::Outputs, name)?,
                    edge: RTrig::new(),
                    light: Light::new(*name),
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;
        let followed = (
            bind(&table, Namespace::Inputs, FOLLOWED)?,
            bind(&table, Namespace::Outputs, FOLLOWED)?,
        );
        Ok(Self {
            table,
            toggled,
            followed,
        })
    }
}

impl Program for GroundLogic {
    fn name(&self) -> &str {
        "GroundLogic"
    }

    fn execute(&mut self, _now: Duration) -> Result<(), RuntimeError> {
        for light in &mut self.toggled {
            let pressed = self.table.get_bool(light.input)?;
            if light.edge.step(pressed) {
                let on = light.light.toggle();
                self.table.set_bool(light.output, on)?;
            }
        }
        let (input, output) = self.followed;
        let level = self.table.get_bool(input)?;
        self.table.set_bool(output, level)
    }

    fn written_outputs(&self) -> Vec<SmolStr> {
        TOGGLED
            .iter()
            .copied()
            .chain(std::iter::once(FOLLOWED))
            .map(SmolStr::new)
            .collect()
    }
}

pub(super) fn bind(table: &VariableTable, namespace: Namespace, name: &str) -> Result<VarKey, RuntimeError> {
    let key = table
        .key(namespace, name)
        .map_err(|_| RuntimeError::UnboundVariable(SmolStr::new(format!("{namespace}.{name}"))))?;
    // bool entries only
    table.get_bool(key)?;
    Ok(key)
}
