//! Window blind motor control, native counterpart of `blind.st`.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::library::{Blind, BlindConfig};
use crate::table::{Namespace, VarKey, VariableTable};
use crate::value::Duration;

use super::ground::bind;
use super::Program;

const OUTPUTS: [&str; 2] = ["output_up", "output_down"];

/// Drives `output_up`/`output_down` from the `input_up`/`input_down` buttons.
#[derive(Debug)]
pub struct BlindLogic {
    table: Arc<VariableTable>,
    buttons: (VarKey, VarKey),
    motor: (VarKey, VarKey),
    blind: Blind,
}

impl BlindLogic {
    pub fn new(table: Arc<VariableTable>) -> Result<Self, RuntimeError> {
        Self::with_config(table, BlindConfig::default())
    }

    pub fn with_config(table: Arc<VariableTable>, config: BlindConfig) -> Result<Self, RuntimeError> {
        let buttons = (
            bind(&table, Namespace::Inputs, "input_up")?,
            bind(&table, Namespace::Inputs, "input_down")?,
        );
        let motor = (
            bind(&table, Namespace::Outputs, OUTPUTS[0])?,
            bind(&table, Namespace::Outputs, OUTPUTS[1])?,
        );
        Ok(Self {
            table,
            buttons,
            motor,
            blind: Blind::new(config),
        })
    }
}

impl Program for BlindLogic {
    fn name(&self) -> &str {
        "BlindLogic"
    }

    fn execute(&mut self, now: Duration) -> Result<(), RuntimeError> {
        let up = self.table.get_bool(self.buttons.0)?;
        let down = self.table.get_bool(self.buttons.1)?;
        let outputs = self.blind.update(up, down, now);
        self.table.set_bool(self.motor.0, outputs.up)?;
        self.table.set_bool(self.motor.1, outputs.down)
    }

    fn written_outputs(&self) -> Vec<SmolStr> {
        OUTPUTS.iter().copied().map(SmolStr::new).collect()
    }
}
