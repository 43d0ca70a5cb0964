//! I/O subsystems attached to tasks.

#![allow(missing_docs)]

use smol_str::SmolStr;

pub mod bus;
pub mod channel;
pub mod expander;
mod i2c;
mod registry;

pub use bus::{Bus, InputHandle, OutputHandle};
pub use channel::{
    BusChannel, ChannelProvider, SimulatedBusState, SimulatedChannel, SimulatedChannels,
    SystemChannels,
};
pub use expander::{Direction, ExpanderKind};
pub use i2c::{I2cLogic, InputBinding, OutputBinding};
pub use registry::{IoContext, IoFactory};

use crate::error::RuntimeError;
use crate::table::{VarKey, VariableTable};

/// Hardware exchange hooks run around a task's programs.
pub trait IoSubsystem: Send {
    fn name(&self) -> &str;

    /// Acquire hardware. Runs once on the task thread before the first cycle.
    fn init(&mut self) -> Result<(), RuntimeError>;

    /// Pull hardware state into table inputs.
    fn before(&mut self, table: &VariableTable) -> Result<(), RuntimeError>;

    /// Push table outputs to hardware.
    fn after(&mut self, table: &VariableTable) -> Result<(), RuntimeError>;

    /// Release hardware. Runs once on the task thread after the last cycle.
    fn shutdown(&mut self);

    /// Input entries this subsystem writes.
    fn input_keys(&self) -> Vec<VarKey> {
        Vec::new()
    }

    /// Output entries this subsystem reads.
    fn output_keys(&self) -> Vec<VarKey> {
        Vec::new()
    }

    /// Bus and device addresses this subsystem drives, if any.
    fn bus_claim(&self) -> Option<BusClaim> {
        None
    }

    fn health(&self) -> IoHealth {
        IoHealth::Ok
    }
}

/// One bus path and the device addresses a subsystem registered on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusClaim {
    pub bus: SmolStr,
    pub addresses: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoHealth {
    Ok,
    Degraded { error: SmolStr },
}

/// A hook failure attributed to one member of an [`IoLogic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoFault {
    pub subsystem: SmolStr,
    pub error: RuntimeError,
}

/// Ordered composite of I/O subsystems.
///
/// `before`/`after` run every member even when an earlier one fails and
/// report every failure.
#[derive(Default)]
pub struct IoLogic {
    members: Vec<Box<dyn IoSubsystem>>,
}

impl std::fmt::Debug for IoLogic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|member| member.name()))
            .finish()
    }
}

impl IoLogic {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subsystem: Box<dyn IoSubsystem>) {
        self.members.push(subsystem);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.iter().map(|member| member.name())
    }

    /// Initialise every member; on failure, already initialised members are
    /// shut down again and the failure is returned.
    pub fn init(&mut self) -> Result<(), IoFault> {
        for index in 0..self.members.len() {
            if let Err(error) = self.members[index].init() {
                for member in self.members[..index].iter_mut().rev() {
                    member.shutdown();
                }
                return Err(IoFault {
                    subsystem: SmolStr::new(self.members[index].name()),
                    error,
                });
            }
        }
        Ok(())
    }

    pub fn before(&mut self, table: &VariableTable) -> Vec<IoFault> {
        self.members
            .iter_mut()
            .filter_map(|member| {
                member.before(table).err().map(|error| IoFault {
                    subsystem: SmolStr::new(member.name()),
                    error,
                })
            })
            .collect()
    }

    pub fn after(&mut self, table: &VariableTable) -> Vec<IoFault> {
        self.members
            .iter_mut()
            .filter_map(|member| {
                member.after(table).err().map(|error| IoFault {
                    subsystem: SmolStr::new(member.name()),
                    error,
                })
            })
            .collect()
    }

    /// Shut members down in reverse order.
    pub fn shutdown(&mut self) {
        for member in self.members.iter_mut().rev() {
            member.shutdown();
        }
    }

    #[must_use]
    pub fn input_keys(&self) -> Vec<VarKey> {
        self.members
            .iter()
            .flat_map(|member| member.input_keys())
            .collect()
    }

    #[must_use]
    pub fn output_keys(&self) -> Vec<VarKey> {
        self.members
            .iter()
            .flat_map(|member| member.output_keys())
            .collect()
    }

    #[must_use]
    pub fn bus_claims(&self) -> Vec<BusClaim> {
        self.members
            .iter()
            .filter_map(|member| member.bus_claim())
            .collect()
    }

    pub fn health(&self) -> Vec<(SmolStr, IoHealth)> {
        self.members
            .iter()
            .map(|member| (SmolStr::new(member.name()), member.health()))
            .collect()
    }
}
