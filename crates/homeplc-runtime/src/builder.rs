//! Startup wiring from a loaded config to a ready scheduler.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use smol_str::SmolStr;

use crate::config::HomeplcConfig;
use crate::error::RuntimeError;
use crate::io::{ChannelProvider, IoContext, IoFactory, SystemChannels};
use crate::program::{ProgramFactory, ProgramRegistry};
use crate::scheduler::{Clock, Scheduler, StdClock};
use crate::table::{Namespace, VariableTable};
use crate::task::Task;

/// A configured runtime, not yet started.
#[derive(Debug)]
pub struct Runtime<C: Clock + Clone = StdClock> {
    pub scheduler: Scheduler<C>,
    pub table: Arc<VariableTable>,
}

pub struct RuntimeBuilder<C: Clock + Clone = StdClock> {
    programs: ProgramFactory,
    io: IoFactory,
    channels: Arc<dyn ChannelProvider>,
    clock: C,
}

impl RuntimeBuilder<StdClock> {
    /// Built-in programs and I/O types on real hardware.
    #[must_use]
    pub fn new() -> Self {
        Self {
            programs: ProgramFactory::default(),
            io: IoFactory::default_registry(),
            channels: Arc::new(SystemChannels),
            clock: StdClock::new(),
        }
    }

    /// Build `config` with the given registries on real hardware.
    pub fn from_config(
        config: &HomeplcConfig,
        registry: ProgramRegistry,
        factory: IoFactory,
    ) -> Result<Runtime, RuntimeError> {
        Self::new()
            .with_programs(registry)
            .with_io_factory(factory)
            .build(config)
    }
}

impl Default for RuntimeBuilder<StdClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> RuntimeBuilder<C> {
    #[must_use]
    pub fn with_programs(mut self, registry: ProgramRegistry) -> Self {
        self.programs = ProgramFactory::new(registry);
        self
    }

    #[must_use]
    pub fn with_io_factory(mut self, factory: IoFactory) -> Self {
        self.io = factory;
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: Arc<dyn ChannelProvider>) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn with_clock<D: Clock + Clone>(self, clock: D) -> RuntimeBuilder<D> {
        RuntimeBuilder {
            programs: self.programs,
            io: self.io,
            channels: self.channels,
            clock,
        }
    }

    /// Declare the table, create programs and I/O, check write ownership and
    /// install the tasks. Nothing touches hardware here.
    pub fn build(&self, config: &HomeplcConfig) -> Result<Runtime<C>, RuntimeError> {
        let table = Arc::new(build_table(config)?);
        let ctx = IoContext {
            table: &table,
            channels: &*self.channels,
        };

        let mut tasks = Vec::with_capacity(config.tasks.len());
        for task_config in &config.tasks {
            let mut task = Task::new(task_config.name.clone(), task_config.interval, Arc::clone(&table));
            for source in &task_config.programs {
                let program = self.programs.create(source, &table).inspect_err(|err| {
                    tracing::error!(task = %task_config.name, program = %source, error = %err, "program creation failed");
                })?;
                task.add_program(program);
            }
            for entry in &task_config.io {
                let subsystem = self.io.build(entry, &ctx).inspect_err(|err| {
                    tracing::error!(task = %task_config.name, error = %err, "io creation failed");
                })?;
                task.add_io(subsystem);
            }
            tasks.push(task);
        }
        validate_buses(&tasks)?;
        validate_ownership(&tasks, &table)?;

        let mut scheduler = Scheduler::with_clock(self.clock.clone());
        for task in tasks {
            scheduler.install_task(task)?;
        }
        tracing::debug!(
            variables = table.len(),
            tasks = config.tasks.len(),
            "runtime built"
        );
        Ok(Runtime { scheduler, table })
    }
}

fn build_table(config: &HomeplcConfig) -> Result<VariableTable, RuntimeError> {
    let mut table = VariableTable::new();
    for (name, value) in &config.inputs {
        table.declare_input(name.clone(), *value)?;
    }
    for (name, value) in &config.outputs {
        table.declare_output(name.clone(), *value)?;
    }
    Ok(table)
}

/// A bus path belongs to one task, and a device address is registered once
/// per bus across every I/O entry.
pub fn validate_buses(tasks: &[Task]) -> Result<(), RuntimeError> {
    let mut owners: HashMap<SmolStr, SmolStr> = HashMap::new();
    let mut taken: HashSet<(SmolStr, u16)> = HashSet::new();
    for task in tasks {
        for claim in task.io().bus_claims() {
            match owners.get(&claim.bus) {
                Some(owner) if owner != task.name() => {
                    return Err(RuntimeError::SharedBus {
                        bus: claim.bus,
                        first: owner.clone(),
                        second: task.name().into(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(claim.bus.clone(), task.name().into());
                }
            }
            for address in claim.addresses {
                if !taken.insert((claim.bus.clone(), address)) {
                    return Err(RuntimeError::DuplicateAddress {
                        bus: claim.bus,
                        address,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Every table entry has at most one writing task: inputs are written by
/// I/O, outputs by programs. I/O reading an output must live in the task
/// that writes it.
pub fn validate_ownership(tasks: &[Task], table: &VariableTable) -> Result<(), RuntimeError> {
    let mut writers: HashMap<SmolStr, SmolStr> = HashMap::new();
    let mut claim = |name: SmolStr, task: &str| -> Result<(), RuntimeError> {
        match writers.get(&name) {
            Some(owner) if owner != task => Err(RuntimeError::WriteOverlap {
                name,
                first: owner.clone(),
                second: task.into(),
            }),
            Some(_) => Ok(()),
            None => {
                writers.insert(name, task.into());
                Ok(())
            }
        }
    };

    for task in tasks {
        for key in task.input_keys() {
            claim(table.qualified_key(key), task.name())?;
        }
        for name in task.written_outputs() {
            claim(SmolStr::new(format!("{}.{name}", Namespace::Outputs)), task.name())?;
        }
    }
    for task in tasks {
        for key in task.output_keys() {
            claim(table.qualified_key(key), task.name())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::io::SimulatedChannels;
    use crate::scheduler::ManualClock;

    fn config(text: &str) -> HomeplcConfig {
        HomeplcConfig::from_toml_str(text, Path::new(".")).unwrap()
    }

    fn builder() -> RuntimeBuilder<ManualClock> {
        RuntimeBuilder::new()
            .with_channels(Arc::new(SimulatedChannels::new()))
            .with_clock(ManualClock::new())
    }

    const LIGHTS: &str = r#"
[variables.inputs]
stairs_light = false
kitchen_light = false
charger = false
deck_light = false
u_light = false
ground_office_light = false

[variables.outputs]
stairs_light = false
kitchen_light = false
charger = false
deck_light = false
u_light = false
ground_office_light = false
"#;

    #[test]
    fn unknown_program_aborts_build() {
        let text = format!(
            "{LIGHTS}\n[[tasks]]\nname = \"main\"\ninterval_ms = 10\nprograms = [{{ native = \"Nope\" }}]\n"
        );
        let err = builder().build(&config(&text)).unwrap_err();
        assert_eq!(err, RuntimeError::UnknownProgram("Nope".into()));
    }

    #[test]
    fn two_tasks_writing_one_output_overlap() {
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"a\"
interval_ms = 10
programs = [{{ native = \"GroundLogic\" }}]

[[tasks]]
name = \"b\"
interval_ms = 20
programs = [{{ native = \"GroundLogic\" }}]
"
        );
        let err = builder().build(&config(&text)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::WriteOverlap {
                name: "outputs.stairs_light".into(),
                first: "a".into(),
                second: "b".into(),
            }
        );
    }

    #[test]
    fn output_io_must_live_with_its_writer() {
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"logic\"
interval_ms = 10
programs = [{{ native = \"GroundLogic\" }}]

[[tasks]]
name = \"io\"
interval_ms = 10

[[tasks.io]]
type = \"i2c\"
bus = \"/dev/i2c-1\"
[tasks.io.components.\"0x21\"]
direction = \"output\"
type = \"pcf8574\"
outputs = {{ 0 = \"charger\" }}
"
        );
        let err = builder().build(&config(&text)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::WriteOverlap {
                name: "outputs.charger".into(),
                first: "logic".into(),
                second: "io".into(),
            }
        );
    }

    fn output_entry(address: &str, pin: u8, name: &str) -> String {
        format!(
            "
[[tasks.io]]
type = \"i2c\"
bus = \"/dev/i2c-1\"
[tasks.io.components.\"{address}\"]
direction = \"output\"
type = \"pcf8574\"
outputs = {{ {pin} = \"{name}\" }}
"
        )
    }

    #[test]
    fn same_address_in_two_io_entries_is_rejected() {
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"main\"
interval_ms = 10
{}{}",
            output_entry("0x21", 0, "stairs_light"),
            output_entry("0x21", 1, "kitchen_light"),
        );
        let err = builder().build(&config(&text)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::DuplicateAddress {
                bus: "/dev/i2c-1".into(),
                address: 0x21,
            }
        );

        // distinct addresses on one bus within one task are fine
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"main\"
interval_ms = 10
{}{}",
            output_entry("0x21", 0, "stairs_light"),
            output_entry("0x22", 1, "kitchen_light"),
        );
        assert!(builder().build(&config(&text)).is_ok());
    }

    #[test]
    fn bus_path_is_owned_by_one_task() {
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"a\"
interval_ms = 10
{}
[[tasks]]
name = \"b\"
interval_ms = 20
{}",
            output_entry("0x21", 0, "stairs_light"),
            output_entry("0x22", 0, "kitchen_light"),
        );
        let err = builder().build(&config(&text)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::SharedBus {
                bus: "/dev/i2c-1".into(),
                first: "a".into(),
                second: "b".into(),
            }
        );
    }

    #[test]
    fn builds_and_installs_tasks() {
        let text = format!(
            "{LIGHTS}
[[tasks]]
name = \"main\"
interval_ms = 10
programs = [{{ native = \"GroundLogic\" }}]
"
        );
        let runtime = builder().build(&config(&text)).unwrap();
        assert_eq!(runtime.table.len(), 12);
        let handle = runtime.scheduler.get_task("main").unwrap();
        assert_eq!(handle.interval().as_millis(), 10);
    }
}
