//! Periodic tasks: I/O exchange around an ordered list of programs.

#![allow(missing_docs)]

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::io::{IoFault, IoLogic, IoSubsystem};
use crate::program::Program;
use crate::table::{VarKey, VariableTable};
use crate::value::Duration;

/// A program failure during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramFault {
    pub program: SmolStr,
    pub error: RuntimeError,
}

/// Everything that went wrong in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub io_faults: Vec<IoFault>,
    pub program_faults: Vec<ProgramFault>,
}

impl CycleReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.io_faults.is_empty() && self.program_faults.is_empty()
    }

    /// First fault of the cycle, I/O before programs.
    #[must_use]
    pub fn first_error(&self) -> Option<&RuntimeError> {
        self.io_faults
            .iter()
            .map(|fault| &fault.error)
            .chain(self.program_faults.iter().map(|fault| &fault.error))
            .next()
    }
}

/// Configuration and contents of one periodic task.
pub struct Task {
    name: SmolStr,
    interval: Duration,
    table: Arc<VariableTable>,
    io: IoLogic,
    programs: Vec<Box<dyn Program>>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("io", &self.io)
            .field(
                "programs",
                &self.programs.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Task {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>, interval: Duration, table: Arc<VariableTable>) -> Self {
        Self {
            name: name.into(),
            interval,
            table,
            io: IoLogic::new(),
            programs: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn table(&self) -> &Arc<VariableTable> {
        &self.table
    }

    /// Programs run in the order they were added.
    pub fn add_program(&mut self, program: Box<dyn Program>) {
        self.programs.push(program);
    }

    pub fn add_io(&mut self, subsystem: Box<dyn IoSubsystem>) {
        self.io.add(subsystem);
    }

    #[must_use]
    pub fn io(&self) -> &IoLogic {
        &self.io
    }

    pub fn program_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.programs.iter().map(|program| program.name())
    }

    /// Initialise I/O; on failure nothing stays open.
    pub fn init(&mut self) -> Result<(), RuntimeError> {
        self.io.init().map_err(|fault| {
            tracing::error!(
                task = %self.name,
                subsystem = %fault.subsystem,
                error = %fault.error,
                "io init failed"
            );
            fault.error
        })?;
        tracing::debug!(task = %self.name, io = self.io.len(), "task initialised");
        Ok(())
    }

    /// One cycle: `before` hooks, every program, then `after` hooks.
    pub fn run_cycle(&mut self, now: Duration) -> CycleReport {
        let mut report = CycleReport {
            io_faults: self.io.before(&self.table),
            program_faults: Vec::new(),
        };
        for program in &mut self.programs {
            if let Err(error) = program.execute(now) {
                tracing::warn!(
                    task = %self.name,
                    program = program.name(),
                    timestamp_ms = now.as_millis(),
                    %error,
                    "program fault"
                );
                report.program_faults.push(ProgramFault {
                    program: SmolStr::new(program.name()),
                    error,
                });
            }
        }
        report.io_faults.extend(self.io.after(&self.table));
        for fault in &report.io_faults {
            tracing::warn!(
                task = %self.name,
                subsystem = %fault.subsystem,
                timestamp_ms = now.as_millis(),
                error = %fault.error,
                "io transaction failed"
            );
        }
        report
    }

    pub fn shutdown(&mut self) {
        self.io.shutdown();
        tracing::debug!(task = %self.name, "task shut down");
    }

    /// Outputs the task's programs write.
    #[must_use]
    pub fn written_outputs(&self) -> Vec<SmolStr> {
        let mut names: Vec<SmolStr> = Vec::new();
        for name in self.programs.iter().flat_map(|program| program.written_outputs()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Inputs the task's I/O writes.
    #[must_use]
    pub fn input_keys(&self) -> Vec<VarKey> {
        self.io.input_keys()
    }

    /// Outputs the task's I/O reads.
    #[must_use]
    pub fn output_keys(&self) -> Vec<VarKey> {
        self.io.output_keys()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Step {
        name: &'static str,
        fail: bool,
        journal: Journal,
    }

    impl Program for Step {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&mut self, now: Duration) -> Result<(), RuntimeError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{} @{now}", self.name));
            if self.fail {
                return Err(RuntimeError::ScriptRuntime("boom".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn failing_program_does_not_stop_siblings() {
        let journal = Journal::default();
        let mut task = Task::new("main", Duration::from_millis(10), Arc::new(VariableTable::new()));
        task.add_program(Box::new(Step {
            name: "first",
            fail: true,
            journal: Arc::clone(&journal),
        }));
        task.add_program(Box::new(Step {
            name: "second",
            fail: false,
            journal: Arc::clone(&journal),
        }));

        let report = task.run_cycle(Duration::from_millis(20));
        assert_eq!(
            report.program_faults,
            vec![ProgramFault {
                program: "first".into(),
                error: RuntimeError::ScriptRuntime("boom".into()),
            }]
        );
        assert!(report.io_faults.is_empty());
        assert_eq!(*journal.lock().unwrap(), vec!["first @20ms", "second @20ms"]);
        assert_eq!(task.program_names().collect::<Vec<_>>(), vec!["first", "second"]);
    }
}
