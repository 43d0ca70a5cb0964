//! `homeplc-runtime` - cyclic PLC-style runtime for home automation.
//!
//! A shared [`table::VariableTable`] connects periodic [`task::Task`]s. Each
//! task pulls inputs from its I/O subsystems, runs its programs (native Rust
//! or Structured Text scripts) and pushes outputs back to hardware.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Startup wiring from config to scheduler.
pub mod builder;
/// `homeplc.toml` loading.
pub mod config;
/// Runtime errors.
pub mod error;
/// Bus, device and I/O subsystem layer.
pub mod io;
/// Edge detectors, timers and controllers.
pub mod library;
/// Native and script programs.
pub mod program;
/// Task threads and clocks.
pub mod scheduler;
/// Typed variable table.
pub mod table;
/// Periodic task cycle.
pub mod task;
/// Values and the time base.
pub mod value;

pub use builder::{Runtime, RuntimeBuilder};
pub use config::HomeplcConfig;
pub use error::RuntimeError;
pub use program::{Program, ProgramSource};
pub use scheduler::{Clock, ManualClock, Scheduler, StdClock, StopSignal};
pub use table::{Namespace, VarKey, VariableTable};
pub use value::{Duration, Value, ValueKind};
