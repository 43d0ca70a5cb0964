//! Task scheduling and clocks.
//!
//! Every task runs on its own OS thread: I/O init, then one cycle per
//! interval until the scheduler stops, then I/O shutdown on the same thread.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::task::{CycleReport, Task};
use crate::value::Duration;

/// Time source of the task loops.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Duration;

    /// Block until `deadline` or until [`Clock::wake`] is called.
    fn sleep_until(&self, deadline: Duration);

    /// End every current and future sleep. Used once, on stop.
    fn wake(&self) {}
}

/// Wall clock measured from construction. Sleeps are cut short by `wake`.
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: std::time::Instant,
    woken: StopSignal,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
            woken: StopSignal::new(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        let nanos = self.origin.elapsed().as_nanos();
        Duration::from_nanos(i64::try_from(nanos).unwrap_or(i64::MAX))
    }

    fn sleep_until(&self, deadline: Duration) {
        let remaining = deadline.saturating_sub(self.now()).as_nanos();
        if let Ok(remaining) = u64::try_from(remaining) {
            if remaining > 0 {
                self.woken
                    .wait_timeout(std::time::Duration::from_nanos(remaining));
            }
        }
    }

    fn wake(&self) {
        self.woken.trigger();
    }
}

#[derive(Debug, Default)]
struct ManualTime {
    now: Duration,
    sleeps: u64,
    woken: bool,
}

/// Clock that only moves when told to. Clones share one timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
    ticked: Arc<Condvar>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn time(&self) -> std::sync::MutexGuard<'_, ManualTime> {
        self.time.lock().expect("manual clock poisoned")
    }

    #[must_use]
    pub fn current_time(&self) -> Duration {
        self.time().now
    }

    /// Move time forward by `delta` and return the new time.
    pub fn advance(&self, delta: Duration) -> Duration {
        let mut time = self.time();
        time.now = time.now.saturating_add(delta);
        self.ticked.notify_all();
        time.now
    }

    pub fn set_time(&self, now: Duration) {
        self.time().now = now;
        self.ticked.notify_all();
    }

    /// How often `sleep_until` was entered.
    #[must_use]
    pub fn sleep_calls(&self) -> u64 {
        self.time().sleeps
    }

    /// Release every sleeper, now and later.
    pub fn interrupt(&self) {
        self.time().woken = true;
        self.ticked.notify_all();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.current_time()
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut time = self.time();
        time.sleeps += 1;
        while !time.woken && time.now < deadline {
            time = self.ticked.wait(time).expect("manual clock poisoned");
        }
    }

    fn wake(&self) {
        self.interrupt();
    }
}

/// Termination condition of a scheduler. Cloneable; any clone may trigger it,
/// e.g. from a Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("stop signal poisoned") = true;
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().expect("stop signal poisoned")
    }

    /// Block until triggered.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("stop signal poisoned");
        while !*triggered {
            triggered = cvar.wait(triggered).expect("stop signal wait poisoned");
        }
    }

    /// Block until triggered or `timeout` passes; returns whether triggered.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().expect("stop signal poisoned");
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .expect("stop signal wait poisoned");
        *guard
    }
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Installed,
    Running,
    Stopped,
}

/// Supervisory counters of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub cycles: u64,
    pub overruns: u64,
    pub program_faults: u64,
    pub io_faults: u64,
    pub consecutive_io_failures: u64,
    pub last_error: Option<RuntimeError>,
}

impl TaskStatus {
    fn record(&mut self, report: &CycleReport) {
        self.cycles = self.cycles.saturating_add(1);
        self.program_faults = self
            .program_faults
            .saturating_add(report.program_faults.len() as u64);
        self.io_faults = self.io_faults.saturating_add(report.io_faults.len() as u64);
        if report.io_faults.is_empty() {
            self.consecutive_io_failures = 0;
        } else {
            self.consecutive_io_failures = self.consecutive_io_failures.saturating_add(1);
        }
        if let Some(error) = report.first_error() {
            self.last_error = Some(error.clone());
        }
    }
}

/// Read-only view of an installed task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: SmolStr,
    interval: Duration,
    status: Arc<Mutex<TaskStatus>>,
}

impl TaskHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.status.lock().expect("task status poisoned").state
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status.lock().expect("task status poisoned").clone()
    }

    fn set_state(&self, state: TaskState) {
        self.status.lock().expect("task status poisoned").state = state;
    }
}

/// Blocks task threads after init until every task has initialised.
#[derive(Debug, Default)]
struct StartGate {
    decision: Mutex<Option<bool>>,
    cvar: Condvar,
}

impl StartGate {
    fn decide(&self, go: bool) {
        *self.decision.lock().expect("start gate lock poisoned") = Some(go);
        self.cvar.notify_all();
    }

    fn wait(&self) -> bool {
        let mut guard = self.decision.lock().expect("start gate lock poisoned");
        loop {
            if let Some(go) = *guard {
                return go;
            }
            guard = self.cvar.wait(guard).expect("start gate wait poisoned");
        }
    }
}

/// Installs tasks, runs each on its own thread and stops them together.
pub struct Scheduler<C: Clock + Clone = StdClock> {
    clock: C,
    signal: StopSignal,
    halt: Arc<AtomicBool>,
    pending: IndexMap<SmolStr, Task>,
    handles: IndexMap<SmolStr, TaskHandle>,
    threads: Vec<(SmolStr, thread::JoinHandle<()>)>,
    quit: Option<Box<dyn FnOnce() + Send>>,
    started: bool,
}

impl<C: Clock + Clone> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.handles.keys().collect::<Vec<_>>())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Scheduler<StdClock> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(StdClock::new())
    }
}

impl Default for Scheduler<StdClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> Scheduler<C> {
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            signal: StopSignal::new(),
            halt: Arc::new(AtomicBool::new(false)),
            pending: IndexMap::new(),
            handles: IndexMap::new(),
            threads: Vec::new(),
            quit: None,
            started: false,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Install a task. Only allowed before `start`.
    pub fn install_task(&mut self, task: Task) -> Result<TaskHandle, RuntimeError> {
        if self.started {
            return Err(RuntimeError::SchedulerStarted);
        }
        let name = SmolStr::new(task.name());
        if self.handles.contains_key(&name) {
            return Err(RuntimeError::DuplicateTask(name));
        }
        let handle = TaskHandle {
            name: name.clone(),
            interval: task.interval(),
            status: Arc::new(Mutex::new(TaskStatus::default())),
        };
        tracing::debug!(task = %name, interval_ms = task.interval().as_millis(), "task installed");
        self.handles.insert(name.clone(), handle.clone());
        self.pending.insert(name, task);
        Ok(handle)
    }

    /// Mutable access to an installed task before `start`.
    pub fn task_mut(&mut self, name: &str) -> Result<&mut Task, RuntimeError> {
        if self.started {
            return Err(RuntimeError::SchedulerStarted);
        }
        self.pending
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UndefinedTask(name.into()))
    }

    /// Look up an installed task. Never creates one.
    pub fn get_task(&self, name: &str) -> Result<TaskHandle, RuntimeError> {
        self.handles
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedTask(name.into()))
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.handles.keys().map(SmolStr::as_str)
    }

    /// Tasks not yet handed to their threads.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.pending.values()
    }

    /// Clone of the termination condition.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Trigger the termination condition.
    pub fn stop(&self) {
        self.signal.trigger();
    }

    /// Spawn every task. Each thread initialises its I/O first; if any task
    /// fails to initialise, every task is shut down again and the error is
    /// returned. `quit` runs once when the termination condition fires.
    pub fn start(&mut self, quit: Box<dyn FnOnce() + Send>) -> Result<(), RuntimeError> {
        if self.started {
            return Err(RuntimeError::SchedulerStarted);
        }
        self.started = true;
        self.quit = Some(quit);

        let gate = Arc::new(StartGate::default());
        let (ready_tx, ready_rx) = mpsc::channel();
        let mut spawned = 0;
        let mut failure = None;
        for (name, task) in std::mem::take(&mut self.pending) {
            let Some(handle) = self.handles.get(&name).cloned() else {
                continue;
            };
            let runner = TaskRunner {
                task,
                handle,
                clock: self.clock.clone(),
                halt: Arc::clone(&self.halt),
                gate: Arc::clone(&gate),
                ready: ready_tx.clone(),
            };
            let spawn = thread::Builder::new()
                .name(format!("homeplc-{name}"))
                .spawn(move || runner.run())
                .map_err(|err| RuntimeError::ThreadSpawn(err.to_string().into()));
            match spawn {
                Ok(join) => {
                    self.threads.push((name, join));
                    spawned += 1;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        drop(ready_tx);

        for _ in 0..spawned {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    failure.get_or_insert(RuntimeError::ThreadSpawn(
                        "task thread exited during init".into(),
                    ));
                    break;
                }
            }
        }

        if let Some(err) = failure {
            tracing::error!(error = %err, "scheduler start aborted");
            self.halt.store(true, Ordering::SeqCst);
            gate.decide(false);
            self.join_threads();
            return Err(err);
        }
        gate.decide(true);
        tracing::info!(tasks = self.threads.len(), "scheduler started");
        Ok(())
    }

    /// Block until the termination condition fires, then run the quit
    /// callback and stop every task.
    pub fn wait(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.signal.wait();
        if let Some(quit) = self.quit.take() {
            quit();
        }
        self.halt.store(true, Ordering::SeqCst);
        self.clock.wake();
        self.join_threads();
        tracing::info!("scheduler stopped");
    }

    fn join_threads(&mut self) {
        for (name, join) in self.threads.drain(..) {
            if join.join().is_err() {
                tracing::error!(task = %name, "task thread panicked");
            }
            if let Some(handle) = self.handles.get(&name) {
                handle.set_state(TaskState::Stopped);
            }
        }
    }
}

impl<C: Clock + Clone> Drop for Scheduler<C> {
    fn drop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.halt.store(true, Ordering::SeqCst);
        self.clock.wake();
        self.join_threads();
    }
}

/// Everything a task thread owns.
struct TaskRunner<C: Clock + Clone> {
    task: Task,
    handle: TaskHandle,
    clock: C,
    halt: Arc<AtomicBool>,
    gate: Arc<StartGate>,
    ready: mpsc::Sender<Result<(), RuntimeError>>,
}

impl<C: Clock + Clone> TaskRunner<C> {
    fn run(mut self) {
        let init = self.task.init();
        let initialised = init.is_ok();
        let _ = self.ready.send(init);
        if !self.gate.wait() {
            if initialised {
                self.task.shutdown();
            }
            self.handle.set_state(TaskState::Stopped);
            return;
        }

        self.handle.set_state(TaskState::Running);
        tracing::info!(task = self.task.name(), "task running");
        let interval = self.task.interval();
        while !self.halt.load(Ordering::SeqCst) {
            let start = self.clock.now();
            let report = self.task.run_cycle(start);
            self.handle
                .status
                .lock()
                .expect("task status poisoned")
                .record(&report);

            let deadline = start.saturating_add(interval);
            let end = self.clock.now();
            if end > deadline {
                let overruns = {
                    let mut status = self.handle.status.lock().expect("task status poisoned");
                    status.overruns = status.overruns.saturating_add(1);
                    status.overruns
                };
                tracing::warn!(
                    task = self.task.name(),
                    timestamp_ms = start.as_millis(),
                    elapsed_ms = end.saturating_sub(start).as_millis(),
                    interval_ms = interval.as_millis(),
                    overruns,
                    "cycle overrun"
                );
                continue;
            }
            self.clock.sleep_until(deadline);
        }

        self.task.shutdown();
        self.handle.set_state(TaskState::Stopped);
        tracing::info!(task = self.task.name(), "task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::VariableTable;

    #[test]
    fn install_rejects_duplicates_and_late_tasks() {
        let table = Arc::new(VariableTable::new());
        let mut scheduler = Scheduler::with_clock(ManualClock::new());
        scheduler
            .install_task(Task::new("fast", Duration::from_millis(10), Arc::clone(&table)))
            .unwrap();
        let err = scheduler
            .install_task(Task::new("fast", Duration::from_millis(20), Arc::clone(&table)))
            .unwrap_err();
        assert_eq!(err, RuntimeError::DuplicateTask("fast".into()));
        assert_eq!(
            scheduler.get_task("slow").unwrap_err(),
            RuntimeError::UndefinedTask("slow".into())
        );
        assert_eq!(scheduler.get_task("fast").unwrap().state(), TaskState::Installed);

        scheduler.start(Box::new(|| {})).unwrap();
        let err = scheduler
            .install_task(Task::new("late", Duration::from_millis(10), table))
            .unwrap_err();
        assert_eq!(err, RuntimeError::SchedulerStarted);
        assert!(scheduler.task_mut("fast").is_err());

        scheduler.stop();
        scheduler.wait();
        assert_eq!(scheduler.get_task("fast").unwrap().state(), TaskState::Stopped);
    }

    #[test]
    fn stop_signal_wakes_waiters() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(std::time::Duration::from_millis(1)));
        let remote = signal.clone();
        let waiter = thread::spawn(move || remote.wait());
        signal.trigger();
        waiter.join().unwrap();
        assert!(signal.is_triggered());
    }

    #[test]
    fn std_clock_wake_cuts_sleep_short() {
        let clock = StdClock::new();
        let sleeper = clock.clone();
        let began = std::time::Instant::now();
        let join = thread::spawn(move || sleeper.sleep_until(Duration::from_secs(60)));
        thread::sleep(std::time::Duration::from_millis(20));
        clock.wake();
        join.join().unwrap();
        assert!(began.elapsed() < std::time::Duration::from_secs(5));

        // stays woken
        clock.sleep_until(clock.now().saturating_add(Duration::from_secs(60)));
    }

    #[test]
    fn manual_clock_sleep_returns_once_time_reaches_deadline() {
        let clock = ManualClock::new();
        let sleeper = clock.clone();
        let join = thread::spawn(move || sleeper.sleep_until(Duration::from_millis(5)));
        while clock.sleep_calls() == 0 {
            thread::yield_now();
        }
        clock.advance(Duration::from_millis(5));
        join.join().unwrap();
        assert_eq!(clock.current_time(), Duration::from_millis(5));
    }
}
