use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use homeplc_runtime::error::RuntimeError;
use homeplc_runtime::io::IoSubsystem;
use homeplc_runtime::program::Program;
use homeplc_runtime::scheduler::{ManualClock, Scheduler, TaskHandle, TaskState, TaskStatus};
use homeplc_runtime::table::VariableTable;
use homeplc_runtime::task::Task;
use homeplc_runtime::value::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

struct FakeIo {
    journal: Journal,
    fail_init: bool,
    fail_before: bool,
}

impl IoSubsystem for FakeIo {
    fn name(&self) -> &str {
        "fake_io"
    }

    fn init(&mut self) -> Result<(), RuntimeError> {
        self.journal.lock().unwrap().push("init".into());
        if self.fail_init {
            return Err(RuntimeError::BusTransaction("no such bus".into()));
        }
        Ok(())
    }

    fn before(&mut self, _table: &VariableTable) -> Result<(), RuntimeError> {
        self.journal.lock().unwrap().push("before".into());
        if self.fail_before {
            return Err(RuntimeError::BusTransaction("nack".into()));
        }
        Ok(())
    }

    fn after(&mut self, _table: &VariableTable) -> Result<(), RuntimeError> {
        self.journal.lock().unwrap().push("after".into());
        Ok(())
    }

    fn shutdown(&mut self) {
        self.journal.lock().unwrap().push("shutdown".into());
    }
}

struct Recorder {
    journal: Journal,
    clock: Option<ManualClock>,
}

impl Program for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn execute(&mut self, now: Duration) -> Result<(), RuntimeError> {
        self.journal.lock().unwrap().push(format!("execute {now}"));
        if let Some(clock) = &self.clock {
            // a slow cycle
            clock.advance(Duration::from_millis(15));
        }
        Ok(())
    }
}

fn task(name: &str, journal: &Journal, io: Option<FakeIo>) -> Task {
    periodic(name, 10, journal, io)
}

fn periodic(name: &str, interval_ms: i64, journal: &Journal, io: Option<FakeIo>) -> Task {
    let mut task = Task::new(
        name,
        Duration::from_millis(interval_ms),
        Arc::new(VariableTable::new()),
    );
    if let Some(io) = io {
        task.add_io(Box::new(io));
    }
    task.add_program(Box::new(Recorder {
        journal: Arc::clone(journal),
        clock: None,
    }));
    task
}

fn fake_io(journal: &Journal) -> FakeIo {
    FakeIo {
        journal: Arc::clone(journal),
        fail_init: false,
        fail_before: false,
    }
}

fn wait_for(handle: &TaskHandle, done: impl Fn(&TaskStatus) -> bool) -> TaskStatus {
    let started = Instant::now();
    loop {
        let status = handle.status();
        if done(&status) {
            return status;
        }
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "timed out waiting on task '{}': {status:?}",
            handle.name()
        );
        std::thread::yield_now();
    }
}

#[test]
fn hooks_wrap_programs_every_cycle() {
    let journal = Journal::default();
    let clock = ManualClock::new();
    let mut scheduler = Scheduler::with_clock(clock.clone());
    let handle = scheduler
        .install_task(task("main", &journal, Some(fake_io(&journal))))
        .unwrap();

    let quit_called = Arc::new(AtomicBool::new(false));
    let quit_flag = Arc::clone(&quit_called);
    scheduler
        .start(Box::new(move || quit_flag.store(true, Ordering::SeqCst)))
        .unwrap();
    wait_for(&handle, |status| status.cycles >= 1);
    assert_eq!(handle.state(), TaskState::Running);

    clock.advance(Duration::from_millis(10));
    wait_for(&handle, |status| status.cycles >= 2);

    scheduler.stop();
    scheduler.wait();
    assert!(quit_called.load(Ordering::SeqCst));
    assert_eq!(handle.state(), TaskState::Stopped);

    let log = entries(&journal);
    assert_eq!(
        &log[..7],
        &[
            "init",
            "before",
            "execute 0ms",
            "after",
            "before",
            "execute 10ms",
            "after"
        ]
    );
    assert_eq!(log.last().map(String::as_str), Some("shutdown"));
}

#[test]
fn tasks_fire_independently() {
    let fast_journal = Journal::default();
    let slow_journal = Journal::default();
    let clock = ManualClock::new();
    let mut scheduler = Scheduler::with_clock(clock.clone());
    let fast = scheduler
        .install_task(task("fast", &fast_journal, None))
        .unwrap();
    let slow = scheduler
        .install_task(periodic("slow", 30, &slow_journal, None))
        .unwrap();

    scheduler.start(Box::new(|| {})).unwrap();
    wait_for(&slow, |status| status.cycles >= 1);
    for step in 1..=3 {
        wait_for(&fast, |status| status.cycles >= step);
        clock.advance(Duration::from_millis(10));
    }
    wait_for(&fast, |status| status.cycles >= 4);
    wait_for(&slow, |status| status.cycles >= 2);
    scheduler.stop();
    scheduler.wait();

    assert_eq!(
        entries(&fast_journal)[..4],
        ["execute 0ms", "execute 10ms", "execute 20ms", "execute 30ms"]
    );
    assert_eq!(
        entries(&slow_journal)[..2],
        ["execute 0ms", "execute 30ms"]
    );
}

#[test]
fn init_failure_aborts_start_and_releases_io() {
    let good = Journal::default();
    let bad = Journal::default();
    let mut scheduler = Scheduler::with_clock(ManualClock::new());
    let good_handle = scheduler
        .install_task(task("good", &good, Some(fake_io(&good))))
        .unwrap();
    let mut failing = fake_io(&bad);
    failing.fail_init = true;
    scheduler
        .install_task(task("bad", &bad, Some(failing)))
        .unwrap();

    let err = scheduler.start(Box::new(|| {})).unwrap_err();
    assert_eq!(err, RuntimeError::BusTransaction("no such bus".into()));
    assert_eq!(entries(&good), vec!["init", "shutdown"]);
    assert_eq!(entries(&bad), vec!["init"]);
    assert_eq!(good_handle.state(), TaskState::Stopped);
    assert_eq!(good_handle.status().cycles, 0);
}

#[test]
fn overruns_are_counted_and_next_cycle_starts_at_once() {
    let journal = Journal::default();
    let clock = ManualClock::new();
    let mut task = Task::new(
        "slow",
        Duration::from_millis(10),
        Arc::new(VariableTable::new()),
    );
    task.add_program(Box::new(Recorder {
        journal: Arc::clone(&journal),
        clock: Some(clock.clone()),
    }));
    let mut scheduler = Scheduler::with_clock(clock.clone());
    let handle = scheduler.install_task(task).unwrap();
    scheduler.start(Box::new(|| {})).unwrap();

    let status = wait_for(&handle, |status| status.overruns >= 2);
    scheduler.stop();
    scheduler.wait();

    assert!(status.cycles >= 2);
    assert_eq!(clock.sleep_calls(), 0);
    assert_eq!(entries(&journal)[..2], ["execute 0ms", "execute 15ms"]);
}

#[test]
fn io_failures_are_counted_without_stopping_the_task() {
    let journal = Journal::default();
    let clock = ManualClock::new();
    let mut failing = fake_io(&journal);
    failing.fail_before = true;
    let mut scheduler = Scheduler::with_clock(clock.clone());
    let handle = scheduler
        .install_task(task("main", &journal, Some(failing)))
        .unwrap();
    scheduler.start(Box::new(|| {})).unwrap();

    wait_for(&handle, |status| status.cycles >= 1);
    clock.advance(Duration::from_millis(10));
    let status = wait_for(&handle, |status| status.cycles >= 2);
    scheduler.stop();
    scheduler.wait();

    assert_eq!(status.consecutive_io_failures, 2);
    assert_eq!(status.io_faults, 2);
    assert_eq!(
        status.last_error,
        Some(RuntimeError::BusTransaction("nack".into()))
    );
    // programs still ran
    assert!(entries(&journal).contains(&"execute 10ms".to_string()));
}

#[test]
fn stop_does_not_wait_out_a_long_interval() {
    let journal = Journal::default();
    let mut scheduler = Scheduler::new();
    let handle = scheduler
        .install_task(periodic("poll", 60_000, &journal, Some(fake_io(&journal))))
        .unwrap();
    scheduler.start(Box::new(|| {})).unwrap();
    wait_for(&handle, |status| status.cycles >= 1);

    let stopping = Instant::now();
    scheduler.stop();
    scheduler.wait();
    assert!(
        stopping.elapsed() < std::time::Duration::from_secs(5),
        "stop took {:?}",
        stopping.elapsed()
    );
    assert_eq!(handle.state(), TaskState::Stopped);
    assert_eq!(entries(&journal).last().map(String::as_str), Some("shutdown"));
}
