use std::path::PathBuf;
use std::sync::Arc;

use homeplc_runtime::error::RuntimeError;
use homeplc_runtime::program::{Program, ProgramFactory, ProgramRegistry, ProgramSource};
use homeplc_runtime::table::VariableTable;
use homeplc_runtime::value::{Duration, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn ms(value: i64) -> Duration {
    Duration::from_millis(value)
}

fn blind_table() -> Arc<VariableTable> {
    let mut table = VariableTable::new();
    table.declare_input("input_up", false).unwrap();
    table.declare_input("input_down", false).unwrap();
    table.declare_output("output_up", false).unwrap();
    table.declare_output("output_down", false).unwrap();
    Arc::new(table)
}

fn blind(table: &Arc<VariableTable>) -> Box<dyn Program> {
    ProgramFactory::default()
        .create(&ProgramSource::Script(fixture("blind.st")), table)
        .unwrap()
}

fn outputs(table: &VariableTable) -> (Value, Value) {
    (
        table.output("output_up").unwrap(),
        table.output("output_down").unwrap(),
    )
}

const IDLE: (Value, Value) = (Value::Bool(false), Value::Bool(false));
const UP: (Value, Value) = (Value::Bool(true), Value::Bool(false));
const DOWN: (Value, Value) = (Value::Bool(false), Value::Bool(true));

#[test]
fn blind_script_follows_button_timeline() {
    let table = blind_table();
    let mut program = blind(&table);
    assert_eq!(program.name(), "blind");
    assert_eq!(program.written_outputs(), vec!["output_up", "output_down"]);

    // (time ms, up pressed, down pressed, expected outputs)
    let timeline = [
        (600, false, false, IDLE),
        (700, true, false, UP),
        (800, true, false, UP),
        (900, false, false, UP),
        (1000, true, false, IDLE),
        (1100, true, false, IDLE),
        (1200, false, false, IDLE),
        // inside the lockout after the stop at 1000
        (1300, true, false, IDLE),
        (1400, false, false, IDLE),
        (1900, false, true, DOWN),
        (2000, false, false, DOWN),
        (31_700, true, false, IDLE),
    ];
    for (at, up, down, expected) in timeline {
        table.set_input("input_up", up).unwrap();
        table.set_input("input_down", down).unwrap();
        program.execute(ms(at)).unwrap();
        assert_eq!(outputs(&table), expected, "at {at}ms");
    }
}

#[test]
fn blind_travel_stops_after_thirty_seconds() {
    let table = blind_table();
    let mut program = blind(&table);
    let t = 5_000;

    table.set_input("input_up", true).unwrap();
    program.execute(ms(t)).unwrap();
    table.set_input("input_up", false).unwrap();
    program.execute(ms(t + 100)).unwrap();
    program.execute(ms(t + 300)).unwrap();
    assert_eq!(outputs(&table), UP);

    program.execute(ms(t + 29_990)).unwrap();
    assert_eq!(outputs(&table), UP);
    program.execute(ms(t + 30_010)).unwrap();
    assert_eq!(outputs(&table), IDLE);
}

#[test]
fn native_blind_matches_script_timeline() {
    let script_table = blind_table();
    let native_table = blind_table();
    let mut script = blind(&script_table);
    let mut native = ProgramFactory::default()
        .create(&ProgramSource::Native("BlindLogic".into()), &native_table)
        .unwrap();
    assert_eq!(native.name(), "BlindLogic");
    assert_eq!(native.written_outputs(), script.written_outputs());

    let presses = [
        (700, true, false),
        (900, false, false),
        (1000, true, false),
        (1200, false, false),
        (1300, true, false),
        (1400, false, false),
        (1900, false, true),
        (2000, false, false),
        (31_900, false, false),
        (32_600, true, false),
        (62_600, false, false),
    ];
    for (at, up, down) in presses {
        for table in [&script_table, &native_table] {
            table.set_input("input_up", up).unwrap();
            table.set_input("input_down", down).unwrap();
        }
        script.execute(ms(at)).unwrap();
        native.execute(ms(at)).unwrap();
        assert_eq!(outputs(&native_table), outputs(&script_table), "at {at}ms");
    }
    assert_eq!(outputs(&native_table), IDLE);
}

#[test]
fn blind_script_load_fails_on_missing_variable() {
    let mut table = VariableTable::new();
    table.declare_input("input_up", false).unwrap();
    table.declare_output("output_up", false).unwrap();
    table.declare_output("output_down", false).unwrap();
    let err = ProgramFactory::default()
        .create(&ProgramSource::Script(fixture("blind.st")), &Arc::new(table))
        .err();
    assert_eq!(err, Some(RuntimeError::UnboundVariable("inputs.input_down".into())));
}

#[test]
fn missing_script_file_is_a_load_error() {
    let err = ProgramFactory::default()
        .create(
            &ProgramSource::Script(fixture("does_not_exist.st")),
            &blind_table(),
        )
        .err();
    assert!(
        matches!(err, Some(RuntimeError::ScriptLoad { ref program, .. }) if program == "does_not_exist"),
        "{err:?}"
    );
}

fn ground_table() -> Arc<VariableTable> {
    let mut table = VariableTable::new();
    for name in [
        "stairs_light",
        "kitchen_light",
        "charger",
        "deck_light",
        "u_light",
        "ground_office_light",
    ] {
        table.declare_input(name, false).unwrap();
        table.declare_output(name, false).unwrap();
    }
    Arc::new(table)
}

#[test]
fn ground_logic_is_idempotent_for_unchanged_inputs() {
    let table = ground_table();
    let mut program = ProgramFactory::default()
        .create(&ProgramSource::Native("GroundLogic".into()), &table)
        .unwrap();
    table.set_input("ground_office_light", true).unwrap();
    table.set_input("charger", true).unwrap();

    program.execute(ms(0)).unwrap();
    let first = table.snapshot();
    program.execute(ms(10)).unwrap();
    assert_eq!(table.snapshot(), first);
    assert_eq!(table.output("ground_office_light"), Ok(Value::Bool(true)));
    assert_eq!(table.output("charger"), Ok(Value::Bool(true)));
}

#[test]
fn unknown_native_program_is_recoverable() {
    let table = ground_table();
    let factory = ProgramFactory::new(ProgramRegistry::default_registry());
    let err = factory
        .create(&ProgramSource::Native("AtticLogic".into()), &table)
        .err();
    assert_eq!(err, Some(RuntimeError::UnknownProgram("AtticLogic".into())));

    // the factory stays usable
    assert!(factory
        .create(&ProgramSource::Native("GroundLogic".into()), &table)
        .is_ok());
}

#[test]
fn custom_native_programs_can_be_registered() {
    struct Heartbeat {
        table: Arc<VariableTable>,
    }

    impl Program for Heartbeat {
        fn name(&self) -> &str {
            "Heartbeat"
        }

        fn execute(&mut self, now: Duration) -> Result<(), RuntimeError> {
            let beat = (now.as_millis() / 500) % 2 == 1;
            self.table.set_output("charger", beat)
        }
    }

    let mut registry = ProgramRegistry::new();
    registry.register("Heartbeat", |table| Ok(Box::new(Heartbeat { table })));
    let table = ground_table();
    let mut program = ProgramFactory::new(registry)
        .create(&ProgramSource::Native("Heartbeat".into()), &table)
        .unwrap();
    program.execute(ms(750)).unwrap();
    assert_eq!(table.output("charger"), Ok(Value::Bool(true)));
}
