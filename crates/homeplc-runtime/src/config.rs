//! `homeplc.toml` loading.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::program::ProgramSource;
use crate::value::{Duration, Value};

/// Largest interval whose nanosecond count fits the time base.
const MAX_INTERVAL_MS: i64 = i64::MAX / 1_000_000;

#[derive(Debug, Clone)]
pub struct HomeplcConfig {
    pub log_level: SmolStr,
    pub inputs: IndexMap<SmolStr, Value>,
    pub outputs: IndexMap<SmolStr, Value>,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: SmolStr,
    pub interval: Duration,
    pub programs: Vec<ProgramSource>,
    /// Raw `[[tasks.io]]` entries, interpreted by the I/O factory.
    pub io: Vec<toml::Value>,
}

impl HomeplcConfig {
    /// Load a config file; relative script paths resolve against its
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            RuntimeError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, root).map_err(|err| match err {
            RuntimeError::InvalidConfig(msg) => {
                RuntimeError::InvalidConfig(format!("{}: {msg}", path.display()).into())
            }
            other => other,
        })
    }

    pub fn from_toml_str(text: &str, root: &Path) -> Result<Self, RuntimeError> {
        let raw: HomeplcToml =
            toml::from_str(text).map_err(|err| RuntimeError::InvalidConfig(err.to_string().into()))?;
        raw.into_config(root)
    }
}

#[derive(Debug, Deserialize)]
struct HomeplcToml {
    #[serde(default)]
    runtime: RuntimeSection,
    #[serde(default)]
    variables: VariablesSection,
    #[serde(default)]
    tasks: Vec<TaskSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeSection {
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VariablesSection {
    #[serde(default)]
    inputs: IndexMap<String, toml::Value>,
    #[serde(default)]
    outputs: IndexMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct TaskSection {
    name: String,
    interval_ms: u64,
    #[serde(default)]
    programs: Vec<ProgramEntry>,
    #[serde(default)]
    io: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct ProgramEntry {
    native: Option<String>,
    script: Option<String>,
}

impl HomeplcToml {
    fn into_config(self, root: &Path) -> Result<HomeplcConfig, RuntimeError> {
        let log_level = parse_log_level(self.runtime.log_level.as_deref().unwrap_or("info"))?;
        let inputs = parse_variables("inputs", self.variables.inputs)?;
        let outputs = parse_variables("outputs", self.variables.outputs)?;

        let mut tasks: Vec<TaskConfig> = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let name = task.name.trim();
            if name.is_empty() {
                return Err(RuntimeError::InvalidConfig("tasks.name must not be empty".into()));
            }
            if tasks.iter().any(|existing| existing.name == name) {
                return Err(RuntimeError::DuplicateTask(name.into()));
            }
            let interval = i64::try_from(task.interval_ms)
                .ok()
                .filter(|ms| *ms > 0 && *ms <= MAX_INTERVAL_MS)
                .and_then(Duration::checked_from_millis)
                .ok_or_else(|| {
                    RuntimeError::InvalidConfig(
                        format!("task '{name}' interval_ms must be between 1 and {MAX_INTERVAL_MS}")
                            .into(),
                    )
                })?;
            let programs = task
                .programs
                .into_iter()
                .map(|entry| entry.into_source(name, root))
                .collect::<Result<Vec<_>, _>>()?;
            tasks.push(TaskConfig {
                name: SmolStr::new(name),
                interval,
                programs,
                io: task.io,
            });
        }

        Ok(HomeplcConfig {
            log_level,
            inputs,
            outputs,
            tasks,
        })
    }
}

impl ProgramEntry {
    fn into_source(self, task: &str, root: &Path) -> Result<ProgramSource, RuntimeError> {
        match (self.native, self.script) {
            (Some(name), None) => Ok(ProgramSource::Native(SmolStr::new(name.trim()))),
            (None, Some(path)) => {
                let path = PathBuf::from(path);
                let path = if path.is_absolute() {
                    path
                } else {
                    root.join(path)
                };
                Ok(ProgramSource::Script(path))
            }
            _ => Err(RuntimeError::InvalidConfig(
                format!("task '{task}' program entries need exactly one of 'native' or 'script'")
                    .into(),
            )),
        }
    }
}

fn parse_log_level(text: &str) -> Result<SmolStr, RuntimeError> {
    let level = text.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(SmolStr::new(level)),
        _ => Err(RuntimeError::InvalidConfig(
            format!("invalid runtime.log_level '{text}'").into(),
        )),
    }
}

fn parse_variables(
    namespace: &str,
    raw: IndexMap<String, toml::Value>,
) -> Result<IndexMap<SmolStr, Value>, RuntimeError> {
    raw.into_iter()
        .map(|(name, value)| {
            let value = match value {
                toml::Value::Boolean(value) => Value::Bool(value),
                toml::Value::Integer(value) => Value::Int(value),
                toml::Value::Float(value) => Value::Real(value),
                other => {
                    return Err(RuntimeError::InvalidConfig(
                        format!(
                            "variables.{namespace}.{name} must be a bool, integer or float, got {}",
                            other.type_str()
                        )
                        .into(),
                    ))
                }
            };
            Ok((SmolStr::new(name), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[runtime]
log_level = "DEBUG"

[variables.inputs]
input_up = false
setpoint = 21.5

[variables.outputs]
output_up = false
count = 0

[[tasks]]
name = "blinds"
interval_ms = 10
programs = [{ script = "blind.st" }, { native = "GroundLogic" }]

[[tasks.io]]
type = "i2c"
bus = "/dev/i2c-1"
"#;

    #[test]
    fn parses_variables_and_tasks() {
        let config = HomeplcConfig::from_toml_str(CONFIG, Path::new("/etc/homeplc")).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.inputs.iter().collect::<Vec<_>>(),
            vec![
                (&SmolStr::new("input_up"), &Value::Bool(false)),
                (&SmolStr::new("setpoint"), &Value::Real(21.5)),
            ]
        );
        assert_eq!(config.outputs.get("count"), Some(&Value::Int(0)));
        let task = &config.tasks[0];
        assert_eq!(task.interval, Duration::from_millis(10));
        assert_eq!(
            task.programs,
            vec![
                ProgramSource::Script(PathBuf::from("/etc/homeplc/blind.st")),
                ProgramSource::Native("GroundLogic".into()),
            ]
        );
        assert_eq!(task.io.len(), 1);
    }

    #[test]
    fn rejects_zero_interval_and_duplicate_tasks() {
        let zero = "[[tasks]]\nname = \"a\"\ninterval_ms = 0\n";
        assert!(matches!(
            HomeplcConfig::from_toml_str(zero, Path::new(".")),
            Err(RuntimeError::InvalidConfig(_))
        ));
        let twice = "[[tasks]]\nname = \"a\"\ninterval_ms = 5\n[[tasks]]\nname = \"a\"\ninterval_ms = 5\n";
        assert_eq!(
            HomeplcConfig::from_toml_str(twice, Path::new(".")).unwrap_err(),
            RuntimeError::DuplicateTask("a".into())
        );
    }

    #[test]
    fn interval_must_fit_the_time_base() {
        let task = |ms: i64| format!("[[tasks]]\nname = \"a\"\ninterval_ms = {ms}\n");
        let err = HomeplcConfig::from_toml_str(&task(10_000_000_000_000), Path::new("."))
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidConfig(
                format!("task 'a' interval_ms must be between 1 and {MAX_INTERVAL_MS}").into()
            )
        );
        assert!(matches!(
            HomeplcConfig::from_toml_str(&task(i64::MAX), Path::new(".")),
            Err(RuntimeError::InvalidConfig(_))
        ));

        let config = HomeplcConfig::from_toml_str(&task(MAX_INTERVAL_MS), Path::new(".")).unwrap();
        assert_eq!(config.tasks[0].interval.as_millis(), MAX_INTERVAL_MS);
    }

    #[test]
    fn program_entry_needs_one_source() {
        let text = "[[tasks]]\nname = \"a\"\ninterval_ms = 5\nprograms = [{ native = \"X\", script = \"x.st\" }]\n";
        let err = HomeplcConfig::from_toml_str(text, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("exactly one"), "{err}");
    }

    #[test]
    fn string_variables_are_rejected() {
        let text = "[variables.inputs]\nname = \"x\"\n";
        let err = HomeplcConfig::from_toml_str(text, Path::new(".")).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidConfig(
                "variables.inputs.name must be a bool, integer or float, got string".into()
            )
        );
    }
}
