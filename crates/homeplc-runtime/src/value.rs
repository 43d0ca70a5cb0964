//! Variable values and the runtime time base.

#![allow(missing_docs)]

use std::fmt;

/// Kind a table entry is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Real,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Real => "REAL",
        };
        f.write_str(name)
    }
}

/// Value stored in the variable table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl Value {
    #[must_use]
    pub fn kind(self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Real(_) => ValueKind::Real,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_real(self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(value),
            _ => None,
        }
    }

    /// Raw 64-bit image used by the table's atomic slots.
    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Self::Bool(value) => u64::from(value),
            Self::Int(value) => value as u64,
            Self::Real(value) => value.to_bits(),
        }
    }

    pub(crate) fn from_bits(kind: ValueKind, bits: u64) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(bits != 0),
            ValueKind::Int => Self::Int(bits as i64),
            ValueKind::Real => Self::Real(f64::from_bits(bits)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

/// Duration with nanosecond precision.
///
/// Cycle timestamps are durations since the scheduler clock started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    pub const ZERO: Self = Self { nanos: 0 };

    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self {
            nanos: micros.saturating_mul(1_000),
        }
    }

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// `None` when `millis` does not fit the nanosecond range.
    #[must_use]
    pub const fn checked_from_millis(millis: i64) -> Option<Self> {
        match millis.checked_mul(1_000_000) {
            Some(nanos) => Some(Self { nanos }),
            None => None,
        }
    }

    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self {
            nanos: secs.saturating_mul(1_000_000_000),
        }
    }

    #[must_use]
    pub fn as_nanos(self) -> i64 {
        self.nanos
    }

    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.nanos / 1_000_000
    }

    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self::from_nanos(self.nanos.saturating_add(other.nanos))
    }

    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::from_nanos(self.nanos.saturating_sub(other.nanos))
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.nanos.checked_add(other.nanos).map(Self::from_nanos)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.nanos.checked_sub(other.nanos).map(Self::from_nanos)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_bits_keep_sign_and_fraction() {
        for value in [
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(-42),
            Value::Real(-0.25),
        ] {
            assert_eq!(Value::from_bits(value.kind(), value.to_bits()), value);
        }
    }

    #[test]
    fn duration_arithmetic_saturates() {
        let max = Duration::from_nanos(i64::MAX);
        assert_eq!(max.saturating_add(Duration::from_secs(1)), max);
        assert_eq!(
            Duration::from_millis(1500).saturating_sub(Duration::from_secs(1)),
            Duration::from_millis(500)
        );
        assert_eq!(max.checked_add(Duration::from_nanos(1)), None);
    }

    #[test]
    fn unit_constructors_do_not_overflow() {
        assert_eq!(Duration::from_millis(i64::MAX).as_nanos(), i64::MAX);
        assert_eq!(Duration::checked_from_millis(10_000_000_000_000), None);
        assert_eq!(
            Duration::checked_from_millis(250),
            Some(Duration::from_millis(250))
        );
    }
}
