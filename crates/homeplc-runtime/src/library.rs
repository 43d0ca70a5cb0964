//! Logic blocks used by native programs and the script interpreter.

#![allow(missing_docs)]

use smol_str::SmolStr;

use crate::value::Duration;

/// Rising edge detector.
#[derive(Debug, Clone, Default)]
pub struct RTrig {
    prev: bool,
}

impl RTrig {
    #[must_use]
    pub fn new() -> Self {
        Self { prev: false }
    }

    pub fn step(&mut self, clk: bool) -> bool {
        let q = clk && !self.prev;
        self.prev = clk;
        q
    }
}

/// Falling edge detector. Fires on the first step when `clk` starts low.
#[derive(Debug, Clone, Default)]
pub struct FTrig {
    prev: bool,
}

impl FTrig {
    #[must_use]
    pub fn new() -> Self {
        Self { prev: false }
    }

    pub fn step(&mut self, clk: bool) -> bool {
        let not_clk = !clk;
        let q = not_clk && !self.prev;
        self.prev = not_clk;
        q
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerOutput {
    pub q: bool,
    pub et: Duration,
}

/// On-delay timer driven by cycle timestamps.
#[derive(Debug, Clone, Default)]
pub struct Ton {
    started: Option<Duration>,
    q: bool,
    et: Duration,
}

impl Ton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, input: bool, pt: Duration, now: Duration) -> TimerOutput {
        let pt = pt.max(Duration::ZERO);
        if input {
            let started = *self.started.get_or_insert(now);
            let elapsed = now.saturating_sub(started).max(Duration::ZERO);
            self.q = elapsed >= pt;
            self.et = elapsed.min(pt);
        } else {
            self.started = None;
            self.q = false;
            self.et = Duration::ZERO;
        }
        self.output()
    }

    #[must_use]
    pub fn output(&self) -> TimerOutput {
        TimerOutput {
            q: self.q,
            et: self.et,
        }
    }
}

/// A named on/off light switched by toggling.
#[derive(Debug, Clone)]
pub struct Light {
    name: SmolStr,
    on: bool,
}

impl Light {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            on: false,
        }
    }

    /// Flip the light and return the new state.
    pub fn toggle(&mut self) -> bool {
        self.on = !self.on;
        tracing::debug!(light = %self.name, on = self.on, "light toggled");
        self.on
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlindState {
    #[default]
    Idle,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindConfig {
    /// Minimum time between a stop and the next start.
    pub idle_lockout: Duration,
    /// Travel stops by itself after this long.
    pub travel_time: Duration,
}

impl Default for BlindConfig {
    fn default() -> Self {
        Self {
            idle_lockout: Duration::from_millis(500),
            travel_time: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlindOutputs {
    pub up: bool,
    pub down: bool,
}

/// Up/down motor controller for a window blind.
///
/// From idle, a rising edge on `up` or `down` starts travel once the idle
/// lockout since the last stop has elapsed. While travelling, any rising edge
/// stops the motor; travel also ends after `travel_time`.
#[derive(Debug, Clone, Default)]
pub struct Blind {
    config: BlindConfig,
    state: BlindState,
    up_edge: RTrig,
    down_edge: RTrig,
    changed_at: Option<Duration>,
}

impl Blind {
    #[must_use]
    pub fn new(config: BlindConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn update(&mut self, up: bool, down: bool, now: Duration) -> BlindOutputs {
        let up_rise = self.up_edge.step(up);
        let down_rise = self.down_edge.step(down);
        let since_change = self.changed_at.map(|at| now.saturating_sub(at));
        match self.state {
            BlindState::Idle => {
                let unlocked = since_change.map_or(true, |idle| idle >= self.config.idle_lockout);
                if unlocked && (up_rise || down_rise) {
                    self.state = if up_rise {
                        BlindState::Up
                    } else {
                        BlindState::Down
                    };
                    self.changed_at = Some(now);
                }
            }
            BlindState::Up | BlindState::Down => {
                let expired =
                    since_change.is_some_and(|travel| travel >= self.config.travel_time);
                if up_rise || down_rise || expired {
                    self.state = BlindState::Idle;
                    self.changed_at = Some(now);
                }
            }
        }
        self.outputs()
    }

    #[must_use]
    pub fn state(&self) -> BlindState {
        self.state
    }

    #[must_use]
    pub fn outputs(&self) -> BlindOutputs {
        BlindOutputs {
            up: self.state == BlindState::Up,
            down: self.state == BlindState::Down,
        }
    }
}
