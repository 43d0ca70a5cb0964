//! Port expander families and their frame layouts.

use std::fmt;

/// Transfer direction of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

const MAX7311_INPUT_PORT: u8 = 0x00;
const MAX7311_OUTPUT_PORT: u8 = 0x02;
const MAX7311_CONFIG_PORT: u8 = 0x06;

/// Supported I2C port expanders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpanderKind {
    /// 8 quasi-bidirectional pins, one-byte frames.
    Pcf8574,
    /// 16 pins behind a register map.
    Max7311,
}

impl ExpanderKind {
    /// Resolve a component `type` for the given direction.
    #[must_use]
    pub fn parse(text: &str, direction: Direction) -> Option<Self> {
        match (text.trim().to_ascii_lowercase().as_str(), direction) {
            ("pcf8574", _) => Some(Self::Pcf8574),
            ("max7311", Direction::Output) => Some(Self::Max7311),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pcf8574 => "pcf8574",
            Self::Max7311 => "max7311",
        }
    }

    #[must_use]
    pub fn pin_count(self) -> u8 {
        match self {
            Self::Pcf8574 => 8,
            Self::Max7311 => 16,
        }
    }

    /// Bytes per port image.
    #[must_use]
    pub fn frame_len(self) -> usize {
        usize::from(self.pin_count() / 8)
    }

    /// Register selected before reading the input port, if any.
    #[must_use]
    pub fn input_register(self) -> Option<u8> {
        match self {
            Self::Pcf8574 => None,
            Self::Max7311 => Some(MAX7311_INPUT_PORT),
        }
    }

    /// Frames written once when the bus is initialised.
    #[must_use]
    pub fn init_frames(self, direction: Direction) -> Vec<Vec<u8>> {
        match (self, direction) {
            // release all pins so they can be pulled low externally
            (Self::Pcf8574, Direction::Input) => vec![vec![0xFF]],
            (Self::Pcf8574, Direction::Output) => Vec::new(),
            // output only, `parse` never yields a MAX7311 input module
            (Self::Max7311, _) => vec![vec![MAX7311_CONFIG_PORT, 0x00, 0x00]],
        }
    }

    /// Frame that drives the output port to `image`.
    #[must_use]
    pub fn output_frame(self, image: u16) -> Vec<u8> {
        let [lo, hi] = image.to_le_bytes();
        match self {
            Self::Pcf8574 => vec![lo],
            Self::Max7311 => vec![MAX7311_OUTPUT_PORT, lo, hi],
        }
    }

    /// Port image from the bytes of an input read.
    #[must_use]
    pub fn decode_input(self, bytes: &[u8]) -> u16 {
        let lo = bytes.first().copied().unwrap_or(0);
        let hi = if self.frame_len() > 1 {
            bytes.get(1).copied().unwrap_or(0)
        } else {
            0
        };
        u16::from_le_bytes([lo, hi])
    }

    /// Mask covering every pin.
    #[must_use]
    pub fn pin_mask(self) -> u16 {
        match self {
            Self::Pcf8574 => 0x00FF,
            Self::Max7311 => 0xFFFF,
        }
    }
}

impl fmt::Display for ExpanderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
