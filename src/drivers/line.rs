//! Logical line handle over a sysfs value file.
//!
//! Both GPIO lines (`/sys/class/gpio/gpioN/value`) and CPLD register
//! attributes expose their level as a single ASCII character.  Sysfs only
//! re-delivers an edge notification after the file has been read from
//! offset 0, so every read rewinds first.
//!
//! ## Polarity
//!
//! | Polarity    | raw `'0'`    | raw `'1'`    |
//! |-------------|--------------|--------------|
//! | active-low  | `Asserted`   | `Deasserted` |
//! | active-high | `Deasserted` | `Asserted`   |
//!
//! The handle also implements the `embedded-hal` digital traits, where
//! "high" means *logically asserted* after polarity is applied.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use serde::{Deserialize, Serialize};

use crate::error::LineError;

// ---------------------------------------------------------------------------
// Line description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    #[default]
    Both,
}

impl Direction {
    /// Value written to the sysfs `direction` attribute.
    ///
    /// Outputs are configured as `high`/`low` so the current level is
    /// preserved instead of glitching to zero.
    pub fn sysfs_value(self, current_raw_high: bool) -> &'static str {
        match self {
            Self::In | Self::Both => "in",
            Self::Out if current_raw_high => "high",
            Self::Out => "low",
        }
    }
}

/// Logical level after polarity has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Asserted,
    Deasserted,
}

impl Polarity {
    /// Map a raw value character to a logical state.
    pub fn decode(self, line: &str, raw: u8) -> Result<LineState, LineError> {
        let high = match raw {
            b'0' => false,
            b'1' => true,
            other => {
                return Err(LineError::UnexpectedValue {
                    line: line.to_owned(),
                    value: other,
                });
            }
        };
        Ok(match (self, high) {
            (Self::ActiveLow, false) | (Self::ActiveHigh, true) => LineState::Asserted,
            _ => LineState::Deasserted,
        })
    }

    /// Map a logical state to the raw value character to write.
    pub fn encode(self, state: LineState) -> u8 {
        match (self, state) {
            (Self::ActiveLow, LineState::Asserted) | (Self::ActiveHigh, LineState::Deasserted) => {
                b'0'
            }
            _ => b'1',
        }
    }
}

/// One physical line as described in the definitions file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    /// Kernel line number (chip base already added for pin names).
    pub number: u32,
    /// Role name inside a group, e.g. `debug_card_present`.
    pub name: String,
    pub direction: Direction,
    pub polarity: Polarity,
}

// ---------------------------------------------------------------------------
// Line handle
// ---------------------------------------------------------------------------

/// Exclusive owner of an open value file.
///
/// Dropping the handle closes the descriptor; [`close`](Self::close) does
/// the same explicitly and may be called any number of times.
#[derive(Debug)]
pub struct LineHandle {
    name: String,
    path: PathBuf,
    polarity: Polarity,
    file: Option<File>,
}

impl LineHandle {
    pub fn new(name: impl Into<String>, path: &Path, polarity: Polarity, file: File) -> Self {
        Self {
            name: name.into(),
            path: path.to_path_buf(),
            polarity,
            file: Some(file),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Descriptor to hand to the reactor, `None` once closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn file_mut(&mut self) -> Result<&mut File, LineError> {
        match self.file.as_mut() {
            Some(f) => Ok(f),
            None => Err(LineError::Closed {
                line: self.name.clone(),
            }),
        }
    }

    /// Rewind and read the single raw value character.
    pub fn read_raw(&mut self) -> Result<u8, LineError> {
        let name = self.name.clone();
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| LineError::Read {
                line: name.clone(),
                source,
            })?;
        let mut buf = [0u8; 1];
        let n = file.read(&mut buf).map_err(|source| LineError::Read {
            line: name.clone(),
            source,
        })?;
        if n == 0 {
            return Err(LineError::Empty { line: name });
        }
        Ok(buf[0])
    }

    /// Rewind, read, and apply polarity.
    pub fn read_state(&mut self) -> Result<LineState, LineError> {
        let raw = self.read_raw()?;
        self.polarity.decode(&self.name, raw)
    }

    /// Drive an output line to a logical state.
    pub fn write_state(&mut self, state: LineState) -> Result<(), LineError> {
        let raw = self.polarity.encode(state);
        let name = self.name.clone();
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&[raw]))
            .map_err(|source| LineError::Write { line: name, source })
    }

    /// Release the descriptor. Returns `true` only on the call that closed it.
    pub fn close(&mut self) -> bool {
        self.file.take().is_some()
    }
}

// ── embedded-hal digital traits ─────────────────────────────

impl embedded_hal::digital::Error for LineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for LineHandle {
    type Error = LineError;
}

impl InputPin for LineHandle {
    fn is_high(&mut self) -> Result<bool, LineError> {
        Ok(self.read_state()? == LineState::Asserted)
    }

    fn is_low(&mut self) -> Result<bool, LineError> {
        Ok(self.read_state()? == LineState::Deasserted)
    }
}

impl OutputPin for LineHandle {
    fn set_low(&mut self) -> Result<(), LineError> {
        self.write_state(LineState::Deasserted)
    }

    fn set_high(&mut self) -> Result<(), LineError> {
        self.write_state(LineState::Asserted)
    }
}
