//! Unified error types for the button daemon.
//!
//! A single `Error` enum that every subsystem converts into, so device
//! construction and the top-level loop handle failures uniformly.  Each
//! subsystem keeps its own narrower enum (`ConfigError`, `LineError`,
//! `BusError`) so call sites can match on what actually went wrong.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level daemon error
// ---------------------------------------------------------------------------

/// Every fallible operation in the daemon funnels into this type.
#[derive(Debug, Error)]
pub enum Error {
    /// A definition entry or settings file is malformed.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// A GPIO or CPLD line could not be opened, read or written.
    #[error("line: {0}")]
    Line(#[from] LineError),
    /// An outbound state-management request failed.
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    /// The event loop rejected a registration or failed to poll.
    #[error("event loop: {0}")]
    EventLoop(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// A required key is absent from a definition entry.
    #[error("{entry}: missing required field '{field}'")]
    Missing { entry: String, field: &'static str },
    /// A key is present but its value cannot be used.
    #[error("{entry}: {reason}")]
    Invalid { entry: String, reason: String },
}

impl ConfigError {
    pub fn invalid(entry: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entry: entry.to_owned(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Line (GPIO / CPLD register) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LineError {
    #[error("open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing the export / direction / edge control files failed.
    #[error("configure {path}: {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read {line}: {source}")]
    Read {
        line: String,
        #[source]
        source: io::Error,
    },
    #[error("write {line}: {source}")]
    Write {
        line: String,
        #[source]
        source: io::Error,
    },
    /// The value file returned no bytes.
    #[error("read {line}: empty value")]
    Empty { line: String },
    /// The value file held something other than `'0'` or `'1'`.
    #[error("read {line}: unexpected value {value:#04x}")]
    UnexpectedValue { line: String, value: u8 },
    /// The handle has already been released.
    #[error("{line}: handle closed")]
    Closed { line: String },
    /// No gpiochip with the requested label exists.
    #[error("no gpiochip labelled '{0}'")]
    ChipNotFound(String),
    #[error("bad pin name '{pin}'")]
    BadPin { pin: String },
    /// Chip base plus pin offset does not fit a line number.
    #[error("pin '{pin}' overflows line numbers from base {base}")]
    PinOutOfRange { pin: String, base: u32 },
    /// The reactor refused to watch the line.
    #[error("watch {line}: {source}")]
    Watch {
        line: String,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Outbound state-management (IPC) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No service hosts the requested object / interface pair.
    #[error("no service provides {interface} at {path}")]
    ServiceUnknown { path: String, interface: String },
    #[error("{path} has no property {interface}.{name}")]
    NoSuchProperty {
        path: String,
        interface: String,
        name: String,
    },
    /// The property exists but holds a different type.
    #[error("{path}: property {name} has unexpected type")]
    TypeMismatch { path: String, name: String },
    /// The transport rejected the call.
    #[error("call failed: {0}")]
    Call(String),
}

// ---------------------------------------------------------------------------
// Host selector lookup miss
// ---------------------------------------------------------------------------

/// A host selector bitmask with no entry in the position map.
///
/// Not a failure: the published position simply stays where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bitmask {mask:#010b} has no host position")]
pub struct MappingMiss {
    pub mask: u8,
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Daemon-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
