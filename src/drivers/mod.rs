//! Line drivers: sysfs GPIO, CPLD registers, and the shared line handle.

pub mod cpld;
pub mod gpio;
pub mod line;

use std::path::{Path, PathBuf};

use crate::config::{ButtonConfig, LineSource};
use crate::error::LineError;
use line::LineHandle;

/// Where line value files live; hands out opened [`LineHandle`]s.
#[derive(Debug, Clone)]
pub struct Lines {
    gpio: gpio::SysfsGpio,
    cpld_root: PathBuf,
}

impl Lines {
    pub fn new(gpio: gpio::SysfsGpio, cpld_root: impl Into<PathBuf>) -> Self {
        Self {
            gpio,
            cpld_root: cpld_root.into(),
        }
    }

    pub fn gpio(&self) -> &gpio::SysfsGpio {
        &self.gpio
    }

    pub fn cpld_root(&self) -> &Path {
        &self.cpld_root
    }

    /// Open every line an entry names, in config order.
    ///
    /// On failure the handles opened so far are dropped (and closed).
    pub fn open_all(&self, config: &ButtonConfig) -> Result<Vec<LineHandle>, LineError> {
        match &config.source {
            LineSource::Gpio(lines) => lines.iter().map(|l| self.gpio.open_line(l)).collect(),
            LineSource::Cpld { info, polarity } => {
                Ok(vec![info.open(&self.cpld_root, *polarity)?])
            }
        }
    }
}
