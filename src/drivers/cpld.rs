//! CPLD register attributes exposed by an i2c client driver.
//!
//! Each register appears as `<root>/<bus>-<addr:04x>/<register_name>` and
//! reads back a single ASCII digit, just like a GPIO value file.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::drivers::gpio::open_value;
use crate::drivers::line::{LineHandle, Polarity};
use crate::error::LineError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CpldInfo {
    pub register_name: String,
    pub i2c_bus: u32,
    pub i2c_address: u32,
}

impl CpldInfo {
    pub fn device_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}-{:04x}", self.i2c_bus, self.i2c_address))
            .join(&self.register_name)
    }

    /// Open the register read-only and non-blocking.
    pub fn open(&self, root: &Path, polarity: Polarity) -> Result<LineHandle, LineError> {
        let path = self.device_path(root);
        let file = open_value(&path, false)?;
        debug!("CPLD: opened {}", path.display());
        Ok(LineHandle::new(
            self.register_name.clone(),
            &path,
            polarity,
            file,
        ))
    }
}
