//! Sysfs GPIO export and configuration.
//!
//! ```text
//! <root>/export            ← "N" written when gpioN is not yet exported
//! <root>/gpioN/direction   ← "in" | "high" | "low"
//! <root>/gpioN/edge        ← "both" (input lines only)
//! <root>/gpioN/value       → opened and handed out as a LineHandle
//! ```
//!
//! The root is `/sys/class/gpio` on a real BMC and a temp dir in tests.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::drivers::line::{Direction, LineConfig, LineHandle};
use crate::error::LineError;

/// Pins per Aspeed GPIO bank letter.
const ASPEED_BANK_WIDTH: u32 = 8;

/// Offset of an Aspeed-style pin name (`"A3"`, `"AA0"`) within its chip.
///
/// Banks are lettered `A`..`Z`, then `AA`, `AB`, ... with eight pins each.
pub fn aspeed_pin_offset(name: &str) -> Option<u32> {
    if !name.is_ascii() {
        return None;
    }
    let (letters, digit) = name.split_at(name.len().checked_sub(1)?);
    let pin = digit.parse::<u32>().ok().filter(|p| *p < ASPEED_BANK_WIDTH)?;
    if letters.is_empty() || letters.len() > 2 {
        return None;
    }
    let mut bank = 0u32;
    for c in letters.bytes() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        bank = bank * 26 + u32::from(c - b'A') + 1;
    }
    Some((bank - 1) * ASPEED_BANK_WIDTH + pin)
}

/// Kernel line number for `name` on a chip whose first line is `base`.
pub fn pin_number(base: u32, name: &str) -> Result<u32, LineError> {
    let off = aspeed_pin_offset(name).ok_or_else(|| LineError::BadPin {
        pin: name.to_owned(),
    })?;
    base.checked_add(off).ok_or_else(|| LineError::PinOutOfRange {
        pin: name.to_owned(),
        base,
    })
}

/// Sysfs GPIO class directory plus the number base of the primary chip.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
}

impl SysfsGpio {
    /// Use `root` with a chip base of zero.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: 0,
        }
    }

    /// Find the chip whose `label` matches and adopt its `base`.
    pub fn with_chip_label(root: impl Into<PathBuf>, label: &str) -> Result<Self, LineError> {
        let root = root.into();
        let entries = fs::read_dir(&root).map_err(|source| LineError::Open {
            path: root.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let dir = entry.path();
            let is_chip = dir
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("gpiochip"));
            if !is_chip {
                continue;
            }
            let Ok(found) = fs::read_to_string(dir.join("label")) else {
                continue;
            };
            if found.trim() != label {
                continue;
            }
            let base = fs::read_to_string(dir.join("base"))
                .ok()
                .and_then(|b| b.trim().parse::<u32>().ok());
            if let Some(base) = base {
                info!("GPIO: chip '{}' has base {}", label, base);
                return Ok(Self { root, base });
            }
        }
        Err(LineError::ChipNotFound(label.to_owned()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn line_dir(&self, number: u32) -> PathBuf {
        self.root.join(format!("gpio{number}"))
    }

    /// Export, configure and open one line.
    pub fn open_line(&self, cfg: &LineConfig) -> Result<LineHandle, LineError> {
        let dir = self.line_dir(cfg.number);
        let value_path = dir.join("value");

        if !value_path.exists() {
            let export = self.root.join("export");
            write_attr(&export, &cfg.number.to_string())?;
            debug!("GPIO: exported gpio{}", cfg.number);
        }

        let current_high = matches!(fs::read(&value_path).ok().as_deref(), Some([b'1', ..]));
        write_attr(&dir.join("direction"), cfg.direction.sysfs_value(current_high))?;

        if cfg.direction != Direction::Out {
            write_attr(&dir.join("edge"), "both")?;
        }
        let file = open_value(&value_path, true)?;

        debug!(
            "GPIO: opened gpio{} ({}) direction={:?} polarity={:?}",
            cfg.number, cfg.name, cfg.direction, cfg.polarity
        );
        Ok(LineHandle::new(
            cfg.name.clone(),
            &value_path,
            cfg.polarity,
            file,
        ))
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), LineError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|mut f| f.write_all(value.as_bytes()))
        .map_err(|source| LineError::Configure {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) fn open_value(path: &Path, writable: bool) -> Result<File, LineError> {
    OpenOptions::new()
        .read(true)
        .write(writable)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| LineError::Open {
            path: path.to_path_buf(),
            source,
        })
}
