//! Configuration: line definitions and daemon settings.
//!
//! Two inputs:
//!
//! - **Definitions** (`gpio_defs.json`): which buttons exist and which lines
//!   back them.  Parsed into [`ButtonConfig`] entries; a malformed entry is
//!   logged and skipped so one bad line never stops the rest of the panel.
//! - **Settings** ([`DaemonConfig`]): platform tunables such as press
//!   thresholds, the escalation profile and the BMC selector position.
//!   Every field has a default, so the settings file is optional.
//!
//! ```json
//! { "gpio_definitions": [
//!     { "name": "POWER_BUTTON", "pin": "D0", "direction": "both" },
//!     { "name": "HOST_SELECTOR",
//!       "group_gpio_config": [ { "name": "host_sel_0", "num": 100, "direction": "both",
//!                                "polarity": "active_high" } ],
//!       "host_selector_map": { "0": 0, "1": 1 }, "max_position": 4 } ],
//!   "cpld_definitions": [
//!     { "name": "HOST_SELECTOR", "register_name": "uart-sel",
//!       "i2c_bus": 12, "i2c_address": 15, "max_position": 4 } ] }
//! ```

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::drivers::cpld::CpldInfo;
use crate::drivers::line::{Direction, LineConfig, Polarity};
use crate::error::ConfigError;

/// Upper bound on lines in one group (host selector bitmask width).
pub const MAX_LINES: usize = 8;

pub const DEFAULT_DEFINITIONS_PATH: &str = "/etc/default/obmc/gpio/gpio_defs.json";

// ---------------------------------------------------------------------------
// Button definitions
// ---------------------------------------------------------------------------

/// Backing store for a button's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSource {
    Gpio(heapless::Vec<LineConfig, MAX_LINES>),
    Cpld { info: CpldInfo, polarity: Polarity },
}

/// One parsed definition entry.
#[derive(Debug, Clone)]
pub struct ButtonConfig {
    /// Form-factor name, e.g. `POWER_BUTTON` or `HOST_SELECTOR`.
    pub form_factor: String,
    pub source: LineSource,
    /// The whole entry, for kind-specific keys (`host_selector_map`, ...).
    pub extra: Map<String, Value>,
}

impl ButtonConfig {
    pub fn is_cpld(&self) -> bool {
        matches!(self.source, LineSource::Cpld { .. })
    }

    /// Number of lines this entry will open.
    pub fn line_count(&self) -> usize {
        match &self.source {
            LineSource::Gpio(lines) => lines.len(),
            LineSource::Cpld { .. } => 1,
        }
    }

    pub fn lines(&self) -> &[LineConfig] {
        match &self.source {
            LineSource::Gpio(lines) => lines.as_slice(),
            LineSource::Cpld { .. } => &[],
        }
    }

    /// Optional kind-specific key.
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::deserialize(v)
                .map(Some)
                .map_err(|e| ConfigError::invalid(&self.form_factor, format!("{key}: {e}"))),
        }
    }

    /// Required kind-specific key.
    pub fn require<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, ConfigError> {
        self.extra(key)?.ok_or_else(|| ConfigError::Missing {
            entry: self.form_factor.clone(),
            field: key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawDefinitions {
    #[serde(default)]
    gpio_definitions: Vec<Value>,
    #[serde(default)]
    cpld_definitions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    num: Option<u32>,
    #[serde(default)]
    pin: Option<String>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    polarity: Option<Polarity>,
}

impl RawLine {
    fn resolve(self, entry: &str, pin_base: u32) -> Result<LineConfig, ConfigError> {
        let number = match (self.pin.as_deref(), self.num) {
            (Some(pin), _) => crate::drivers::gpio::pin_number(pin_base, pin)
                .map_err(|e| ConfigError::invalid(entry, e.to_string()))?,
            (None, Some(num)) => num,
            (None, None) => {
                return Err(ConfigError::Missing {
                    entry: entry.to_owned(),
                    field: "num",
                });
            }
        };
        Ok(LineConfig {
            number,
            name: self.name.unwrap_or_else(|| entry.to_owned()),
            direction: self.direction.unwrap_or_default(),
            polarity: self.polarity.unwrap_or_default(),
        })
    }
}

fn entry_name(entry: &Value) -> Result<String, ConfigError> {
    entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ConfigError::Missing {
            entry: "<unnamed>".into(),
            field: "name",
        })
}

fn as_object(entry: Value, name: &str) -> Result<Map<String, Value>, ConfigError> {
    match entry {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::invalid(name, "entry is not an object")),
    }
}

fn parse_gpio_entry(entry: Value, pin_base: u32) -> Result<ButtonConfig, ConfigError> {
    let name = entry_name(&entry)?;
    let map = as_object(entry, &name)?;

    let raw_lines: Vec<RawLine> = match map.get("group_gpio_config") {
        Some(group) => Vec::<RawLine>::deserialize(group)
            .map_err(|e| ConfigError::invalid(&name, format!("group_gpio_config: {e}")))?,
        None => vec![
            RawLine::deserialize(Value::Object(map.clone()))
                .map_err(|e| ConfigError::invalid(&name, e.to_string()))?,
        ],
    };

    let mut lines = heapless::Vec::new();
    for raw in raw_lines {
        let mut line = raw.resolve(&name, pin_base)?;
        // A single-line entry's "name" is the form factor, not a role.
        if !map.contains_key("group_gpio_config") {
            line.name.clone_from(&name);
        }
        lines
            .push(line)
            .map_err(|_| ConfigError::invalid(&name, format!("more than {MAX_LINES} lines")))?;
    }
    if lines.is_empty() {
        return Err(ConfigError::invalid(&name, "group_gpio_config is empty"));
    }

    Ok(ButtonConfig {
        form_factor: name,
        source: LineSource::Gpio(lines),
        extra: map,
    })
}

fn parse_cpld_entry(entry: Value) -> Result<ButtonConfig, ConfigError> {
    let name = entry_name(&entry)?;
    let info = CpldInfo::deserialize(&entry)
        .map_err(|e| ConfigError::invalid(&name, e.to_string()))?;
    let polarity = match entry.get("polarity") {
        Some(p) => Polarity::deserialize(p).map_err(|e| ConfigError::invalid(&name, e.to_string()))?,
        None => Polarity::default(),
    };
    Ok(ButtonConfig {
        form_factor: name.clone(),
        source: LineSource::Cpld { info, polarity },
        extra: as_object(entry, &name)?,
    })
}

/// Parse a definitions document.
///
/// A document that is not valid JSON is an error; individual entries that
/// fail to parse are logged and skipped.  CPLD entries come first.
pub fn parse_definitions(text: &str, pin_base: u32) -> Result<Vec<ButtonConfig>, ConfigError> {
    let raw: RawDefinitions = serde_json::from_str(text)?;
    let mut out = Vec::with_capacity(raw.cpld_definitions.len() + raw.gpio_definitions.len());

    for entry in raw.cpld_definitions {
        match parse_cpld_entry(entry) {
            Ok(cfg) => {
                debug!("Config: found cpld button '{}'", cfg.form_factor);
                out.push(cfg);
            }
            Err(e) => warn!("Config: skipping cpld entry: {}", e),
        }
    }
    for entry in raw.gpio_definitions {
        match parse_gpio_entry(entry, pin_base) {
            Ok(cfg) => {
                debug!("Config: found gpio button '{}'", cfg.form_factor);
                out.push(cfg);
            }
            Err(e) => warn!("Config: skipping gpio entry: {}", e),
        }
    }
    Ok(out)
}

pub fn load_definitions(path: &Path, pin_base: u32) -> Result<Vec<ButtonConfig>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_definitions(&text, pin_base)
}

// ---------------------------------------------------------------------------
// Daemon settings
// ---------------------------------------------------------------------------

/// What a press means while the host selector points at the BMC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmcSelectedPolicy {
    /// Drop short-press actions; long presses act on the whole sled.
    #[default]
    SuppressShortPress,
    /// Drop every power action.
    SuppressAll,
}

/// Platform tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // --- Press classification ---
    /// Hold time (ms) at which a release counts as a long press.
    pub long_press_ms: u64,
    /// Hold time (ms) at which a release counts as a longer press.
    pub longer_press_ms: u64,
    /// Whether the longer-press class exists on this platform.
    pub longer_press_enabled: bool,

    // --- Escalation ---
    /// Escalation profile name; empty selects the default short-press policy.
    pub power_button_profile: String,
    pub host_off_after_ms: u64,
    pub chassis_off_after_ms: u64,
    pub escalation_poll_ms: u64,

    // --- Routing ---
    /// Host selector position that means "the BMC itself".
    pub bmc_position: usize,
    pub bmc_selected: BmcSelectedPolicy,
    /// Long press with the BMC selected power-cycles the whole sled.
    pub chassis_system_reset: bool,
    /// Reset requests a warm reboot instead of a regular reboot.
    pub reset_warm_reboot: bool,
    /// LED group toggled by the identify button.
    pub id_led_group: String,

    // --- Registry ---
    /// Number of per-slot power buttons (`POWER_BUTTON1..N`).
    pub chassis_instances: usize,

    // --- Paths ---
    pub gpio_root: PathBuf,
    pub cpld_root: PathBuf,
    /// Label of the gpiochip whose base offsets pin names.
    pub gpio_base_label: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            long_press_ms: 4000,
            longer_press_ms: 14000,
            longer_press_enabled: false,

            power_button_profile: String::new(),
            host_off_after_ms: 4000,
            chassis_off_after_ms: 10000,
            escalation_poll_ms: 1000,

            bmc_position: 0,
            bmc_selected: BmcSelectedPolicy::default(),
            chassis_system_reset: true,
            reset_warm_reboot: false,
            id_led_group: "enclosure_identify".into(),

            chassis_instances: 0,

            gpio_root: PathBuf::from("/sys/class/gpio"),
            cpld_root: PathBuf::from("/sys/bus/i2c/devices"),
            gpio_base_label: None,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the press classifier or escalation timer cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const ENTRY: &str = "settings";
        if self.long_press_ms == 0 {
            return Err(ConfigError::invalid(ENTRY, "long_press_ms must be non-zero"));
        }
        if self.longer_press_enabled && self.longer_press_ms <= self.long_press_ms {
            return Err(ConfigError::invalid(
                ENTRY,
                "longer_press_ms must exceed long_press_ms",
            ));
        }
        if self.escalation_poll_ms == 0 {
            return Err(ConfigError::invalid(ENTRY, "escalation_poll_ms must be non-zero"));
        }
        Ok(())
    }
}
