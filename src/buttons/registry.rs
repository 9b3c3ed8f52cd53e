//! Form-factor name → device constructor lookup.
//!
//! The definitions file decides which devices exist; this table decides
//! how each name is built.  Platform builds add entries with
//! [`Registry::register`] without touching the startup sequence.

use std::collections::BTreeMap;

use log::{info, warn};

use super::{host_selector, serial_uart_mux, simple, ButtonDevice, ButtonKind, DeviceContext, DeviceSpec};
use crate::config::ButtonConfig;
use crate::drivers::line::LineHandle;
use crate::drivers::Lines;
use crate::error::Error;
use crate::events::DeviceId;
use crate::paths::{
    self, DEBUG_HOST_SELECTOR_OBJECT, HOST_SELECTOR_OBJECT, ID_OBJECT, POWER_OBJECT,
    POWER_OBJECT_BASE, RESET_OBJECT, SERIAL_UART_MUX_OBJECT,
};

pub const POWER_BUTTON: &str = "POWER_BUTTON";
pub const RESET_BUTTON: &str = "RESET_BUTTON";
pub const ID_BUTTON: &str = "ID_BTN";
pub const HOST_SELECTOR: &str = "HOST_SELECTOR";
pub const DEBUG_SELECTOR_BUTTON: &str = "DEBUG_SELECTOR_BUTTON";
pub const SERIAL_UART_MUX: &str = "SERIAL_UART_MUX";

/// Builds a device from its opened lines.
pub type DeviceCtor =
    fn(DeviceSpec, &ButtonConfig, Vec<LineHandle>, &mut DeviceContext<'_>) -> Result<ButtonDevice, Error>;

#[derive(Debug, Clone)]
struct Entry {
    kind: ButtonKind,
    object_path: String,
    ctor: DeviceCtor,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in form factor, plus `POWER_BUTTON1..=chassis_instances`
    /// for per-slot power buttons.
    pub fn with_builtin(chassis_instances: usize) -> Self {
        let mut reg = Self::new();
        reg.register(POWER_BUTTON, ButtonKind::Power, POWER_OBJECT, simple::construct);
        reg.register(RESET_BUTTON, ButtonKind::Reset, RESET_OBJECT, simple::construct);
        reg.register(ID_BUTTON, ButtonKind::Id, ID_OBJECT, simple::construct);
        reg.register(
            DEBUG_SELECTOR_BUTTON,
            ButtonKind::DebugHostSelector,
            DEBUG_HOST_SELECTOR_OBJECT,
            simple::construct,
        );
        reg.register(
            HOST_SELECTOR,
            ButtonKind::HostSelector,
            HOST_SELECTOR_OBJECT,
            host_selector::construct,
        );
        reg.register(
            SERIAL_UART_MUX,
            ButtonKind::SerialUartMux,
            SERIAL_UART_MUX_OBJECT,
            serial_uart_mux::construct,
        );
        for slot in 1..=chassis_instances {
            reg.register(
                &format!("{POWER_BUTTON}{slot}"),
                ButtonKind::Power,
                &paths::indexed(POWER_OBJECT_BASE, slot),
                simple::construct,
            );
        }
        reg
    }

    pub fn register(&mut self, name: &str, kind: ButtonKind, object_path: &str, ctor: DeviceCtor) {
        self.entries.insert(
            name.to_owned(),
            Entry {
                kind,
                object_path: object_path.to_owned(),
                ctor,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kind and object path registered for `name`.
    pub fn lookup(&self, name: &str) -> Option<(ButtonKind, &str)> {
        self.entries
            .get(name)
            .map(|e| (e.kind, e.object_path.as_str()))
    }

    /// Open the entry's lines and build its device.
    ///
    /// `Ok(None)` when no constructor is registered for the form factor.
    /// Lines opened before a failure are closed on the way out.
    pub fn create(
        &self,
        id: DeviceId,
        config: &ButtonConfig,
        lines: &Lines,
        ctx: &mut DeviceContext<'_>,
    ) -> Result<Option<ButtonDevice>, Error> {
        let Some(entry) = self.entries.get(&config.form_factor) else {
            warn!("Registry: no device for form factor '{}'", config.form_factor);
            return Ok(None);
        };
        let handles = lines.open_all(config)?;
        let spec = DeviceSpec {
            id,
            kind: entry.kind,
            form_factor: config.form_factor.clone(),
            object_path: entry.object_path.clone(),
        };
        let device = (entry.ctor)(spec, config, handles, ctx)?;
        info!(
            "Registry: created {} ({}) with {} line(s)",
            config.form_factor,
            entry.kind.name(),
            config.line_count()
        );
        Ok(Some(device))
    }
}
