//! Serial console multiplexer.
//!
//! Follows the host selector: on every position change each mux select
//! line is driven from its bit of `serial_uart_mux_map[position]`.  The
//! `serial_uart_rx` line instead follows the `debug_card_present` input.
//! No line is watched.

use std::collections::BTreeMap;

use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, info};

use super::{ButtonDevice, DeviceContext, DeviceSpec, LineGroup};
use crate::app::ports::Reactor;
use crate::config::ButtonConfig;
use crate::drivers::line::LineHandle;
use crate::error::{ConfigError, Error, LineError};

pub const DEBUG_CARD_PRESENT: &str = "debug_card_present";
pub const SERIAL_UART_RX: &str = "serial_uart_rx";

const MIN_LINES: usize = 3;

#[derive(Debug)]
pub struct SerialUartMux {
    spec: DeviceSpec,
    lines: LineGroup,
    map: BTreeMap<usize, u8>,
    debug_card: usize,
}

impl SerialUartMux {
    pub fn new(
        spec: DeviceSpec,
        config: &ButtonConfig,
        lines: Vec<LineHandle>,
        _ctx: &mut DeviceContext<'_>,
    ) -> Result<Self, Error> {
        if lines.len() < MIN_LINES {
            return Err(ConfigError::invalid(
                &config.form_factor,
                format!("needs at least {MIN_LINES} lines, found {}", lines.len()),
            )
            .into());
        }
        let raw: BTreeMap<String, u8> = config.require("serial_uart_mux_map")?;
        let mut map = BTreeMap::new();
        for (key, mask) in raw {
            let position: usize = key.trim().parse().map_err(|_| {
                ConfigError::invalid(&config.form_factor, format!("serial_uart_mux_map key '{key}'"))
            })?;
            map.insert(position, mask);
        }
        let group = LineGroup::new(spec.form_factor.clone(), spec.id, lines);
        let debug_card = group.index_of(DEBUG_CARD_PRESENT).ok_or_else(|| ConfigError::Missing {
            entry: config.form_factor.clone(),
            field: DEBUG_CARD_PRESENT,
        })?;
        info!("{}: {} mux lines", spec.form_factor, group.len() - 1);
        Ok(Self {
            spec,
            lines: group,
            map,
            debug_card,
        })
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn is_debug_card_present(&mut self) -> Result<bool, LineError> {
        match self.lines.line_mut(self.debug_card) {
            Some(line) => line.is_high(),
            None => Ok(false),
        }
    }

    /// Route the console to `position`.
    pub fn on_position_changed(&mut self, position: usize) -> Result<(), LineError> {
        let present = self.is_debug_card_present()?;
        info!(
            "{}: position {}, debug card {}",
            self.spec.form_factor,
            position,
            if present { "present" } else { "absent" }
        );
        let mask = match self.map.get(&position) {
            Some(mask) => *mask,
            None => {
                debug!("{}: no mux entry for position {}", self.spec.form_factor, position);
                0
            }
        };
        for index in 0..self.lines.len() {
            if index == self.debug_card {
                continue;
            }
            let Some(line) = self.lines.line_mut(index) else {
                continue;
            };
            let assert = if line.name() == SERIAL_UART_RX {
                present
            } else {
                mask & (1 << index) != 0
            };
            let result = if assert { line.set_high() } else { line.set_low() };
            if let Err(e) = result {
                error!("{}: {}", self.spec.form_factor, e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn tear_down(&mut self, reactor: &mut dyn Reactor) {
        self.lines.tear_down(reactor);
    }
}

pub fn construct(
    spec: DeviceSpec,
    config: &ButtonConfig,
    lines: Vec<LineHandle>,
    ctx: &mut DeviceContext<'_>,
) -> Result<ButtonDevice, Error> {
    SerialUartMux::new(spec, config, lines, ctx).map(ButtonDevice::SerialUartMux)
}
