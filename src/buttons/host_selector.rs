//! Host selector switch.
//!
//! GPIO selectors fold one bit per line into a mask and look it up in the
//! configured `host_selector_map`; CPLD selectors hold the position as a
//! single ASCII digit.  The position is published on the bus as
//! `Position`, alongside the constant `MaxPosition`.
//!
//! Bit convention: a deasserted line sets its bit, an asserted line clears
//! it (bit index = the line's place in the group).
//!
//! With `polling_mode` set, every line is also re-read on a periodic timer
//! and a change is published as if an edge had arrived.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use serde_json::Value as Json;

use super::{ButtonDevice, DeviceContext, DeviceSpec, LineGroup};
use crate::app::ports::{Reactor, StateBus, Value};
use crate::config::ButtonConfig;
use crate::drivers::line::{LineHandle, LineState};
use crate::error::{BusError, ConfigError, Error, MappingMiss};
use crate::events::ButtonEvent;
use crate::paths::{MAX_POSITION_PROP, POSITION_PROP};
use crate::scheduler::{TimerId, TimerOwner};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// Bitmask over the group's lines, mapped to positions.
    Gpio { map: BTreeMap<u8, usize> },
    /// One register whose value is the position digit.
    Cpld,
}

#[derive(Debug)]
pub struct HostSelector {
    spec: DeviceSpec,
    lines: LineGroup,
    source: Source,
    mask: u8,
    position: usize,
    max_position: usize,
    poll: Option<TimerId>,
}

fn to_position(v: &Json) -> Option<usize> {
    match v {
        Json::Number(n) => n.as_u64().map(|n| n as usize),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `host_selector_map`: decimal mask keys, integer or string positions.
fn parse_map(config: &ButtonConfig) -> Result<BTreeMap<u8, usize>, ConfigError> {
    let raw: BTreeMap<String, Json> = config.require("host_selector_map")?;
    let mut map = BTreeMap::new();
    for (key, value) in raw {
        let mask: u8 = key.trim().parse().map_err(|_| {
            ConfigError::invalid(&config.form_factor, format!("host_selector_map key '{key}'"))
        })?;
        let position = to_position(&value).ok_or_else(|| {
            ConfigError::invalid(&config.form_factor, format!("host_selector_map['{key}'] = {value}"))
        })?;
        map.insert(mask, position);
    }
    Ok(map)
}

fn set_bit(mask: u8, index: usize, state: LineState) -> u8 {
    let bit = 1u8 << index;
    match state {
        LineState::Deasserted => mask | bit,
        LineState::Asserted => mask & !bit,
    }
}

impl HostSelector {
    pub fn new(
        spec: DeviceSpec,
        config: &ButtonConfig,
        lines: Vec<LineHandle>,
        ctx: &mut DeviceContext<'_>,
    ) -> Result<Self, Error> {
        let source = if config.is_cpld() {
            Source::Cpld
        } else {
            Source::Gpio {
                map: parse_map(config)?,
            }
        };
        let max_position: usize = config.require("max_position")?;
        let polling = config.extra::<bool>("polling_mode")?.unwrap_or(false);
        let poll_ms = config
            .extra::<u64>("polling_interval_ms")?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if polling && poll_ms == 0 {
            return Err(ConfigError::invalid(&config.form_factor, "polling_interval_ms must be > 0").into());
        }

        let mut group = LineGroup::new(spec.form_factor.clone(), spec.id, lines);
        let initial = group.arm(ctx.reactor)?;

        let mut selector = Self {
            spec,
            lines: group,
            source,
            mask: 0,
            position: 0,
            max_position,
            poll: None,
        };

        let start = match selector.source {
            Source::Gpio { .. } => {
                for (index, raw) in initial.iter().enumerate() {
                    let line = &selector.lines.lines()[index];
                    match line.polarity().decode(line.name(), *raw) {
                        Ok(state) => selector.mask = set_bit(selector.mask, index, state),
                        Err(e) => {
                            selector.lines.tear_down(ctx.reactor);
                            return Err(e.into());
                        }
                    }
                }
                selector.lookup(selector.mask).ok()
            }
            Source::Cpld => initial.first().and_then(|raw| selector.cpld_position(*raw)),
        };
        selector.position = start.unwrap_or(0);

        if let Err(e) = selector.publish_initial(ctx.bus) {
            selector.lines.tear_down(ctx.reactor);
            return Err(e.into());
        }
        if polling {
            selector.poll = Some(ctx.reactor.arm_timer(TimerOwner::Device(selector.spec.id), poll_ms, true));
            info!("{}: polling every {} ms", selector.spec.form_factor, poll_ms);
        }
        info!(
            "{}: position {} of {}",
            selector.spec.form_factor, selector.position, selector.max_position
        );
        Ok(selector)
    }

    fn publish_initial(&self, bus: &mut dyn StateBus) -> Result<(), BusError> {
        let path = &self.spec.object_path;
        let iface = self.spec.kind.interface();
        bus.add_object(path, iface)?;
        bus.publish(path, iface, MAX_POSITION_PROP, Value::U64(self.max_position as u64))?;
        bus.publish(path, iface, POSITION_PROP, Value::U64(self.position as u64))
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn max_position(&self) -> usize {
        self.max_position
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn poll_timer(&self) -> Option<TimerId> {
        self.poll
    }

    fn lookup(&self, mask: u8) -> Result<usize, MappingMiss> {
        match &self.source {
            Source::Gpio { map } => map.get(&mask).copied().ok_or(MappingMiss { mask }),
            Source::Cpld => Ok(mask as usize),
        }
    }

    /// Position encoded by a register byte; `None` unless it is a digit
    /// no greater than `max_position`.
    fn cpld_position(&self, raw: u8) -> Option<usize> {
        if !raw.is_ascii_digit() {
            warn!("{}: register value {:#04x} is not a digit", self.spec.form_factor, raw);
            return None;
        }
        let position = usize::from(raw - b'0');
        if position > self.max_position {
            warn!(
                "{}: register position {} exceeds max {}",
                self.spec.form_factor, position, self.max_position
            );
            return None;
        }
        Some(position)
    }

    /// Store and publish `position`; an event only when it changed.
    fn set_position(&mut self, position: usize, bus: &mut dyn StateBus) -> Option<ButtonEvent> {
        if position == self.position {
            return None;
        }
        self.position = position;
        if let Err(e) = bus.publish(
            &self.spec.object_path,
            self.spec.kind.interface(),
            POSITION_PROP,
            Value::U64(position as u64),
        ) {
            error!("{}: publish position: {}", self.spec.form_factor, e);
        }
        info!("{}: position -> {}", self.spec.form_factor, position);
        Some(ButtonEvent::PositionChanged(position))
    }

    fn resolve_mask(&mut self, bus: &mut dyn StateBus) -> Option<ButtonEvent> {
        match self.lookup(self.mask) {
            Ok(position) => self.set_position(position, bus),
            Err(miss) => {
                debug!("{}: {}", self.spec.form_factor, miss);
                None
            }
        }
    }

    pub fn handle_ready(&mut self, line: usize, ctx: &mut DeviceContext<'_>) -> Option<ButtonEvent> {
        match self.source {
            Source::Gpio { .. } => {
                let state = self.lines.read(line)?;
                self.mask = set_bit(self.mask, line, state);
                self.resolve_mask(ctx.bus)
            }
            Source::Cpld => {
                let raw = match self.lines.line_mut(line)?.read_raw() {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!("{}: {}", self.spec.form_factor, e);
                        return None;
                    }
                };
                let position = self.cpld_position(raw)?;
                self.set_position(position, ctx.bus)
            }
        }
    }

    /// Polling tick: re-read every line and publish on change.
    pub fn handle_timer(&mut self, id: TimerId, ctx: &mut DeviceContext<'_>) -> Option<ButtonEvent> {
        if self.poll != Some(id) {
            return None;
        }
        match self.source {
            Source::Gpio { .. } => {
                for index in 0..self.lines.len() {
                    if let Some(state) = self.lines.read(index) {
                        self.mask = set_bit(self.mask, index, state);
                    }
                }
                self.resolve_mask(ctx.bus)
            }
            Source::Cpld => self.handle_ready(0, ctx),
        }
    }

    /// Step to the next position, wrapping after `MaxPosition`.
    pub fn advance(&mut self, bus: &mut dyn StateBus) -> Option<ButtonEvent> {
        let next = if self.position < self.max_position {
            self.position + 1
        } else {
            0
        };
        self.set_position(next, bus)
    }

    pub fn tear_down(&mut self, reactor: &mut dyn Reactor) {
        if let Some(id) = self.poll.take() {
            reactor.cancel_timer(id);
        }
        self.lines.tear_down(reactor);
    }
}

pub fn construct(
    spec: DeviceSpec,
    config: &ButtonConfig,
    lines: Vec<LineHandle>,
    ctx: &mut DeviceContext<'_>,
) -> Result<ButtonDevice, Error> {
    HostSelector::new(spec, config, lines, ctx).map(ButtonDevice::HostSelector)
}
