//! Single-line push buttons: power, reset, ID and the debug host selector.
//!
//! The device holds no gesture state.  Each readiness notification is one
//! edge: asserted means pressed, deasserted means released.  Hold timing
//! lives with the power escalation policy.

use log::{debug, info};

use super::{ButtonDevice, DeviceContext, DeviceSpec, LineGroup};
use crate::app::ports::Reactor;
use crate::config::ButtonConfig;
use crate::drivers::line::{LineHandle, LineState};
use crate::error::{ConfigError, Error};
use crate::events::ButtonEvent;

#[derive(Debug)]
pub struct SimpleButton {
    spec: DeviceSpec,
    lines: LineGroup,
}

impl SimpleButton {
    /// Publish the button object and arm its line.
    pub fn new(
        spec: DeviceSpec,
        config: &ButtonConfig,
        lines: Vec<LineHandle>,
        ctx: &mut DeviceContext<'_>,
    ) -> Result<Self, Error> {
        if lines.len() != 1 {
            return Err(ConfigError::invalid(
                &config.form_factor,
                format!("expected one line, found {}", lines.len()),
            )
            .into());
        }
        let mut group = LineGroup::new(spec.form_factor.clone(), spec.id, lines);
        group.arm(ctx.reactor)?;
        if let Err(e) = ctx.bus.add_object(&spec.object_path, spec.kind.interface()) {
            group.tear_down(ctx.reactor);
            return Err(e.into());
        }
        info!("{}: ready at {}", spec.form_factor, spec.object_path);
        Ok(Self { spec, lines: group })
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn handle_ready(&mut self, line: usize) -> Option<ButtonEvent> {
        let event = match self.lines.read(line)? {
            LineState::Asserted => ButtonEvent::Pressed,
            LineState::Deasserted => ButtonEvent::Released,
        };
        debug!("{}: {:?}", self.spec.form_factor, event);
        Some(event)
    }

    pub fn tear_down(&mut self, reactor: &mut dyn Reactor) {
        self.lines.tear_down(reactor);
    }
}

/// Registry constructor for every single-line kind.
pub fn construct(
    spec: DeviceSpec,
    config: &ButtonConfig,
    lines: Vec<LineHandle>,
    ctx: &mut DeviceContext<'_>,
) -> Result<ButtonDevice, Error> {
    SimpleButton::new(spec, config, lines, ctx).map(ButtonDevice::Simple)
}
