//! Button device catalog.
//!
//! Every configured definition becomes one [`ButtonDevice`], selected by
//! form-factor name through the [`registry::Registry`].  Devices own their
//! lines through a [`LineGroup`], which is the only place descriptors enter
//! and leave the reactor's watch set.
//!
//! | Variant        | Form factor              | Lines watched | Emits                |
//! |----------------|--------------------------|---------------|----------------------|
//! | `Simple`       | POWER / RESET / ID / DEBUG | 1           | Pressed, Released    |
//! | `HostSelector` | HOST_SELECTOR            | 1..=8 or CPLD | PositionChanged      |
//! | `SerialUartMux`| SERIAL_UART_MUX          | none          | (drives outputs)     |

pub mod host_selector;
pub mod registry;
pub mod serial_uart_mux;
pub mod simple;

use std::mem;

use log::{error, warn};

use crate::app::ports::{Orphans, Reactor, StateBus, WatchClass, WatchId};
use crate::drivers::line::{LineHandle, LineState};
use crate::error::{Error, LineError};
use crate::events::{ButtonEvent, DeviceId};
use crate::paths::{
    DEBUG_HOST_SELECTOR_IFACE, HOST_SELECTOR_IFACE, ID_IFACE, POWER_IFACE, RESET_IFACE,
    SERIAL_UART_MUX_IFACE,
};
use crate::scheduler::TimerId;

pub use host_selector::HostSelector;
pub use serial_uart_mux::SerialUartMux;
pub use simple::SimpleButton;

/// Fixed catalog of button archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonKind {
    Power,
    Reset,
    Id,
    HostSelector,
    DebugHostSelector,
    SerialUartMux,
}

impl ButtonKind {
    pub fn interface(self) -> &'static str {
        match self {
            Self::Power => POWER_IFACE,
            Self::Reset => RESET_IFACE,
            Self::Id => ID_IFACE,
            Self::HostSelector => HOST_SELECTOR_IFACE,
            Self::DebugHostSelector => DEBUG_HOST_SELECTOR_IFACE,
            Self::SerialUartMux => SERIAL_UART_MUX_IFACE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Reset => "reset",
            Self::Id => "id",
            Self::HostSelector => "host-selector",
            Self::DebugHostSelector => "debug-host-selector",
            Self::SerialUartMux => "serial-uart-mux",
        }
    }
}

/// Identity handed to a device constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub kind: ButtonKind,
    pub form_factor: String,
    pub object_path: String,
}

/// Collaborators a device may touch while handling an event.
pub struct DeviceContext<'a> {
    pub reactor: &'a mut dyn Reactor,
    pub bus: &'a mut dyn StateBus,
}

// ---------------------------------------------------------------------------
// Line group
// ---------------------------------------------------------------------------

/// The lines of one device plus their reactor registrations.
///
/// Teardown always unwatches before it closes.  A group dropped while
/// still watched hands its open lines to the reactor's [`Orphans`].
#[derive(Debug)]
pub struct LineGroup {
    form_factor: String,
    device: DeviceId,
    lines: Vec<LineHandle>,
    watches: Vec<WatchId>,
    orphans: Option<Orphans>,
}

impl LineGroup {
    pub fn new(form_factor: impl Into<String>, device: DeviceId, lines: Vec<LineHandle>) -> Self {
        Self {
            form_factor: form_factor.into(),
            device,
            lines,
            watches: Vec::new(),
            orphans: None,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_watched(&self) -> bool {
        !self.watches.is_empty()
    }

    pub fn lines(&self) -> &[LineHandle] {
        &self.lines
    }

    pub fn line_mut(&mut self, index: usize) -> Option<&mut LineHandle> {
        self.lines.get_mut(index)
    }

    /// Position of the line named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.name() == name)
    }

    /// Read one line, logging failures under the device's name.
    pub fn read(&mut self, index: usize) -> Option<LineState> {
        let form_factor = &self.form_factor;
        let line = self.lines.get_mut(index)?;
        match line.read_state() {
            Ok(state) => Some(state),
            Err(e) => {
                error!("{}: {}", form_factor, e);
                None
            }
        }
    }

    /// Consume the arming read on every line, then register each with the
    /// reactor.  Returns the raw initial values in line order.
    ///
    /// Any failure unregisters what was registered and closes every line.
    pub fn arm(&mut self, reactor: &mut dyn Reactor) -> Result<Vec<u8>, Error> {
        match self.try_arm(reactor) {
            Ok(states) => Ok(states),
            Err(e) => {
                error!("{}: initialisation failed: {}", self.form_factor, e);
                self.tear_down(reactor);
                Err(e)
            }
        }
    }

    fn try_arm(&mut self, reactor: &mut dyn Reactor) -> Result<Vec<u8>, Error> {
        self.orphans = Some(reactor.orphans().clone());
        let mut raw = Vec::with_capacity(self.lines.len());
        for line in &mut self.lines {
            raw.push(line.read_raw()?);
        }
        for (index, line) in self.lines.iter().enumerate() {
            let fd = line.raw_fd().ok_or_else(|| LineError::Closed {
                line: line.name().to_owned(),
            })?;
            let watch = reactor
                .watch(fd, WatchClass::Urgent, self.device, index)
                .map_err(|source| LineError::Watch {
                    line: line.name().to_owned(),
                    source,
                })?;
            self.watches.push(watch);
        }
        Ok(raw)
    }

    /// Unregister every watch, then close every line.  Safe to repeat.
    pub fn tear_down(&mut self, reactor: &mut dyn Reactor) {
        for watch in self.watches.drain(..) {
            if let Err(e) = reactor.unwatch(watch) {
                warn!("{}: unwatch failed: {}", self.form_factor, e);
            }
        }
        for line in &mut self.lines {
            line.close();
        }
    }
}

impl Drop for LineGroup {
    fn drop(&mut self) {
        if self.watches.is_empty() {
            return;
        }
        warn!(
            "{}: dropped with {} lines still watched",
            self.form_factor,
            self.watches.len()
        );
        if let Some(orphans) = &self.orphans {
            orphans.park(mem::take(&mut self.watches), mem::take(&mut self.lines));
        }
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One constructed button device.
#[derive(Debug)]
pub enum ButtonDevice {
    Simple(SimpleButton),
    HostSelector(HostSelector),
    SerialUartMux(SerialUartMux),
}

impl ButtonDevice {
    fn spec(&self) -> &DeviceSpec {
        match self {
            Self::Simple(d) => d.spec(),
            Self::HostSelector(d) => d.spec(),
            Self::SerialUartMux(d) => d.spec(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.spec().id
    }

    pub fn kind(&self) -> ButtonKind {
        self.spec().kind
    }

    pub fn form_factor(&self) -> &str {
        &self.spec().form_factor
    }

    pub fn object_path(&self) -> &str {
        &self.spec().object_path
    }

    /// A watched line became readable.
    pub fn handle_ready(&mut self, line: usize, ctx: &mut DeviceContext<'_>) -> Option<ButtonEvent> {
        match self {
            Self::Simple(d) => d.handle_ready(line),
            Self::HostSelector(d) => d.handle_ready(line, ctx),
            Self::SerialUartMux(_) => None,
        }
    }

    /// A timer owned by this device expired.
    pub fn handle_timer(&mut self, id: TimerId, ctx: &mut DeviceContext<'_>) -> Option<ButtonEvent> {
        match self {
            Self::HostSelector(d) => d.handle_timer(id, ctx),
            _ => None,
        }
    }

    /// Cancel timers, unwatch, then close every line.
    pub fn tear_down(&mut self, reactor: &mut dyn Reactor) {
        match self {
            Self::Simple(d) => d.tear_down(reactor),
            Self::HostSelector(d) => d.tear_down(reactor),
            Self::SerialUartMux(d) => d.tear_down(reactor),
        }
    }

    pub fn as_host_selector_mut(&mut self) -> Option<&mut HostSelector> {
        match self {
            Self::HostSelector(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_serial_uart_mux_mut(&mut self) -> Option<&mut SerialUartMux> {
        match self {
            Self::SerialUartMux(d) => Some(d),
            _ => None,
        }
    }
}
