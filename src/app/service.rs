//! Button service: the hexagonal core.
//!
//! [`ButtonService`] owns every constructed device, the power escalation
//! units and the host router.  All I/O flows through the [`StateBus`] it
//! owns and the [`Reactor`] passed in at each call, so the whole service
//! runs against mock adapters in tests.
//!
//! ```text
//!  Wakeup ──▶ device.handle_ready / handle_timer ──▶ EventQueue
//!                                                       │
//!   ┌───────────────────────────────────────────────────┘
//!   ▼
//!  Power          → signals + PowerUnit → HostRouter
//!  Reset / ID     → signals + router action on release
//!  Debug selector → HostSelector::advance
//!  PositionChanged→ SerialUartMux
//! ```

use log::{debug, error, info, warn};

use crate::app::ports::{Reactor, StateBus, Value};
use crate::app::router::HostRouter;
use crate::buttons::registry::Registry;
use crate::buttons::{ButtonDevice, ButtonKind, DeviceContext};
use crate::config::{ButtonConfig, DaemonConfig};
use crate::drivers::Lines;
use crate::error::{Error, Result};
use crate::event_loop::{EventLoop, Wakeup};
use crate::events::{ButtonEvent, DeviceEvent, DeviceId, EventQueue};
use crate::fsm::context::{EscalationCommands, PowerRequest};
use crate::fsm::policy::{PolicyRegistry, PowerUnit};
use crate::fsm::PowerOpState;
use crate::paths::{SIGNAL_PRESSED, SIGNAL_PRESSED_LONG, SIGNAL_PRESSED_LONGER, SIGNAL_RELEASED};
use crate::scheduler::{TimerId, TimerOwner};

// ───────────────────────────────────────────────────────────────
// ButtonService
// ───────────────────────────────────────────────────────────────

pub struct ButtonService<B: StateBus> {
    config: DaemonConfig,
    bus: B,
    router: HostRouter,
    policies: PolicyRegistry,
    /// Indexed by [`DeviceId`].
    devices: Vec<ButtonDevice>,
    /// One escalation unit per power device, keyed by device id.
    power: Vec<(DeviceId, PowerUnit)>,
    queue: EventQueue,
}

fn signal_for(event: ButtonEvent) -> Option<&'static str> {
    match event {
        ButtonEvent::Pressed => Some(SIGNAL_PRESSED),
        ButtonEvent::Released => Some(SIGNAL_RELEASED),
        ButtonEvent::LongPressed => Some(SIGNAL_PRESSED_LONG),
        ButtonEvent::LongerPressed => Some(SIGNAL_PRESSED_LONGER),
        ButtonEvent::PositionChanged(_) => None,
    }
}

impl<B: StateBus> ButtonService<B> {
    pub fn new(config: DaemonConfig, bus: B) -> Self {
        Self::with_policies(config, bus, PolicyRegistry::with_builtin())
    }

    /// Use a custom escalation policy table.
    pub fn with_policies(config: DaemonConfig, bus: B, policies: PolicyRegistry) -> Self {
        let router = HostRouter::new(&config);
        Self {
            config,
            bus,
            router,
            policies,
            devices: Vec::new(),
            power: Vec::new(),
            queue: EventQueue::new(),
        }
    }

    // ── Construction ──────────────────────────────────────────

    /// Build a device for every definition the registry knows.
    ///
    /// A definition that fails to build is logged and skipped; the others
    /// still come up.  Returns the number of devices created.
    pub fn create_devices(
        &mut self,
        configs: &[ButtonConfig],
        lines: &Lines,
        registry: &Registry,
        reactor: &mut dyn Reactor,
    ) -> usize {
        let mut created = 0;
        for config in configs {
            let id = self.devices.len();
            let mut ctx = DeviceContext {
                reactor: &mut *reactor,
                bus: &mut self.bus,
            };
            match registry.create(id, config, lines, &mut ctx) {
                Ok(Some(device)) => {
                    if device.kind() == ButtonKind::Power {
                        let unit = PowerUnit::new(id, &self.config, &self.policies);
                        info!(
                            "{}: escalation policy '{}'",
                            device.form_factor(),
                            unit.policy_name()
                        );
                        self.power.push((id, unit));
                    }
                    self.devices.push(device);
                    created += 1;
                }
                Ok(None) => {}
                Err(e) => error!("{}: not created: {}", config.form_factor, e),
            }
        }
        self.sync_serial_mux();
        reactor.reap();
        info!("Service: {} of {} buttons ready", created, configs.len());
        created
    }

    /// Push the current selector position into a freshly built mux.
    fn sync_serial_mux(&mut self) {
        let position = self
            .devices
            .iter_mut()
            .find_map(ButtonDevice::as_host_selector_mut)
            .map(|s| s.position());
        if let Some(position) = position {
            self.notify_serial_mux(position);
        }
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Handle one wakeup and everything it causes.  Returns `false` on
    /// shutdown.
    pub fn dispatch(&mut self, wakeup: Wakeup, reactor: &mut dyn Reactor) -> bool {
        let now = reactor.now_ms();
        match wakeup {
            Wakeup::Shutdown => return false,
            Wakeup::Ready { device, line } => {
                let mut ctx = DeviceContext {
                    reactor: &mut *reactor,
                    bus: &mut self.bus,
                };
                match self.devices.get_mut(device) {
                    Some(dev) => {
                        if let Some(event) = dev.handle_ready(line, &mut ctx) {
                            self.enqueue(device, event, now);
                        }
                    }
                    None => warn!("Service: readiness for unknown device {}", device),
                }
            }
            Wakeup::Timer { id, owner } => self.timer_fired(id, owner, now, reactor),
        }
        self.drain(reactor);
        reactor.reap();
        true
    }

    fn timer_fired(&mut self, id: TimerId, owner: TimerOwner, now: u64, reactor: &mut dyn Reactor) {
        match owner {
            TimerOwner::Escalation(device) => {
                let Some(unit) = self.power_unit(device) else {
                    debug!("Service: stale escalation timer for device {}", device);
                    return;
                };
                let cmds = unit.timer_fired(id, now);
                self.apply(device, cmds, reactor);
            }
            TimerOwner::Device(device) => {
                let mut ctx = DeviceContext {
                    reactor: &mut *reactor,
                    bus: &mut self.bus,
                };
                if let Some(event) = self
                    .devices
                    .get_mut(device)
                    .and_then(|d| d.handle_timer(id, &mut ctx))
                {
                    self.enqueue(device, event, now);
                }
            }
        }
    }

    fn enqueue(&mut self, device: DeviceId, event: ButtonEvent, at_ms: u64) {
        self.queue.push(DeviceEvent {
            device,
            event,
            at_ms,
        });
    }

    fn drain(&mut self, reactor: &mut dyn Reactor) {
        while let Some(ev) = self.queue.pop() {
            self.handle_event(ev, reactor);
        }
    }

    fn handle_event(&mut self, ev: DeviceEvent, reactor: &mut dyn Reactor) {
        let Some(device) = self.devices.get(ev.device) else {
            return;
        };
        let kind = device.kind();
        let path = device.object_path().to_owned();
        debug!("{}: {:?} at {} ms", device.form_factor(), ev.event, ev.at_ms);

        match (kind, ev.event) {
            (ButtonKind::Power, ButtonEvent::Pressed) => {
                self.signal(&path, kind, ButtonEvent::Pressed, &[]);
                let Some(unit) = self.power.iter_mut().find(|(id, _)| *id == ev.device).map(|(_, u)| u) else {
                    return;
                };
                let mut status = self.router.status(&path, &mut self.bus);
                let cmds = unit.pressed(ev.at_ms, &mut status);
                self.apply(ev.device, cmds, reactor);
            }
            (ButtonKind::Power, ButtonEvent::Released) => {
                let Some(unit) = self.power.iter_mut().find(|(id, _)| *id == ev.device).map(|(_, u)| u) else {
                    return;
                };
                let mut status = self.router.status(&path, &mut self.bus);
                let (press, cmds) = unit.released(ev.at_ms, &mut status);
                self.signal(&path, kind, press.event(), &[Value::U64(press.held_ms)]);
                self.apply(ev.device, cmds, reactor);
            }
            (ButtonKind::Reset, ButtonEvent::Released) => {
                self.signal(&path, kind, ButtonEvent::Released, &[]);
                self.route(PowerRequest::Reset, &path);
            }
            (ButtonKind::Id, ButtonEvent::Released) => {
                self.signal(&path, kind, ButtonEvent::Released, &[]);
                if let Err(e) = self.router.toggle_identify(&mut self.bus) {
                    error!("{}: identify toggle failed: {}", path, e);
                }
            }
            (ButtonKind::DebugHostSelector, ButtonEvent::Released) => {
                self.signal(&path, kind, ButtonEvent::Released, &[]);
                self.advance_selector();
            }
            (ButtonKind::HostSelector, ButtonEvent::PositionChanged(position)) => {
                self.notify_serial_mux(position);
            }
            (_, event) => self.signal(&path, kind, event, &[]),
        }
    }

    fn power_unit(&mut self, device: DeviceId) -> Option<&mut PowerUnit> {
        self.power
            .iter_mut()
            .find(|(id, _)| *id == device)
            .map(|(_, unit)| unit)
    }

    /// Arm or cancel the unit's timer, then issue each request.
    ///
    /// A failed request is logged; the escalation state has already moved.
    fn apply(&mut self, device: DeviceId, cmds: EscalationCommands, reactor: &mut dyn Reactor) {
        if let Some(unit) = self.power_unit(device) {
            unit.apply_timer(cmds.timer, reactor);
        }
        let Some(path) = self.devices.get(device).map(|d| d.object_path().to_owned()) else {
            return;
        };
        for request in cmds.requests {
            self.route(request, &path);
        }
    }

    fn route(&mut self, request: PowerRequest, path: &str) {
        match self.router.route(request, path, &mut self.bus) {
            Ok(outcome) => debug!("{}: {:?} -> {:?}", path, request, outcome),
            Err(e) => error!("{}: {:?} failed: {}", path, request, e),
        }
    }

    fn signal(&mut self, path: &str, kind: ButtonKind, event: ButtonEvent, args: &[Value]) {
        let Some(member) = signal_for(event) else {
            return;
        };
        if let Err(e) = self.bus.emit_signal(path, kind.interface(), member, args) {
            warn!("{}: {} signal failed: {}", path, member, e);
        }
    }

    /// Step the host selector, locally if we own it.
    fn advance_selector(&mut self) {
        let local = self
            .devices
            .iter_mut()
            .find_map(ButtonDevice::as_host_selector_mut);
        let position = match local {
            Some(selector) => match selector.advance(&mut self.bus) {
                Some(ButtonEvent::PositionChanged(p)) => Some(p),
                _ => None,
            },
            None => match self.router.advance_remote_selector(&mut self.bus) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Service: cannot advance host selector: {}", e);
                    None
                }
            },
        };
        if let Some(position) = position {
            self.notify_serial_mux(position);
        }
    }

    fn notify_serial_mux(&mut self, position: usize) {
        for mux in self
            .devices
            .iter_mut()
            .filter_map(ButtonDevice::as_serial_uart_mux_mut)
        {
            if let Err(e) = mux.on_position_changed(position) {
                error!("Service: serial mux update failed: {}", e);
            }
        }
    }

    // ── Loop ──────────────────────────────────────────────────

    /// Run until SIGTERM/SIGINT, then tear every device down.
    pub fn run(&mut self, event_loop: &mut EventLoop) -> Result<()> {
        let mut wakeups = Vec::new();
        loop {
            event_loop.wait(&mut wakeups).map_err(Error::EventLoop)?;
            for wakeup in wakeups.drain(..) {
                if !self.dispatch(wakeup, event_loop) {
                    info!("Service: shutting down");
                    self.shutdown(event_loop);
                    return Ok(());
                }
            }
        }
    }

    /// Cancel escalation timers and release every device.
    pub fn shutdown(&mut self, reactor: &mut dyn Reactor) {
        for (_, unit) in &mut self.power {
            unit.stop(reactor);
        }
        for device in &mut self.devices {
            device.tear_down(reactor);
        }
        self.devices.clear();
        self.power.clear();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device(&self, id: DeviceId) -> Option<&ButtonDevice> {
        self.devices.get(id)
    }

    /// Device id of the first device with `form_factor`.
    pub fn find(&self, form_factor: &str) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.form_factor() == form_factor)
    }

    /// Escalation state of a power device.
    pub fn power_state(&self, device: DeviceId) -> Option<PowerOpState> {
        self.power
            .iter()
            .find(|(id, _)| *id == device)
            .map(|(_, unit)| unit.state())
    }

    pub fn escalation_timer(&self, device: DeviceId) -> Option<TimerId> {
        self.power
            .iter()
            .find(|(id, _)| *id == device)
            .and_then(|(_, unit)| unit.timer())
    }

    pub fn host_selector_position(&self) -> Option<usize> {
        self.devices.iter().find_map(|d| match d {
            ButtonDevice::HostSelector(s) => Some(s.position()),
            _ => None,
        })
    }
}
