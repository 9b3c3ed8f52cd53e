//! Mock adapters for integration tests.
//!
//! [`MockBus`] wraps the in-process bus, seeds the state objects another
//! service would normally host, and can be told to fail every property
//! write.  [`FakeReactor`] is a reactor with a hand-driven clock.

use std::io;
use std::os::fd::RawFd;

use bmc_buttons::adapters::local_bus::LocalBus;
use bmc_buttons::app::ports::{Orphans, Reactor, StateBus, Value, WatchClass, WatchId};
use bmc_buttons::event_loop::Wakeup;
use bmc_buttons::events::DeviceId;
use bmc_buttons::paths::{
    self, BMC_READY, BMC_STATE_IFACE, BMC_STATE_OBJECT, CHASSIS_POWER_ON, CHASSIS_STATE_BASE,
    CHASSIS_STATE_IFACE, CHASSIS_SYSTEM_BASE, CURRENT_BMC_STATE, CURRENT_HOST_STATE,
    CURRENT_POWER_STATE, HOST_STATE_BASE, HOST_STATE_IFACE, HOST_STATE_OFF, LED_ASSERTED_PROP,
    LED_GROUP_IFACE, LED_GROUPS_BASE, REQUESTED_HOST_TRANSITION, REQUESTED_POWER_TRANSITION,
    SERVICE_NAME,
};
use bmc_buttons::scheduler::{TimerId, TimerOwner, TimerQueue};
use bmc_buttons::BusError;

pub const HOST_RUNNING: &str = "xyz.openbmc_project.State.Host.HostState.Running";
pub const CHASSIS_POWER_OFF: &str = "xyz.openbmc_project.State.Chassis.PowerState.Off";
pub const ID_LED: &str = "/xyz/openbmc_project/led/groups/enclosure_identify";

const HOST_SERVICE: &str = "xyz.openbmc_project.State.Host";
const CHASSIS_SERVICE: &str = "xyz.openbmc_project.State.Chassis";
const BMC_SERVICE: &str = "xyz.openbmc_project.State.BMC";
const LED_SERVICE: &str = "xyz.openbmc_project.LED.GroupManager";

// ── MockBus ───────────────────────────────────────────────────

pub struct MockBus {
    pub inner: LocalBus,
    /// Reject every `set_property`.
    pub fail_sets: bool,
    /// `(path, value)` of every rejected write.
    pub failed: Vec<(String, String)>,
}

#[allow(dead_code)]
impl MockBus {
    /// BMC ready, LED group present, no hosts.
    pub fn new() -> Self {
        let mut inner = LocalBus::new(SERVICE_NAME);
        inner.host_object(
            BMC_SERVICE,
            BMC_STATE_OBJECT,
            BMC_STATE_IFACE,
            [(CURRENT_BMC_STATE, Value::Str(BMC_READY.into()))],
        );
        inner.host_object(
            LED_SERVICE,
            ID_LED,
            LED_GROUP_IFACE,
            [(LED_ASSERTED_PROP, Value::Bool(false))],
        );
        Self {
            inner,
            fail_sets: false,
            failed: Vec::new(),
        }
    }

    /// Hosts `0..count`, each powered `on` or off, plus their chassis.
    pub fn with_hosts(count: usize, on: bool) -> Self {
        let mut bus = Self::new();
        for host in 0..count {
            bus.add_host(host, on);
        }
        bus
    }

    pub fn add_host(&mut self, host: usize, on: bool) {
        let host_state = if on { HOST_RUNNING } else { HOST_STATE_OFF };
        let power = if on { CHASSIS_POWER_ON } else { CHASSIS_POWER_OFF };
        self.inner.host_object(
            HOST_SERVICE,
            &paths::indexed(HOST_STATE_BASE, host),
            HOST_STATE_IFACE,
            [
                (CURRENT_HOST_STATE, Value::Str(host_state.into())),
                (REQUESTED_HOST_TRANSITION, Value::Str(String::new())),
            ],
        );
        self.inner.host_object(
            CHASSIS_SERVICE,
            &paths::indexed(CHASSIS_STATE_BASE, host),
            CHASSIS_STATE_IFACE,
            [
                (CURRENT_POWER_STATE, Value::Str(power.into())),
                (REQUESTED_POWER_TRANSITION, Value::Str(String::new())),
            ],
        );
        self.inner.host_object(
            CHASSIS_SERVICE,
            &paths::indexed(CHASSIS_SYSTEM_BASE, host),
            CHASSIS_STATE_IFACE,
            [(REQUESTED_POWER_TRANSITION, Value::Str(String::new()))],
        );
    }

    /// Every transition request written so far, as `(path, value)`.
    pub fn transitions(&self) -> Vec<(String, String)> {
        self.inner
            .writes()
            .iter()
            .filter(|w| w.name == REQUESTED_HOST_TRANSITION || w.name == REQUESTED_POWER_TRANSITION)
            .map(|w| (w.path.clone(), w.value.as_str().unwrap_or_default().to_owned()))
            .collect()
    }

    /// Number of `member` signals emitted from `path`.
    pub fn signal_count(&self, path: &str, member: &str) -> usize {
        self.inner
            .signals()
            .iter()
            .filter(|s| s.path == path && s.member == member)
            .count()
    }

    pub fn signal_args(&self, path: &str, member: &str) -> Vec<Vec<Value>> {
        self.inner
            .signals()
            .iter()
            .filter(|s| s.path == path && s.member == member)
            .map(|s| s.args.clone())
            .collect()
    }

    pub fn led_asserted(&self) -> Option<bool> {
        self.inner
            .property(ID_LED, LED_GROUP_IFACE, LED_ASSERTED_PROP)
            .and_then(Value::as_bool)
    }
}

impl StateBus for MockBus {
    fn get_service(&mut self, path: &str, interface: &str) -> Result<String, BusError> {
        self.inner.get_service(path, interface)
    }

    fn get_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Value, BusError> {
        self.inner.get_property(service, path, interface, name)
    }

    fn set_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError> {
        if self.fail_sets {
            self.failed
                .push((path.to_owned(), value.as_str().unwrap_or_default().to_owned()));
            return Err(BusError::Call("injected failure".into()));
        }
        self.inner.set_property(service, path, interface, name, value)
    }

    fn add_object(&mut self, path: &str, interface: &str) -> Result<(), BusError> {
        self.inner.add_object(path, interface)
    }

    fn publish(&mut self, path: &str, interface: &str, name: &str, value: Value) -> Result<(), BusError> {
        self.inner.publish(path, interface, name, value)
    }

    fn emit_signal(
        &mut self,
        path: &str,
        interface: &str,
        member: &str,
        args: &[Value],
    ) -> Result<(), BusError> {
        self.inner.emit_signal(path, interface, member, args)
    }
}

// ── FakeReactor ───────────────────────────────────────────────

/// Reactor whose clock only moves when a test says so.
pub struct FakeReactor {
    now: u64,
    timers: TimerQueue,
    watches: Vec<(WatchId, DeviceId, usize)>,
    next_watch: usize,
    orphans: Orphans,
}

#[allow(dead_code)]
impl FakeReactor {
    pub fn new() -> Self {
        Self {
            now: 0,
            timers: TimerQueue::new(),
            watches: Vec::new(),
            next_watch: 0,
            orphans: Orphans::default(),
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn is_watched(&self, device: DeviceId, line: usize) -> bool {
        self.watches.iter().any(|(_, d, l)| *d == device && *l == line)
    }

    /// Move the clock to the earliest deadline at or before `to_ms` and
    /// return the timers that fire there; `None` once none remain.
    pub fn step_until(&mut self, to_ms: u64) -> Option<Vec<Wakeup>> {
        match self.timers.next_deadline() {
            Some(deadline) if deadline <= to_ms => {
                self.now = self.now.max(deadline);
                let mut fired = Vec::new();
                self.timers.expire(self.now, &mut fired);
                Some(
                    fired
                        .into_iter()
                        .map(|(id, owner)| Wakeup::Timer { id, owner })
                        .collect(),
                )
            }
            _ => {
                self.now = self.now.max(to_ms);
                None
            }
        }
    }
}

impl Reactor for FakeReactor {
    fn watch(&mut self, _fd: RawFd, _class: WatchClass, device: DeviceId, line: usize) -> io::Result<WatchId> {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        self.watches.push((id, device, line));
        Ok(id)
    }

    fn unwatch(&mut self, watch: WatchId) -> io::Result<()> {
        let before = self.watches.len();
        self.watches.retain(|(id, _, _)| *id != watch);
        if self.watches.len() == before {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(())
    }

    fn arm_timer(&mut self, owner: TimerOwner, after_ms: u64, periodic: bool) -> TimerId {
        self.timers.arm(owner, self.now, after_ms, periodic)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    fn now_ms(&self) -> u64 {
        self.now
    }

    fn orphans(&self) -> &Orphans {
        &self.orphans
    }
}
