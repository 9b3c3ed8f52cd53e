//! Port traits: the hexagonal boundary between button logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ButtonService (domain)
//! ```
//!
//! Driven adapters (the state bus, the epoll reactor) implement these
//! traits.  The [`ButtonService`](super::service::ButtonService) and the
//! devices consume them as trait objects, so tests swap in recording fakes.

use std::cell::RefCell;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;

use log::warn;

use crate::drivers::line::LineHandle;
use crate::error::BusError;
use crate::events::DeviceId;
use crate::scheduler::{TimerId, TimerOwner};

// ───────────────────────────────────────────────────────────────
// State bus port (domain ↔ system state management)
// ───────────────────────────────────────────────────────────────

/// Property and signal argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    U64(u64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Synchronous request/response access to the system state bus, plus
/// the daemon's own published objects.
pub trait StateBus {
    /// Name of the service hosting `interface` at `path`.
    fn get_service(&mut self, path: &str, interface: &str) -> Result<String, BusError>;

    fn get_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Value, BusError>;

    fn set_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError>;

    /// Expose one of our own objects.
    fn add_object(&mut self, path: &str, interface: &str) -> Result<(), BusError>;

    /// Update a property on one of our own objects and announce the change.
    fn publish(&mut self, path: &str, interface: &str, name: &str, value: Value)
    -> Result<(), BusError>;

    fn emit_signal(
        &mut self,
        path: &str,
        interface: &str,
        member: &str,
        args: &[Value],
    ) -> Result<(), BusError>;
}

// ───────────────────────────────────────────────────────────────
// Power status port (escalation policies → host routing)
// ───────────────────────────────────────────────────────────────

/// Queries an escalation policy may make while deciding.
pub trait PowerStatus {
    /// Whether the targeted chassis reports power on.
    fn is_chassis_on(&mut self) -> Result<bool, BusError>;

    /// Whether the BMC has reached its ready state.
    fn is_bmc_ready(&mut self) -> Result<bool, BusError>;
}

// ───────────────────────────────────────────────────────────────
// Reactor port (devices ↔ event loop)
// ───────────────────────────────────────────────────────────────

/// Handle for one watched descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub usize);

/// Which readiness a watched descriptor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchClass {
    /// Urgent/exceptional data: sysfs value files signal edges this way.
    Urgent,
    /// Plain readability (pipes, sockets).
    Readable,
}

/// Registrations whose owner was dropped while still watched.
#[derive(Debug)]
pub struct Orphan {
    pub watches: Vec<WatchId>,
    /// Kept open until every watch above is gone.
    pub lines: Vec<LineHandle>,
}

/// Parking lot shared between a reactor and the line groups it watches.
///
/// A line group dropped without tearing down parks its watches and its
/// still-open lines here; [`Reactor::reap`] unwatches them, then closes.
#[derive(Debug, Clone, Default)]
pub struct Orphans(Rc<RefCell<Vec<Orphan>>>);

impl Orphans {
    pub fn park(&self, watches: Vec<WatchId>, lines: Vec<LineHandle>) {
        self.0.borrow_mut().push(Orphan { watches, lines });
    }

    pub fn take(&self) -> Vec<Orphan> {
        mem::take(&mut *self.0.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Readiness registration and timers, as seen by devices and the service.
pub trait Reactor {
    /// Watch `fd`; readiness is reported as `(device, line)`.
    fn watch(
        &mut self,
        fd: RawFd,
        class: WatchClass,
        device: DeviceId,
        line: usize,
    ) -> io::Result<WatchId>;

    /// Stop watching.  Must be called before the descriptor is closed.
    fn unwatch(&mut self, watch: WatchId) -> io::Result<()>;

    fn arm_timer(&mut self, owner: TimerOwner, after_ms: u64, periodic: bool) -> TimerId;

    fn cancel_timer(&mut self, id: TimerId) -> bool;

    /// Monotonic milliseconds since the loop started.
    fn now_ms(&self) -> u64;

    fn orphans(&self) -> &Orphans;

    /// Unwatch every parked registration, then close its lines.  Returns
    /// the number of watches released.
    fn reap(&mut self) -> usize {
        let mut released = 0;
        for orphan in self.orphans().take() {
            for watch in orphan.watches {
                match self.unwatch(watch) {
                    Ok(()) => released += 1,
                    Err(e) => warn!("Reactor: unwatch of orphaned {:?}: {}", watch, e),
                }
            }
            drop(orphan.lines);
        }
        released
    }
}
