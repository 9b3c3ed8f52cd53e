//! Button events and the in-process dispatch queue.
//!
//! Events are produced by:
//! - line readiness (a device re-reads its value file)
//! - device timers (host selector polling)
//! - software (the debug selector advancing the host selector)
//!
//! Events are consumed by the service, one at a time in FIFO order,
//! within the same loop iteration that produced them.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Line ready  │────▶│              │     │                  │
//! │ Device timer│────▶│  EventQueue  │────▶│  ButtonService   │
//! │ Software    │────▶│  (bounded)   │     │  (consumer)      │
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```

use heapless::Deque;
use log::warn;

/// Maximum number of pending events.
const EVENT_QUEUE_CAP: usize = 32;

/// Index of a device in the service's device table.
pub type DeviceId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Line went to its asserted level.
    Pressed,
    /// Line went back to its deasserted level.
    Released,
    /// Released after the long-press threshold.
    LongPressed,
    /// Released after the longer-press threshold.
    LongerPressed,
    /// A selector published a new position.
    PositionChanged(usize),
}

/// An event tagged with its source device and loop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device: DeviceId,
    pub event: ButtonEvent,
    pub at_ms: u64,
}

/// Bounded FIFO; events beyond capacity are dropped with a warning.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Deque<DeviceEvent, EVENT_QUEUE_CAP>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { inner: Deque::new() }
    }

    /// Returns `false` if the queue is full (event dropped).
    pub fn push(&mut self, event: DeviceEvent) -> bool {
        if self.inner.push_back(event).is_err() {
            warn!("Events: queue full, dropping {:?}", event);
            return false;
        }
        true
    }

    pub fn pop(&mut self) -> Option<DeviceEvent> {
        self.inner.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
