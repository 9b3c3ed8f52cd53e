//! Deadline-ordered timer queue.
//!
//! The event loop asks [`TimerQueue::next_deadline`] for its poll timeout
//! and calls [`TimerQueue::expire`] after every wake.  Timers never fire
//! before their deadline; periodic timers re-arm one period after the
//! deadline they just hit (skipping ahead if the loop fell behind).
//!
//! ```text
//!   arm(owner, now, 1000, periodic)
//!         │
//!         ▼
//!  ┌──────────────────────────────┐   next_deadline()   ┌────────────┐
//!  │ BTreeMap<(deadline, id), ..> │ ──────────────────▶ │ poll(tmo)  │
//!  └──────────────────────────────┘                     └─────┬──────┘
//!         ▲                                                   │
//!         └──────────── expire(now) ◀─────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::events::DeviceId;

// ═══════════════════════════════════════════════════════════════
//  Timer types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Who gets the wakeup when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOwner {
    /// The power escalation unit attached to a power device.
    Escalation(DeviceId),
    /// The device itself (host selector polling).
    Device(DeviceId),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    owner: TimerOwner,
    period_ms: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Queue
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct TimerQueue {
    by_deadline: BTreeMap<(u64, TimerId), Entry>,
    deadlines: HashMap<TimerId, u64>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer `after_ms` from `now_ms`.  A periodic timer keeps
    /// firing every `after_ms` until cancelled.
    pub fn arm(&mut self, owner: TimerOwner, now_ms: u64, after_ms: u64, periodic: bool) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = now_ms.saturating_add(after_ms);
        let period_ms = periodic.then_some(after_ms.max(1));
        self.by_deadline.insert((deadline, id), Entry { owner, period_ms });
        self.deadlines.insert(id, deadline);
        debug!("Timers: armed {:?} for {:?} at {} ms", id, owner, deadline);
        id
    }

    /// Returns `false` if the timer was not armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => {
                self.by_deadline.remove(&(deadline, id));
                debug!("Timers: cancelled {:?}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop every timer whose deadline is at or before `now_ms`, in
    /// deadline order, re-arming periodic ones.
    pub fn expire(&mut self, now_ms: u64, fired: &mut Vec<(TimerId, TimerOwner)>) {
        let mut rearm = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now_ms {
                break;
            }
            let e = entry.remove();
            self.deadlines.remove(&id);
            fired.push((id, e.owner));
            if let Some(period) = e.period_ms {
                let mut next = deadline + period;
                if next <= now_ms {
                    next = now_ms + period;
                }
                rearm.push((next, id, e));
            }
        }
        for (next, id, e) in rearm {
            self.by_deadline.insert((next, id), e);
            self.deadlines.insert(id, next);
        }
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
