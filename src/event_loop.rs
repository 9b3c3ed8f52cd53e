//! Single-threaded reactor: epoll readiness, timers, and shutdown signals.
//!
//! ```text
//!               ┌──────────────── mio::Poll ────────────────┐
//!  value fds ──▶│ Token(n) ──▶ (device, line)  EPOLLPRI|ET  │
//!  SIGTERM   ──▶│ Token(0) ──▶ Shutdown                     │
//!               └───────────────────┬───────────────────────┘
//!                                   │ timeout = next timer deadline
//!                                   ▼
//!                           Vec<Wakeup> ──▶ ButtonService::dispatch
//! ```
//!
//! Sysfs value files report edges as urgent data, so line watches use
//! `Interest::PRIORITY`.  Registration is edge-triggered: a device must
//! re-read (from offset 0) after each wake to re-arm the notification.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;

use crate::app::ports::{Orphans, Reactor, WatchClass, WatchId};
use crate::events::DeviceId;
use crate::scheduler::{TimerId, TimerOwner, TimerQueue};

const SIGNAL_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 64;

/// One reason the loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A watched line has a pending edge.
    Ready { device: DeviceId, line: usize },
    /// A timer reached its deadline.
    Timer { id: TimerId, owner: TimerOwner },
    /// SIGTERM or SIGINT arrived.
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    fd: RawFd,
    device: DeviceId,
    line: usize,
}

pub struct EventLoop {
    poll: Poll,
    events: Events,
    watches: HashMap<Token, Watch>,
    next_token: usize,
    timers: TimerQueue,
    started: Instant,
    signals: Option<Signals>,
    orphans: Orphans,
}

fn interest(class: WatchClass) -> Interest {
    match class {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        WatchClass::Urgent => Interest::PRIORITY,
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        WatchClass::Urgent => Interest::READABLE,
        WatchClass::Readable => Interest::READABLE,
    }
}

impl EventLoop {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            watches: HashMap::new(),
            next_token: SIGNAL_TOKEN.0 + 1,
            timers: TimerQueue::new(),
            started: Instant::now(),
            signals: None,
            orphans: Orphans::default(),
        })
    }

    /// Route SIGTERM and SIGINT into the loop as [`Wakeup::Shutdown`].
    pub fn with_shutdown_signals(mut self) -> io::Result<Self> {
        let mut signals = Signals::new([SIGTERM, SIGINT])?;
        self.poll
            .registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        self.signals = Some(signals);
        Ok(self)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Block until something is ready or the next timer is due.
    ///
    /// Readiness is appended first, in the order the kernel reported it,
    /// then expired timers in deadline order.
    pub fn wait(&mut self, out: &mut Vec<Wakeup>) -> io::Result<()> {
        self.reap();
        let timeout = self.timers.next_deadline().map(|deadline| {
            let due = self.started + Duration::from_millis(deadline);
            due.saturating_duration_since(Instant::now())
        });

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        for event in &self.events {
            let token = event.token();
            if token == SIGNAL_TOKEN {
                if let Some(signals) = self.signals.as_mut() {
                    for sig in signals.pending() {
                        info!("EventLoop: received signal {}", sig);
                        out.push(Wakeup::Shutdown);
                    }
                }
                continue;
            }
            match self.watches.get(&token) {
                Some(w) => out.push(Wakeup::Ready {
                    device: w.device,
                    line: w.line,
                }),
                None => debug!("EventLoop: event for stale token {:?}", token),
            }
        }

        let mut fired = Vec::new();
        let now = self.now_ms();
        self.timers.expire(now, &mut fired);
        out.extend(
            fired
                .into_iter()
                .map(|(id, owner)| Wakeup::Timer { id, owner }),
        );
        Ok(())
    }
}

impl Reactor for EventLoop {
    fn watch(
        &mut self,
        fd: RawFd,
        class: WatchClass,
        device: DeviceId,
        line: usize,
    ) -> io::Result<WatchId> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, interest(class))?;
        self.watches.insert(token, Watch { fd, device, line });
        debug!(
            "EventLoop: watching fd {} as {:?} for device {} line {}",
            fd, token, device, line
        );
        Ok(WatchId(token.0))
    }

    fn unwatch(&mut self, watch: WatchId) -> io::Result<()> {
        let token = Token(watch.0);
        let Some(w) = self.watches.remove(&token) else {
            warn!("EventLoop: unwatch of unknown {:?}", token);
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown watch"));
        };
        self.poll.registry().deregister(&mut SourceFd(&w.fd))
    }

    fn arm_timer(&mut self, owner: TimerOwner, after_ms: u64, periodic: bool) -> TimerId {
        let now = self.now_ms();
        self.timers.arm(owner, now, after_ms, periodic)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn orphans(&self) -> &Orphans {
        &self.orphans
    }
}
