//! Shared mutable context threaded through every escalation handler.
//!
//! `EscalationContext` is the blackboard state handlers read from and
//! write to: loop time, the power status sampled for this press, the
//! escalation deadlines, and the commands the service applies afterwards.

use log::warn;

use crate::config::DaemonConfig;

// ---------------------------------------------------------------------------
// Outbound power requests
// ---------------------------------------------------------------------------

/// A power action, before it is resolved to a concrete host or chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequest {
    /// Short press: toggle the host between on and off.
    Toggle,
    /// Long press: chassis off, only if the host is running.
    LongPress,
    /// Longer press: power-cycle the chassis.
    LongerPress,
    /// Reset button released.
    Reset,
    HostOn,
    HostOff,
    /// Escalated chassis off, issued regardless of host state.
    ChassisOff,
}

impl PowerRequest {
    /// Short-class requests act on a host; the rest act on a chassis.
    pub fn is_short(self) -> bool {
        matches!(
            self,
            Self::Toggle | Self::Reset | Self::HostOn | Self::HostOff
        )
    }
}

// ---------------------------------------------------------------------------
// Commands (written by handlers; applied by the service)
// ---------------------------------------------------------------------------

/// What to do with the escalation poll timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerCommand {
    #[default]
    Keep,
    /// (Re)arm as a periodic timer.
    Restart { interval_ms: u64 },
    Disable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationCommands {
    pub requests: heapless::Vec<PowerRequest, 4>,
    pub timer: TimerCommand,
}

impl EscalationCommands {
    pub fn request(&mut self, request: PowerRequest) {
        if self.requests.push(request).is_err() {
            warn!("Escalation: too many requests in one step, dropping {:?}", request);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.timer == TimerCommand::Keep
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTiming {
    /// Hold time after which the host is asked to power off.
    pub host_off_after_ms: u64,
    /// Window after host-off at which the chassis is powered off.
    pub chassis_off_after_ms: u64,
    /// Poll timer period while a press is in progress.
    pub poll_ms: u64,
}

impl From<&DaemonConfig> for EscalationTiming {
    fn from(cfg: &DaemonConfig) -> Self {
        Self {
            host_off_after_ms: cfg.host_off_after_ms,
            chassis_off_after_ms: cfg.chassis_off_after_ms,
            poll_ms: cfg.escalation_poll_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// EscalationContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EscalationContext {
    pub timing: EscalationTiming,
    /// Loop time of the trigger being handled.
    pub now_ms: u64,
    /// Chassis power sampled on press.
    pub chassis_on: bool,
    /// When to issue host-off, set on entering the press window.
    pub host_off_at: Option<u64>,
    /// When to issue chassis-off, set once host-off has gone out.
    pub chassis_off_at: Option<u64>,
    pub commands: EscalationCommands,
}

impl EscalationContext {
    pub fn new(timing: EscalationTiming) -> Self {
        Self {
            timing,
            now_ms: 0,
            chassis_on: false,
            host_off_at: None,
            chassis_off_at: None,
            commands: EscalationCommands::default(),
        }
    }

    /// Prepare for a new trigger at `now_ms`.
    pub fn begin(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.commands = EscalationCommands::default();
    }

    pub fn take_commands(&mut self) -> EscalationCommands {
        core::mem::take(&mut self.commands)
    }

    pub fn deadline_passed(&self, deadline: Option<u64>) -> bool {
        deadline.is_some_and(|d| self.now_ms >= d)
    }
}
