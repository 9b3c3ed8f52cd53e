//! Power button escalation policies and the per-device power unit.
//!
//! A [`PowerUnit`] sits behind every power device:
//!
//! ```text
//!  Pressed/Released edge ──▶ PressClassifier ──▶ Press{class, held_ms}
//!                                  │
//!                                  ▼
//!                      Box<dyn EscalationPolicy> ──▶ EscalationCommands
//!                                                     (requests + timer)
//! ```
//!
//! | Profile                        | Short hold      | Long hold             |
//! |--------------------------------|-----------------|-----------------------|
//! | (default)                      | toggle host     | chassis off if on     |
//! | `host_then_chassis_poweroff`   | host on if off  | host off, then chassis|

use log::{error, info, warn};

use super::context::{
    EscalationCommands, EscalationContext, EscalationTiming, PowerRequest, TimerCommand,
};
use super::{Fsm, PowerOpState, Trigger, states};
use crate::app::ports::{PowerStatus, Reactor};
use crate::config::DaemonConfig;
use crate::events::{ButtonEvent, DeviceId};
use crate::scheduler::{TimerId, TimerOwner};

pub const HOST_THEN_CHASSIS_POWEROFF: &str = "host_then_chassis_poweroff";

// ═══════════════════════════════════════════════════════════════
//  Press classification
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressClass {
    Short,
    Long,
    Longer,
}

/// A completed press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Press {
    pub class: PressClass,
    pub held_ms: u64,
}

impl Press {
    /// The event a release of this length publishes.
    pub fn event(self) -> ButtonEvent {
        match self.class {
            PressClass::Short => ButtonEvent::Released,
            PressClass::Long => ButtonEvent::LongPressed,
            PressClass::Longer => ButtonEvent::LongerPressed,
        }
    }
}

/// Records press time and classifies the hold on release.
#[derive(Debug, Clone)]
pub struct PressClassifier {
    long_ms: u64,
    longer_ms: Option<u64>,
    pressed_at: Option<u64>,
}

impl PressClassifier {
    pub fn new(long_ms: u64, longer_ms: Option<u64>) -> Self {
        Self {
            long_ms,
            longer_ms,
            pressed_at: None,
        }
    }

    pub fn from_config(cfg: &DaemonConfig) -> Self {
        Self::new(
            cfg.long_press_ms,
            cfg.longer_press_enabled.then_some(cfg.longer_press_ms),
        )
    }

    pub fn classify(&self, held_ms: u64) -> PressClass {
        if held_ms < self.long_ms {
            return PressClass::Short;
        }
        match self.longer_ms {
            Some(longer) if held_ms >= longer => PressClass::Longer,
            _ => PressClass::Long,
        }
    }

    pub fn pressed(&mut self, now_ms: u64) {
        self.pressed_at = Some(now_ms);
    }

    /// A release without a recorded press counts as a zero-length press.
    pub fn released(&mut self, now_ms: u64) -> Press {
        let held_ms = self
            .pressed_at
            .take()
            .map_or(0, |at| now_ms.saturating_sub(at));
        Press {
            class: self.classify(held_ms),
            held_ms,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Policy trait
// ═══════════════════════════════════════════════════════════════

/// Turns power button activity into power requests.
pub trait EscalationPolicy {
    fn name(&self) -> &'static str;

    fn state(&self) -> PowerOpState;

    fn pressed(&mut self, now_ms: u64, status: &mut dyn PowerStatus) -> EscalationCommands;

    fn released(
        &mut self,
        now_ms: u64,
        press: Press,
        status: &mut dyn PowerStatus,
    ) -> EscalationCommands;

    fn timer_fired(&mut self, now_ms: u64) -> EscalationCommands;
}

// ── Default: act on release ─────────────────────────────────

/// Release-time policy: the hold length alone picks the request.
#[derive(Debug, Default)]
pub struct ShortPressPolicy {
    state: PowerOpState,
}

impl EscalationPolicy for ShortPressPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn state(&self) -> PowerOpState {
        self.state
    }

    fn pressed(&mut self, _now_ms: u64, _status: &mut dyn PowerStatus) -> EscalationCommands {
        self.state = PowerOpState::PressedWaitingEscalation;
        EscalationCommands::default()
    }

    fn released(
        &mut self,
        _now_ms: u64,
        press: Press,
        _status: &mut dyn PowerStatus,
    ) -> EscalationCommands {
        self.state = PowerOpState::Idle;
        let mut out = EscalationCommands::default();
        out.request(match press.class {
            PressClass::Short => PowerRequest::Toggle,
            PressClass::Long => PowerRequest::LongPress,
            PressClass::Longer => PowerRequest::LongerPress,
        });
        out
    }

    fn timer_fired(&mut self, _now_ms: u64) -> EscalationCommands {
        EscalationCommands::default()
    }
}

// ── Host, then chassis ──────────────────────────────────────

/// Hold to power the host off, keep holding (or press again) to cut
/// chassis power.
pub struct HostThenChassisPolicy {
    fsm: Fsm,
    ctx: EscalationContext,
}

impl HostThenChassisPolicy {
    pub fn new(timing: EscalationTiming) -> Self {
        let mut fsm = Fsm::new(states::build_state_table(), PowerOpState::Idle);
        let mut ctx = EscalationContext::new(timing);
        fsm.start(&mut ctx);
        Self { fsm, ctx }
    }

    fn run(&mut self, trigger: Trigger, now_ms: u64) -> EscalationCommands {
        self.ctx.begin(now_ms);
        self.fsm.handle(trigger, &mut self.ctx);
        self.ctx.take_commands()
    }
}

impl EscalationPolicy for HostThenChassisPolicy {
    fn name(&self) -> &'static str {
        HOST_THEN_CHASSIS_POWEROFF
    }

    fn state(&self) -> PowerOpState {
        self.fsm.current_state()
    }

    fn pressed(&mut self, now_ms: u64, status: &mut dyn PowerStatus) -> EscalationCommands {
        let on = match status.is_chassis_on() {
            Ok(on) => on,
            Err(e) => {
                error!("Escalation: cannot read chassis power, ignoring press: {}", e);
                return EscalationCommands::default();
            }
        };
        if !on {
            match status.is_bmc_ready() {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Escalation: BMC not ready, cannot power on");
                    return EscalationCommands::default();
                }
                Err(e) => {
                    error!("Escalation: cannot read BMC state, ignoring press: {}", e);
                    return EscalationCommands::default();
                }
            }
        }
        self.ctx.chassis_on = on;
        self.run(Trigger::Pressed, now_ms)
    }

    fn released(
        &mut self,
        now_ms: u64,
        _press: Press,
        _status: &mut dyn PowerStatus,
    ) -> EscalationCommands {
        self.run(Trigger::Released, now_ms)
    }

    fn timer_fired(&mut self, now_ms: u64) -> EscalationCommands {
        self.run(Trigger::TimerFired, now_ms)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Policy registry
// ═══════════════════════════════════════════════════════════════

pub type PolicyCtor = fn(&DaemonConfig) -> Box<dyn EscalationPolicy>;

fn host_then_chassis(cfg: &DaemonConfig) -> Box<dyn EscalationPolicy> {
    Box::new(HostThenChassisPolicy::new(EscalationTiming::from(cfg)))
}

/// Profile name → policy constructor.
pub struct PolicyRegistry {
    entries: Vec<(&'static str, PolicyCtor)>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register(HOST_THEN_CHASSIS_POWEROFF, host_then_chassis);
        reg
    }

    pub fn register(&mut self, name: &'static str, ctor: PolicyCtor) {
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, ctor));
    }

    /// Build the configured profile; empty or unknown names get the default.
    pub fn create(&self, cfg: &DaemonConfig) -> Box<dyn EscalationPolicy> {
        let name = cfg.power_button_profile.as_str();
        if let Some((_, ctor)) = self.entries.iter().find(|(n, _)| *n == name) {
            info!("Escalation: using '{}' profile", name);
            return ctor(cfg);
        }
        if !name.is_empty() {
            warn!("Escalation: unknown profile '{}', using default", name);
        }
        Box::new(ShortPressPolicy::default())
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Power unit
// ═══════════════════════════════════════════════════════════════

/// Classifier, policy and poll timer for one power device.
pub struct PowerUnit {
    device: DeviceId,
    classifier: PressClassifier,
    policy: Box<dyn EscalationPolicy>,
    timer: Option<TimerId>,
}

impl PowerUnit {
    pub fn new(device: DeviceId, cfg: &DaemonConfig, registry: &PolicyRegistry) -> Self {
        Self {
            device,
            classifier: PressClassifier::from_config(cfg),
            policy: registry.create(cfg),
            timer: None,
        }
    }

    pub fn state(&self) -> PowerOpState {
        self.policy.state()
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    pub fn pressed(&mut self, now_ms: u64, status: &mut dyn PowerStatus) -> EscalationCommands {
        self.classifier.pressed(now_ms);
        self.policy.pressed(now_ms, status)
    }

    /// Classify the hold, then let the policy react.
    pub fn released(
        &mut self,
        now_ms: u64,
        status: &mut dyn PowerStatus,
    ) -> (Press, EscalationCommands) {
        let press = self.classifier.released(now_ms);
        let cmds = self.policy.released(now_ms, press, status);
        (press, cmds)
    }

    /// Stale wakeups from a timer already replaced are ignored.
    pub fn timer_fired(&mut self, id: TimerId, now_ms: u64) -> EscalationCommands {
        if self.timer != Some(id) {
            return EscalationCommands::default();
        }
        self.policy.timer_fired(now_ms)
    }

    /// Apply a timer command against the reactor.
    pub fn apply_timer(&mut self, cmd: TimerCommand, reactor: &mut dyn Reactor) {
        match cmd {
            TimerCommand::Keep => {}
            TimerCommand::Restart { interval_ms } => {
                if let Some(old) = self.timer.take() {
                    reactor.cancel_timer(old);
                }
                self.timer = Some(reactor.arm_timer(
                    TimerOwner::Escalation(self.device),
                    interval_ms,
                    true,
                ));
            }
            TimerCommand::Disable => {
                if let Some(old) = self.timer.take() {
                    reactor.cancel_timer(old);
                }
            }
        }
        if self.policy.state() == PowerOpState::Idle {
            if let Some(old) = self.timer.take() {
                warn!("Escalation: timer still armed in Idle, cancelling");
                reactor.cancel_timer(old);
            }
        }
    }

    /// Drop any armed timer, e.g. on shutdown.
    pub fn stop(&mut self, reactor: &mut dyn Reactor) {
        if let Some(old) = self.timer.take() {
            reactor.cancel_timer(old);
        }
    }
}
