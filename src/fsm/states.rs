//! Host-then-chassis power-off escalation: state handlers and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch.  Chassis power is sampled before every `Pressed` trigger; if
//! it is off, any press becomes a host power-on and the machine resets.
//!
//! ```text
//!  IDLE ──[press]──▶ PRESSED ──[t ≥ host_off_at]──▶ HOST_OFF_ISSUED
//!   ▲                   │                               │       │
//!   └────[release]──────┘                   [release]   │  [t ≥ chassis_off_at]
//!   ▲                                                   ▼       ▼
//!   ├──[t ≥ chassis_off_at]── RELEASED_IN_WINDOW ──[press]──▶ CHASSIS_OFF_ISSUED
//!   └───────────────────────────────[release]───────────────────┘
//! ```

use super::context::{EscalationContext, PowerRequest, TimerCommand};
use super::{PowerOpState, StateDescriptor};
use log::info;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Called once per power device.
pub fn build_state_table() -> [StateDescriptor; PowerOpState::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: PowerOpState::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_pressed: idle_pressed,
            on_released: ignore,
            on_timer: ignore,
        },
        // Index 1 — PressedWaitingEscalation
        StateDescriptor {
            id: PowerOpState::PressedWaitingEscalation,
            name: "PressedWaitingEscalation",
            on_enter: Some(pressed_enter),
            on_exit: None,
            on_pressed: power_on_if_off,
            on_released: to_idle,
            on_timer: pressed_timer,
        },
        // Index 2 — HostOffIssuedWaitingChassisWindow
        StateDescriptor {
            id: PowerOpState::HostOffIssuedWaitingChassisWindow,
            name: "HostOffIssuedWaitingChassisWindow",
            on_enter: Some(host_off_enter),
            on_exit: None,
            on_pressed: power_on_if_off,
            on_released: host_off_released,
            on_timer: chassis_deadline_to_off,
        },
        // Index 3 — ReleasedWithinChassisWindow
        StateDescriptor {
            id: PowerOpState::ReleasedWithinChassisWindow,
            name: "ReleasedWithinChassisWindow",
            on_enter: None,
            on_exit: None,
            on_pressed: window_pressed,
            on_released: to_idle,
            on_timer: window_timer,
        },
        // Index 4 — ChassisOffIssued
        StateDescriptor {
            id: PowerOpState::ChassisOffIssued,
            name: "ChassisOffIssued",
            on_enter: Some(chassis_off_enter),
            on_exit: None,
            on_pressed: power_on_if_off,
            on_released: to_idle,
            on_timer: ignore,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared handlers
// ═══════════════════════════════════════════════════════════════════════════

fn ignore(_ctx: &mut EscalationContext) -> Option<PowerOpState> {
    None
}

fn to_idle(_ctx: &mut EscalationContext) -> Option<PowerOpState> {
    Some(PowerOpState::Idle)
}

/// A press while the chassis is off powers the host on and starts over.
fn power_on_if_off(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if ctx.chassis_on {
        return None;
    }
    info!("Escalation: power is off, requesting host on");
    ctx.commands.request(PowerRequest::HostOn);
    Some(PowerOpState::Idle)
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut EscalationContext) {
    ctx.host_off_at = None;
    ctx.chassis_off_at = None;
    ctx.commands.timer = TimerCommand::Disable;
}

fn idle_pressed(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if !ctx.chassis_on {
        info!("Escalation: power is off, requesting host on");
        ctx.commands.request(PowerRequest::HostOn);
        return None;
    }
    ctx.host_off_at = Some(ctx.now_ms + ctx.timing.host_off_after_ms);
    Some(PowerOpState::PressedWaitingEscalation)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PRESSED
// ═══════════════════════════════════════════════════════════════════════════

fn pressed_enter(ctx: &mut EscalationContext) {
    ctx.commands.timer = TimerCommand::Restart {
        interval_ms: ctx.timing.poll_ms,
    };
}

fn pressed_timer(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if ctx.deadline_passed(ctx.host_off_at) {
        Some(PowerOpState::HostOffIssuedWaitingChassisWindow)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  HOST_OFF_ISSUED
// ═══════════════════════════════════════════════════════════════════════════

fn host_off_enter(ctx: &mut EscalationContext) {
    info!("Escalation: held past host-off deadline, requesting host off");
    ctx.chassis_off_at = Some(ctx.now_ms + ctx.timing.chassis_off_after_ms);
    ctx.commands.request(PowerRequest::HostOff);
}

fn host_off_released(_ctx: &mut EscalationContext) -> Option<PowerOpState> {
    Some(PowerOpState::ReleasedWithinChassisWindow)
}

fn chassis_deadline_to_off(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if ctx.deadline_passed(ctx.chassis_off_at) {
        Some(PowerOpState::ChassisOffIssued)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  RELEASED_IN_WINDOW
// ═══════════════════════════════════════════════════════════════════════════

fn window_pressed(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if !ctx.chassis_on {
        return power_on_if_off(ctx);
    }
    Some(PowerOpState::ChassisOffIssued)
}

fn window_timer(ctx: &mut EscalationContext) -> Option<PowerOpState> {
    if ctx.deadline_passed(ctx.chassis_off_at) {
        info!("Escalation: chassis-off window closed without a second press");
        Some(PowerOpState::Idle)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHASSIS_OFF_ISSUED
// ═══════════════════════════════════════════════════════════════════════════

fn chassis_off_enter(ctx: &mut EscalationContext) {
    info!("Escalation: requesting chassis off");
    ctx.commands.timer = TimerCommand::Disable;
    ctx.commands.request(PowerRequest::ChassisOff);
}
