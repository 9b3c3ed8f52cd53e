//! Function-pointer finite state machine engine for power escalation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                             │
//! │  ┌──────────────────┬──────────┬─────────┬────────────┬─────────────┐   │
//! │  │ PowerOpState     │ on_enter │ on_exit │ on_pressed │ on_released │...│
//! │  ├──────────────────┼──────────┼─────────┼────────────┼─────────────┤   │
//! │  │ Idle             │ fn(ctx)  │ fn(ctx) │ fn->Option │ fn->Option  │   │
//! │  │ Pressed...       │ fn(ctx)  │ fn(ctx) │ fn->Option │ fn->Option  │   │
//! │  │ HostOffIssued... │ fn(ctx)  │ fn(ctx) │ fn->Option │ fn->Option  │   │
//! │  │ ReleasedWithin...│ fn(ctx)  │ fn(ctx) │ fn->Option │ fn->Option  │   │
//! │  │ ChassisOffIssued │ fn(ctx)  │ fn(ctx) │ fn->Option │ fn->Option  │   │
//! │  └──────────────────┴──────────┴─────────┴────────────┴─────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each trigger (press, release, poll timer) calls the matching handler
//! for the **current** state.  If it returns `Some(next_id)`, the engine
//! runs `on_exit` for the current state, then `on_enter` for the next.
//! All functions receive `&mut EscalationContext`, which carries loop
//! time, the sampled power status, and the output commands.

pub mod context;
pub mod policy;
pub mod states;

use context::EscalationContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Escalation progress of one power button.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PowerOpState {
    #[default]
    Idle = 0,
    PressedWaitingEscalation = 1,
    HostOffIssuedWaitingChassisWindow = 2,
    ReleasedWithinChassisWindow = 3,
    ChassisOffIssued = 4,
}

impl PowerOpState {
    pub const COUNT: usize = 5;

    /// Convert an index back to a state.  Out-of-range maps to `Idle`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::PressedWaitingEscalation,
            2 => Self::HostOffIssuedWaitingChassisWindow,
            3 => Self::ReleasedWithinChassisWindow,
            4 => Self::ChassisOffIssued,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }
}

/// Input delivered to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Pressed,
    Released,
    TimerFired,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut EscalationContext);

/// Signature for trigger handlers.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateEventFn = fn(&mut EscalationContext) -> Option<PowerOpState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: PowerOpState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_pressed: StateEventFn,
    pub on_released: StateEventFn,
    pub on_timer: StateEventFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `PowerOpState as usize`.
    table: [StateDescriptor; PowerOpState::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; PowerOpState::COUNT], initial: PowerOpState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter`.  Call once after construction.
    pub fn start(&mut self, ctx: &mut EscalationContext) {
        info!("Escalation FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Deliver one trigger to the current state.
    pub fn handle(&mut self, trigger: Trigger, ctx: &mut EscalationContext) {
        let row = &self.table[self.current];
        let handler = match trigger {
            Trigger::Pressed => row.on_pressed,
            Trigger::Released => row.on_released,
            Trigger::TimerFired => row.on_timer,
        };
        if let Some(next) = handler(ctx) {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> PowerOpState {
        PowerOpState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: PowerOpState, ctx: &mut EscalationContext) {
        let next_idx = next_id as usize;
        if next_idx == self.current {
            return;
        }

        info!(
            "Escalation FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
