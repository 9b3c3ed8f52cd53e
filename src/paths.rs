//! Object paths, interfaces and property values used on the state bus.
//!
//! Single source of truth for every name the daemon exposes or calls.
//! Indexed objects (`host<N>`, `chassis<N>`, `chassis_system<N>`) are built
//! with [`indexed`].

// ---------------------------------------------------------------------------
// Our own service and objects
// ---------------------------------------------------------------------------

/// Well-known name the daemon claims on the bus.
pub const SERVICE_NAME: &str = "xyz.openbmc_project.Chassis.Buttons";

pub const BUTTONS_ROOT: &str = "/xyz/openbmc_project/Chassis/Buttons";

pub const POWER_OBJECT: &str = "/xyz/openbmc_project/Chassis/Buttons/Power0";
/// Per-slot power buttons are `POWER_OBJECT_BASE` + slot index (1..=N).
pub const POWER_OBJECT_BASE: &str = "/xyz/openbmc_project/Chassis/Buttons/Power";
pub const RESET_OBJECT: &str = "/xyz/openbmc_project/Chassis/Buttons/Reset0";
pub const ID_OBJECT: &str = "/xyz/openbmc_project/Chassis/Buttons/ID0";
pub const HOST_SELECTOR_OBJECT: &str = "/xyz/openbmc_project/Chassis/Buttons/HostSelector0";
pub const DEBUG_HOST_SELECTOR_OBJECT: &str =
    "/xyz/openbmc_project/Chassis/Buttons/DebugHostSelector0";
pub const SERIAL_UART_MUX_OBJECT: &str = "/xyz/openbmc_project/Chassis/Buttons/SerialUartMux0";

pub const POWER_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.Power";
pub const RESET_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.Reset";
pub const ID_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.ID";
pub const HOST_SELECTOR_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.HostSelector";
pub const DEBUG_HOST_SELECTOR_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.Button";
pub const SERIAL_UART_MUX_IFACE: &str = "xyz.openbmc_project.Chassis.Buttons.SerialUartMux";

pub const POSITION_PROP: &str = "Position";
pub const MAX_POSITION_PROP: &str = "MaxPosition";

// ── Signal members ──────────────────────────────────────────
pub const SIGNAL_PRESSED: &str = "Pressed";
pub const SIGNAL_RELEASED: &str = "Released";
pub const SIGNAL_PRESSED_LONG: &str = "PressedLong";
pub const SIGNAL_PRESSED_LONGER: &str = "PressedLonger";

// ---------------------------------------------------------------------------
// Host / chassis / BMC state management
// ---------------------------------------------------------------------------

pub const HOST_STATE_BASE: &str = "/xyz/openbmc_project/state/host";
pub const CHASSIS_STATE_BASE: &str = "/xyz/openbmc_project/state/chassis";
pub const CHASSIS_SYSTEM_BASE: &str = "/xyz/openbmc_project/state/chassis_system";
pub const BMC_STATE_OBJECT: &str = "/xyz/openbmc_project/state/bmc0";

pub const HOST_STATE_IFACE: &str = "xyz.openbmc_project.State.Host";
pub const CHASSIS_STATE_IFACE: &str = "xyz.openbmc_project.State.Chassis";
pub const BMC_STATE_IFACE: &str = "xyz.openbmc_project.State.BMC";

pub const CURRENT_HOST_STATE: &str = "CurrentHostState";
pub const REQUESTED_HOST_TRANSITION: &str = "RequestedHostTransition";
pub const CURRENT_POWER_STATE: &str = "CurrentPowerState";
pub const REQUESTED_POWER_TRANSITION: &str = "RequestedPowerTransition";
pub const CURRENT_BMC_STATE: &str = "CurrentBMCState";

pub const HOST_STATE_OFF: &str = "xyz.openbmc_project.State.Host.HostState.Off";
pub const CHASSIS_POWER_ON: &str = "xyz.openbmc_project.State.Chassis.PowerState.On";
pub const BMC_READY: &str = "xyz.openbmc_project.State.BMC.BMCState.Ready";

pub const HOST_TRANSITION_ON: &str = "xyz.openbmc_project.State.Host.Transition.On";
pub const HOST_TRANSITION_OFF: &str = "xyz.openbmc_project.State.Host.Transition.Off";
pub const HOST_TRANSITION_REBOOT: &str = "xyz.openbmc_project.State.Host.Transition.Reboot";
pub const HOST_TRANSITION_WARM_REBOOT: &str =
    "xyz.openbmc_project.State.Host.Transition.ForceWarmReboot";
pub const CHASSIS_TRANSITION_OFF: &str = "xyz.openbmc_project.State.Chassis.Transition.Off";
pub const CHASSIS_TRANSITION_POWER_CYCLE: &str =
    "xyz.openbmc_project.State.Chassis.Transition.PowerCycle";

// ---------------------------------------------------------------------------
// Identify LED group
// ---------------------------------------------------------------------------

pub const LED_GROUPS_BASE: &str = "/xyz/openbmc_project/led/groups";
pub const LED_GROUP_IFACE: &str = "xyz.openbmc_project.Led.Group";
pub const LED_ASSERTED_PROP: &str = "Asserted";

/// `base` followed by the decimal index, e.g. `host0`.
pub fn indexed(base: &str, index: usize) -> String {
    format!("{base}{index}")
}

/// Slot index encoded at the end of a per-slot power button path.
///
/// `Power0` is the shared front-panel button and yields `None`.
pub fn power_slot(object_path: &str) -> Option<usize> {
    let suffix = object_path.strip_prefix(POWER_OBJECT_BASE)?;
    match suffix.parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(slot) => Some(slot),
    }
}
