//! Power button escalation, end to end: sysfs edge → device → policy →
//! router → bus.

use bmc_buttons::app::ports::Value;
use bmc_buttons::config::DaemonConfig;
use bmc_buttons::fsm::policy::HOST_THEN_CHASSIS_POWEROFF;
use bmc_buttons::fsm::PowerOpState;
use bmc_buttons::paths::{
    CHASSIS_TRANSITION_OFF, CHASSIS_TRANSITION_POWER_CYCLE, HOST_TRANSITION_OFF, HOST_TRANSITION_ON,
    POWER_OBJECT, SIGNAL_PRESSED, SIGNAL_PRESSED_LONG, SIGNAL_PRESSED_LONGER, SIGNAL_RELEASED,
};

use super::fixture::Harness;
use super::mock_bus::MockBus;

const POWER_GPIO: u32 = 20;
const DEFS: &str = r#"{"gpio_definitions":[
    {"name":"POWER_BUTTON","num":20,"direction":"both","polarity":"active_low"}
]}"#;

const HOST0: &str = "/xyz/openbmc_project/state/host0";
const CHASSIS0: &str = "/xyz/openbmc_project/state/chassis0";

fn escalating() -> DaemonConfig {
    DaemonConfig {
        power_button_profile: HOST_THEN_CHASSIS_POWEROFF.into(),
        ..DaemonConfig::default()
    }
}

fn harness(settings: DaemonConfig, host_on: bool) -> Harness {
    Harness::new(DEFS, &[(POWER_GPIO, "1")], settings, MockBus::with_hosts(1, host_on))
}

fn press(h: &mut Harness) {
    h.edge("POWER_BUTTON", 0, POWER_GPIO, "0");
}

fn release(h: &mut Harness) {
    h.edge("POWER_BUTTON", 0, POWER_GPIO, "1");
}

fn count(h: &Harness, path: &str, value: &str) -> usize {
    h.bus()
        .transitions()
        .iter()
        .filter(|(p, v)| p == path && v == value)
        .count()
}

// ── Default policy ────────────────────────────────────────────

#[test]
fn short_press_releases_once_and_toggles_host() {
    let mut h = harness(DaemonConfig::default(), true);
    press(&mut h);
    h.advance_to(2000);
    release(&mut h);

    let bus = h.bus();
    assert_eq!(bus.signal_count(POWER_OBJECT, SIGNAL_PRESSED), 1);
    assert_eq!(bus.signal_count(POWER_OBJECT, SIGNAL_RELEASED), 1);
    assert_eq!(bus.signal_count(POWER_OBJECT, SIGNAL_PRESSED_LONG), 0);
    assert_eq!(
        bus.signal_args(POWER_OBJECT, SIGNAL_RELEASED),
        vec![vec![Value::U64(2000)]]
    );
    assert_eq!(bus.transitions(), vec![(HOST0.to_owned(), HOST_TRANSITION_OFF.to_owned())]);
}

#[test]
fn short_press_with_host_off_powers_on() {
    let mut h = harness(DaemonConfig::default(), false);
    press(&mut h);
    h.advance_to(300);
    release(&mut h);
    assert_eq!(h.bus().transitions(), vec![(HOST0.to_owned(), HOST_TRANSITION_ON.to_owned())]);
}

#[test]
fn long_press_requests_chassis_off() {
    let mut h = harness(DaemonConfig::default(), true);
    press(&mut h);
    h.advance_to(5000);
    release(&mut h);

    assert_eq!(h.bus().signal_count(POWER_OBJECT, SIGNAL_RELEASED), 0);
    assert_eq!(h.bus().signal_count(POWER_OBJECT, SIGNAL_PRESSED_LONG), 1);
    assert_eq!(h.bus().transitions(), vec![(CHASSIS0.to_owned(), CHASSIS_TRANSITION_OFF.to_owned())]);
}

#[test]
fn longer_press_power_cycles_when_enabled() {
    let settings = DaemonConfig {
        longer_press_enabled: true,
        ..DaemonConfig::default()
    };
    let mut h = harness(settings, true);
    press(&mut h);
    h.advance_to(15_000);
    release(&mut h);

    assert_eq!(h.bus().signal_count(POWER_OBJECT, SIGNAL_PRESSED_LONGER), 1);
    assert_eq!(count(&h, CHASSIS0, CHASSIS_TRANSITION_POWER_CYCLE), 1);
}

#[test]
fn longer_hold_is_a_long_press_when_disabled() {
    let mut h = harness(DaemonConfig::default(), true);
    press(&mut h);
    h.advance_to(15_000);
    release(&mut h);

    assert_eq!(h.bus().signal_count(POWER_OBJECT, SIGNAL_PRESSED_LONGER), 0);
    assert_eq!(h.bus().signal_count(POWER_OBJECT, SIGNAL_PRESSED_LONG), 1);
}

// ── Host, then chassis ────────────────────────────────────────

#[test]
fn held_through_both_deadlines_issues_host_then_chassis_off() {
    let mut h = harness(escalating(), true);
    let power = h.device("POWER_BUTTON");
    press(&mut h);
    assert_eq!(h.service.power_state(power), Some(PowerOpState::PressedWaitingEscalation));

    h.advance_to(3999);
    assert!(h.bus().transitions().is_empty());

    h.advance_to(4000);
    assert_eq!(
        h.service.power_state(power),
        Some(PowerOpState::HostOffIssuedWaitingChassisWindow)
    );
    assert_eq!(h.bus().transitions(), vec![(HOST0.to_owned(), HOST_TRANSITION_OFF.to_owned())]);

    h.advance_to(20_000);
    assert_eq!(h.service.power_state(power), Some(PowerOpState::ChassisOffIssued));
    assert_eq!(
        h.bus().transitions(),
        vec![
            (HOST0.to_owned(), HOST_TRANSITION_OFF.to_owned()),
            (CHASSIS0.to_owned(), CHASSIS_TRANSITION_OFF.to_owned()),
        ]
    );
    assert_eq!(h.service.escalation_timer(power), None);

    release(&mut h);
    assert_eq!(h.service.power_state(power), Some(PowerOpState::Idle));
    assert_eq!(h.bus().transitions().len(), 2);
}

#[test]
fn released_inside_window_skips_chassis_off() {
    let mut h = harness(escalating(), true);
    let power = h.device("POWER_BUTTON");
    press(&mut h);
    h.advance_to(9000);
    release(&mut h);
    assert_eq!(
        h.service.power_state(power),
        Some(PowerOpState::ReleasedWithinChassisWindow)
    );

    h.advance_to(30_000);
    assert_eq!(count(&h, HOST0, HOST_TRANSITION_OFF), 1);
    assert_eq!(count(&h, CHASSIS0, CHASSIS_TRANSITION_OFF), 0);
    assert_eq!(h.service.power_state(power), Some(PowerOpState::Idle));
    assert_eq!(h.service.escalation_timer(power), None);
    assert_eq!(h.reactor.timer_count(), 0);
}

#[test]
fn second_press_inside_window_forces_chassis_off() {
    let mut h = harness(escalating(), true);
    let power = h.device("POWER_BUTTON");
    press(&mut h);
    h.advance_to(5000);
    release(&mut h);
    h.advance_to(7000);
    press(&mut h);

    assert_eq!(h.service.power_state(power), Some(PowerOpState::ChassisOffIssued));
    assert_eq!(count(&h, CHASSIS0, CHASSIS_TRANSITION_OFF), 1);
    assert_eq!(h.reactor.timer_count(), 0);
}

#[test]
fn early_release_returns_to_idle_without_requests() {
    let mut h = harness(escalating(), true);
    let power = h.device("POWER_BUTTON");
    press(&mut h);
    h.advance_to(2500);
    release(&mut h);

    assert_eq!(h.service.power_state(power), Some(PowerOpState::Idle));
    assert!(h.bus().transitions().is_empty());
    assert_eq!(h.reactor.timer_count(), 0);
}

#[test]
fn press_with_power_off_requests_host_on() {
    let mut h = harness(escalating(), false);
    let power = h.device("POWER_BUTTON");
    press(&mut h);
    assert_eq!(h.bus().transitions(), vec![(HOST0.to_owned(), HOST_TRANSITION_ON.to_owned())]);
    assert_eq!(h.service.power_state(power), Some(PowerOpState::Idle));
    assert_eq!(h.reactor.timer_count(), 0);
}

#[test]
fn failed_requests_still_advance_the_state_machine() {
    let mut h = harness(escalating(), true);
    let power = h.device("POWER_BUTTON");
    h.bus_mut().fail_sets = true;
    press(&mut h);
    h.advance_to(20_000);

    assert_eq!(h.service.power_state(power), Some(PowerOpState::ChassisOffIssued));
    assert!(h.bus().transitions().is_empty());
    assert_eq!(
        h.bus().failed,
        vec![
            (HOST0.to_owned(), HOST_TRANSITION_OFF.to_owned()),
            (CHASSIS0.to_owned(), CHASSIS_TRANSITION_OFF.to_owned()),
        ]
    );
}
