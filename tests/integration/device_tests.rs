//! Device construction, selector decoding, the serial mux and teardown,
//! driven through the service against a fake sysfs tree.

use bmc_buttons::app::ports::{Reactor, StateBus};
use bmc_buttons::buttons::ButtonKind;
use bmc_buttons::config::DaemonConfig;
use bmc_buttons::event_loop::Wakeup;
use bmc_buttons::fsm::policy::HOST_THEN_CHASSIS_POWEROFF;
use bmc_buttons::paths::{
    HOST_SELECTOR_IFACE, HOST_SELECTOR_OBJECT, MAX_POSITION_PROP, POSITION_PROP,
};

use super::fixture::{FakeSysfs, Harness};
use super::mock_bus::MockBus;

const SELECTOR: &str = r#"{"gpio_definitions":[
    {"name":"HOST_SELECTOR",
     "group_gpio_config":[
        {"name":"hs0","num":0,"polarity":"active_high"},
        {"name":"hs1","num":1,"polarity":"active_high"},
        {"name":"hs2","num":2,"polarity":"active_high"},
        {"name":"hs3","num":3,"polarity":"active_high"}
     ],
     "max_position": 4,
     "host_selector_map": {"6":"2","14":1,"15":0}}
]}"#;

fn published(h: &Harness, name: &str) -> Option<u64> {
    h.bus()
        .inner
        .property(HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE, name)
        .and_then(|v| v.as_u64())
}

// ── Host selector ─────────────────────────────────────────────

#[test]
fn selector_decodes_initial_mask() {
    // Lines 1 and 2 deasserted -> bits 1 and 2 set -> 0b0110.
    let lines = [(0, "1"), (1, "0"), (2, "0"), (3, "1")];
    let h = Harness::new(SELECTOR, &lines, DaemonConfig::default(), MockBus::new());

    assert_eq!(h.created, 1);
    assert_eq!(h.service.host_selector_position(), Some(2));
    assert_eq!(published(&h, POSITION_PROP), Some(2));
    assert_eq!(published(&h, MAX_POSITION_PROP), Some(4));
    assert_eq!(h.reactor.watch_count(), 4);
}

#[test]
fn unmapped_mask_keeps_position() {
    let lines = [(0, "1"), (1, "0"), (2, "0"), (3, "1")];
    let mut h = Harness::new(SELECTOR, &lines, DaemonConfig::default(), MockBus::new());

    // 0b0110 -> 0b0100: not in the map.
    h.edge("HOST_SELECTOR", 1, 1, "1");
    assert_eq!(h.service.host_selector_position(), Some(2));
    assert_eq!(published(&h, POSITION_PROP), Some(2));

    // 0b0100 -> 0b1110 -> position 1.
    h.edge("HOST_SELECTOR", 1, 1, "0");
    h.edge("HOST_SELECTOR", 3, 3, "0");
    assert_eq!(h.service.host_selector_position(), Some(1));
    assert_eq!(published(&h, POSITION_PROP), Some(1));
}

#[test]
fn unmapped_initial_mask_starts_at_zero() {
    let lines = [(0, "0"), (1, "1"), (2, "1"), (3, "1")];
    let h = Harness::new(SELECTOR, &lines, DaemonConfig::default(), MockBus::new());
    assert_eq!(h.service.host_selector_position(), Some(0));
}

#[test]
fn polled_selector_picks_up_changes_without_edges() {
    let defs = r#"{"gpio_definitions":[
        {"name":"HOST_SELECTOR",
         "group_gpio_config":[
            {"name":"hs0","num":0,"polarity":"active_high"},
            {"name":"hs1","num":1,"polarity":"active_high"}
         ],
         "max_position": 2,
         "polling_mode": true,
         "polling_interval_ms": 500,
         "host_selector_map": {"3":0,"2":1,"1":2}}
    ]}"#;
    let mut h = Harness::new(defs, &[(0, "0"), (1, "0")], DaemonConfig::default(), MockBus::new());
    assert_eq!(h.service.host_selector_position(), Some(0));
    assert_eq!(h.reactor.timer_count(), 1);

    h.sysfs.set_line(1, "1");
    h.advance_to(499);
    assert_eq!(h.service.host_selector_position(), Some(0));
    h.advance_to(500);
    assert_eq!(h.service.host_selector_position(), Some(2));
    assert_eq!(h.reactor.timer_count(), 1);
}

#[test]
fn cpld_selector_reads_a_digit() {
    let defs = r#"{"cpld_definitions":[
        {"name":"HOST_SELECTOR","register_name":"host-sel","i2c_bus":12,"i2c_address":64,
         "max_position": 4}
    ]}"#;
    let sysfs = FakeSysfs::new();
    sysfs.add_register(12, 0x40, "host-sel", "3");
    let mut h = Harness::with_sysfs(sysfs, defs, DaemonConfig::default(), MockBus::new());

    assert_eq!(h.created, 1);
    assert_eq!(h.service.host_selector_position(), Some(3));

    h.sysfs.add_register(12, 0x40, "host-sel", "1");
    let device = h.device("HOST_SELECTOR");
    h.service.dispatch(Wakeup::Ready { device, line: 0 }, &mut h.reactor);
    assert_eq!(h.service.host_selector_position(), Some(1));
    assert_eq!(published(&h, POSITION_PROP), Some(1));
}

// ── Construction ──────────────────────────────────────────────

#[test]
fn broken_and_unknown_definitions_are_skipped() {
    let defs = r#"{"gpio_definitions":[
        {"name":"POWER_BUTTON","num":20},
        {"name":"FAN_BUTTON","num":21},
        {"name":"RESET_BUTTON","num":99},
        {"name":"HOST_SELECTOR",
         "group_gpio_config":[{"name":"hs0","num":0}],
         "max_position": 1},
        {"name":"ID_BTN","num":22}
    ]}"#;
    let lines = [(20, "1"), (21, "1"), (22, "1"), (0, "1")];
    let h = Harness::new(defs, &lines, DaemonConfig::default(), MockBus::new());

    // Unknown name, missing gpio99, and a selector without a map.
    assert_eq!(h.created, 2);
    assert_eq!(h.service.device_count(), 2);
    let kinds: Vec<ButtonKind> = (0..2)
        .filter_map(|id| h.service.device(id).map(|d| d.kind()))
        .collect();
    assert_eq!(kinds, vec![ButtonKind::Power, ButtonKind::Id]);

    // The failed selector left nothing watched behind.
    assert_eq!(h.reactor.watch_count(), 2);
}

#[test]
fn created_buttons_are_on_the_bus() {
    let defs = r#"{"gpio_definitions":[{"name":"POWER_BUTTON","num":20}]}"#;
    let mut h = Harness::new(defs, &[(20, "1")], DaemonConfig::default(), MockBus::new());
    let path = h.service.device(0).map(|d| d.object_path().to_owned()).unwrap();
    let iface = ButtonKind::Power.interface();
    assert!(h.bus_mut().get_service(&path, iface).is_ok());
}

#[test]
fn shutdown_releases_every_watch_and_timer() {
    let defs = r#"{"gpio_definitions":[
        {"name":"POWER_BUTTON","num":20},
        {"name":"HOST_SELECTOR",
         "group_gpio_config":[{"name":"hs0","num":0},{"name":"hs1","num":1}],
         "max_position": 1,
         "polling_mode": true,
         "host_selector_map": {"0":0,"3":1}}
    ]}"#;
    let settings = DaemonConfig {
        power_button_profile: HOST_THEN_CHASSIS_POWEROFF.into(),
        ..DaemonConfig::default()
    };
    let mut h = Harness::new(
        defs,
        &[(20, "1"), (0, "1"), (1, "1")],
        settings,
        MockBus::with_hosts(2, true),
    );
    h.edge("POWER_BUTTON", 0, 20, "0");
    assert_eq!(h.reactor.watch_count(), 3);
    assert_eq!(h.reactor.timer_count(), 2);

    h.service.shutdown(&mut h.reactor);
    assert_eq!(h.reactor.watch_count(), 0);
    assert_eq!(h.reactor.timer_count(), 0);
    assert_eq!(h.service.device_count(), 0);

    // A second shutdown finds nothing left to release.
    h.service.shutdown(&mut h.reactor);
    assert_eq!(h.reactor.watch_count(), 0);
}

#[test]
fn service_dropped_without_shutdown_leaves_no_watches() {
    let defs = r#"{"gpio_definitions":[
        {"name":"POWER_BUTTON","num":20},
        {"name":"RESET_BUTTON","num":21}
    ]}"#;
    let Harness {
        sysfs: _sysfs,
        mut reactor,
        service,
        ..
    } = Harness::new(defs, &[(20, "1"), (21, "1")], DaemonConfig::default(), MockBus::new());
    assert_eq!(reactor.watch_count(), 2);

    drop(service);
    assert_eq!(reactor.orphans().len(), 2);
    assert_eq!(reactor.reap(), 2);
    assert_eq!(reactor.watch_count(), 0);
}

// ── Serial console mux ────────────────────────────────────────

const MUX_DEFS: &str = r#"{"gpio_definitions":[
    {"name":"HOST_SELECTOR",
     "group_gpio_config":[
        {"name":"hs0","num":0,"polarity":"active_high"},
        {"name":"hs1","num":1,"polarity":"active_high"}
     ],
     "max_position": 3,
     "host_selector_map": {"3":0,"2":1,"1":2,"0":3}},
    {"name":"DEBUG_SELECTOR_BUTTON","num":10},
    {"name":"SERIAL_UART_MUX",
     "group_gpio_config":[
        {"name":"serial_uart_mux_sel0","num":30,"direction":"out","polarity":"active_high"},
        {"name":"serial_uart_mux_sel1","num":31,"direction":"out","polarity":"active_high"},
        {"name":"debug_card_present","num":32,"direction":"in","polarity":"active_high"},
        {"name":"serial_uart_rx","num":33,"direction":"out","polarity":"active_high"}
     ],
     "serial_uart_mux_map": {"0":0,"1":1,"2":2,"3":3}}
]}"#;

fn mux_harness(selector: [&str; 2], debug_card: &str) -> Harness {
    let lines = [
        (0, selector[0]),
        (1, selector[1]),
        (10, "1"),
        (30, "0"),
        (31, "0"),
        (32, debug_card),
        (33, "0"),
    ];
    Harness::new(MUX_DEFS, &lines, DaemonConfig::default(), MockBus::new())
}

fn mux_lines(h: &Harness) -> (String, String, String) {
    (h.sysfs.line(30), h.sysfs.line(31), h.sysfs.line(33))
}

#[test]
fn mux_follows_initial_position() {
    // Line 0 asserted, line 1 deasserted -> mask 2 -> position 1.
    let h = mux_harness(["1", "0"], "1");
    assert_eq!(h.created, 3);
    assert_eq!(h.service.host_selector_position(), Some(1));
    assert_eq!(mux_lines(&h), ("1".into(), "0".into(), "1".into()));
    // Only the selector and the debug button are watched.
    assert_eq!(h.reactor.watch_count(), 3);
}

#[test]
fn mux_follows_selector_edges() {
    let mut h = mux_harness(["1", "0"], "0");
    // mask 2 -> 0: position 3.
    h.edge("HOST_SELECTOR", 1, 1, "1");
    assert_eq!(h.service.host_selector_position(), Some(3));
    assert_eq!(mux_lines(&h), ("1".into(), "1".into(), "0".into()));
}

#[test]
fn mux_follows_debug_selector() {
    let mut h = mux_harness(["1", "0"], "1");
    h.edge("DEBUG_SELECTOR_BUTTON", 0, 10, "0");
    h.edge("DEBUG_SELECTOR_BUTTON", 0, 10, "1");
    assert_eq!(h.service.host_selector_position(), Some(2));
    assert_eq!(mux_lines(&h), ("0".into(), "1".into(), "1".into()));
}

#[test]
fn mux_without_debug_card_line_is_rejected() {
    let defs = r#"{"gpio_definitions":[
        {"name":"SERIAL_UART_MUX",
         "group_gpio_config":[
            {"name":"serial_uart_mux_sel0","num":30,"direction":"out"},
            {"name":"serial_uart_mux_sel1","num":31,"direction":"out"},
            {"name":"serial_uart_rx","num":33,"direction":"out"}
         ],
         "serial_uart_mux_map": {"0":0}}
    ]}"#;
    let h = Harness::new(
        defs,
        &[(30, "0"), (31, "0"), (33, "0")],
        DaemonConfig::default(),
        MockBus::new(),
    );
    assert_eq!(h.created, 0);
}
