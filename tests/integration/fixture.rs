//! Fake sysfs tree plus a service wired to the mock adapters.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use bmc_buttons::app::service::ButtonService;
use bmc_buttons::buttons::registry::Registry;
use bmc_buttons::config::{parse_definitions, DaemonConfig};
use bmc_buttons::drivers::gpio::SysfsGpio;
use bmc_buttons::drivers::Lines;
use bmc_buttons::event_loop::Wakeup;
use bmc_buttons::events::DeviceId;

use super::mock_bus::{FakeReactor, MockBus};

// ── FakeSysfs ─────────────────────────────────────────────────

pub struct FakeSysfs {
    dir: TempDir,
}

#[allow(dead_code)]
impl FakeSysfs {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("gpio")).unwrap();
        fs::create_dir_all(dir.path().join("i2c")).unwrap();
        fs::write(dir.path().join("gpio/export"), "").unwrap();
        Self { dir }
    }

    pub fn gpio_root(&self) -> PathBuf {
        self.dir.path().join("gpio")
    }

    pub fn cpld_root(&self) -> PathBuf {
        self.dir.path().join("i2c")
    }

    /// An exported line with direction and edge attributes.
    pub fn add_line(&self, number: u32, raw: &str) {
        let dir = self.gpio_root().join(format!("gpio{number}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), raw).unwrap();
        fs::write(dir.join("direction"), "").unwrap();
        fs::write(dir.join("edge"), "").unwrap();
    }

    pub fn set_line(&self, number: u32, raw: &str) {
        fs::write(self.gpio_root().join(format!("gpio{number}/value")), raw).unwrap();
    }

    pub fn line(&self, number: u32) -> String {
        fs::read_to_string(self.gpio_root().join(format!("gpio{number}/value"))).unwrap()
    }

    pub fn add_register(&self, bus: u32, address: u32, name: &str, raw: &str) {
        let dir = self.cpld_root().join(format!("{bus}-{address:04x}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), raw).unwrap();
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub sysfs: FakeSysfs,
    pub reactor: FakeReactor,
    pub service: ButtonService<MockBus>,
    pub created: usize,
}

#[allow(dead_code)]
impl Harness {
    /// `lines` are `(gpio number, initial raw value)` created before parsing.
    pub fn new(defs: &str, lines: &[(u32, &str)], settings: DaemonConfig, bus: MockBus) -> Self {
        let sysfs = FakeSysfs::new();
        for (number, raw) in lines {
            sysfs.add_line(*number, raw);
        }
        Self::with_sysfs(sysfs, defs, settings, bus)
    }

    pub fn with_sysfs(sysfs: FakeSysfs, defs: &str, mut settings: DaemonConfig, bus: MockBus) -> Self {
        settings.gpio_root = sysfs.gpio_root();
        settings.cpld_root = sysfs.cpld_root();
        let configs = parse_definitions(defs, 0).unwrap();
        let registry = Registry::with_builtin(settings.chassis_instances);
        let lines = Lines::new(SysfsGpio::new(&settings.gpio_root), &settings.cpld_root);
        let mut reactor = FakeReactor::new();
        let mut service = ButtonService::new(settings, bus);
        let created = service.create_devices(&configs, &lines, &registry, &mut reactor);
        Self {
            sysfs,
            reactor,
            service,
            created,
        }
    }

    pub fn bus(&self) -> &MockBus {
        self.service.bus()
    }

    pub fn bus_mut(&mut self) -> &mut MockBus {
        self.service.bus_mut()
    }

    pub fn device(&self, form_factor: &str) -> DeviceId {
        self.service
            .find(form_factor)
            .unwrap_or_else(|| panic!("{form_factor} was not created"))
    }

    /// Fire every timer due up to `to_ms`, then leave the clock there.
    pub fn advance_to(&mut self, to_ms: u64) {
        while let Some(wakeups) = self.reactor.step_until(to_ms) {
            for wakeup in wakeups {
                self.service.dispatch(wakeup, &mut self.reactor);
            }
        }
    }

    /// Write `raw` to the line and deliver its edge to the device.
    pub fn edge(&mut self, form_factor: &str, line: usize, gpio: u32, raw: &str) {
        self.sysfs.set_line(gpio, raw);
        let device = self.device(form_factor);
        self.service
            .dispatch(Wakeup::Ready { device, line }, &mut self.reactor);
    }
}
