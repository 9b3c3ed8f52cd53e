//! buttond: front-panel button daemon entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  SysfsGpio / CPLD lines     LocalBus (StateBus)              │
//! │  EventLoop (Reactor, mio + signal-hook)                      │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ──────────────────     │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │          ButtonService (pure logic)                    │  │
//! │  │  Devices · PowerUnit escalation · HostRouter           │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};

use bmc_buttons::adapters::local_bus::LocalBus;
use bmc_buttons::app::service::ButtonService;
use bmc_buttons::buttons::registry::Registry;
use bmc_buttons::config::{self, DaemonConfig, DEFAULT_DEFINITIONS_PATH};
use bmc_buttons::drivers::gpio::SysfsGpio;
use bmc_buttons::drivers::Lines;
use bmc_buttons::event_loop::EventLoop;
use bmc_buttons::paths::SERVICE_NAME;

#[derive(Debug, Parser)]
#[command(name = "buttond", version, about = "BMC front-panel button daemon")]
struct Cli {
    /// Button definitions (gpio_defs.json format).
    #[arg(short, long, default_value = DEFAULT_DEFINITIONS_PATH)]
    config: PathBuf,

    /// Daemon settings; built-in defaults when absent.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Overrides RUST_LOG (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn init_logging(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    info!("buttond v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Settings ───────────────────────────────────────────
    let settings = match &cli.settings {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    // ── 2. Line drivers ───────────────────────────────────────
    let gpio = match &settings.gpio_base_label {
        Some(label) => SysfsGpio::with_chip_label(&settings.gpio_root, label)
            .with_context(|| format!("locating gpiochip '{label}'"))?,
        None => SysfsGpio::new(&settings.gpio_root),
    };
    info!("GPIO base {} under {}", gpio.base(), gpio.root().display());
    let lines = Lines::new(gpio, &settings.cpld_root);

    // ── 3. Definitions ────────────────────────────────────────
    let definitions = config::load_definitions(&cli.config, lines.gpio().base())
        .with_context(|| format!("loading button definitions from {}", cli.config.display()))?;
    if definitions.is_empty() {
        warn!("No button definitions in {}", cli.config.display());
    }

    // ── 4. Event loop + service ───────────────────────────────
    let mut event_loop = EventLoop::new()
        .and_then(EventLoop::with_shutdown_signals)
        .context("creating event loop")?;
    let registry = Registry::with_builtin(settings.chassis_instances);
    let mut service = ButtonService::new(settings, LocalBus::new(SERVICE_NAME));

    let created = service.create_devices(&definitions, &lines, &registry, &mut event_loop);
    if created == 0 {
        warn!("No buttons could be created; waiting for shutdown");
    }

    // ── 5. Run ────────────────────────────────────────────────
    service.run(&mut event_loop).context("event loop failed")?;
    info!("buttond stopped");
    Ok(())
}
