//! BMC front-panel button daemon library.
//!
//! Turns edge-triggered GPIO and CPLD lines into button events and power
//! transition requests.  Everything except the `buttond` binary's wiring
//! lives here so it can be exercised by the integration tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod buttons;
pub mod config;
pub mod drivers;
pub mod event_loop;
pub mod events;
pub mod fsm;
pub mod paths;
pub mod scheduler;

mod error;

pub use error::{BusError, ConfigError, Error, LineError, MappingMiss, Result};
