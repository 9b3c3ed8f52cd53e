//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the daemon against a
//! fake sysfs tree and mock adapters.  No hardware or system bus needed.

mod device_tests;
mod escalation_tests;
mod fixture;
mod mock_bus;
