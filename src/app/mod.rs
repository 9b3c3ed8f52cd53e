//! Application core: button semantics, host routing and dispatch.
//!
//! Nothing here touches a file descriptor directly.  All interaction with
//! the bus and the event loop happens through the **port traits** in
//! [`ports`], so the whole layer runs against mock adapters in tests.

pub mod ports;
pub mod router;
pub mod service;
