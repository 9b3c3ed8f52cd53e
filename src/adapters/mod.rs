//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements   | Connects to                     |
//! |----------------|--------------|---------------------------------|
//! | `local_bus`    | StateBus     | In-memory object table          |
//! | `event_loop`   | Reactor      | epoll via mio (crate root)      |

pub mod local_bus;
