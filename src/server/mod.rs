//! Reactor side of the server: the event loop, the connection table, and
//! the self-signal channel feeding it ticks and shutdown requests.

pub mod listener;
pub mod reactor;
pub mod signal;
pub mod table;

pub use reactor::{Server, ShutdownHandle};
