//! Halfsync - Half-sync/half-reactive HTTP server
//!
//! One reactor thread multiplexes every socket and hands ready connections
//! to a fixed pool of worker threads, which parse the request and write the
//! response synchronously.

pub mod auth;
pub mod cli;
pub mod config;
pub mod http;
pub mod pool;
pub mod server;
pub mod timer;
