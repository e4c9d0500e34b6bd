//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 subset the server speaks: GET and
//! POST, one request in flight per connection, optional keep-alive.
//!
//! # Architecture
//!
//! - **`line`**: Line sub-machine finding CRLF terminators across reads
//! - **`parser`**: Request state machine (request line, headers, body)
//! - **`request`**: Method and parsed request fields
//! - **`resolve`**: Maps targets to files under the document root and runs
//!   the login and registration actions
//! - **`mapped`**: Read-only memory mapping of served files
//! - **`mime`**: Content type detection based on file extensions
//! - **`response`**: Status codes and response bodies
//! - **`writer`**: Scatter-gather transmission with resumable progress
//! - **`connection`**: Per-connection state machine driven by the workers

pub mod connection;
pub mod line;
pub mod mapped;
pub mod mime;
pub mod parser;
pub mod request;
pub mod resolve;
pub mod response;
pub mod writer;
