use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::parser::{ParseStatus, RequestParser};
use crate::http::resolve::DocRoot;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteStatus};

/// Size of the per-connection read buffer. A request (head and body) must
/// fit in it.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Which readiness a worker was dispatched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Read,
    Write,
}

/// What the reactor should do with the connection after a worker ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request is incomplete; wait for more bytes.
    NeedRead,
    /// The socket send buffer filled up mid-response.
    NeedWrite,
    /// Response flushed on a persistent connection; parse state was reset.
    KeepAlive,
    /// Tear the connection down.
    Close,
}

/// Result of draining the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The socket has no more bytes for now.
    Drained,
    /// The read buffer is full.
    Full,
    /// The peer closed its side.
    Closed,
}

/// Protocol state of one client connection.
///
/// A worker owns the value for the duration of one [`HttpConnection::run`]
/// call and everything happens synchronously inside it: draining the socket,
/// parsing, resolving the target, and writing as much of the response as the
/// socket accepts.
///
/// ```text
///        ┌─────────────┐
///        │   Reading   │ ← drain socket, parse, NeedRead if incomplete
///        └──────┬──────┘
///               │ Request complete (or malformed → 400)
///               ▼
///        ┌──────────────────┐
///        │   Responding     │ ← resolve file, build head + segments
///        └──────┬───────────┘
///               ▼
///        ┌──────────────────┐
///        │    Writing       │ ← NeedWrite while the socket is full
///        └──────┬───────────┘
///               ├─ keep-alive → reset, Reading
///               └─ close → Close
/// ```
pub struct HttpConnection<S> {
    stream: S,
    peer: SocketAddr,
    site: Arc<DocRoot>,
    read_buf: Box<[u8]>,
    read_idx: usize,
    parser: RequestParser,
    writer: Option<ResponseWriter>,
    requests_served: u64,
}

impl<S: Read + Write> HttpConnection<S> {
    pub fn new(stream: S, peer: SocketAddr, site: Arc<DocRoot>) -> Self {
        Self {
            stream,
            peer,
            site,
            read_buf: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            read_idx: 0,
            parser: RequestParser::new(READ_BUFFER_SIZE),
            writer: None,
            requests_served: 0,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    /// Bytes received and not yet discarded by a reset.
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf[..self.read_idx]
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    pub fn has_pending_response(&self) -> bool {
        self.writer.is_some()
    }

    /// One worker invocation.
    pub fn run(&mut self, readiness: Readiness) -> Outcome {
        if readiness == Readiness::Write || self.writer.is_some() {
            return self.write();
        }

        match self.read() {
            Ok(ReadStatus::Closed) => {
                debug!(peer = %self.peer, "peer closed connection");
                Outcome::Close
            }
            Ok(ReadStatus::Drained | ReadStatus::Full) => self.process(),
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "read failed");
                Outcome::Close
            }
        }
    }

    /// Drains the socket into the read buffer.
    pub fn read(&mut self) -> io::Result<ReadStatus> {
        loop {
            if self.read_idx == self.read_buf.len() {
                return Ok(ReadStatus::Full);
            }
            match self.stream.read(&mut self.read_buf[self.read_idx..]) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => self.read_idx += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadStatus::Drained),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Parses what has been read so far and, once the request is complete,
    /// composes the response and starts writing it.
    pub fn process(&mut self) -> Outcome {
        match self.parser.parse(&self.read_buf[..self.read_idx]) {
            Ok(ParseStatus::Incomplete) => {
                if self.read_idx == self.read_buf.len() {
                    warn!(peer = %self.peer, "request exceeds read buffer");
                    return Outcome::Close;
                }
                Outcome::NeedRead
            }
            Ok(ParseStatus::Complete) => {
                let response = self.respond();
                self.start_response(response)
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "bad request");
                self.start_response(Response::error(StatusCode::BadRequest))
            }
        }
    }

    /// Continues the pending response.
    pub fn write(&mut self) -> Outcome {
        let Some(writer) = self.writer.as_mut() else {
            // Nothing pending: a stale write readiness.
            return Outcome::NeedRead;
        };

        match writer.write_to(&mut self.stream) {
            Ok(WriteStatus::Pending) => Outcome::NeedWrite,
            Ok(WriteStatus::Complete) => {
                self.writer = None;
                self.requests_served += 1;
                if self.parser.head().keep_alive {
                    self.reset();
                    Outcome::KeepAlive
                } else {
                    Outcome::Close
                }
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "write failed");
                self.writer = None;
                Outcome::Close
            }
        }
    }

    /// Forgets the finished request so the next one parses from a clean
    /// buffer.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.read_idx = 0;
        self.writer = None;
    }

    fn respond(&self) -> Response {
        let head = self.parser.head();
        let body = self.parser.body(&self.read_buf[..self.read_idx]);

        match self.site.resolve(head.method, &head.path, body) {
            Ok(file) => {
                debug!(
                    peer = %self.peer,
                    method = head.method.as_str(),
                    path = %head.path,
                    file = %file.path.display(),
                    "serving file"
                );
                Response::file(file.map, file.content_type)
            }
            Err(e) => {
                debug!(peer = %self.peer, path = %head.path, error = %e, "resolution failed");
                Response::error(e.status())
            }
        }
    }

    fn start_response(&mut self, response: Response) -> Outcome {
        let keep_alive = self.parser.head().keep_alive;
        match ResponseWriter::new(response, keep_alive) {
            Ok(writer) => {
                self.writer = Some(writer);
                self.write()
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "failed to compose response");
                Outcome::Close
            }
        }
    }
}
