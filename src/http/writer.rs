use std::fmt::{self, Write as _};
use std::io::{self, IoSlice, Write};

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::http::mapped::MappedFile;
use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Size of the per-connection header buffer.
pub const WRITE_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head of {0} bytes exceeds the write buffer")]
    HeaderOverflow(usize),
    #[error("failed to format response head")]
    Format(#[from] fmt::Error),
}

/// Progress of a (possibly resumed) transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Every byte was handed to the socket.
    Complete,
    /// The socket stopped accepting bytes; resume on the next write readiness.
    Pending,
}

fn serialize_head(resp: &Response, keep_alive: bool) -> Result<BytesMut, ResponseError> {
    let mut buf = BytesMut::with_capacity(WRITE_BUFFER_SIZE);

    write!(
        buf,
        "{} {} {}\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: {}\r\n\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase(),
        resp.body.len(),
        resp.content_type,
        if keep_alive { "keep-alive" } else { "close" },
    )?;

    if let Body::Inline(text) = &resp.body {
        buf.put_slice(text.as_bytes());
    }

    if buf.len() > WRITE_BUFFER_SIZE {
        return Err(ResponseError::HeaderOverflow(buf.len()));
    }
    Ok(buf)
}

/// Scatter-gather transmission of one response.
///
/// Segment one is the header buffer (holding the whole page for inline
/// bodies); segment two is the mapped file, if any. `sent` counts bytes
/// already accepted by the socket across every attempt, and both segments
/// are re-derived from it, so a resumed write neither repeats nor skips
/// bytes.
#[derive(Debug)]
pub struct ResponseWriter {
    head: BytesMut,
    file: Option<MappedFile>,
    sent: usize,
    total: usize,
}

impl ResponseWriter {
    pub fn new(response: Response, keep_alive: bool) -> Result<Self, ResponseError> {
        let head = serialize_head(&response, keep_alive)?;
        let file = match response.body {
            Body::Mapped(file) => Some(file),
            Body::Inline(_) => None,
        };
        let total = head.len() + file.as_ref().map_or(0, |file| file.len());

        Ok(Self {
            head,
            file,
            sent: 0,
            total,
        })
    }

    pub fn bytes_sent(&self) -> usize {
        self.sent
    }

    pub fn remaining(&self) -> usize {
        self.total - self.sent
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.total
    }

    /// Writes until done or until the socket would block.
    pub fn write_to<W: Write>(&mut self, stream: &mut W) -> io::Result<WriteStatus> {
        while !self.is_complete() {
            let result = stream.write_vectored(&self.segments());
            match result {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteStatus::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(WriteStatus::Complete)
    }

    fn segments(&self) -> [IoSlice<'_>; 2] {
        let body = self.file.as_ref().map_or(&[][..], MappedFile::as_bytes);

        let head_len = self.head.len();
        if self.sent < head_len {
            [IoSlice::new(&self.head[self.sent..]), IoSlice::new(body)]
        } else {
            [IoSlice::new(&body[self.sent - head_len..]), IoSlice::new(&[])]
        }
    }
}
