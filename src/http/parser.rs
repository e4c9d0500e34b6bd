use std::ops::Range;

use thiserror::Error;
use tracing::{debug, trace};

use crate::http::line::{LineStatus, parse_line};
use crate::http::request::{Method, RequestHead};

/// Document served for a bare `/` target.
pub const DEFAULT_DOCUMENT: &str = "/judge.html";

/// Why a request was rejected. Every variant answers 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed line terminator")]
    MalformedLine,
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unsupported method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("invalid request target")]
    InvalidTarget,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("request body of {0} bytes does not fit the read buffer")]
    BodyTooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Incomplete,
    /// Request line, headers and body are all available.
    Complete,
}

/// Main request state machine: request line, headers, body.
///
/// The parser never owns the bytes. Each call receives the whole filled part
/// of the connection's read buffer and resumes from the cursors it kept, so
/// feeding a request in any number of pieces gives the same result as
/// feeding it at once.
#[derive(Debug, Clone)]
pub struct RequestParser {
    state: CheckState,
    start_line: usize,
    checked: usize,
    capacity: usize,
    head: RequestHead,
    body: Range<usize>,
}

impl RequestParser {
    /// `capacity` is the size of the buffer the request must fit into.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: CheckState::RequestLine,
            start_line: 0,
            checked: 0,
            capacity,
            head: RequestHead::default(),
            body: 0..0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// The request body inside `buf`, empty until parsing completed.
    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.body.clone()).unwrap_or_default()
    }

    pub fn parse(&mut self, buf: &[u8]) -> Result<ParseStatus, ParseError> {
        loop {
            match self.state {
                CheckState::Done => return Ok(ParseStatus::Complete),
                CheckState::Body => return Ok(self.parse_body(buf)),
                CheckState::RequestLine | CheckState::Headers => {}
            }

            let line = match parse_line(buf, self.start_line, &mut self.checked) {
                LineStatus::Ok(line) => line,
                LineStatus::Bad => return Err(ParseError::MalformedLine),
                LineStatus::Open => return Ok(ParseStatus::Incomplete),
            };
            self.start_line = self.checked;

            let text = &buf[line];
            trace!(line = %String::from_utf8_lossy(text), "got request line");

            if self.state == CheckState::RequestLine {
                self.parse_request_line(text)?;
                self.state = CheckState::Headers;
            } else if text.is_empty() {
                if self.head.content_length == 0 {
                    self.body = self.checked..self.checked;
                    self.state = CheckState::Done;
                    return Ok(ParseStatus::Complete);
                }
                let length = self.head.content_length;
                self.checked
                    .checked_add(length)
                    .filter(|end| *end <= self.capacity)
                    .ok_or(ParseError::BodyTooLarge(length))?;
                self.state = CheckState::Body;
            } else {
                self.parse_header(text)?;
            }
        }
    }

    fn parse_body(&mut self, buf: &[u8]) -> ParseStatus {
        let start = self.checked;
        // Bounded by `capacity` before entering the Body state.
        let end = start + self.head.content_length;
        if buf.len() < end {
            return ParseStatus::Incomplete;
        }
        self.body = start..end;
        self.state = CheckState::Done;
        ParseStatus::Complete
    }

    fn parse_request_line(&mut self, text: &[u8]) -> Result<(), ParseError> {
        let mut tokens = text
            .split(|b| *b == b' ' || *b == b'\t')
            .filter(|token| !token.is_empty());

        let method = tokens.next().ok_or(ParseError::InvalidRequest)?;
        let target = tokens.next().ok_or(ParseError::InvalidRequest)?;
        let version = tokens.next().ok_or(ParseError::InvalidRequest)?;
        if tokens.next().is_some() {
            return Err(ParseError::InvalidRequest);
        }

        self.head.method = Method::from_bytes(method).ok_or(ParseError::InvalidMethod)?;
        if !version.eq_ignore_ascii_case(b"HTTP/1.1") {
            return Err(ParseError::InvalidVersion);
        }
        self.head.path = normalize_target(target)?;
        Ok(())
    }

    fn parse_header(&mut self, text: &[u8]) -> Result<(), ParseError> {
        if let Some(value) = header_value(text, b"Connection:") {
            if value.eq_ignore_ascii_case(b"keep-alive") {
                self.head.keep_alive = true;
            }
        } else if let Some(value) = header_value(text, b"Content-Length:") {
            self.head.content_length = parse_content_length(value)?;
        } else if let Some(value) = header_value(text, b"Host:") {
            self.head.host = Some(String::from_utf8_lossy(value).into_owned());
        } else {
            debug!(header = %String::from_utf8_lossy(text), "unknown header");
        }
        Ok(())
    }
}

/// Reduces a request target to an absolute path.
///
/// An `http://` or `https://` prefix and its authority are dropped, the rest
/// must start with `/`, and `/` alone maps to [`DEFAULT_DOCUMENT`].
pub fn normalize_target(target: &[u8]) -> Result<String, ParseError> {
    let target = std::str::from_utf8(target).map_err(|_| ParseError::InvalidTarget)?;

    let path = match strip_scheme(target) {
        Some(rest) => {
            let slash = rest.find('/').ok_or(ParseError::InvalidTarget)?;
            &rest[slash..]
        }
        None => target,
    };

    if !path.starts_with('/') {
        return Err(ParseError::InvalidTarget);
    }
    if path == "/" {
        return Ok(DEFAULT_DOCUMENT.to_string());
    }
    Ok(path.to_string())
}

fn strip_scheme(target: &str) -> Option<&str> {
    ["http://", "https://"].iter().find_map(|scheme| {
        target
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &target[scheme.len()..])
    })
}

fn header_value<'a>(line: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    let prefix = line.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    Some(line[name.len()..].trim_ascii())
}

fn parse_content_length(value: &[u8]) -> Result<usize, ParseError> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidContentLength);
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(ParseError::InvalidContentLength)
}
