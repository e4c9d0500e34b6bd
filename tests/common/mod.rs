#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use halfsync::auth::{CredentialPool, CredentialStore, MemoryStore};
use halfsync::http::resolve::DocRoot;

/// One scripted outcome of a `read` call.
pub enum Step {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
}

/// In-memory socket. Reads follow the script and report `WouldBlock` once
/// it runs out; writes are accepted up to `write_budget` bytes.
pub struct MockStream {
    reads: VecDeque<Step>,
    pub output: Vec<u8>,
    write_budget: usize,
}

impl MockStream {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            output: Vec::new(),
            write_budget: usize::MAX,
        }
    }

    pub fn with_write_budget(budget: usize) -> Self {
        Self {
            write_budget: budget,
            ..Self::new()
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.reads.push_back(Step::Data(data.to_vec()));
    }

    pub fn push_would_block(&mut self) {
        self.reads.push_back(Step::WouldBlock);
    }

    pub fn push_eof(&mut self) {
        self.reads.push_back(Step::Eof);
    }

    pub fn grant(&mut self, bytes: usize) {
        self.write_budget = self.write_budget.saturating_add(bytes);
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Eof) => Ok(0),
            Some(Step::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_budget == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.write_budget);
        self.output.extend_from_slice(&buf[..n]);
        self.write_budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A parsed response: status code, raw head, body.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Splits consecutive responses out of `bytes` using their Content-Length.
pub fn parse_responses(mut bytes: &[u8]) -> Vec<RawResponse> {
    let mut responses = Vec::new();
    while !bytes.is_empty() {
        let end = bytes
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .expect("response head terminator");
        let head = String::from_utf8(bytes[..end].to_vec()).expect("utf-8 head");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");

        let mut response = RawResponse {
            status,
            head,
            body: Vec::new(),
        };
        let length: usize = response
            .header("Content-Length")
            .and_then(|value| value.parse().ok())
            .expect("content length");
        let body_start = end + 4;
        response.body = bytes[body_start..body_start + length].to_vec();
        bytes = &bytes[body_start + length..];
        responses.push(response);
    }
    responses
}

pub fn parse_response(bytes: &[u8]) -> RawResponse {
    let mut responses = parse_responses(bytes);
    assert_eq!(responses.len(), 1, "expected exactly one response");
    responses.remove(0)
}

pub fn write_file(root: &Path, name: &str, contents: &[u8], mode: u32) {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

/// Document root with the pages the routing table refers to.
pub fn populated_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for (name, body) in [
        ("judge.html", "<html>judge</html>"),
        ("register.html", "<html>register</html>"),
        ("login.html", "<html>login</html>"),
        ("welcome.html", "<html>welcome</html>"),
        ("loginError.html", "<html>login error</html>"),
        ("registerError.html", "<html>register error</html>"),
        ("picture.html", "<html>picture</html>"),
        ("video.html", "<html>video</html>"),
        ("fans.html", "<html>fans</html>"),
    ] {
        write_file(root, name, body.as_bytes(), 0o644);
    }
    dir
}

pub fn site(root: &Path, store: Arc<dyn CredentialStore>) -> Arc<DocRoot> {
    site_with_handles(root, store, 2)
}

/// Site whose form pages share `handles` credential handles and give up
/// after a short wait.
pub fn site_with_handles(
    root: &Path,
    store: Arc<dyn CredentialStore>,
    handles: usize,
) -> Arc<DocRoot> {
    let credentials = CredentialPool::for_store(store, handles, Duration::from_millis(50));
    Arc::new(DocRoot::new(root, credentials))
}

pub fn empty_store() -> Arc<dyn CredentialStore> {
    Arc::new(MemoryStore::new())
}
