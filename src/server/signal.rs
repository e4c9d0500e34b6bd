//! Self-signal channel.
//!
//! Periodic ticks and shutdown requests reach the reactor as single bytes
//! written into a non-blocking pipe whose read end sits in the same poll as
//! the sockets. Anything can hold a [`SignalSender`]: the ticker thread, the
//! OS signal forwarder, a [`ShutdownHandle`](crate::server::ShutdownHandle).

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::event::Source;
use mio::unix::pipe;
use mio::{Interest, Registry, Token};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    /// Run timer eviction.
    Tick = 1,
    /// Leave the event loop after the current iteration.
    Terminate = 2,
}

impl Signal {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Signal::Tick),
            2 => Some(Signal::Terminate),
            _ => None,
        }
    }
}

/// Creates a connected sender/receiver pair.
pub fn channel() -> io::Result<(SignalSender, SignalReceiver)> {
    let (sender, receiver) = pipe::new()?;
    Ok((SignalSender(Arc::new(sender)), SignalReceiver(receiver)))
}

#[derive(Clone)]
pub struct SignalSender(Arc<pipe::Sender>);

impl SignalSender {
    pub fn send(&self, signal: Signal) -> io::Result<()> {
        loop {
            match (&*self.0).write(&[signal as u8]) {
                Ok(_) => return Ok(()),
                // A full pipe already holds undelivered signals.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct SignalReceiver(pipe::Receiver);

impl SignalReceiver {
    /// Reads every pending byte. Unknown bytes are skipped.
    pub fn drain(&mut self) -> io::Result<Vec<Signal>> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match self.0.read(&mut buf) {
                Ok(0) => return Ok(signals),
                Ok(n) => signals.extend(buf[..n].iter().copied().filter_map(Signal::from_byte)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(signals),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl Source for SignalReceiver {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.0.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.0.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.0.deregister(registry)
    }
}

/// Thread writing [`Signal::Tick`] once per period.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(sender: SignalSender, period: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("halfsync-ticker".to_string())
            .spawn(move || {
                loop {
                    thread::park_timeout(period);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = sender.send(Signal::Tick) {
                        debug!(error = %e, "tick channel closed");
                        break;
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

/// Forwards `SIGINT` and `SIGTERM` into the channel as
/// [`Signal::Terminate`].
pub struct SignalForwarder {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    pub fn install(sender: SignalSender) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("halfsync-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(signal, "shutdown signal received");
                    if sender.send(Signal::Terminate).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
