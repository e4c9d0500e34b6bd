use std::io::{self, IoSlice, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_queue::SegQueue;
use mio::net::{TcpListener, TcpStream};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::auth::{CredentialPool, CredentialStore};
use crate::config::Config;
use crate::http::connection::{HttpConnection, Outcome, Readiness};
use crate::http::resolve::DocRoot;
use crate::pool::{Rejected, ThreadPool};
use crate::server::listener;
use crate::server::signal::{self, Signal, SignalForwarder, SignalReceiver, SignalSender, Ticker};
use crate::server::table::{ConnectionTable, Lease};
use crate::timer::TimerList;

const LISTENER: Token = Token(usize::MAX - 1);
const SIGNALS: Token = Token(usize::MAX - 2);
const WAKER: Token = Token(usize::MAX - 3);

const EVENTS_CAPACITY: usize = 1024;

/// Client socket shared between the reactor, which keeps it for teardown,
/// and the worker currently running the connection.
pub struct SharedStream(Arc<TcpStream>);

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.0).read(buf)
    }
}

impl Write for SharedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        (&*self.0).write_vectored(bufs)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

type Conn = HttpConnection<SharedStream>;

/// Unit of work handed to the pool.
pub struct Task {
    token: Token,
    serial: u64,
    readiness: Readiness,
    conn: Conn,
}

/// A worker's report back to the reactor.
pub struct Completion {
    token: Token,
    serial: u64,
    outcome: Outcome,
    conn: Conn,
}

/// Asks a running [`Server`] to stop. Cloneable and usable from any thread.
#[derive(Clone)]
pub struct ShutdownHandle(SignalSender);

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.0.send(Signal::Terminate)
    }
}

/// The reactor: owns the poll, the listening socket, the connection table
/// and the timer list, and feeds ready connections to the worker pool.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    signals: SignalReceiver,
    sender: SignalSender,
    completions: Arc<SegQueue<Completion>>,
    pool: ThreadPool<Task>,
    table: ConnectionTable<Conn, Arc<TcpStream>>,
    timers: TimerList<(Token, u64)>,
    site: Arc<DocRoot>,
    timeslot: Duration,
    idle_timeout: Duration,
    forwarder: Option<SignalForwarder>,
}

impl Server {
    /// Binds the listening socket and starts the worker pool. Nothing is
    /// accepted until [`Server::run`].
    pub fn bind(config: Config, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let poll = Poll::new().context("failed to create poll instance")?;
        let mut listener = listener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listener")?;

        let (sender, mut signals) = signal::channel().context("failed to create signal channel")?;
        poll.registry()
            .register(&mut signals, SIGNALS, Interest::READABLE)
            .context("failed to register signal channel")?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER).context("failed to create waker")?);
        let completions = Arc::new(SegQueue::new());

        let pool = {
            let completions = Arc::clone(&completions);
            let waker = Arc::clone(&waker);
            ThreadPool::new(config.threads, config.max_requests, move |task: Task| {
                let Task {
                    token,
                    serial,
                    readiness,
                    mut conn,
                } = task;
                let outcome = run_guarded(token, &mut conn, readiness);
                completions.push(Completion {
                    token,
                    serial,
                    outcome,
                    conn,
                });
                if let Err(e) = waker.wake() {
                    error!(error = %e, "failed to wake reactor");
                }
            })
            .context("failed to start worker pool")?
        };

        if !config.doc_root.is_dir() {
            warn!(root = %config.doc_root.display(), "document root is not a directory");
        }
        let credentials = CredentialPool::for_store(
            store,
            config.credential_connections,
            config.credential_timeout(),
        );
        let site = Arc::new(DocRoot::new(config.doc_root.clone(), credentials));

        Ok(Self {
            poll,
            listener,
            local_addr,
            signals,
            sender,
            completions,
            pool,
            table: ConnectionTable::with_capacity(config.max_connections),
            timers: TimerList::new(),
            site,
            timeslot: config.timeslot(),
            idle_timeout: config.idle_timeout(),
            forwarder: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.sender.clone())
    }

    /// Routes `SIGINT` and `SIGTERM` into the event loop as a shutdown
    /// request.
    pub fn forward_os_signals(&mut self) -> anyhow::Result<()> {
        let forwarder = SignalForwarder::install(self.sender.clone())
            .context("failed to install signal handlers")?;
        self.forwarder = Some(forwarder);
        Ok(())
    }

    /// Runs the event loop until a terminate signal arrives.
    pub fn run(mut self) -> anyhow::Result<()> {
        let _ticker = Ticker::spawn(self.sender.clone(), self.timeslot)
            .context("failed to start ticker")?;
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        info!(
            addr = %self.local_addr,
            threads = self.pool.threads(),
            max_requests = self.pool.capacity(),
            max_connections = self.table.capacity(),
            "server running"
        );

        let mut running = true;
        while running {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("poll failed");
            }

            let mut tick = false;
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    SIGNALS => {
                        for signal in self.signals.drain().context("failed to read signals")? {
                            match signal {
                                Signal::Tick => tick = true,
                                Signal::Terminate => running = false,
                            }
                        }
                    }
                    // Completions are drained after every batch.
                    WAKER => {}
                    token if event.is_error() || (event.is_read_closed() && event.is_write_closed()) => {
                        debug!(?token, "connection hung up");
                        self.close(token);
                    }
                    token => self.dispatch(
                        token,
                        event.is_readable() || event.is_read_closed(),
                        event.is_writable(),
                    ),
                }
            }

            self.drain_completions();
            if tick {
                self.tick();
            }
        }

        self.shutdown();
        Ok(())
    }

    fn accept(&mut self) {
        let Self {
            listener,
            poll,
            table,
            timers,
            site,
            idle_timeout,
            ..
        } = self;

        listener::accept_pending(listener, |stream, peer| {
            if table.is_full() {
                listener::reject_busy(stream, peer);
                return;
            }

            let stream = Arc::new(stream);
            let conn = HttpConnection::new(SharedStream(Arc::clone(&stream)), peer, Arc::clone(site));
            let fd = stream.as_raw_fd();
            let Some((token, serial)) = table.insert(stream, conn) else {
                return;
            };

            let interest = Interest::READABLE | Interest::WRITABLE;
            if let Err(e) = poll.registry().register(&mut SourceFd(&fd), token, interest) {
                warn!(%peer, error = %e, "failed to register connection");
                table.remove(token);
                return;
            }

            let timer = timers.add(Instant::now() + *idle_timeout, (token, serial));
            table.set_timer(token, timer);
            debug!(%peer, ?token, open = table.len(), "connection registered");
        });
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        if let Some(lease) = self.table.note_ready(token, readable, writable) {
            self.refresh_timer(token);
            self.submit(token, lease);
        }
    }

    fn submit(&mut self, token: Token, lease: Lease<Conn>) {
        let task = Task {
            token,
            serial: lease.serial,
            readiness: lease.readiness,
            conn: lease.conn,
        };
        if let Err(Rejected(task)) = self.pool.submit(task) {
            warn!(peer = %task.conn.peer(), queued = self.pool.queued(), "worker queue full, closing connection");
            drop(task);
            self.close(token);
        }
    }

    fn drain_completions(&mut self) {
        while let Some(Completion {
            token,
            serial,
            outcome,
            conn,
        }) = self.completions.pop()
        {
            let armed = match outcome {
                Outcome::NeedRead | Outcome::KeepAlive => Readiness::Read,
                Outcome::NeedWrite => Readiness::Write,
                Outcome::Close => {
                    if self.table.is_current(token, serial) {
                        debug!(peer = %conn.peer(), served = conn.requests_served(), "closing connection");
                        drop(conn);
                        self.close(token);
                    }
                    continue;
                }
            };

            match self.table.restore(token, serial, conn, armed) {
                Ok(next) => {
                    self.refresh_timer(token);
                    if let Some(lease) = next {
                        self.submit(token, lease);
                    }
                }
                Err(stale) => {
                    debug!(peer = %stale.peer(), "discarding completion for evicted connection");
                }
            }
        }
    }

    fn refresh_timer(&mut self, token: Token) {
        if let Some(timer) = self.table.timer(token) {
            self.timers.adjust(timer, Instant::now() + self.idle_timeout);
        }
    }

    fn tick(&mut self) {
        let mut expired = Vec::new();
        let evicted = self
            .timers
            .tick(Instant::now(), |(token, serial)| expired.push((token, serial)));

        for (token, serial) in expired {
            if self.table.is_current(token, serial) {
                self.close(token);
            }
        }
        if evicted > 0 {
            info!(evicted, open = self.table.len(), "closed idle connections");
        }
    }

    /// Forgets the connection: timer first, then poll registration, then the
    /// socket itself. A worker still holding the connection sees its next
    /// I/O fail.
    fn close(&mut self, token: Token) {
        let Some(entry) = self.table.remove(token) else {
            return;
        };
        if let Some(timer) = entry.timer {
            self.timers.remove(timer);
        }
        release_socket(self.poll.registry(), &entry.handle);
    }

    fn shutdown(&mut self) {
        info!(open = self.table.len(), "shutting down");
        for entry in self.table.drain() {
            release_socket(self.poll.registry(), &entry.handle);
        }
        self.timers = TimerList::new();
        self.pool.shutdown();
        // Whatever workers finished meanwhile only holds dead sockets.
        while self.completions.pop().is_some() {}
        self.forwarder = None;
    }
}

/// Runs one worker step. A panic inside the connection closes it, so the
/// reactor still gets a completion and frees the slot.
fn run_guarded<S: Read + Write>(
    token: Token,
    conn: &mut HttpConnection<S>,
    readiness: Readiness,
) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| conn.run(readiness))) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(?token, peer = %conn.peer(), "connection handler panicked");
            Outcome::Close
        }
    }
}

fn release_socket(registry: &Registry, stream: &TcpStream) {
    let fd = stream.as_raw_fd();
    if let Err(e) = registry.deregister(&mut SourceFd(&fd)) {
        debug!(error = %e, "failed to deregister connection");
    }
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        if e.kind() != io::ErrorKind::NotConnected {
            debug!(error = %e, "failed to shut down socket");
        }
    }
}
