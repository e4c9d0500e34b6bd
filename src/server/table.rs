//! Connection table.
//!
//! Fixed-capacity registry from poll token to connection state. Only the
//! reactor thread touches it. A slot either holds its connection (idle,
//! waiting for readiness) or is leased: the connection travels inside a
//! worker task and comes back through [`ConnectionTable::restore`].
//!
//! Readiness that shows up while a slot is leased, or for the interest the
//! slot is not armed for, is remembered and consumed when the slot is armed
//! for it. Together with the lease this gives one-shot semantics on top of
//! an edge-triggered poll: a connection is never handed to a second worker
//! while one is running it, and no edge is lost in between.

use mio::Token;
use slab::Slab;

use crate::http::connection::Readiness;
use crate::timer::TimerHandle;

/// A connection handed out for one worker run.
#[derive(Debug)]
pub struct Lease<C> {
    pub conn: C,
    pub serial: u64,
    pub readiness: Readiness,
}

/// Table entry for one live connection.
#[derive(Debug)]
pub struct Entry<C, H> {
    /// Distinguishes this connection from later ones reusing the token.
    pub serial: u64,
    /// Socket handle kept by the reactor for teardown.
    pub handle: H,
    pub timer: Option<TimerHandle>,
    armed: Readiness,
    pending_read: bool,
    pending_write: bool,
    conn: Option<C>,
}

impl<C, H> Entry<C, H> {
    pub fn is_leased(&self) -> bool {
        self.conn.is_none()
    }

    pub fn armed(&self) -> Readiness {
        self.armed
    }

    fn try_lease(&mut self) -> Option<Lease<C>> {
        let pending = match self.armed {
            Readiness::Read => &mut self.pending_read,
            Readiness::Write => &mut self.pending_write,
        };
        if !*pending || self.conn.is_none() {
            return None;
        }
        *pending = false;

        let conn = self.conn.take()?;
        Some(Lease {
            conn,
            serial: self.serial,
            readiness: self.armed,
        })
    }
}

pub struct ConnectionTable<C, H> {
    slab: Slab<Entry<C, H>>,
    capacity: usize,
    next_serial: u64,
}

impl<C, H> ConnectionTable<C, H> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Slab::with_capacity(capacity.min(4096)),
            capacity,
            next_serial: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slab.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores a new connection armed for reading. `None` when full.
    pub fn insert(&mut self, handle: H, conn: C) -> Option<(Token, u64)> {
        if self.is_full() {
            return None;
        }
        let serial = self.next_serial;
        self.next_serial += 1;

        let key = self.slab.insert(Entry {
            serial,
            handle,
            timer: None,
            armed: Readiness::Read,
            pending_read: false,
            pending_write: false,
            conn: Some(conn),
        });
        Some((Token(key), serial))
    }

    pub fn get(&self, token: Token) -> Option<&Entry<C, H>> {
        self.slab.get(token.0)
    }

    pub fn set_timer(&mut self, token: Token, timer: TimerHandle) {
        if let Some(entry) = self.slab.get_mut(token.0) {
            entry.timer = Some(timer);
        }
    }

    pub fn timer(&self, token: Token) -> Option<TimerHandle> {
        self.slab.get(token.0).and_then(|entry| entry.timer)
    }

    /// True when `token` still names the connection with `serial`.
    pub fn is_current(&self, token: Token, serial: u64) -> bool {
        self.slab
            .get(token.0)
            .is_some_and(|entry| entry.serial == serial)
    }

    /// Records readiness and leases the connection if it is idle and armed
    /// for what arrived.
    pub fn note_ready(&mut self, token: Token, readable: bool, writable: bool) -> Option<Lease<C>> {
        let entry = self.slab.get_mut(token.0)?;
        entry.pending_read |= readable;
        entry.pending_write |= writable;
        entry.try_lease()
    }

    /// Returns a leased connection and re-arms the slot for `armed`.
    ///
    /// When readiness for `armed` already arrived during the lease, the
    /// connection is leased out again immediately. A completion whose slot
    /// is gone or was reused gets its connection back as `Err`.
    pub fn restore(
        &mut self,
        token: Token,
        serial: u64,
        conn: C,
        armed: Readiness,
    ) -> Result<Option<Lease<C>>, C> {
        let Some(entry) = self.slab.get_mut(token.0) else {
            return Err(conn);
        };
        if entry.serial != serial || entry.conn.is_some() {
            return Err(conn);
        }
        entry.conn = Some(conn);
        entry.armed = armed;
        Ok(entry.try_lease())
    }

    pub fn remove(&mut self, token: Token) -> Option<Entry<C, H>> {
        self.slab.try_remove(token.0)
    }

    /// Empties the table, yielding every entry.
    pub fn drain(&mut self) -> impl Iterator<Item = Entry<C, H>> + '_ {
        self.slab.drain()
    }
}
