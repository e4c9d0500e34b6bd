//! Idle-connection timer list.
//!
//! Timers are kept in a doubly-linked list sorted ascending by expiry. The
//! links are indices into an arena of slots, so a [`TimerHandle`] stays valid
//! (or is detectably stale) no matter how the list is rearranged.
//!
//! ```text
//!  head                                         tail
//!   │                                            │
//!   ▼                                            ▼
//! ┌─────┐  next  ┌─────┐  next  ┌─────┐  next  ┌─────┐
//! │ t=3 │ ─────► │ t=5 │ ─────► │ t=5 │ ─────► │ t=9 │
//! │     │ ◄───── │     │ ◄───── │     │ ◄───── │     │
//! └─────┘  prev  └─────┘  prev  └─────┘  prev  └─────┘
//! ```
//!
//! Cost model:
//! - `add` is O(1) when the timer becomes the new head, otherwise a scan from
//!   the head.
//! - `adjust` only ever moves a timer later, so the scan starts at its old
//!   successor instead of the head.
//! - `remove` is O(1).
//! - `tick` touches exactly the timers that are due.

use std::time::Instant;

/// Stable reference to a timer in a [`TimerList`].
///
/// The generation guards against a slot being reused after its timer fired
/// or was removed: operations on a stale handle are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: usize,
    generation: u64,
}

struct Slot<T> {
    generation: u64,
    expire: Instant,
    payload: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Sorted-by-expiry timer list carrying a payload per timer.
///
/// The reactor stores the connection token as payload; the close action is
/// whatever the caller does with the payload handed to [`TimerList::tick`].
pub struct TimerList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Expiry of the earliest timer, if any.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.head.map(|index| self.slots[index].expire)
    }

    /// Expiry of a live timer.
    pub fn expiry(&self, handle: TimerHandle) -> Option<Instant> {
        self.resolve(handle).map(|index| self.slots[index].expire)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.resolve(handle).is_some()
    }

    /// All expiries in list order (head to tail).
    pub fn expiries(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            out.push(self.slots[index].expire);
            cursor = self.slots[index].next;
        }
        out
    }

    /// Inserts a timer. Timers with equal expiry keep insertion order.
    pub fn add(&mut self, expire: Instant, payload: T) -> TimerHandle {
        let index = self.allocate(expire, payload);
        self.link_from_head(index);
        self.len += 1;
        TimerHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Moves a timer to a new expiry.
    ///
    /// Returns `false` for a stale handle. When the timer still precedes its
    /// successor nothing moves; otherwise it is unlinked and reinserted by
    /// scanning forward from the old successor.
    pub fn adjust(&mut self, handle: TimerHandle, expire: Instant) -> bool {
        let Some(index) = self.resolve(handle) else {
            return false;
        };

        let previous = self.slots[index].expire;
        self.slots[index].expire = expire;

        if expire < previous {
            // Moving earlier cannot reuse the forward scan.
            self.unlink(index);
            self.link_from_head(index);
            return true;
        }

        let Some(successor) = self.slots[index].next else {
            return true;
        };
        if expire < self.slots[successor].expire {
            return true;
        }

        self.unlink(index);
        self.insert_after(index, successor);
        true
    }

    /// Removes a timer and returns its payload. Stale handles return `None`.
    pub fn remove(&mut self, handle: TimerHandle) -> Option<T> {
        let index = self.resolve(handle)?;
        self.unlink(index);
        self.len -= 1;
        self.release(index)
    }

    /// Evicts every timer with `expire <= now`, earliest first, handing each
    /// payload to `on_expire` exactly once. Returns the number evicted.
    pub fn tick<F>(&mut self, now: Instant, mut on_expire: F) -> usize
    where
        F: FnMut(T),
    {
        let mut evicted = 0;
        while let Some(index) = self.head {
            if now < self.slots[index].expire {
                break;
            }
            self.unlink(index);
            self.len -= 1;
            if let Some(payload) = self.release(index) {
                on_expire(payload);
                evicted += 1;
            }
        }
        evicted
    }

    fn resolve(&self, handle: TimerHandle) -> Option<usize> {
        let slot = self.slots.get(handle.index)?;
        (slot.generation == handle.generation && slot.payload.is_some()).then_some(handle.index)
    }

    fn allocate(&mut self, expire: Instant, payload: T) -> usize {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.expire = expire;
                slot.payload = Some(payload);
                slot.prev = None;
                slot.next = None;
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    expire,
                    payload: Some(payload),
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) -> Option<T> {
        let slot = &mut self.slots[index];
        let payload = slot.payload.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        payload
    }

    fn link_from_head(&mut self, index: usize) {
        match self.head {
            None => {
                self.slots[index].prev = None;
                self.slots[index].next = None;
                self.head = Some(index);
                self.tail = Some(index);
            }
            Some(head) if self.slots[index].expire < self.slots[head].expire => {
                self.slots[index].prev = None;
                self.slots[index].next = Some(head);
                self.slots[head].prev = Some(index);
                self.head = Some(index);
            }
            Some(head) => self.insert_after(index, head),
        }
    }

    /// Links `index` somewhere after `anchor`, which must not expire later
    /// than the timer being linked.
    fn insert_after(&mut self, index: usize, anchor: usize) {
        let expire = self.slots[index].expire;
        let mut prev = anchor;
        let mut cursor = self.slots[anchor].next;

        while let Some(current) = cursor {
            if expire < self.slots[current].expire {
                self.slots[prev].next = Some(index);
                self.slots[current].prev = Some(index);
                self.slots[index].prev = Some(prev);
                self.slots[index].next = Some(current);
                return;
            }
            prev = current;
            cursor = self.slots[current].next;
        }

        self.slots[prev].next = Some(index);
        self.slots[index].prev = Some(prev);
        self.slots[index].next = None;
        self.tail = Some(index);
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.slots[index].prev.take();
        let next = self.slots[index].next.take();

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
    }
}
