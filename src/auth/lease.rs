use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::auth::store::CredentialStore;

/// Bounded set of reusable handles lent out one caller at a time.
///
/// [`LeasePool::acquire`] waits at most the configured timeout for a free
/// handle. The returned [`Checkout`] gives the handle back when it drops, so
/// every exit path releases it exactly once, errors and panics included.
pub struct LeasePool<T> {
    idle: Mutex<Vec<T>>,
    returned: Condvar,
    capacity: usize,
    acquire_timeout: Duration,
}

impl<T> LeasePool<T> {
    pub fn new(handles: Vec<T>, acquire_timeout: Duration) -> Self {
        Self {
            capacity: handles.len(),
            idle: Mutex::new(handles),
            returned: Condvar::new(),
            acquire_timeout,
        }
    }

    /// Takes a handle, waiting up to the acquire timeout. `None` when every
    /// handle stayed lent out for that long.
    pub fn acquire(&self) -> Option<Checkout<'_, T>> {
        let (mut idle, _) = self
            .returned
            .wait_timeout_while(self.lock(), self.acquire_timeout, |idle| idle.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        let Some(handle) = idle.pop() else {
            debug!(capacity = self.capacity, "lease pool exhausted");
            return None;
        };
        Some(Checkout {
            pool: self,
            handle: Some(handle),
        })
    }

    /// Takes a handle only if one is free right now.
    pub fn try_acquire(&self) -> Option<Checkout<'_, T>> {
        let handle = self.lock().pop()?;
        Some(Checkout {
            pool: self,
            handle: Some(handle),
        })
    }

    /// Handles not currently lent out.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, handle: T) {
        self.lock().push(handle);
        self.returned.notify_one();
    }
}

/// Pool of handles onto the credential backend.
pub type CredentialPool = LeasePool<Arc<dyn CredentialStore>>;

impl LeasePool<Arc<dyn CredentialStore>> {
    /// `connections` handles sharing one store.
    pub fn for_store(
        store: Arc<dyn CredentialStore>,
        connections: usize,
        acquire_timeout: Duration,
    ) -> Self {
        let handles = (0..connections).map(|_| Arc::clone(&store)).collect();
        Self::new(handles, acquire_timeout)
    }
}

/// A handle lent out by a [`LeasePool`].
pub struct Checkout<'a, T> {
    pool: &'a LeasePool<T>,
    handle: Option<T>,
}

impl<T> Deref for Checkout<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the handle out.
        self.handle.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for Checkout<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
