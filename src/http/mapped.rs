use std::ffi::c_void;
use std::fmt;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::ptr::NonNull;
use std::slice;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};
use tracing::warn;

/// Read-only memory mapping of a served file.
///
/// The mapping is released when the value drops, which covers a finished
/// response, a failed write, and a connection torn down mid-transfer alike.
pub struct MappedFile {
    ptr: NonNull<c_void>,
    len: NonZeroUsize,
}

// SAFETY: the mapping is read-only and owned by exactly one value.
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Maps `file` read-only. Zero-length files cannot be mapped; callers
    /// check the size first.
    pub fn map(file: &File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        let len = usize::try_from(size)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("cannot map {size} bytes"))
            })?;

        // SAFETY: a fresh private read-only mapping aliases no Rust memory.
        // Truncation by another process while a response is in flight is
        // not guarded against.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ,
                MapFlags::MAP_PRIVATE,
                file,
                0,
            )
        }?;
        Ok(Self { ptr, len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` and `len` describe a live PROT_READ mapping that
        // outlives the borrow of `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len.get()) }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        // SAFETY: the region was mapped in `map` and is unmapped only here.
        if let Err(e) = unsafe { munmap(self.ptr, self.len.get()) } {
            warn!(error = %e, "munmap failed");
        }
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFile")
            .field("len", &self.len)
            .finish()
    }
}
