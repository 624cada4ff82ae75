//! Anonymous shared memory blocks exchanged between the codec, the driver
//! and the user.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;

use crate::{HdiError, HdiResult};

static NEXT_FD: AtomicI32 = AtomicI32::new(3);

struct Inner {
    fd: i32,
    name: String,
    data: Mutex<BytesMut>,
}

/// A fixed-size shared memory block.
///
/// Cloning is cheap and yields another handle to the same block, the way a
/// duplicated file descriptor would. Who may touch the bytes at any moment
/// is decided by the buffer ownership protocol, not by this type.
#[derive(Clone)]
pub struct SharedMemory {
    inner: Arc<Inner>,
}

impl SharedMemory {
    /// Allocate a zero-filled block of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HdiError::OutOfMemory`] if `size` is zero.
    pub fn create(size: usize, name: impl Into<String>) -> HdiResult<Self> {
        if size == 0 {
            return Err(HdiError::OutOfMemory);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                fd: NEXT_FD.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                data: Mutex::new(BytesMut::zeroed(size)),
            }),
        })
    }

    /// Descriptor identifying this block.
    #[must_use]
    pub fn fd(&self) -> i32 {
        self.inner.fd
    }

    /// Debug name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Copy `src` into the block at `offset`. Returns the number of bytes
    /// written, which is truncated at the end of the block.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> usize {
        let mut data = self.lock();
        if offset >= data.len() {
            return 0;
        }
        let n = src.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&src[..n]);
        n
    }

    /// Copy `len` bytes starting at `offset` out of the block.
    #[must_use]
    pub fn read_at(&self, offset: usize, len: usize) -> Vec<u8> {
        let data = self.lock();
        let start = offset.min(data.len());
        let end = offset.saturating_add(len).min(data.len());
        data[start..end].to_vec()
    }

    /// Same underlying block.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("fd", &self.inner.fd)
            .field("name", &self.inner.name)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_zero_size_fails() {
        assert_eq!(SharedMemory::create(0, "x").unwrap_err(), HdiError::OutOfMemory);
    }

    #[test]
    fn test_write_read_truncates_at_end() {
        let mem = SharedMemory::create(4, "t").unwrap();
        assert_eq!(mem.write_at(2, &[1, 2, 3]), 2);
        assert_eq!(mem.read_at(0, 8), vec![0, 0, 1, 2]);
        assert_eq!(mem.write_at(9, &[1]), 0);
    }

    #[test]
    fn test_clones_share_storage() {
        let a = SharedMemory::create(2, "t").unwrap();
        let b = a.clone();
        b.write_at(0, &[7]);
        assert_eq!(a.read_at(0, 1), vec![7]);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.fd(), b.fd());
        let c = SharedMemory::create(2, "t").unwrap();
        assert_ne!(a.fd(), c.fd());
    }
}
