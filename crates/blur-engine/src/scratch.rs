//! Scratch buffers for the horizontal blur pass.
//!
//! The pool starts with a fixed number of buffers sized for the processor's
//! maximum dimensions. Each running job checks one out and the buffer goes
//! back when the [`ScratchBuf`] is dropped, so no two workers ever share a
//! buffer. When every pooled buffer is busy a new one is allocated and joins
//! the pool on return. Requests larger than the pooled size get a one-off
//! buffer that is freed afterwards.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blur_core::{Error, Result};
use tracing::{debug, trace};

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Shared pool of equally sized byte buffers.
#[derive(Debug)]
pub struct ScratchPool {
    buffer_len: usize,
    free: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl ScratchPool {
    /// Pre-allocates `count` buffers of `buffer_len` bytes.
    pub fn new(buffer_len: usize, count: usize) -> Result<Arc<Self>> {
        let mut free = Vec::with_capacity(count);
        for _ in 0..count {
            free.push(try_alloc(buffer_len)?);
        }
        debug!(buffer_len, count, "Allocated scratch buffers");
        Ok(Arc::new(Self {
            buffer_len,
            free: Mutex::new(free),
            closed: AtomicBool::new(false),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Size of pooled buffers.
    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Buffers currently idle in the pool.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Takes a buffer holding at least `needed` bytes.
    pub fn checkout(self: &Arc<Self>, needed: usize) -> Result<ScratchBuf> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ProcessorDestroyed);
        }
        if needed > self.buffer_len {
            trace!(needed, pooled = self.buffer_len, "One-off scratch buffer");
            return Ok(ScratchBuf {
                buf: try_alloc(needed)?,
                home: None,
            });
        }
        let pooled = self.lock().pop();
        let buf = match pooled {
            Some(buf) => buf,
            None => {
                trace!(len = self.buffer_len, "Growing scratch pool");
                try_alloc(self.buffer_len)?
            }
        };
        Ok(ScratchBuf {
            buf,
            home: Some(Arc::clone(self)),
        })
    }

    /// Frees idle buffers and stops taking returns.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let freed = std::mem::take(&mut *self.lock());
        debug!(freed = freed.len(), "Released scratch buffers");
    }

    fn give_back(&self, buf: Vec<u8>) {
        if !self.closed.load(Ordering::Acquire) {
            self.lock().push(buf);
        }
    }
}

/// A checked-out scratch buffer; returns to its pool on drop.
#[derive(Debug)]
pub struct ScratchBuf {
    buf: Vec<u8>,
    home: Option<Arc<ScratchPool>>,
}

impl Deref for ScratchBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for ScratchBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for ScratchBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.home.take() {
            pool.give_back(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_and_return() {
        let pool = ScratchPool::new(64, 2).unwrap();
        assert_eq!(pool.available(), 2);
        {
            let a = pool.checkout(10).unwrap();
            let b = pool.checkout(64).unwrap();
            assert_eq!(a.len(), 64);
            assert_eq!(b.len(), 64);
            assert_eq!(pool.available(), 0);

            // Third concurrent user grows the pool
            let c = pool.checkout(1).unwrap();
            assert_eq!(c.len(), 64);
        }
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_oversized_is_one_off() {
        let pool = ScratchPool::new(16, 1).unwrap();
        {
            let big = pool.checkout(100).unwrap();
            assert_eq!(big.len(), 100);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_close() {
        let pool = ScratchPool::new(16, 2).unwrap();
        let held = pool.checkout(8).unwrap();
        pool.close();
        assert_eq!(pool.available(), 0);
        drop(held);
        assert_eq!(pool.available(), 0);
        assert!(pool.checkout(8).is_err());
    }
}
