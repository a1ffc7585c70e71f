//! Pre-allocated ring of transmit buffers. Borrowed buffers are removed
//! from the pool's `Vec` entirely and wrapped in an RAII guard, so a
//! double-release is a type error rather than a runtime hazard: there is no
//! slot left behind to release twice.

use parking_lot::Mutex;

pub const POOL_CAPACITY: usize = 256;
pub const BUFFER_SIZE: usize = 1500;

struct PoolInner {
    free: Vec<Vec<u8>>,
}

pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new() -> Self {
        let mut free = Vec::with_capacity(POOL_CAPACITY);
        for _ in 0..POOL_CAPACITY {
            free.push(vec![0u8; BUFFER_SIZE]);
        }
        Self { inner: Mutex::new(PoolInner { free }) }
    }

    /// Borrows a buffer. Returns `None` immediately (never blocks) if the
    /// pool is exhausted.
    pub fn acquire(&self) -> Option<PooledBuffer<'_>> {
        let mut inner = self.inner.lock();
        inner.free.pop().map(|buf| PooledBuffer { pool: self, buf: Some(buf) })
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        buf.resize(BUFFER_SIZE, 0);
        self.inner.lock().free.push(buf);
    }

    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle to a borrowed buffer. Dropping it without calling
/// [`PooledBuffer::into_inner`] returns the buffer to the pool automatically.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl<'a> PooledBuffer<'a> {
    /// Takes ownership of the underlying buffer, transferring it to the
    /// transmit path. The pool's claim on it ends here; it will not be
    /// returned to the pool by `Drop`.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.take().expect("buffer already taken")
    }
}

impl<'a> std::ops::Deref for PooledBuffer<'a> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer already taken")
    }
}

impl<'a> std::ops::DerefMut for PooledBuffer<'a> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer already taken")
    }
}

impl<'a> Drop for PooledBuffer<'a> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reduces_available_count() {
        let pool = BufferPool::new();
        assert_eq!(pool.available(), POOL_CAPACITY);
        let _buf = pool.acquire().unwrap();
        assert_eq!(pool.available(), POOL_CAPACITY - 1);
    }

    #[test]
    fn drop_returns_buffer_to_pool() {
        let pool = BufferPool::new();
        {
            let _buf = pool.acquire().unwrap();
            assert_eq!(pool.available(), POOL_CAPACITY - 1);
        }
        assert_eq!(pool.available(), POOL_CAPACITY);
    }

    #[test]
    fn into_inner_does_not_return_to_pool() {
        let pool = BufferPool::new();
        let buf = pool.acquire().unwrap();
        let owned = buf.into_inner();
        assert_eq!(owned.len(), BUFFER_SIZE);
        assert_eq!(pool.available(), POOL_CAPACITY - 1);
    }

    #[test]
    fn exhaustion_returns_none_without_blocking() {
        let pool = BufferPool::new();
        let mut held = Vec::new();
        for _ in 0..POOL_CAPACITY {
            held.push(pool.acquire().unwrap());
        }
        assert!(pool.acquire().is_none());
    }
}
