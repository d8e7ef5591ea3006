//! Pooled scratch buffers for the mapper's hot path (spec.md §5, §9:
//! "parser pooling... a lock-free free-list or equivalent"). `serde_json`
//! builds an owned `Value` tree regardless of how the bytes were sourced,
//! so pooling here amortises the one allocation the mapper still needs on
//! the string/byte-copy appenders rather than the parse step itself.

use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// A bounded free-list of reusable scratch buffers.
pub struct ParserPool {
    free: ArrayQueue<Vec<u8>>,
}

impl ParserPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: ArrayQueue::new(capacity.max(1)),
        })
    }

    /// Acquire a scratch buffer, creating a fresh one if the free-list is
    /// empty. Released back to the pool when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self.free.pop().unwrap_or_default();
        PooledBuffer {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    /// Number of buffers currently sitting in the free-list. Exposed for
    /// tests that check a buffer actually comes back after a guard drops.
    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }
}

pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<ParserPool>,
}

impl PooledBuffer {
    pub fn get_mut(&mut self) -> &mut Vec<u8> {
        self.buf.get_or_insert_with(Vec::new)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            let _ = self.pool.free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_returned_to_pool_on_drop() {
        let pool = ParserPool::new(2);
        {
            let mut guard = pool.acquire();
            guard.get_mut().extend_from_slice(b"hello");
        }
        assert_eq!(pool.free.len(), 1);
    }
}
