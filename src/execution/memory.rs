//! Memory accounting for operator state

use crate::error::{QueryError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Tracks bytes reserved by running operators against a fixed limit
#[derive(Debug)]
pub struct MemoryPool {
    max_memory: usize,
    used: AtomicUsize,
}

impl MemoryPool {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            used: AtomicUsize::new(0),
        }
    }

    /// Create a pool with no limit
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn try_acquire(&self, size: usize) -> bool {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new_usage = match current.checked_add(size) {
                Some(usage) if usage <= self.max_memory => usage,
                _ => return false,
            };

            match self.used.compare_exchange_weak(
                current,
                new_usage,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve `size` bytes on behalf of `consumer`.
    ///
    /// Fails with [`QueryError::ResourcesExhausted`] if the limit would be exceeded.
    pub fn try_reserve(&self, consumer: &str, size: usize) -> Result<MemoryReservation<'_>> {
        if !self.try_acquire(size) {
            return Err(self.exhausted(consumer, size));
        }
        trace!(consumer, size, used = self.used(), "Reserved memory");
        Ok(MemoryReservation {
            pool: self,
            consumer: consumer.to_string(),
            size,
        })
    }

    fn exhausted(&self, consumer: &str, size: usize) -> QueryError {
        QueryError::ResourcesExhausted(format!(
            "{} could not reserve {} bytes ({} of {} bytes in use)",
            consumer,
            size,
            self.used(),
            self.max_memory
        ))
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max_memory
    }

    pub fn available(&self) -> usize {
        self.max_memory.saturating_sub(self.used())
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::SeqCst);
    }
}

/// Bytes held in a [`MemoryPool`], returned when dropped
#[derive(Debug)]
pub struct MemoryReservation<'a> {
    pool: &'a MemoryPool,
    consumer: String,
    size: usize,
}

impl MemoryReservation<'_> {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn try_grow(&mut self, additional: usize) -> Result<()> {
        if !self.pool.try_acquire(additional) {
            return Err(self.pool.exhausted(&self.consumer, additional));
        }
        self.size += additional;
        Ok(())
    }

    /// Grow or shrink to exactly `new_size` bytes
    pub fn try_resize(&mut self, new_size: usize) -> Result<()> {
        if new_size > self.size {
            self.try_grow(new_size - self.size)
        } else {
            self.pool.release(self.size - new_size);
            self.size = new_size;
            Ok(())
        }
    }
}

impl Drop for MemoryReservation<'_> {
    fn drop(&mut self) {
        self.pool.release(self.size);
    }
}

pub type SharedMemoryPool = Arc<MemoryPool>;
