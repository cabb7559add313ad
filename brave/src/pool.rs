use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// A buffer type that can be rented from a [`Pool`].
pub trait Reusable: Default {
    fn fresh() -> Self;

    /// Clears the buffer for its next renter. Returns `false` when the buffer
    /// no longer has the pool's standard shape and must be dropped instead.
    fn reset(&mut self) -> bool;
}

/// A bounded free list of reusable buffers.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    retain: usize,
}

impl<T: Reusable> Pool<T> {
    pub const fn new(retain: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            retain,
        }
    }

    pub fn rent(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_else(T::fresh);
        Pooled { pool: self, item }
    }

    fn give_back(&self, mut item: T) {
        if !item.reset() {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.retain {
            free.push(item);
        }
    }

    /// Number of buffers currently waiting to be rented.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

/// A rented buffer. Returned to its pool exactly once, when dropped.
pub struct Pooled<'p, T: Reusable> {
    pool: &'p Pool<T>,
    item: T,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // The default left behind owns no allocation.
        self.pool.give_back(std::mem::take(&mut self.item));
    }
}

/// Scratch text buffer used by the identifier slow path.
pub const SCRATCH_CAPACITY: usize = 64;

impl Reusable for String {
    fn fresh() -> Self {
        String::with_capacity(SCRATCH_CAPACITY)
    }

    fn reset(&mut self) -> bool {
        self.clear();
        self.capacity() == SCRATCH_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_returns_on_drop() {
        let pool: Pool<String> = Pool::new(4);
        {
            let mut buf = pool.rent();
            buf.push_str("abc");
        }
        assert_eq!(pool.available(), 1);
        let buf = pool.rent();
        assert!(buf.is_empty());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn grown_buffer_is_discarded() {
        let pool: Pool<String> = Pool::new(4);
        {
            let mut buf = pool.rent();
            buf.push_str(&"x".repeat(SCRATCH_CAPACITY * 2));
        }
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn retain_bound_is_respected() {
        let pool: Pool<String> = Pool::new(1);
        let a = pool.rent();
        let b = pool.rent();
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 1);
    }
}
