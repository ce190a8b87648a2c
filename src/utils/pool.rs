//! Reusable scratch buffers.
//!
//! Patch-authored code runs on every host tick and often needs a short-lived list (for example
//! the per-poll role tally of the round-end machine). [`ObjectPool`] hands out buffers from a
//! lock-free multi-producer/multi-consumer queue so that steady-state ticks do not allocate.
//!
//! The pool is unbounded and never evicts. Every buffer is reset when it is released, so a
//! buffer obtained from the pool is always empty.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::utils::ListPool;
//!
//! let pool: ListPool<u32> = ListPool::new();
//! let mut list = pool.get();
//! list.extend([1, 2, 3]);
//! pool.release(list);
//!
//! let reused = pool.get();
//! assert!(reused.is_empty());
//! assert!(reused.capacity() >= 3);
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::Hash,
    ops::{Deref, DerefMut},
};

use crossbeam::queue::SegQueue;

/// A value that can be cleared and reused.
pub trait Poolable: Default {
    /// Removes all contents, keeping allocated capacity.
    fn reset(&mut self);
}

impl<T> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V> Poolable for HashMap<K, V> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Poolable for HashSet<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Unbounded pool of reusable values.
pub struct ObjectPool<T: Poolable> {
    idle: SegQueue<T>,
}

/// Pool of `Vec<T>` buffers.
pub type ListPool<T> = ObjectPool<Vec<T>>;

/// Pool of `HashMap<K, V>` buffers.
pub type MapPool<K, V> = ObjectPool<HashMap<K, V>>;

impl<T: Poolable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle.len())
            .finish()
    }
}

impl<T: Poolable> ObjectPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle: SegQueue::new(),
        }
    }

    /// Takes an idle value, or creates a new one.
    #[must_use]
    pub fn get(&self) -> T {
        self.idle.pop().unwrap_or_default()
    }

    /// Resets `value` and stores it for reuse.
    pub fn release(&self, mut value: T) {
        value.reset();
        self.idle.push(value);
    }

    /// Takes a value wrapped in a guard that releases it when dropped.
    #[must_use]
    pub fn scoped(&self) -> Pooled<'_, T> {
        Pooled {
            pool: self,
            value: Some(self.get()),
        }
    }

    /// Number of idle values.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }
}

impl<T> ObjectPool<Vec<T>> {
    /// Takes a list with room for at least `capacity` elements.
    #[must_use]
    pub fn get_with_capacity(&self, capacity: usize) -> Vec<T> {
        match self.idle.pop() {
            Some(mut list) => {
                list.reserve(capacity);
                list
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Takes a list filled with `items`.
    pub fn get_from(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut list = self.get();
        list.extend(items);
        list
    }

    /// Releases `list` and returns its former contents.
    ///
    /// The elements move out; the allocation goes back to the pool.
    pub fn release_into_boxed(&self, mut list: Vec<T>) -> Box<[T]> {
        let contents: Box<[T]> = list.drain(..).collect();
        self.release(list);
        contents
    }
}

/// A pooled value that returns itself to its pool on drop.
pub struct Pooled<'a, T: Poolable> {
    pool: &'a ObjectPool<T>,
    value: Option<T>,
}

impl<T: Poolable> Pooled<'_, T> {
    /// Detaches the value from the pool; it will not be released.
    #[must_use]
    pub fn into_inner(mut self) -> T {
        self.value.take().unwrap_or_default()
    }
}

impl<T: Poolable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `into_inner` and `drop` take the value, and both consume the guard
        self.value.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Poolable + fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

impl<K: Eq + Hash, V> ObjectPool<HashMap<K, V>> {
    /// Takes a map with room for at least `capacity` entries.
    #[must_use]
    pub fn get_with_capacity(&self, capacity: usize) -> HashMap<K, V> {
        let mut map = self.get();
        map.reserve(capacity);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_released_lists_come_back_empty() {
        let pool: ListPool<String> = ListPool::new();
        let mut list = pool.get_with_capacity(16);
        list.push("stale".to_string());
        pool.release(list);
        assert_eq!(pool.idle_len(), 1);

        let list = pool.get();
        assert!(list.is_empty());
        assert!(list.capacity() >= 16);
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn test_get_from_and_boxed_release() {
        let pool: ListPool<u8> = ListPool::new();
        let list = pool.get_from([1, 2, 3]);
        let boxed = pool.release_into_boxed(list);
        assert_eq!(&*boxed, &[1, 2, 3]);
        assert_eq!(pool.idle_len(), 1);
        assert!(pool.get().is_empty());
    }

    #[test]
    fn test_scoped_guard() {
        let pool: MapPool<&str, u32> = MapPool::new();
        {
            let mut map = pool.scoped();
            map.insert("a", 1);
            assert_eq!(map.len(), 1);
        }
        assert_eq!(pool.idle_len(), 1);
        assert!(pool.get_with_capacity(4).is_empty());

        let detached = pool.scoped().into_inner();
        assert!(detached.is_empty());
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn test_concurrent_get_and_release() {
        let pool: Arc<ListPool<usize>> = Arc::new(ListPool::new());
        let workers: Vec<_> = (0..4)
            .map(|id| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for n in 0..250 {
                        let mut list = pool.get();
                        assert!(list.is_empty());
                        list.extend([id, n]);
                        pool.release(list);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(pool.idle_len() >= 1 && pool.idle_len() <= 4);
    }
}
