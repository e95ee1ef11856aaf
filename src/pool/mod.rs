//! Failover pool of interchangeable endpoint handles
//!
//! Handles are shuffled once at construction so the first configured endpoint
//! does not take all initial traffic. The cursor is a single atomic counter;
//! `next()` is safe to call from concurrent swap tasks.

pub mod retry;

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::error::{Error, Result};
use crate::random::EntropyGenerator;

pub use retry::with_retry;

/// Fixed-size round-robin pool
#[derive(Debug)]
pub struct EndpointPool<T> {
    handles: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> EndpointPool<T> {
    /// Build a pool, shuffling the handles with OS entropy
    pub fn new(handles: Vec<T>) -> Result<Self> {
        Self::with_shuffle(handles, |items| EntropyGenerator::new().shuffle(items))
    }

    /// Build a pool with a caller-provided shuffle
    pub fn with_shuffle<F>(mut handles: Vec<T>, shuffle: F) -> Result<Self>
    where
        F: FnOnce(&mut [T]),
    {
        if handles.is_empty() {
            return Err(Error::EmptyPool);
        }

        shuffle(&mut handles);
        info!("Endpoint pool initialized with {} handles", handles.len());

        Ok(Self {
            handles,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Handle at the cursor, without advancing
    pub fn current(&self) -> &T {
        let index = self.cursor.load(Ordering::SeqCst) % self.handles.len();
        &self.handles[index]
    }

    /// Handle at the cursor, then advance by one
    pub fn next(&self) -> &T {
        &self.handles[self.claim()]
    }

    /// Total number of handles
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Advance the cursor and return the slot that was claimed
    pub(crate) fn claim(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::SeqCst) % self.handles.len()
    }

    /// Handle `offset` slots after `start`, wrapping around
    pub(crate) fn at(&self, start: usize, offset: usize) -> &T {
        &self.handles[(start + offset) % self.handles.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_empty_pool_fails() {
        let result = EndpointPool::<String>::new(Vec::new());
        assert!(matches!(result, Err(Error::EmptyPool)));
    }

    #[test]
    fn test_round_robin_visits_each_once() {
        let handles: Vec<String> = (0..5).map(|i| format!("https://rpc-{}.example", i)).collect();
        let pool = EndpointPool::new(handles.clone()).unwrap();

        let first_pass: Vec<String> = (0..pool.size()).map(|_| pool.next().clone()).collect();
        let unique: HashSet<&String> = first_pass.iter().collect();
        assert_eq!(unique.len(), 5);
        assert!(handles.iter().all(|h| unique.contains(h)));

        // N+1-th call wraps to the first handle of the shuffled order
        assert_eq!(pool.next(), &first_pass[0]);
    }

    #[test]
    fn test_current_does_not_advance() {
        let pool = EndpointPool::with_shuffle(vec!["a", "b", "c"], |_| {}).unwrap();

        assert_eq!(*pool.current(), "a");
        assert_eq!(*pool.current(), "a");
        assert_eq!(*pool.next(), "a");
        assert_eq!(*pool.current(), "b");
    }

    #[test]
    fn test_at_wraps() {
        let pool = EndpointPool::with_shuffle(vec![1, 2, 3], |_| {}).unwrap();
        assert_eq!(*pool.at(2, 0), 3);
        assert_eq!(*pool.at(2, 1), 1);
        assert_eq!(*pool.at(2, 2), 2);
    }

    #[test]
    fn test_concurrent_next_is_balanced() {
        let pool = Arc::new(EndpointPool::with_shuffle(vec![0usize, 1, 2, 3], |_| {}).unwrap());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut counts = [0usize; 4];
                    for _ in 0..1000 {
                        counts[*pool.next()] += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals = [0usize; 4];
        for worker in workers {
            for (slot, count) in worker.join().unwrap().iter().enumerate() {
                totals[slot] += count;
            }
        }

        // 4000 atomic increments spread exactly evenly across 4 slots
        assert!(totals.iter().all(|&c| c == 1000));
    }
}
