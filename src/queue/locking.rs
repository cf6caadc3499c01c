//! Bounded blocking queue shared between a stream worker and its caller.
//!
//! One producer thread and one consumer thread per instance. The queue either
//! blocks the producer when full or, in overwrite mode, evicts the oldest
//! item. [`LockingQueue::destruct`] wakes every waiter; after that all blocking
//! calls return [`QueueDestructed`] instead of waiting.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Returned by blocking operations once the queue has been destructed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queue destructed")]
pub struct QueueDestructed;

struct State<T> {
    items: VecDeque<T>,
    destructed: bool,
}

pub struct LockingQueue<T> {
    state: Mutex<State<T>>,
    /// Signalled when an item is pushed.
    not_empty: Condvar,
    /// Signalled when an item is popped.
    not_full: Condvar,
    /// Signalled when the length drops to zero.
    drained: Condvar,
    capacity: usize,
    overwrite: bool,
}

impl<T> LockingQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize, overwrite: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                destructed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            drained: Condvar::new(),
            capacity,
            overwrite,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // A panic while holding the lock cannot leave VecDeque half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_destructed(&self) -> bool {
        self.lock().destructed
    }

    fn pop_locked(&self, state: &mut State<T>) -> Option<T> {
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
            if state.items.is_empty() {
                self.drained.notify_all();
            }
        }
        item
    }

    fn push_locked(&self, state: &mut State<T>, item: T) {
        if state.items.len() >= self.capacity {
            // only reachable in overwrite mode
            state.items.pop_front();
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Enqueue `item`, blocking while full unless in overwrite mode.
    pub fn push(&self, item: T) -> Result<(), QueueDestructed> {
        let mut state = self.lock();
        if !self.overwrite {
            while state.items.len() >= self.capacity && !state.destructed {
                state = self.not_full.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        }
        if state.destructed {
            return Err(QueueDestructed);
        }
        self.push_locked(&mut state, item);
        Ok(())
    }

    /// Enqueue `item`, waiting at most `timeout` for space.
    ///
    /// Returns `Ok(false)` if the deadline passed with the queue still full.
    pub fn try_wait_and_push(&self, item: T, timeout: Duration) -> Result<bool, QueueDestructed> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        if !self.overwrite {
            while state.items.len() >= self.capacity && !state.destructed {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                let (guard, _) = self
                    .not_full
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(|e| e.into_inner());
                state = guard;
            }
        }
        if state.destructed {
            return Err(QueueDestructed);
        }
        self.push_locked(&mut state, item);
        Ok(true)
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        self.pop_locked(&mut state)
    }

    /// Block until an item is available.
    pub fn wait_and_pop(&self) -> Result<T, QueueDestructed> {
        let mut state = self.lock();
        loop {
            if state.destructed {
                return Err(QueueDestructed);
            }
            if let Some(item) = self.pop_locked(&mut state) {
                return Ok(item);
            }
            state = self.not_empty.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block up to `timeout` for an item; `Ok(None)` on expiry.
    pub fn try_wait_and_pop(&self, timeout: Duration) -> Result<Option<T>, QueueDestructed> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.destructed {
                return Err(QueueDestructed);
            }
            if let Some(item) = self.pop_locked(&mut state) {
                return Ok(Some(item));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }

    /// Inspect the head without removing it.
    pub fn front_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().items.front().map(f)
    }

    /// Block until the queue is observed empty.
    pub fn wait_empty(&self) -> Result<(), QueueDestructed> {
        let mut state = self.lock();
        while !state.items.is_empty() && !state.destructed {
            state = self.drained.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if state.destructed {
            return Err(QueueDestructed);
        }
        Ok(())
    }

    /// Drop all queued items.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.items.clear();
        self.not_full.notify_all();
        self.drained.notify_all();
    }

    /// Permanently close the queue and wake every waiter. Queued items are dropped.
    pub fn destruct(&self) {
        let mut state = self.lock();
        state.destructed = true;
        state.items.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.drained.notify_all();
    }
}

impl<T: Clone> LockingQueue<T> {
    /// Clone of the head item.
    pub fn front(&self) -> Option<T> {
        self.front_with(T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = LockingQueue::new(4, false);
        for i in 0..4 {
            q.push(i).unwrap();
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.front(), Some(0));
        for i in 0..4 {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let q: LockingQueue<u8> = LockingQueue::new(0, true);
        assert_eq!(q.capacity(), 1);
    }

    #[test]
    fn test_overwrite_keeps_newest() {
        let q = LockingQueue::new(3, true);
        for i in 0..5 {
            q.push(i).unwrap();
        }
        assert_eq!(q.len(), 3);
        let items: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn test_blocking_push_waits_for_pop() {
        let q = Arc::new(LockingQueue::new(2, false));
        q.push(1).unwrap();
        q.push(2).unwrap();

        let pushed = Arc::new(AtomicBool::new(false));
        let handle = {
            let q = q.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                q.push(3).unwrap();
                pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst), "push must block while full");

        assert_eq!(q.try_pop(), Some(1));
        handle.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn test_try_wait_and_push_times_out() {
        let q = LockingQueue::new(1, false);
        assert!(q.try_wait_and_push(1, Duration::from_millis(5)).unwrap());
        assert!(!q.try_wait_and_push(2, Duration::from_millis(20)).unwrap());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_try_wait_and_pop_times_out() {
        let q: LockingQueue<u32> = LockingQueue::new(1, false);
        let start = Instant::now();
        assert_eq!(q.try_wait_and_pop(Duration::from_millis(30)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_and_pop_wakes_on_push() {
        let q = Arc::new(LockingQueue::new(1, false));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.wait_and_pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.push(7u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(7));
    }

    #[test]
    fn test_wait_empty_blocks_until_drained() {
        let q = Arc::new(LockingQueue::new(4, false));
        q.push(1).unwrap();
        q.push(2).unwrap();

        let saw_empty = Arc::new(AtomicBool::new(false));
        let waiter = {
            let q = q.clone();
            let saw_empty = saw_empty.clone();
            thread::spawn(move || {
                q.wait_empty().unwrap();
                saw_empty.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        q.try_pop();
        thread::sleep(Duration::from_millis(20));
        assert!(!saw_empty.load(Ordering::SeqCst));
        q.try_pop();
        waiter.join().unwrap();
        assert!(saw_empty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_destruct_wakes_waiters() {
        let q: Arc<LockingQueue<u32>> = Arc::new(LockingQueue::new(1, false));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.wait_and_pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.destruct();
        assert_eq!(consumer.join().unwrap(), Err(QueueDestructed));
        assert!(q.is_destructed());
        assert_eq!(q.push(1), Err(QueueDestructed));
        assert_eq!(q.wait_empty(), Err(QueueDestructed));
    }

    #[test]
    fn test_front_with_peeks() {
        let q = LockingQueue::new(2, false);
        q.push(String::from("a")).unwrap();
        assert_eq!(q.front_with(|s| s.len()), Some(1));
        assert_eq!(q.len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn overwrite_retains_most_recent_in_order(
                capacity in 1usize..16,
                items in prop::collection::vec(any::<u32>(), 0..64)
            ) {
                let q = LockingQueue::new(capacity, true);
                for &item in &items {
                    q.push(item).unwrap();
                }
                let kept: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
                let start = items.len().saturating_sub(capacity);
                prop_assert_eq!(kept, items[start..].to_vec());
            }

            #[test]
            fn blocking_queue_preserves_fifo(
                items in prop::collection::vec(any::<u16>(), 0..32)
            ) {
                let q = LockingQueue::new(32, false);
                for &item in &items {
                    q.push(item).unwrap();
                }
                let out: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
                prop_assert_eq!(out, items);
            }
        }
    }
}
