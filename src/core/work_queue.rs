//! # Work Queues
//!
//! The single synchronisation primitive connecting every pipeline stage. A
//! [`WorkQueue`] is a mutex-protected container paired with a condition variable:
//! producers `push`, consumers either poll with `try_pop` or park in `wait_pop`
//! until an item arrives or the queue is stopped.
//!
//! ## Ordering
//! - [`FifoQueue`] hands items out in insertion order (generation, upload, save stages)
//! - [`PriorityQueue`] hands out the item with the lowest priority value first; the
//!   meshing stage uses the distance to the observer as the priority
//!
//! ## Stopping
//! `stop()` is irreversible and idempotent. It wakes every parked consumer; pushes made
//! after it are dropped, but whatever is still queued stays inspectable so shutdown can
//! drain it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Backing container of a [`WorkQueue`].
pub trait QueueStorage<T>: Default + Send {
    /// Adds an item.
    fn put(&mut self, item: T);
    /// Removes the next item according to the container's ordering.
    fn take(&mut self) -> Option<T>;
    /// Removes every item, in the container's ordering.
    fn take_all(&mut self) -> Vec<T>;
    fn len(&self) -> usize;
    fn clear(&mut self);
}

impl<T: Send> QueueStorage<T> for VecDeque<T> {
    fn put(&mut self, item: T) {
        self.push_back(item);
    }

    fn take(&mut self) -> Option<T> {
        self.pop_front()
    }

    fn take_all(&mut self) -> Vec<T> {
        self.drain(..).collect()
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn clear(&mut self) {
        VecDeque::clear(self);
    }
}

impl<T: Ord + Send> QueueStorage<T> for BinaryHeap<T> {
    fn put(&mut self, item: T) {
        self.push(item);
    }

    fn take(&mut self) -> Option<T> {
        self.pop()
    }

    fn take_all(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(BinaryHeap::len(self));
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }

    fn len(&self) -> usize {
        BinaryHeap::len(self)
    }

    fn clear(&mut self) {
        BinaryHeap::clear(self);
    }
}

/// An item tagged with a priority. Lower values are dequeued first.
#[derive(Debug, Clone)]
pub struct Prioritized<T> {
    pub priority: f32,
    pub item: T,
}

impl<T> Prioritized<T> {
    pub fn new(priority: f32, item: T) -> Self {
        Self { priority, item }
    }
}

impl<T> PartialEq for Prioritized<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl<T> Eq for Prioritized<T> {}

impl<T> PartialOrd for Prioritized<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Prioritized<T> {
    // BinaryHeap is a max-heap; reversing makes the nearest item pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.total_cmp(&self.priority)
    }
}

struct QueueState<S> {
    items: S,
    stopped: bool,
}

/// A blocking, stoppable, thread-safe queue.
///
/// # Type Parameters
/// - `T`: The queued item type
/// - `S`: The backing container, which decides the dequeue order
pub struct WorkQueue<T, S: QueueStorage<T> = VecDeque<T>> {
    state: Mutex<QueueState<S>>,
    available: Condvar,
    _item: std::marker::PhantomData<fn(T) -> T>,
}

/// First-in, first-out work queue.
pub type FifoQueue<T> = WorkQueue<T, VecDeque<T>>;

/// Work queue that dequeues the lowest priority value first.
pub type PriorityQueue<T> = WorkQueue<Prioritized<T>, BinaryHeap<Prioritized<T>>>;

impl<T, S: QueueStorage<T>> Default for WorkQueue<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: QueueStorage<T>> WorkQueue<T, S> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: S::default(),
                stopped: false,
            }),
            available: Condvar::new(),
            _item: std::marker::PhantomData,
        }
    }

    /// Adds an item and wakes one waiting consumer.
    ///
    /// # Returns
    /// `false` if the queue has been stopped and the item was dropped.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }
        state.items.put(item);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Removes the next item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.take()
    }

    /// Blocks until an item is available or the queue is stopped.
    ///
    /// # Returns
    /// `None` only when the queue has been stopped and is empty.
    pub fn wait_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.take() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`WorkQueue::wait_pop`] but gives up after `timeout`.
    pub fn wait_pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.take() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return state.items.take();
            }
        }
    }

    /// Atomically removes and returns every queued item.
    pub fn drain_all(&self) -> Vec<T> {
        self.state.lock().items.take_all()
    }

    /// Removes at most `max` items.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut state = self.state.lock();
        let mut items = Vec::with_capacity(max.min(state.items.len()));
        while items.len() < max {
            match state.items.take() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    /// Atomically drops every item for which `keep` returns `false`.
    ///
    /// # Returns
    /// The removed items, so the caller can undo any bookkeeping tied to them.
    pub fn retain<F: FnMut(&T) -> bool>(&self, mut keep: F) -> Vec<T> {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        for item in state.items.take_all() {
            if keep(&item) {
                state.items.put(item);
            } else {
                removed.push(item);
            }
        }
        removed
    }

    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the queue and wakes every waiter. Calling it again has no effect.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn fifo_order() {
        let queue = FifoQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.try_pop(), Some(0));
        assert_eq!(queue.drain_all(), vec![1, 2, 3, 4]);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn priority_pops_nearest_first() {
        let queue: PriorityQueue<&str> = PriorityQueue::new();
        queue.push(Prioritized::new(5.0, "far"));
        queue.push(Prioritized::new(0.5, "near"));
        queue.push(Prioritized::new(2.0, "mid"));
        let order: Vec<_> = queue.drain_all().into_iter().map(|p| p.item).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
    }

    #[test]
    fn push_after_stop_is_dropped() {
        let queue = FifoQueue::new();
        queue.push(1);
        queue.stop();
        assert!(!queue.push(2));
        assert_eq!(queue.len(), 1);
        // Stopping twice is harmless and the remaining item is still drainable.
        queue.stop();
        assert_eq!(queue.wait_pop(), Some(1));
        assert_eq!(queue.wait_pop(), None);
    }

    #[test]
    fn stop_wakes_blocked_waiters() {
        let queue: Arc<FifoQueue<u32>> = Arc::new(FifoQueue::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait_pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        queue.stop();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn no_item_lost_between_producers_and_consumers() {
        let queue: Arc<FifoQueue<u32>> = Arc::new(FifoQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.wait_pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(p * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        queue.stop();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all.len(), 1000);
        all.dedup();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn retain_returns_removed_items() {
        let queue = FifoQueue::new();
        for i in 0..6 {
            queue.push(i);
        }
        let removed = queue.retain(|i| i % 2 == 0);
        assert_eq!(removed, vec![1, 3, 5]);
        assert_eq!(queue.drain_all(), vec![0, 2, 4]);
    }

    #[test]
    fn wait_pop_timeout_returns_none_when_idle() {
        let queue: FifoQueue<u8> = FifoQueue::new();
        assert_eq!(queue.wait_pop_timeout(Duration::from_millis(10)), None);
    }
}
