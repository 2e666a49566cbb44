//! Fixed-capacity FIFO queue with blocking producers and consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::{EnqueueError, SyncError, SyncResult};
use crate::monitor::{Condition, Interrupted, Monitor};
use crate::wait::WaitConfig;

const NOT_EMPTY: Condition = Condition::new(0);
const NOT_FULL: Condition = Condition::new(1);

/// A thread-safe bounded queue.
///
/// [`enqueue`](Self::enqueue) blocks while the queue is full and
/// [`dequeue`](Self::dequeue) blocks while it is empty. Each successful call
/// wakes one blocked caller on the opposite side. Cloning produces another
/// handle to the same queue.
///
/// # Examples
///
/// ```
/// use foundation_sync::BoundedBlockingQueue;
/// use std::thread;
///
/// let queue = BoundedBlockingQueue::new(2).unwrap();
///
/// let producer = {
///     let queue = queue.clone();
///     thread::spawn(move || {
///         for i in 0..5 {
///             queue.enqueue(i);
///         }
///     })
/// };
///
/// let received: Vec<_> = (0..5).map(|_| queue.dequeue()).collect();
/// producer.join().unwrap();
///
/// assert_eq!(received, vec![0, 1, 2, 3, 4]);
/// ```
pub struct BoundedBlockingQueue<T> {
    monitor: Arc<Monitor<VecDeque<T>>>,
    capacity: usize,
}

impl<T> Clone for BoundedBlockingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            monitor: Arc::clone(&self.monitor),
            capacity: self.capacity,
        }
    }
}

impl<T> core::fmt::Debug for BoundedBlockingQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundedBlockingQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> BoundedBlockingQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] when `capacity` is zero.
    pub fn new(capacity: usize) -> SyncResult<Self> {
        if capacity == 0 {
            return Err(SyncError::InvalidArgument("queue capacity must be > 0"));
        }

        Ok(Self {
            monitor: Arc::new(Monitor::with_conditions(
                VecDeque::with_capacity(capacity),
                2,
            )),
            capacity,
        })
    }

    /// Appends `item`, blocking while the queue is full.
    pub fn enqueue(&self, item: T) {
        let guard = self.monitor.lock();
        let capacity = self.capacity;
        let (mut items, ()) = self
            .monitor
            .block_for(guard, NOT_FULL, |items| has_room(items, capacity));
        items.push_back(item);
        drop(items);

        self.monitor.notify_one(NOT_EMPTY);
    }

    /// Removes the oldest item, blocking while the queue is empty.
    pub fn dequeue(&self) -> T {
        let guard = self.monitor.lock();
        let (items, item) = self.monitor.block_for(guard, NOT_EMPTY, VecDeque::pop_front);
        drop(items);

        self.monitor.notify_one(NOT_FULL);
        item
    }

    /// Appends `item` only if there is room right now.
    ///
    /// # Errors
    ///
    /// Hands `item` back when the queue is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let mut items = self.monitor.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        drop(items);

        self.monitor.notify_one(NOT_EMPTY);
        Ok(())
    }

    /// Removes the oldest item if one is available right now.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut items = self.monitor.lock();
        let item = items.pop_front();
        drop(items);

        if item.is_some() {
            self.monitor.notify_one(NOT_FULL);
        }
        item
    }

    /// Non-blocking snapshot of the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitor.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Send + 'static> BoundedBlockingQueue<T> {
    /// Appends `item`, blocking while the queue is full or until `wait`
    /// gives up.
    ///
    /// # Errors
    ///
    /// Returns an [`EnqueueError`] carrying the untouched item and the
    /// timeout or cancellation reason.
    pub fn enqueue_with(&self, item: T, wait: &WaitConfig) -> Result<(), EnqueueError<T>> {
        let guard = self.monitor.lock();
        let capacity = self.capacity;
        match self
            .monitor
            .wait_for(guard, NOT_FULL, wait, |items| has_room(items, capacity))
        {
            Ok((mut items, ())) => {
                items.push_back(item);
                drop(items);
                self.monitor.notify_one(NOT_EMPTY);
                Ok(())
            }
            Err(Interrupted { reason, .. }) => {
                tracing::debug!(%reason, "enqueue abandoned");
                Err(EnqueueError::new(item, reason))
            }
        }
    }

    /// Removes the oldest item, blocking while the queue is empty or until
    /// `wait` gives up.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] or [`SyncError::Cancelled`]; the queue
    /// is left untouched.
    pub fn dequeue_with(&self, wait: &WaitConfig) -> SyncResult<T> {
        let guard = self.monitor.lock();
        match self
            .monitor
            .wait_for(guard, NOT_EMPTY, wait, VecDeque::pop_front)
        {
            Ok((items, item)) => {
                drop(items);
                self.monitor.notify_one(NOT_FULL);
                Ok(item)
            }
            Err(Interrupted { reason, .. }) => {
                tracing::debug!(%reason, "dequeue abandoned");
                Err(reason)
            }
        }
    }
}

fn has_room<T>(items: &mut VecDeque<T>, capacity: usize) -> Option<()> {
    (items.len() < capacity).then_some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::CancellationToken;
    use std::thread;
    use std::time::Duration;

    /// WHY: A zero-capacity queue could never accept an item
    /// WHAT: Construction rejects capacity 0
    #[test]
    fn zero_capacity_is_rejected() {
        let err = BoundedBlockingQueue::<u8>::new(0).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    /// WHY: Validates FIFO ordering on a single thread
    /// WHAT: Items come out in the order they went in
    #[test]
    fn fifo_order() {
        let queue = BoundedBlockingQueue::new(3).unwrap();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("c");
        assert!(queue.is_full());

        assert_eq!(queue.dequeue(), "a");
        assert_eq!(queue.dequeue(), "b");
        assert_eq!(queue.dequeue(), "c");
        assert!(queue.is_empty());
    }

    #[test]
    fn try_variants_never_block() {
        let queue = BoundedBlockingQueue::new(1).unwrap();
        assert_eq!(queue.try_dequeue(), None);
        assert_eq!(queue.try_enqueue(1), Ok(()));
        assert_eq!(queue.try_enqueue(2), Err(2));
        assert_eq!(queue.try_dequeue(), Some(1));
    }

    /// WHY: A timed-out enqueue must not partially insert
    /// WHAT: The item is handed back and the queue keeps its previous contents
    #[test]
    #[ntest::timeout(5000)]
    fn timed_out_enqueue_returns_item() {
        let queue = BoundedBlockingQueue::new(1).unwrap();
        queue.enqueue(String::from("first"));

        let wait = WaitConfig::new().timeout(Duration::from_millis(30));
        let err = queue
            .enqueue_with(String::from("second"), &wait)
            .unwrap_err();

        assert!(err.reason().is_timeout());
        assert_eq!(err.into_inner(), "second");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(), "first");
    }

    /// WHY: A blocked consumer must be abortable
    /// WHAT: Cancelling a dequeue on an empty queue returns Cancelled
    #[test]
    #[ntest::timeout(5000)]
    fn cancelled_dequeue_on_empty_queue() {
        let queue = BoundedBlockingQueue::<u32>::new(4).unwrap();
        let token = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let wait = WaitConfig::new().cancel_with(token.clone());
            thread::spawn(move || queue.dequeue_with(&wait))
        };

        thread::sleep(Duration::from_millis(30));
        token.cancel();

        let result = consumer.join().expect("consumer should not panic");
        assert!(result.unwrap_err().is_cancelled());
        assert!(queue.is_empty());
    }

    /// WHY: A full queue must apply backpressure to producers
    /// WHAT: An enqueue on a full queue completes only after a dequeue frees space
    #[test]
    #[ntest::timeout(5000)]
    fn blocked_producer_resumes_after_dequeue() {
        let queue = BoundedBlockingQueue::new(1).unwrap();
        queue.enqueue(1);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.enqueue(2))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(), 1);

        producer.join().expect("producer should not panic");
        assert_eq!(queue.dequeue(), 2);
    }

    /// WHY: Multiple producers and consumers must neither lose nor duplicate items
    /// WHAT: The multiset of dequeued values equals the multiset enqueued
    #[test]
    #[ntest::timeout(20000)]
    fn multi_producer_multi_consumer_preserves_items() {
        let queue = BoundedBlockingQueue::new(4).unwrap();
        let producers = 4;
        let per_producer = 250;

        let producer_handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.enqueue(p * 1000 + i);
                        assert!(queue.len() <= queue.capacity());
                    }
                })
            })
            .collect();

        let consumer_handles: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    (0..(producers * per_producer) / 2)
                        .map(|_| queue.dequeue())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in producer_handles {
            handle.join().expect("producer should not panic");
        }

        let mut received: Vec<_> = consumer_handles
            .into_iter()
            .flat_map(|h| h.join().expect("consumer should not panic"))
            .collect();
        received.sort_unstable();

        let mut expected: Vec<_> = (0..producers)
            .flat_map(|p| (0..per_producer).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();

        assert_eq!(received, expected);
    }
}
