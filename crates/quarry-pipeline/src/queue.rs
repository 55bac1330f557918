use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Size query used by [`MultiQueueWaiter`] over heterogeneous queues.
pub trait QueueDepth {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Blocks a worker until any one of a set of queues becomes non-empty.
///
/// Level-triggered: the emptiness check happens under the waiter's own lock,
/// and producers notify under that same lock, so a wakeup between the check
/// and the sleep cannot be lost.
#[derive(Default)]
pub struct MultiQueueWaiter {
    state: Mutex<()>,
    cv: Condvar,
}

impl MultiQueueWaiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn signal(&self) {
        let _guard = self.state.lock();
        self.cv.notify_all();
    }

    pub fn wait(&self, queues: &[&dyn QueueDepth]) {
        let mut guard = self.state.lock();
        while queues.iter().all(|queue| queue.is_empty()) {
            self.cv.wait(&mut guard);
        }
    }
}

/// In-memory FIFO of one message type, shared between producer and consumer
/// threads. Enqueues signal every registered waiter.
pub struct ThreadedQueue<T> {
    items: Mutex<VecDeque<T>>,
    waiters: Vec<Arc<MultiQueueWaiter>>,
}

impl<T> ThreadedQueue<T> {
    pub fn new(waiters: Vec<Arc<MultiQueueWaiter>>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            waiters,
        }
    }

    pub fn push(&self, value: T) {
        self.items.lock().push_back(value);
        self.notify();
    }

    /// Enqueues a batch atomically: a consumer observes either none or all
    /// of `values`.
    pub fn push_all(&self, values: impl IntoIterator<Item = T>) {
        self.items.lock().extend(values);
        self.notify();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self) {
        for waiter in &self.waiters {
            waiter.signal();
        }
    }
}

impl<T> QueueDepth for ThreadedQueue<T> {
    fn len(&self) -> usize {
        ThreadedQueue::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn queues_are_fifo() {
        let queue = ThreadedQueue::new(Vec::new());
        queue.push(1);
        queue.push_all([2, 3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn wait_returns_immediately_when_a_queue_has_items() {
        let waiter = MultiQueueWaiter::new();
        let empty: ThreadedQueue<u32> = ThreadedQueue::new(vec![waiter.clone()]);
        let full: ThreadedQueue<u32> = ThreadedQueue::new(vec![waiter.clone()]);
        full.push(7);
        // Would deadlock if the waiter were edge-triggered.
        waiter.wait(&[&empty, &full]);
    }

    #[test]
    fn wait_wakes_on_push_from_another_thread() {
        let waiter = MultiQueueWaiter::new();
        let queue: Arc<ThreadedQueue<u32>> = Arc::new(ThreadedQueue::new(vec![waiter.clone()]));

        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.push(1);
            })
        };

        waiter.wait(&[queue.as_ref()]);
        assert_eq!(queue.try_pop(), Some(1));
        producer.join().unwrap();
    }
}
