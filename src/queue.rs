use async_channel::{Receiver, Sender, TrySendError};

use crate::Target;

/// Queue of targets waiting to be fetched, shared by all workers.
///
/// Every enqueued target is delivered to exactly one worker. Once
/// [`WorkQueue::mark_no_more_work`] has been called nothing more can be
/// enqueued, and [`WorkQueue::dequeue`] returns `None` as soon as the
/// remaining items are drained.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<Target>,
    rx: Receiver<Target>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// Adds a target to the back of the queue.
    ///
    /// # Errors
    ///
    /// Gives the target back if the queue was already marked done.
    pub fn enqueue(&self, target: Target) -> Result<(), Target> {
        self.tx.try_send(target).map_err(|e| match e {
            TrySendError::Full(target) | TrySendError::Closed(target) => target,
        })
    }

    /// Takes the next target, waiting while the queue is empty but still open.
    ///
    /// Returns `None` once the queue is marked done and empty.
    pub async fn dequeue(&self) -> Option<Target> {
        self.rx.recv().await.ok()
    }

    /// Signals that no more targets will be added and wakes all waiting workers.
    pub fn mark_no_more_work(&self) {
        self.tx.close();
    }

    /// Returns `true` once [`WorkQueue::mark_no_more_work`] has been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of targets still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no targets are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
