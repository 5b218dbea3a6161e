//! Implements the queue buffering messages between the ingestion loop and
//! readers.
//!
//! The queue never blocks its producer. Whenever the buffer is full it tries
//! to double its capacity; if that is not possible, the incoming message is
//! dropped and a diagnostic is emitted.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

use crate::message::Message;

/// A thread-safe FIFO of messages with doubling growth.
#[derive(Debug)]
pub struct MessageQueue {
    /// The buffered messages, oldest first.
    buffer: Mutex<VecDeque<Message>>,

    /// The capacity the buffer must never grow beyond, if any.
    capacity_limit: Option<usize>,

    /// The amount of messages dropped because the buffer could not grow.
    dropped: AtomicU64,
}

impl MessageQueue {
    /// Creates an empty queue.
    ///
    /// `capacity_limit` caps the growth of the buffer. Pushing onto a full
    /// queue that is not allowed to grow any further drops the message.
    pub fn new(initial_capacity: usize, capacity_limit: Option<usize>) -> Self {
        let initial_capacity = match capacity_limit {
            Some(limit) => initial_capacity.min(limit),
            None => initial_capacity,
        };

        Self {
            buffer: Mutex::new(VecDeque::with_capacity(initial_capacity)),
            capacity_limit,
            dropped: AtomicU64::new(0),
        }
    }

    /// The buffer is left consistent between mutations, so a panic while the
    /// lock was held cannot corrupt it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message to the tail of the queue.
    ///
    /// Returns `false` if the message was dropped because the buffer was full
    /// and could not grow.
    pub fn push(&self, msg: Message) -> bool {
        let rejected = {
            let mut buffer = self.lock();
            match grow_if_full(&mut buffer, self.capacity_limit) {
                Ok(()) => {
                    buffer.push_back(msg);
                    None
                },
                Err(attempted) => Some((buffer.len(), attempted)),
            }
        };

        let Some((len, attempted_capacity)) = rejected else {
            return true;
        };

        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            len,
            attempted_capacity,
            dropped,
            "could not increase size of message queue, message lost"
        );
        false
    }

    /// Removes and returns the message at the head of the queue.
    ///
    /// Returns [`None`] immediately if the queue is empty.
    pub fn pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// The amount of buffered messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no buffered messages.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The amount of messages the queue can hold without growing.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// The amount of messages dropped so far because the queue could not grow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Doubles the capacity of a full buffer.
///
/// Returns the capacity that could not be reached on failure.
fn grow_if_full(buffer: &mut VecDeque<Message>, limit: Option<usize>) -> Result<(), usize> {
    let len = buffer.len();
    if len < buffer.capacity() {
        return Ok(());
    }

    let doubled = len.saturating_mul(2).max(1);
    let target = match limit {
        Some(limit) => doubled.min(limit),
        None => doubled,
    };

    if target <= len {
        return Err(doubled);
    }

    buffer.try_reserve_exact(target - len).map_err(|_| target)
}

/// Creates a queue and splits it into its producing and consuming halves.
pub fn channel(
    initial_capacity: usize,
    capacity_limit: Option<usize>,
) -> (QueueSender, QueueReceiver) {
    let queue = Arc::new(MessageQueue::new(initial_capacity, capacity_limit));
    (
        QueueSender(Arc::clone(&queue)),
        QueueReceiver(queue),
    )
}

/// The producing half of a queue, owned by the ingestion loop.
#[derive(Debug)]
pub struct QueueSender(Arc<MessageQueue>);

impl QueueSender {
    /// See [`MessageQueue::push`].
    pub fn push(&self, msg: Message) -> bool {
        self.0.push(msg)
    }
}

/// The consuming half of a queue, owned by the transport handle.
#[derive(Debug)]
pub struct QueueReceiver(Arc<MessageQueue>);

impl QueueReceiver {
    /// See [`MessageQueue::pop`].
    pub fn pop(&self) -> Option<Message> {
        self.0.pop()
    }

    /// Provides access to the queue's diagnostics.
    pub fn queue(&self) -> &MessageQueue {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(i: u8) -> Message {
        Message::new([i, 0, 0, 0, 0, 0, 0, i])
    }

    #[test]
    fn pops_in_push_order() {
        let queue = MessageQueue::new(4, None);
        for i in 0..4 {
            assert!(queue.push(msg(i)));
        }
        for i in 0..4 {
            assert_eq!(queue.pop(), Some(msg(i)));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn pop_on_empty_queue_returns_none() {
        let queue = MessageQueue::new(0, None);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let queue = MessageQueue::new(2, None);
        let initial = queue.capacity();

        for i in 0..=initial as u8 * 3 {
            assert!(queue.push(msg(i)));
        }

        assert!(queue.capacity() > initial);
        assert!(queue.len() <= queue.capacity());
        assert_eq!(queue.dropped(), 0);
        for i in 0..=initial as u8 * 3 {
            assert_eq!(queue.pop(), Some(msg(i)));
        }
    }

    #[test]
    fn fifo_is_kept_across_wraparound() {
        let queue = MessageQueue::new(4, None);
        for round in 0..10u8 {
            queue.push(msg(round * 2));
            queue.push(msg(round * 2 + 1));
            assert_eq!(queue.pop(), Some(msg(round)));
        }
        for i in 10..20 {
            assert_eq!(queue.pop(), Some(msg(i)));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drops_messages_it_cannot_grow_for() {
        let queue = MessageQueue::new(2, Some(2));
        let capacity = queue.capacity();

        // `VecDeque` may allocate more than requested, which the limit does
        // not take away.
        for i in 0..capacity as u8 {
            assert!(queue.push(msg(i)));
        }
        assert!(!queue.push(msg(0xee)));
        assert_eq!(queue.dropped(), 1);

        for i in 0..capacity as u8 {
            assert_eq!(queue.pop(), Some(msg(i)));
        }
        assert_eq!(queue.pop(), None);

        // The dropped message never shows up, new ones are accepted again.
        assert!(queue.push(msg(0x42)));
        assert_eq!(queue.pop(), Some(msg(0x42)));
    }

    #[test]
    fn channel_halves_share_one_queue() {
        let (tx, rx) = channel(1, None);
        tx.push(msg(1));
        tx.push(msg(2));
        assert_eq!(rx.queue().len(), 2);
        assert_eq!(rx.pop(), Some(msg(1)));
        assert_eq!(rx.pop(), Some(msg(2)));
        assert_eq!(rx.pop(), None);
    }
}
