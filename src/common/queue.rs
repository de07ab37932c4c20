//! Message queues for inter-component communication.
//!
//! Provides both point-to-point (Queue) and broadcast (BroadcastQueue) messaging.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{Result, ScrapeError};

/// Bounded MPMC (multi-producer, multi-consumer) queue.
///
/// The batch runner fills one queue with item indices in row order and every
/// worker pulls from it, so each item is consumed by exactly one worker.
/// Backed by flume for high-performance message passing.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    /// send a message to the queue
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| ScrapeError::Rejected(format!("queue: {}", e)))
    }

    /// take the next message without waiting, `None` when the queue is drained
    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// number of messages waiting in the queue
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Broadcast queue for one-to-many message distribution.
///
/// Used for batch event broadcasting where all subscribers receive every message.
/// Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message to every current subscriber, a queue without subscribers drops it
    pub fn send(
        &self,
        msg: T,
    ) {
        let _ = self.sender.send(msg);
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let queue = Queue::new(4);
        for i in 0..4 {
            queue.send(i).unwrap();
        }
        assert_eq!(queue.len(), 4);
        assert!(queue.send(4).is_err());

        let drained: Vec<i32> = std::iter::from_fn(|| queue.try_next()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let queue = BroadcastQueue::new(8);
        let mut a = queue.subscribe();
        let mut b = queue.subscribe();
        queue.send("hello".to_string());
        assert_eq!(a.recv().await.unwrap(), "hello");
        assert_eq!(b.recv().await.unwrap(), "hello");
    }
}
