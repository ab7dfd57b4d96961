//! Multi-producer, single-consumer hand-off between reader threads and the host

use async_channel::{Receiver, Sender, TryRecvError};
use futures::task::AtomicWaker;
use std::sync::Arc;
use tracing::trace;

use crate::event::{LogEvent, QueuedEvent, RequestId};

/// Unbounded FIFO of events waiting for the next drain
///
/// Producers never block. The consumer takes a bounded batch per drain: the
/// events queued at the moment the batch starts, and nothing pushed afterwards.
#[derive(Debug)]
pub struct HandoffQueue {
    tx: Sender<QueuedEvent>,
    rx: Receiver<QueuedEvent>,
}

impl HandoffQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// A producer handle that stamps every event with `request` and wakes `waker`
    pub fn sender(&self, request: RequestId, waker: Arc<AtomicWaker>) -> EventSender {
        EventSender {
            request,
            tx: self.tx.clone(),
            waker,
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Take the oldest queued event, if any
    pub fn pop(&self) -> Option<QueuedEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Take every event queued right now, in enqueue order
    pub fn take_batch(&self) -> Vec<QueuedEvent> {
        let available = self.rx.len();
        let mut batch = Vec::with_capacity(available);
        while batch.len() < available {
            match self.pop() {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        batch
    }
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of the queue, bound to one request
#[derive(Debug, Clone)]
pub struct EventSender {
    request: RequestId,
    tx: Sender<QueuedEvent>,
    waker: Arc<AtomicWaker>,
}

impl EventSender {
    /// The request this sender feeds
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Enqueue an event; returns false once the consuming engine is gone
    pub fn send(&self, event: LogEvent) -> bool {
        let delivered = self
            .tx
            .try_send(QueuedEvent::new(self.request, event))
            .is_ok();
        if !delivered {
            trace!(request = %self.request, "event dropped, engine is gone");
        }
        self.waker.wake();
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_drain_is_idempotent() {
        let queue = HandoffQueue::new();
        assert!(queue.take_batch().is_empty());
        assert!(queue.take_batch().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_per_producer() {
        let queue = HandoffQueue::new();
        let sender = queue.sender(RequestId::next(), Arc::new(AtomicWaker::new()));

        sender.send(LogEvent::InfoChunk("a".into()));
        sender.send(LogEvent::InfoChunk("b".into()));
        sender.send(LogEvent::EndOfStream(0));

        let batch: Vec<LogEvent> = queue.take_batch().into_iter().map(|e| e.event).collect();
        assert_eq!(
            batch,
            vec![
                LogEvent::InfoChunk("a".into()),
                LogEvent::InfoChunk("b".into()),
                LogEvent::EndOfStream(0),
            ]
        );
    }

    #[test]
    fn test_many_producers_keep_their_own_order() {
        let queue = HandoffQueue::new();
        let senders: Vec<EventSender> = (0..4)
            .map(|_| queue.sender(RequestId::next(), Arc::new(AtomicWaker::new())))
            .collect();

        let handles: Vec<_> = senders
            .into_iter()
            .map(|sender| {
                thread::spawn(move || {
                    for i in 0..100 {
                        sender.send(LogEvent::InfoChunk(i.to_string()));
                    }
                    sender.request()
                })
            })
            .collect();
        let ids: Vec<RequestId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let batch = queue.take_batch();
        assert_eq!(batch.len(), 400);
        for id in ids {
            let seen: Vec<String> = batch
                .iter()
                .filter(|e| e.request == id)
                .filter_map(|e| match &e.event {
                    LogEvent::InfoChunk(text) => Some(text.clone()),
                    _ => None,
                })
                .collect();
            let expected: Vec<String> = (0..100).map(|i: i32| i.to_string()).collect();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_pop_takes_oldest_first() {
        let queue = HandoffQueue::new();
        let sender = queue.sender(RequestId::next(), Arc::new(AtomicWaker::new()));
        sender.send(LogEvent::InfoChunk("a".into()));
        sender.send(LogEvent::EndOfStream(0));

        assert_eq!(queue.pop().map(|e| e.event), Some(LogEvent::InfoChunk("a".into())));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|e| e.event), Some(LogEvent::EndOfStream(0)));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_send_after_engine_dropped() {
        let queue = HandoffQueue::new();
        let sender = queue.sender(RequestId::next(), Arc::new(AtomicWaker::new()));
        drop(queue);
        assert!(!sender.send(LogEvent::EndOfStream(1)));
    }
}
