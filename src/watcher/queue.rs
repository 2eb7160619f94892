//! Unbounded FIFO of paths waiting for a stability check.
//!
//! The same path may be queued more than once (several filesystem events,
//! re-queues after an unstable check). The processing loop treats the extra
//! entries as redundant checks.

use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Cloneable producer side, handed to the directory source.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: UnboundedSender<PathBuf>,
}

impl QueueHandle {
    /// Queue `path`. Returns false once the consumer is gone.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        self.tx.send(path).is_ok()
    }
}

/// Consumer side, owned by the processing loop.
#[derive(Debug)]
pub struct WorkQueue {
    handle: QueueHandle,
    rx: UnboundedReceiver<PathBuf>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: QueueHandle { tx },
            rx,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, path: PathBuf) {
        // Cannot fail: this queue holds its own receiver.
        let _sent = self.handle.enqueue(path);
    }

    /// Next path, or `None` right away when nothing is queued.
    pub fn try_dequeue(&mut self) -> Option<PathBuf> {
        match self.rx.try_recv() {
            Ok(path) => Some(path),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_duplicates() {
        let mut queue = WorkQueue::new();
        let producer = queue.handle();

        assert!(producer.enqueue(PathBuf::from("a")));
        queue.enqueue(PathBuf::from("b"));
        assert!(producer.enqueue(PathBuf::from("a")));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.try_dequeue(), Some(PathBuf::from("a")));
        assert_eq!(queue.try_dequeue(), Some(PathBuf::from("b")));
        assert_eq!(queue.try_dequeue(), Some(PathBuf::from("a")));
        assert_eq!(queue.try_dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_producer_from_other_thread() {
        let mut queue = WorkQueue::new();
        let producer = queue.handle();
        std::thread::spawn(move || {
            for i in 0..10 {
                producer.enqueue(PathBuf::from(format!("f{i}")));
            }
        })
        .join()
        .unwrap();

        let drained: Vec<_> = std::iter::from_fn(|| queue.try_dequeue()).collect();
        assert_eq!(drained.len(), 10);
        assert_eq!(drained[0], PathBuf::from("f0"));
    }
}
