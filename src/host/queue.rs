//! Outbound command queue
//!
//! Unbounded FIFO with many producers and one consumer, the writer thread.
//! [`PendingCommand::Terminate`] tells the consumer to exit.

use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Queue element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCommand {
    /// One command line for the host
    Line(String),
    /// Stop consuming
    Terminate,
}

/// Blocking multi-producer queue feeding the writer
pub struct CommandQueue {
    tx: Sender<PendingCommand>,
    rx: Receiver<PendingCommand>,
    closed: AtomicBool,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a line; never blocks. Returns false once the queue is closed.
    pub fn push(&self, line: impl Into<String>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            trace!("Queue closed, command dropped");
            return false;
        }
        // both ends live in self, so send cannot fail
        self.tx.send(PendingCommand::Line(line.into())).is_ok()
    }

    /// Block until an item is available
    pub fn pop(&self) -> PendingCommand {
        self.rx.recv().unwrap_or(PendingCommand::Terminate)
    }

    /// Close the queue, discard what is waiting and wake the consumer
    ///
    /// Returns the number of discarded lines.
    pub fn terminate(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let discarded = self
            .rx
            .try_iter()
            .filter(|item| matches!(item, PendingCommand::Line(_)))
            .count();
        let _ = self.tx.send(PendingCommand::Terminate);
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = CommandQueue::new();
        q.push("A 1\n");
        q.push("B 2\n");
        assert_eq!(q.pop(), PendingCommand::Line("A 1\n".into()));
        assert_eq!(q.pop(), PendingCommand::Line("B 2\n".into()));
    }

    #[test]
    fn test_terminate_discards_and_closes() {
        let q = CommandQueue::new();
        q.push("A 1\n");
        q.push("B 2\n");
        assert_eq!(q.terminate(), 2);
        assert_eq!(q.pop(), PendingCommand::Terminate);
        assert!(!q.push("C 3\n"));
        assert!(q.is_closed());
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let q = Arc::new(CommandQueue::new());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        q.push("Late 1\n");
        assert_eq!(consumer.join().unwrap(), PendingCommand::Line("Late 1\n".into()));
    }

    #[test]
    fn test_many_producers() {
        let q = Arc::new(CommandQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        q.push(format!("P{} {}\n", p, i));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(q.len(), 200);
    }
}
