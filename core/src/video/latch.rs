use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

/// One-shot completion latch: `Pending -> Resolved`, exactly once.
///
/// Any number of producers may call [`resolve`](Self::resolve); only the first
/// call delivers its value, later calls are no-ops returning `false`. If every
/// handle is dropped while still pending, the receiver observes a closed
/// channel.
#[derive(Debug)]
pub struct CompletionLatch<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionLatch<T> {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (latch, rx)
    }

    pub fn resolve(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The waiter may have given up already (timeout); that still
                // counts as the transition.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// True while pending with nobody left to receive the value. Long-running
    /// producers poll this to stop early.
    pub fn is_abandoned(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.is_closed())
    }

    pub fn is_resolved(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_resolve_wins() {
        let (latch, rx) = CompletionLatch::new();
        assert!(!latch.is_resolved());
        assert!(latch.resolve(1));
        assert!(!latch.resolve(2));
        assert!(latch.is_resolved());
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_latch_closes_receiver() {
        let (latch, rx) = CompletionLatch::<u8>::new();
        drop(latch);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let (latch, rx) = CompletionLatch::new();
        drop(rx);
        assert!(latch.resolve("late"));
        assert!(!latch.resolve("later"));
    }

    #[test]
    fn test_abandoned_once_receiver_dropped() {
        let (latch, rx) = CompletionLatch::<u8>::new();
        assert!(!latch.is_abandoned());
        drop(rx);
        assert!(latch.is_abandoned());
        latch.resolve(1);
        assert!(!latch.is_abandoned());
    }

    #[test]
    fn test_resolve_from_many_threads() {
        let (latch, mut rx) = CompletionLatch::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.resolve(i))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert!(rx.try_recv().is_ok());
    }
}
