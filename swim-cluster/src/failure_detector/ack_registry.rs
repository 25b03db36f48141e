use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct AckInfo {
    pub(crate) from: String,
    pub(crate) incarnation: u64,
}

/// Outstanding probes keyed by sequence number.
#[derive(Debug, Default)]
pub(crate) struct AckRegistry {
    next_seq: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<AckInfo>>>,
}

impl AckRegistry {
    pub(crate) fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(self: &Arc<Self>, seq: u32) -> AckWaiter {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(seq, tx);
        AckWaiter {
            seq,
            registry: self.clone(),
            rx,
            done: false,
        }
    }

    /// Returns false for unknown or already answered sequence numbers.
    pub(crate) fn resolve(&self, seq: u32, ack: AckInfo) -> bool {
        match self.pending.lock().remove(&seq) {
            Some(tx) => tx.send(ack).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Deregisters its sequence number on drop.
#[derive(Debug)]
pub(crate) struct AckWaiter {
    seq: u32,
    registry: Arc<AckRegistry>,
    rx: oneshot::Receiver<AckInfo>,
    done: bool,
}

impl AckWaiter {
    pub(crate) fn seq(&self) -> u32 {
        self.seq
    }

    /// Can be called again after a timeout to keep waiting for the same ack.
    pub(crate) async fn wait(&mut self, timeout: Duration) -> Option<AckInfo> {
        if self.done || timeout.is_zero() {
            return None;
        }
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(ack)) => {
                self.done = true;
                Some(ack)
            }
            Ok(Err(_)) => {
                self.done = true;
                None
            }
            Err(_) => None,
        }
    }
}

impl Drop for AckWaiter {
    fn drop(&mut self) {
        self.registry.pending.lock().remove(&self.seq);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::failure_detector::ack_registry::{AckInfo, AckRegistry};

    fn ack() -> AckInfo {
        AckInfo {
            from: "b".to_string(),
            incarnation: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_survives_a_timeout() {
        let registry = Arc::new(AckRegistry::default());
        let seq = registry.next_seq();
        let mut waiter = registry.register(seq);
        assert_eq!(waiter.seq(), seq);
        assert!(waiter.wait(Duration::from_millis(100)).await.is_none());
        assert!(registry.resolve(seq, ack()));
        assert_eq!(waiter.wait(Duration::from_millis(100)).await, Some(ack()));
        assert!(waiter.wait(Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test]
    async fn dropped_waiter_deregisters() {
        let registry = Arc::new(AckRegistry::default());
        let first = registry.next_seq();
        let second = registry.next_seq();
        assert_ne!(first, second);
        let waiter = registry.register(first);
        assert_eq!(registry.pending(), 1);
        drop(waiter);
        assert_eq!(registry.pending(), 0);
        assert!(!registry.resolve(first, ack()));
    }
}
