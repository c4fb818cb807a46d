//! In-memory work queue for tests and local experiments.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::queue::{Delivery, WorkQueue};

/// Volatile [`WorkQueue`] mirroring the Postgres backend's visible behavior:
/// claimed messages leave the ready set but stay tracked until acknowledged,
/// and an optional induced publish failure exercises the producer's
/// cache-consistency rule.
#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    inner: Mutex<State>,
    fail_publishes: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    ready: VecDeque<Delivery>,
    unacked: Vec<Delivery>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish` fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Messages waiting to be claimed.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Claimed but not yet acknowledged messages.
    pub fn unacked_len(&self) -> usize {
        self.inner.lock().unacked.len()
    }

    /// Payloads currently waiting, oldest first.
    pub fn ready_bodies(&self) -> Vec<String> {
        self.inner
            .lock()
            .ready
            .iter()
            .map(|delivery| delivery.body.clone())
            .collect()
    }

    /// Move every unacknowledged message back to the ready set, simulating
    /// lease expiry.
    pub fn requeue_unacked(&self) {
        let mut state = self.inner.lock();
        let unacked = std::mem::take(&mut state.unacked);
        for delivery in unacked {
            state.ready.push_back(delivery);
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn declare(&self) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, payload: &str) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(PipelineError::Queue {
                message: "publish: induced failure".to_string(),
            });
        }
        let mut state = self.inner.lock();
        state.next_id += 1;
        let delivery = Delivery {
            id: state.next_id,
            body: payload.to_string(),
        };
        state.ready.push_back(delivery);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut state = self.inner.lock();
        let claimed = state.ready.pop_front();
        if let Some(delivery) = &claimed {
            state.unacked.push(delivery.clone());
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.inner
            .lock()
            .unacked
            .retain(|pending| pending.id != delivery.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_receive_ack_cycle() {
        let queue = MemoryWorkQueue::new();
        queue.publish("https://example.com/a").await.unwrap();
        queue.publish("https://example.com/b").await.unwrap();
        assert_eq!(queue.ready_len(), 2);

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.body, "https://example.com/a");
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.unacked_len(), 1);

        queue.ack(&first).await.unwrap();
        assert_eq!(queue.unacked_len(), 0);
    }

    #[tokio::test]
    async fn unacked_messages_can_be_redelivered() {
        let queue = MemoryWorkQueue::new();
        queue.publish("https://example.com/a").await.unwrap();

        let claimed = queue.receive().await.unwrap().unwrap();
        assert!(queue.receive().await.unwrap().is_none());

        queue.requeue_unacked();
        let redelivered = queue.receive().await.unwrap().unwrap();
        assert_eq!(redelivered.body, claimed.body);
    }

    #[tokio::test]
    async fn empty_queue_yields_none() {
        let queue = MemoryWorkQueue::new();
        assert!(queue.receive().await.unwrap().is_none());
    }
}
