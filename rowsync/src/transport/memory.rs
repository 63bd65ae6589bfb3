//! Scriptable in-memory broker client used by tests and local runs.

use std::sync::{Arc, Mutex};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::transport::base::{BrokerClient, SendStatus};

#[derive(Default)]
struct Inner {
    fail_remaining: u32,
    error_remaining: u32,
    attempts: Vec<String>,
    delivered: Vec<(String, String, Vec<u8>)>,
}

/// In-memory [`BrokerClient`] that records every send attempt and can be
/// scripted to reject or error a number of upcoming sends.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends return [`SendStatus::Failed`].
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().unwrap().fail_remaining = count;
    }

    /// Makes the next `count` sends return a transport error.
    pub fn error_next(&self, count: u32) {
        self.inner.lock().unwrap().error_remaining = count;
    }

    /// Ordering keys of every attempted send, successful or not.
    pub fn attempts(&self) -> Vec<String> {
        self.inner.lock().unwrap().attempts.clone()
    }

    /// `(topic, ordering_key, payload)` of every successfully delivered send.
    pub fn delivered(&self) -> Vec<(String, String, Vec<u8>)> {
        self.inner.lock().unwrap().delivered.clone()
    }

    /// Ordering keys of delivered sends, in delivery order.
    pub fn delivered_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .delivered
            .iter()
            .map(|(_, key, _)| key.clone())
            .collect()
    }
}

impl BrokerClient for MemoryBroker {
    async fn send_ordered(
        &self,
        topic: &str,
        ordering_key: &str,
        payload: Vec<u8>,
    ) -> SyncResult<SendStatus> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts.push(ordering_key.to_string());

        if inner.error_remaining > 0 {
            inner.error_remaining -= 1;
            bail!(ErrorKind::TransportSendFailed, "Scripted send error");
        }

        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;

            return Ok(SendStatus::Failed);
        }

        inner
            .delivered
            .push((topic.to_string(), ordering_key.to_string(), payload));

        Ok(SendStatus::Ok)
    }
}
