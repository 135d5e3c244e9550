//! Shared unbounded message queue.
//!
//! A [`MessageQueue`] is the only channel between application code and a
//! [`ConnectionWorker`](crate::worker::ConnectionWorker). It is handed around
//! as an `Arc`: the caller keeps one handle and the worker another, so either
//! side can push or pop.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::{AppError, Result};

/// Unbounded, thread-safe FIFO of opaque byte payloads.
#[derive(Debug)]
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<Bytes>,
    /// Consumers take turns on the receiving half.
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl MessageQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Create an empty queue behind an `Arc` ready to share with a worker.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Append `message` to the back of the queue. Never blocks.
    pub fn push(&self, message: impl Into<Bytes>) {
        // The queue owns its receiver, so the channel cannot be closed.
        let _ = self.tx.send(message.into());
    }

    /// Remove the oldest message without waiting.
    pub async fn try_pop(&self) -> Option<Bytes> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Remove the oldest message, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReceiveTimeout` if the queue stays empty for the
    /// whole of `timeout`.
    pub async fn pop(&self, timeout: Duration) -> Result<Bytes> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(message)) => Ok(message),
            Ok(None) | Err(_) => Err(AppError::ReceiveTimeout(format!(
                "no message within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Remove and return every message currently queued, oldest first.
    pub async fn drain(&self) -> Vec<Bytes> {
        let mut rx = self.rx.lock().await;
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
