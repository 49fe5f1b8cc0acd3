//! Inbound request queue

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue closed")]
    Closed,
}

/// A request waiting for a worker, with its delivery count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub payload: Value,
    #[serde(default)]
    pub attempt: u32,
}

impl QueuedRequest {
    /// First delivery of a payload
    ///
    /// Object payloads without a `request_id` get a fresh one so every
    /// delivery of the request logs under the same id.
    pub fn new(mut payload: Value) -> Self {
        if let Value::Object(map) = &mut payload
            && map.get("request_id").is_none_or(|v| v.as_str().is_none_or(|s| s.trim().is_empty()))
        {
            map.insert("request_id".to_string(), Value::from(Uuid::now_v7().to_string()));
        }
        Self { payload, attempt: 0 }
    }

    /// The same request, one delivery later
    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Queue of trip requests
#[async_trait]
pub trait TripQueue: Send + Sync {
    /// Wait up to `timeout` for the next request
    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedRequest>, QueueError>;

    async fn push(&self, request: QueuedRequest) -> Result<(), QueueError>;
}

/// In-process queue over an unbounded tokio channel
pub struct ChannelQueue {
    name: String,
    tx: mpsc::UnboundedSender<QueuedRequest>,
    rx: Mutex<mpsc::UnboundedReceiver<QueuedRequest>>,
}

impl ChannelQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a raw payload as a first delivery
    pub async fn push_payload(&self, payload: Value) -> Result<(), QueueError> {
        self.push(QueuedRequest::new(payload)).await
    }
}

#[async_trait]
impl TripQueue for ChannelQueue {
    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedRequest>, QueueError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(request)) => {
                debug!(queue = %self.name, attempt = request.attempt, "ChannelQueue::pop: got request");
                Ok(Some(request))
            }
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn push(&self, request: QueuedRequest) -> Result<(), QueueError> {
        debug!(queue = %self.name, attempt = request.attempt, "ChannelQueue::push: called");
        self.tx.send(request).map_err(|_| QueueError::Closed)
    }
}
