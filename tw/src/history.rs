//! Chat history collaborator
//!
//! `GET /messages/thread/{thread_id}?skip&limit` pages a thread's messages;
//! `POST /messages` and `POST /normalised_messages` append to it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::HistoryConfig;
use crate::domain::{ChatRole, ChatTurn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("History service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("History backend unavailable: {0}")]
    Unavailable(String),
}

/// Read and append access to chat threads
#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// One page of a thread's messages, in whatever order the backend keeps them
    async fn fetch_page(&self, thread_id: &str, skip: usize, limit: usize) -> Result<Vec<ChatTurn>, HistoryError>;

    /// Append a chat message
    async fn append_message(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError>;

    /// Append a normalized (structured) message
    async fn append_normalised(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError>;
}

/// Build the configured history collaborator
///
/// Without a base URL the history lives in process.
pub fn create_history(config: &HistoryConfig) -> Result<Arc<dyn HistoryClient>, HistoryError> {
    match &config.base_url {
        Some(base_url) => Ok(Arc::new(HttpHistoryClient::new(base_url, config.timeout_ms)?)),
        None => {
            debug!("create_history: no base-url, using in-memory history");
            Ok(Arc::new(InMemoryHistory::new()))
        }
    }
}

/// A message as the history service returns it
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl WireMessage {
    fn into_turn(self) -> ChatTurn {
        let message_id = self
            .message_id
            .or(self.id)
            .map(|v| scalar_to_string(&v))
            .unwrap_or_default();
        let content = match self.content {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => self.text.unwrap_or_default(),
            Some(other) => other.to_string(),
        };
        ChatTurn {
            message_id,
            role: ChatRole::parse(self.role.as_deref().unwrap_or("")),
            content,
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// HTTP history collaborator
pub struct HttpHistoryClient {
    base_url: String,
    http: Client,
}

impl HttpHistoryClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, HistoryError> {
        debug!(%base_url, timeout_ms, "HttpHistoryClient::new: called");
        let http = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<(), HistoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryClient for HttpHistoryClient {
    async fn fetch_page(&self, thread_id: &str, skip: usize, limit: usize) -> Result<Vec<ChatTurn>, HistoryError> {
        debug!(%thread_id, skip, limit, "HttpHistoryClient::fetch_page: called");
        let url = format!("{}/messages/thread/{}", self.base_url, thread_id);
        let response = self
            .http
            .get(&url)
            .query(&[("skip", skip), ("limit", limit)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let messages: Vec<WireMessage> = response.json().await?;
        Ok(messages.into_iter().map(WireMessage::into_turn).collect())
    }

    async fn append_message(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError> {
        debug!(%thread_id, role = role.as_str(), "HttpHistoryClient::append_message: called");
        self.post(
            "/messages",
            json!({ "thread_id": thread_id, "role": role.as_str(), "content": content }),
        )
        .await
    }

    async fn append_normalised(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError> {
        debug!(%thread_id, role = role.as_str(), "HttpHistoryClient::append_normalised: called");
        self.post(
            "/normalised_messages",
            json!({ "thread_id": thread_id, "role": role.as_str(), "content": content }),
        )
        .await
    }
}

/// A message appended through the collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct AppendedMessage {
    pub role: ChatRole,
    pub content: Value,
    pub normalised: bool,
}

#[derive(Debug, Default)]
struct Threads {
    turns: HashMap<String, Vec<ChatTurn>>,
    appended: HashMap<String, Vec<AppendedMessage>>,
}

/// In-process history collaborator
///
/// Appended chat messages become visible to later `fetch_page` calls;
/// normalized messages are kept separately. Read and write failures can be
/// switched on to exercise degraded paths.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    threads: Mutex<Threads>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_next_message: AtomicBool,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a thread with existing turns
    pub fn with_turns(self, thread_id: &str, turns: Vec<ChatTurn>) -> Self {
        if let Ok(mut threads) = self.threads.lock() {
            threads.turns.entry(thread_id.to_string()).or_default().extend(turns);
        }
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next chat-message append
    pub fn fail_next_message(&self) {
        self.fail_next_message.store(true, Ordering::SeqCst);
    }

    /// Everything appended to a thread, oldest first
    pub fn appended(&self, thread_id: &str) -> Vec<AppendedMessage> {
        self.threads
            .lock()
            .map(|t| t.appended.get(thread_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn append(&self, thread_id: &str, role: ChatRole, content: &Value, normalised: bool) -> Result<(), HistoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HistoryError::Unavailable("writes disabled".to_string()));
        }
        if !normalised && self.fail_next_message.swap(false, Ordering::SeqCst) {
            return Err(HistoryError::Unavailable("message write rejected".to_string()));
        }
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| HistoryError::Unavailable("lock poisoned".to_string()))?;

        threads
            .appended
            .entry(thread_id.to_string())
            .or_default()
            .push(AppendedMessage {
                role,
                content: content.clone(),
                normalised,
            });

        if !normalised {
            let turns = threads.turns.entry(thread_id.to_string()).or_default();
            let message_id = format!("stored_{}", turns.len() + 1);
            let text = match content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            turns.push(ChatTurn {
                message_id,
                role,
                content: text,
                created_at: Some(Utc::now()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryClient for InMemoryHistory {
    async fn fetch_page(&self, thread_id: &str, skip: usize, limit: usize) -> Result<Vec<ChatTurn>, HistoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HistoryError::Unavailable("reads disabled".to_string()));
        }
        let threads = self
            .threads
            .lock()
            .map_err(|_| HistoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(threads
            .turns
            .get(thread_id)
            .map(|turns| turns.iter().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_message(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError> {
        self.append(thread_id, role, content, false)
    }

    async fn append_normalised(&self, thread_id: &str, role: ChatRole, content: &Value) -> Result<(), HistoryError> {
        self.append(thread_id, role, content, true)
    }
}
