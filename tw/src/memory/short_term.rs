//! Short-term memory: the bounded recent window of a thread

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{ChatTurn, NormalizedIntent};
use crate::history::{HistoryClient, HistoryError};

/// Recent-window view over the history collaborator
pub struct ShortTermMemory {
    history: Arc<dyn HistoryClient>,
    window: usize,
    page_size: usize,
}

impl ShortTermMemory {
    pub fn new(history: Arc<dyn HistoryClient>, config: &Config) -> Self {
        Self {
            history,
            window: config.memory.recent_window,
            page_size: config.history.page_size,
        }
    }

    /// Scan a thread page by page, keeping only its newest `keep` turns
    ///
    /// The scan runs to the first short page so a long thread still yields
    /// its tail. A page identical to the previous one ends the scan.
    pub async fn fetch_recent(&self, thread_id: &str, keep: usize) -> Result<Vec<ChatTurn>, HistoryError> {
        debug!(%thread_id, page_size = self.page_size, keep, "fetch_recent: called");
        let mut recent = Vec::new();
        let mut previous: Vec<String> = Vec::new();
        let mut skip = 0;

        loop {
            let batch = self.history.fetch_page(thread_id, skip, self.page_size).await?;
            let fetched = batch.len();
            let ids: Vec<String> = batch.iter().map(|t| t.message_id.clone()).collect();
            if fetched > 0 && ids == previous {
                warn!(%thread_id, skip, "fetch_recent: history repeated a page, stopping");
                break;
            }

            recent.extend(batch);
            recent = order_window(recent, keep);
            if fetched < self.page_size {
                break;
            }
            skip += fetched;
            previous = ids;
        }
        Ok(recent)
    }

    /// The turn's recent window, oldest first
    ///
    /// History failures degrade to the synthesized current turn. A current
    /// message missing from the window is appended as the newest user turn.
    pub async fn recent_window(&self, intent: &NormalizedIntent) -> Vec<ChatTurn> {
        let history = match self.fetch_recent(&intent.thread_id, self.window).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(thread_id = %intent.thread_id, error = %e, "recent_window: history fetch failed, continuing without it");
                Vec::new()
            }
        };

        let mut window = order_window(history, self.window);
        let current_text = intent.user_text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        if let Some(text) = current_text
            && !window.iter().any(|t| t.message_id == intent.message_id)
        {
            debug!(message_id = %intent.message_id, "recent_window: appending current turn");
            window.push(ChatTurn::user(intent.message_id.clone(), text));
            if window.len() > self.window {
                window.remove(0);
            }
        }
        window
    }
}

/// Sort by `created_at` ascending (ties by message id) and keep the last `window` turns
pub fn order_window(mut turns: Vec<ChatTurn>, window: usize) -> Vec<ChatTurn> {
    turns.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.message_id.cmp(&b.message_id))
    });
    let skip = turns.len().saturating_sub(window);
    turns.split_off(skip)
}
