//! One turn end to end
//!
//! normalize → assemble context → retrieve → generate → persist. Validation
//! and persistence failures are the only errors a turn can raise; both leave
//! a diagnostic system message on the thread before being returned.

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::context::ContextAssembler;
use crate::domain::{ChatRole, ContextPack, GroundedContext, NormalizedIntent, TripPlan};
use crate::generator::PlanGenerator;
use crate::history::{HistoryClient, HistoryError};
use crate::normalize::{RequestNormalizer, UNKNOWN_THREAD, ValidationError};
use crate::retrieval::Retriever;

/// Turn-level failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to persist {what}: {source}")]
    Persist {
        what: &'static str,
        #[source]
        source: HistoryError,
    },
}

impl PipelineError {
    /// Terminal errors are never retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persist { .. } => "orchestration",
        }
    }
}

/// Pipeline stage a turn reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Assemble,
    Retrieve,
    Generate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Assemble => "assemble",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
            Self::Persist => "persist",
        }
    }
}

/// Whatever a turn produced before it stopped
#[derive(Debug, Default)]
struct Partial {
    intent: Option<NormalizedIntent>,
    pack: Option<ContextPack>,
    grounded: Option<GroundedContext>,
    plan: Option<TripPlan>,
}

/// Runs the pipeline for single turns
pub struct TripOrchestrator {
    normalizer: RequestNormalizer,
    assembler: ContextAssembler,
    retriever: Retriever,
    generator: PlanGenerator,
    history: Arc<dyn HistoryClient>,
    /// Normalized intents stored for turns whose plan is not yet stored
    pending_normalised: Mutex<HashSet<(String, String)>>,
}

impl TripOrchestrator {
    pub fn new(
        normalizer: RequestNormalizer,
        assembler: ContextAssembler,
        retriever: Retriever,
        generator: PlanGenerator,
        history: Arc<dyn HistoryClient>,
    ) -> Self {
        Self {
            normalizer,
            assembler,
            retriever,
            generator,
            history,
            pending_normalised: Mutex::new(HashSet::new()),
        }
    }

    /// Process one inbound request
    pub async fn process(&self, payload: &Value) -> Result<TripPlan, PipelineError> {
        let mut partial = Partial::default();
        let mut stage = Stage::Normalize;

        match self.run(payload, &mut partial, &mut stage).await {
            Ok(plan) => Ok(plan),
            Err(e) => {
                error!(stage = stage.as_str(), error = %e, terminal = e.is_terminal(), "process: turn failed");
                self.persist_diagnostic(payload, &partial, stage, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, payload: &Value, partial: &mut Partial, stage: &mut Stage) -> Result<TripPlan, PipelineError> {
        *stage = Stage::Normalize;
        let intent = self.normalizer.normalize(payload)?;
        info!(thread_id = %intent.thread_id, message_id = %intent.message_id, "run: request normalized");
        partial.intent = Some(intent.clone());

        *stage = Stage::Assemble;
        let pack = self.assembler.assemble(intent).await;
        partial.pack = Some(pack.clone());

        *stage = Stage::Retrieve;
        let grounded = self.retriever.retrieve(pack).await;
        partial.grounded = Some(grounded.clone());

        *stage = Stage::Generate;
        let plan = self.generator.generate_plan(&grounded).await;
        partial.plan = Some(plan.clone());

        *stage = Stage::Persist;
        let thread_id = grounded.pack.intent.thread_id.as_str();
        let normalized = serde_json::to_value(&grounded.pack.intent).unwrap_or(Value::Null);
        let key = (thread_id.to_string(), normalized.to_string());
        if self.is_pending(&key) {
            debug!(%thread_id, "run: normalized intent already stored by an earlier attempt");
        } else {
            self.history
                .append_normalised(thread_id, ChatRole::User, &normalized)
                .await
                .map_err(|source| PipelineError::Persist {
                    what: "normalized intent",
                    source,
                })?;
            self.set_pending(&key, true);
        }

        let reply = serde_json::to_value(&plan).unwrap_or(Value::Null);
        self.history
            .append_message(thread_id, ChatRole::Assistant, &reply)
            .await
            .map_err(|source| PipelineError::Persist { what: "trip plan", source })?;
        self.set_pending(&key, false);

        info!(%thread_id, message_id = %plan.message_id, days = plan.days, "run: plan persisted");
        Ok(plan)
    }

    fn is_pending(&self, key: &(String, String)) -> bool {
        self.pending_normalised.lock().map(|p| p.contains(key)).unwrap_or(false)
    }

    fn set_pending(&self, key: &(String, String), pending: bool) {
        if let Ok(mut p) = self.pending_normalised.lock() {
            if pending {
                p.insert(key.clone());
            } else {
                p.remove(key);
            }
        }
    }

    /// Best-effort durable error record on the thread
    async fn persist_diagnostic(&self, payload: &Value, partial: &Partial, stage: Stage, err: &PipelineError) {
        let thread_id = partial
            .intent
            .as_ref()
            .map(|i| i.thread_id.clone())
            .or_else(|| payload.get("thread_id").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_THREAD.to_string());
        debug!(%thread_id, stage = stage.as_str(), "persist_diagnostic: called");

        let content = diagnostic(payload, partial, stage, err);
        if let Err(e) = self
            .history
            .append_message(&thread_id, ChatRole::System, &content)
            .await
        {
            warn!(%thread_id, error = %e, "persist_diagnostic: could not store diagnostic");
        }
    }
}

fn diagnostic(payload: &Value, partial: &Partial, stage: Stage, err: &PipelineError) -> Value {
    json!({
        "type": "pipeline_error",
        "kind": err.kind(),
        "stage": stage.as_str(),
        "terminal": err.is_terminal(),
        "error": err.to_string(),
        "request_id": payload.get("request_id").cloned().unwrap_or(Value::Null),
        "normalized": partial.intent.as_ref().and_then(|i| serde_json::to_value(i).ok()),
        "context": partial.pack.as_ref().map(|p| json!({
            "anchors": p.anchors,
            "recent_turns": p.recent.len(),
            "long_term_hits": p.long_term.len(),
            "window_summary": p.window_summary,
        })),
        "grounded": partial.grounded.as_ref().map(|g| json!({
            "query": g.query,
            "rules": g.grounding.rules.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            "places": g.grounding.places.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        })),
        "plan_generated": partial.plan.is_some(),
    })
}
