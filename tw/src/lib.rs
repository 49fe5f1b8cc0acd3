//! TripWeaver - conversational trip planning worker
//!
//! Turns one inbound chat turn into a grounded, structured trip plan.
//!
//! # Pipeline
//!
//! - [`normalize`] - raw request to a typed `NormalizedIntent`
//! - [`context`] - recent window, chat anchors, long-term memory
//! - [`retrieval`] - curated grounding documents for the turn
//! - [`generator`] - model plan with a deterministic fallback
//! - [`orchestrator`] - one turn end to end, with persistence
//! - [`worker`] - queue consumer with retry and backoff
//!
//! Supporting modules: [`anchors`], [`memory`], [`history`], [`llm`], [`lookups`],
//! [`prompts`], [`queue`], [`config`], [`cli`].

pub mod anchors;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod generator;
pub mod history;
pub mod llm;
pub mod lookups;
pub mod memory;
pub mod normalize;
pub mod orchestrator;
pub mod prompts;
pub mod queue;
pub mod retrieval;
pub mod worker;

// Re-export commonly used types
pub use anchors::AnchorExtractor;
pub use config::Config;
pub use context::ContextAssembler;
pub use domain::{AnchorSet, ContextPack, GroundedContext, NormalizedIntent, TripPlan};
pub use generator::PlanGenerator;
pub use history::{HistoryClient, InMemoryHistory, create_history};
pub use llm::{LlmClient, LlmError, create_client};
pub use lookups::{HttpIntentExecutor, IntentExecutor};
pub use memory::{LocalLongTermMemory, LongTermMemory, StoreError};
pub use normalize::{RequestNormalizer, ValidationError};
pub use orchestrator::{PipelineError, TripOrchestrator};
pub use prompts::PromptLoader;
pub use queue::{ChannelQueue, QueuedRequest, TripQueue};
pub use retrieval::{GroundingStore, LocalGroundingStore, Retriever};
pub use worker::{Worker, WorkerStats};
