//! Integration tests for TripWeaver
//!
//! End-to-end turns through the public pipeline API with in-process
//! collaborators: in-memory history, a local store and a scripted model.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use memorystore::MemoryStore;
use serde_json::{Value, json};

use tripweaver::config::Config;
use tripweaver::domain::{ChatRole, ChatTurn, PlanMode};
use tripweaver::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use tripweaver::{
    ChannelQueue, ContextAssembler, InMemoryHistory, LocalGroundingStore, LocalLongTermMemory, PipelineError,
    PlanGenerator, PromptLoader, RequestNormalizer, Retriever, TripOrchestrator, Worker,
};

// =============================================================================
// Harness
// =============================================================================

/// Model stand-in answering from a fixed script
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.prompts.lock().unwrap().push(request.system_prompt);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(CompletionResponse::text(text)),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    orchestrator: TripOrchestrator,
    history: Arc<InMemoryHistory>,
}

fn seed_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/grounding_ca.json")
}

async fn harness(history: InMemoryHistory, llm: Option<Arc<dyn LlmClient>>) -> Harness {
    let config = Config::default();
    let history = Arc::new(history);
    let store = Arc::new(MemoryStore::in_memory());

    let grounding = Arc::new(LocalGroundingStore::new(store.clone(), "travel_docs", 2));
    let seeded = grounding.seed_from_file(&seed_path()).await.expect("seed corpus");
    assert!(seeded > 10);

    let memory = Arc::new(LocalLongTermMemory::new(store, "memories", 2));
    let orchestrator = TripOrchestrator::new(
        RequestNormalizer::new(&config),
        ContextAssembler::new(history.clone(), memory, &config),
        Retriever::new(grounding, &config),
        PlanGenerator::new(llm, PromptLoader::embedded_only(), &config),
        history.clone(),
    );
    Harness { orchestrator, history }
}

fn stored_plan(history: &InMemoryHistory, thread_id: &str) -> Value {
    history
        .appended(thread_id)
        .into_iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content)
        .expect("plan persisted")
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_dates_give_days_and_season() {
    let h = harness(InMemoryHistory::new(), None).await;
    let plan = h
        .orchestrator
        .process(&json!({
            "thread_id": "ta",
            "message_id": "m1",
            "dates": {"start": "2025-06-01", "end": "2025-06-04"},
            "destination": {"region_code": "US-CA"}
        }))
        .await
        .unwrap();

    assert_eq!(plan.days, 3);
    assert!(plan.has_valid_itinerary());

    let normalized = h
        .history
        .appended("ta")
        .into_iter()
        .find(|m| m.normalised)
        .expect("normalized intent persisted")
        .content;
    assert_eq!(normalized["time"]["days"], 3);
    assert_eq!(normalized["time"]["season_hint"], "SUMMER");
}

#[tokio::test]
async fn test_scenario_b_anchors_from_chat_text() {
    let h = harness(InMemoryHistory::new(), None).await;
    let plan = h
        .orchestrator
        .process(&json!({
            "thread_id": "tb",
            "message_id": "m1",
            "content": "drive to Truckee from Fremont, one day trip, leave at 7am"
        }))
        .await
        .unwrap();

    assert_eq!(plan.destination.as_deref(), Some("Truckee"));
    assert_eq!(plan.days, 1);
    assert_eq!(plan.itinerary.len(), 1);
    assert!(plan.itinerary[0].activities.len() <= 3);
    assert!(!plan.itinerary[0].activities.is_empty());
    assert!(plan.lodging.is_some());
    assert!(plan.weather_hint.as_deref().is_some_and(|w| w.contains("snow")));

    let normalized = h
        .history
        .appended("tb")
        .into_iter()
        .find(|m| m.normalised)
        .unwrap()
        .content;
    assert_eq!(normalized["geo_scope"]["origin"]["name"], "Fremont");
    assert_eq!(normalized["constraints"]["transport"]["allowed"], json!(["CAR"]));
}

#[tokio::test]
async fn test_scenario_c_budget_band_per_day() {
    let intent = RequestNormalizer::new(&Config::default())
        .normalize(&json!({"user_filters": {"budget_level": "USD_500_1000", "duration_days": 5}}))
        .unwrap();
    let budget = intent.constraints.budget.unwrap();
    assert_eq!(budget.band, "USD_500_1000");
    assert_eq!(budget.ceiling_total, 1000);
    assert_eq!(budget.per_day, Some(200));
}

#[tokio::test]
async fn test_scenario_d_parking_note_added() {
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(json!({
        "reply": {
            "type": "trip_plan",
            "mode": "TRIP_PLAN",
            "days": 2,
            "lodging": {"name": "Cedar House Sport Hotel", "type": "HOTEL", "notes": "Modern rooms near downtown."},
            "itinerary": [
                {"day": 1, "title": "Lake day", "highlights": ["Donner Lake"], "activities": [{"name": "Kayak Donner Lake"}]},
                {"day": 2, "title": "Town day", "highlights": ["Downtown"], "activities": ["Coffee on Donner Pass Road"]}
            ]
        }
    })
    .to_string())]));

    let h = harness(InMemoryHistory::new(), Some(llm.clone())).await;
    let plan = h
        .orchestrator
        .process(&json!({
            "thread_id": "td",
            "message_id": "m1",
            "destination": "Truckee",
            "user_filters": {"duration_days": 2, "amenities": ["PARKING"]},
            "content": "two days in Truckee please"
        }))
        .await
        .unwrap();

    let notes = plan.lodging.as_ref().and_then(|l| l.notes.clone()).unwrap();
    assert!(notes.to_lowercase().contains("parking"));
    assert!(notes.starts_with("Modern rooms near downtown."));
    assert_eq!(plan.itinerary[0].title, "Lake day");

    let prompt = &llm.prompts()[0];
    assert!(prompt.contains("PARKING"));
    assert!(prompt.contains("Truckee"));

    let stored = stored_plan(&h.history, "td");
    assert!(stored["lodging"]["notes"].as_str().unwrap().contains("parking"));
}

// =============================================================================
// Generation failure paths
// =============================================================================

#[tokio::test]
async fn test_model_error_yields_fallback_plan() {
    let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::ApiError {
        status: 503,
        message: "overloaded".to_string(),
    })]));
    let h = harness(InMemoryHistory::new(), Some(llm)).await;
    let plan = h
        .orchestrator
        .process(&json!({"thread_id": "tf", "message_id": "m1", "content": "3 days in Big Sur"}))
        .await
        .unwrap();

    assert_eq!(plan.mode, Some(PlanMode::TripPlan));
    assert_eq!(plan.days, 3);
    assert!(plan.has_valid_itinerary());
    assert!(plan.itinerary[0].title.starts_with("Day 1 in Big Sur"));
}

#[tokio::test]
async fn test_unparsable_model_output_yields_fallback_plan() {
    let llm = Arc::new(ScriptedLlm::new(vec![Ok("I'd love to help! Day 1: beach.".to_string())]));
    let h = harness(InMemoryHistory::new(), Some(llm)).await;
    let plan = h
        .orchestrator
        .process(&json!({"thread_id": "tu", "message_id": "m1", "content": "plan 2 days in Big Sur"}))
        .await
        .unwrap();
    assert_eq!(plan.itinerary.len(), 2);
    assert!(plan.itinerary[1].title.ends_with("Wrap-up & Relax"));
}

#[tokio::test]
async fn test_unknown_length_asks_for_days() {
    let h = harness(InMemoryHistory::new(), None).await;
    let plan = h
        .orchestrator
        .process(&json!({"thread_id": "tq", "message_id": "m1", "content": "hello there"}))
        .await
        .unwrap();
    assert_eq!(plan.mode, Some(PlanMode::Clarify));
    assert_eq!(plan.days, 0);
    assert!(plan.itinerary.is_empty());
}

// =============================================================================
// Memory across turns
// =============================================================================

#[tokio::test]
async fn test_second_turn_sees_first_turn() {
    let history = InMemoryHistory::new().with_turns(
        "tm",
        vec![ChatTurn::user("m1", "we want a road trip to Big Sur")],
    );
    let llm = Arc::new(ScriptedLlm::new(vec![
        Ok(r#"{"type": "trip_plan", "days": 0}"#.to_string()),
        Ok(r#"{"type": "trip_plan", "days": 3}"#.to_string()),
    ]));
    let h = harness(history, Some(llm.clone())).await;

    let first = h
        .orchestrator
        .process(&json!({"thread_id": "tm", "message_id": "m1", "content": "we want a road trip to Big Sur"}))
        .await
        .unwrap();
    assert_eq!(first.destination.as_deref(), Some("Big Sur"));

    let second = h
        .orchestrator
        .process(&json!({"thread_id": "tm", "message_id": "m2", "content": "make it 3 days"}))
        .await
        .unwrap();
    assert_eq!(second.destination.as_deref(), Some("Big Sur"));
    assert_eq!(second.days, 3);
    assert!(second.has_valid_itinerary());

    let prompt = &llm.prompts()[1];
    assert!(prompt.contains("[user] we want a road trip to Big Sur"));
    assert!(prompt.contains("make it 3 days"));
}

// =============================================================================
// Errors and the worker
// =============================================================================

#[tokio::test]
async fn test_persist_failure_records_nothing_and_is_retryable() {
    let history = InMemoryHistory::new();
    history.set_fail_writes(true);
    let h = harness(history, None).await;

    let err = h
        .orchestrator
        .process(&json!({"thread_id": "tp", "message_id": "m1", "content": "1 day in Truckee"}))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persist { .. }));
    assert!(!err.is_terminal());
    assert!(h.history.appended("tp").is_empty());
}

#[tokio::test]
async fn test_invalid_request_leaves_diagnostic() {
    let h = harness(InMemoryHistory::new(), None).await;
    let err = h
        .orchestrator
        .process(&json!({"thread_id": "tv", "destination": {"name": "  "}}))
        .await
        .unwrap_err();
    assert!(err.is_terminal());

    let stored = h.history.appended("tv");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, ChatRole::System);
    assert_eq!(stored[0].content["type"], "pipeline_error");
    assert_eq!(stored[0].content["stage"], "normalize");
}

#[tokio::test]
async fn test_worker_drains_queue() {
    let h = harness(InMemoryHistory::new(), None).await;
    let history = h.history.clone();
    let queue = Arc::new(ChannelQueue::new("trip_requests"));
    for (i, text) in ["2 days in Big Sur", "day trip to Truckee", "3 days in Yosemite"].iter().enumerate() {
        queue
            .push_payload(json!({"thread_id": format!("w{}", i), "message_id": "m1", "content": text}))
            .await
            .unwrap();
    }

    let mut config = Config::default();
    config.worker.poll_timeout_ms = 20;
    let stats = Worker::new(queue, Arc::new(h.orchestrator), &config.worker).drain().await;

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stored_plan(&history, "w1")["days"], 1);
    assert_eq!(stored_plan(&history, "w2")["destination"], "Yosemite");
}
