//! Trip plan generation
//!
//! The primary path renders the prompt, asks the model for strict JSON and
//! parses it. Any failure along the way switches to the deterministic
//! fallback planner, so `generate_plan` always returns a plan.

mod fallback;
mod guardrail;
mod parse;
mod prompt;

pub use fallback::{POIS_PER_DAY, fallback_plan};
pub use guardrail::apply_amenity_guardrail;
pub use parse::{PlanParseError, parse_plan};
pub use prompt::{PlanPromptContext, enumerated_filters};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{GroundedContext, TripPlan};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message, StopReason};
use crate::prompts::PromptLoader;

/// Why the primary path did not produce a plan
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("No generation model configured")]
    Disabled,

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Model output truncated at max tokens")]
    Truncated,

    #[error(transparent)]
    Parse(#[from] PlanParseError),
}

pub struct PlanGenerator {
    llm: Option<Arc<dyn LlmClient>>,
    prompts: PromptLoader,
    config: Config,
}

impl PlanGenerator {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, prompts: PromptLoader, config: &Config) -> Self {
        debug!(has_model = llm.is_some(), "PlanGenerator::new: called");
        Self {
            llm,
            prompts,
            config: config.clone(),
        }
    }

    /// Fallback-only generator
    pub fn offline(config: &Config) -> Self {
        Self::new(None, PromptLoader::embedded_only(), config)
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    /// Produce a plan for the turn; never fails
    pub async fn generate_plan(&self, grounded: &GroundedContext) -> TripPlan {
        let intent = &grounded.pack.intent;
        debug!(thread_id = %intent.thread_id, message_id = %intent.message_id, "generate_plan: called");

        let mut plan = match self.generate_with_model(grounded).await {
            Ok(plan) => {
                info!(thread_id = %intent.thread_id, days = plan.days, "generate_plan: model plan accepted");
                plan
            }
            Err(GenerateError::Disabled) => {
                debug!("generate_plan: no model, using fallback planner");
                fallback_plan(grounded)
            }
            Err(e) => {
                warn!(thread_id = %intent.thread_id, error = %e, "generate_plan: model path failed, using fallback planner");
                fallback_plan(grounded)
            }
        };

        apply_amenity_guardrail(&mut plan, &intent.constraints.lodging.amenities);
        plan
    }

    /// Primary path: prompt, model call, parse
    pub async fn generate_with_model(&self, grounded: &GroundedContext) -> Result<TripPlan, GenerateError> {
        let llm = self.llm.as_ref().ok_or(GenerateError::Disabled)?;

        let context = PlanPromptContext::build(grounded, &self.config);
        let system_prompt = self
            .prompts
            .render(&self.config.prompt.template, &context)
            .map_err(|e| GenerateError::Prompt(format!("{:#}", e)))?;

        let user_text = grounded
            .pack
            .latest_user_text()
            .unwrap_or("Plan this turn using the input above.")
            .to_string();

        let request = CompletionRequest {
            system_prompt,
            messages: vec![Message::user(user_text)],
            max_tokens: self.config.llm.max_tokens,
            json_mode: true,
        };

        debug!(model = %llm.model(), "generate_with_model: calling model");
        let response = llm.complete(request).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "generate_with_model: model responded"
        );

        if response.stop_reason == StopReason::MaxTokens {
            return Err(GenerateError::Truncated);
        }

        let raw = response.content.unwrap_or_default();
        Ok(parse_plan(&raw, &grounded.pack.intent)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatTurn, LodgingSummary, Place, PlanMode};
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;

    fn grounded(days: u32) -> GroundedContext {
        let mut grounded = GroundedContext::default();
        grounded.pack.intent.thread_id = "t1".to_string();
        grounded.pack.intent.message_id = "m2".to_string();
        grounded.pack.intent.time.days = Some(days);
        grounded.pack.intent.geo_scope.destination = Some(Place::named("Truckee"));
        grounded.pack.recent = vec![ChatTurn::user("m2", "plan 2 days in Truckee")];
        grounded
    }

    fn generator(client: MockLlmClient) -> (Arc<MockLlmClient>, PlanGenerator) {
        let client = Arc::new(client);
        let generator = PlanGenerator::new(
            Some(client.clone() as Arc<dyn LlmClient>),
            PromptLoader::embedded_only(),
            &Config::default(),
        );
        (client, generator)
    }

    #[tokio::test]
    async fn test_model_plan_is_used() {
        let (client, generator) = generator(MockLlmClient::replying(
            r#"{"reply": {"mode": "TRIP_PLAN", "days": 2, "itinerary": [{"day": 1, "title": "Lake day"}]}}"#,
        ));
        let plan = generator.generate_plan(&grounded(2)).await;

        assert_eq!(client.call_count(), 1);
        let request = &client.requests()[0];
        assert!(request.json_mode);
        assert!(request.system_prompt.contains("Truckee"));
        assert_eq!(plan.itinerary[0].title, "Lake day");
        assert_eq!(plan.itinerary.len(), 2);
        assert_eq!(plan.thread_id, "t1");
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let (client, generator) = generator(MockLlmClient::new(vec![]));
        let plan = generator.generate_plan(&grounded(2)).await;
        assert_eq!(client.call_count(), 1);
        assert_eq!(plan.mode, Some(PlanMode::TripPlan));
        assert!(plan.itinerary[0].title.starts_with("Day 1 in Truckee"));
        assert!(plan.has_valid_itinerary());
    }

    #[tokio::test]
    async fn test_unparsable_output_falls_back() {
        let (_, generator) = generator(MockLlmClient::replying("Sure! Here's a plan: day one, go hiking."));
        let plan = generator.generate_plan(&grounded(3)).await;
        assert_eq!(plan.itinerary.len(), 3);
        assert!(plan.itinerary[2].title.ends_with("Wrap-up & Relax"));
    }

    #[tokio::test]
    async fn test_truncated_output_falls_back() {
        let mut response = CompletionResponse::text(r#"{"type": "trip_plan", "days": 2"#);
        response.stop_reason = StopReason::MaxTokens;
        let (_, generator) = generator(MockLlmClient::new(vec![response]));
        assert!(matches!(
            generator.generate_with_model(&grounded(2)).await,
            Err(GenerateError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_guardrail_runs_on_model_output() {
        let (_, generator) = generator(MockLlmClient::replying(
            r#"{"type": "trip_plan", "days": 1, "lodging": {"name": "Cedar House", "notes": "Modern rooms"}}"#,
        ));
        let mut ctx = grounded(1);
        ctx.pack.intent.constraints.lodging.amenities = vec!["PARKING".to_string()];
        let plan = generator.generate_plan(&ctx).await;
        let LodgingSummary { notes, .. } = plan.lodging.unwrap();
        assert!(notes.unwrap().to_lowercase().contains("parking"));
    }

    #[tokio::test]
    async fn test_offline_generator_never_calls_out() {
        let generator = PlanGenerator::offline(&Config::default());
        assert!(!generator.has_model());
        assert!(matches!(
            generator.generate_with_model(&grounded(1)).await,
            Err(GenerateError::Disabled)
        ));
        let plan = generator.generate_plan(&grounded(1)).await;
        assert_eq!(plan.itinerary.len(), 1);
    }
}
