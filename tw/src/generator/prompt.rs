//! Prompt context for the plan template

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{Config, PromptConfig};
use crate::domain::{GroundedContext, GroundingDoc, NormalizedIntent, PLAN_VERSION};

/// Characters kept per grounding document
const GROUNDING_CHARS: usize = 400;

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundingLine {
    pub name: String,
    pub kind: String,
    pub text: String,
}

/// Everything the trip plan template renders
#[derive(Debug, Clone, Serialize)]
pub struct PlanPromptContext {
    pub primary_region: String,
    pub version: String,
    pub thread_id: String,
    pub message_id: String,
    pub last_user_message: Option<String>,
    pub window_summary: String,
    pub transcript: Vec<TranscriptLine>,
    pub memories: Vec<String>,
    pub rules: Vec<GroundingLine>,
    pub places: Vec<GroundingLine>,
    /// Pretty-printed context pack and filter object
    pub input_json: String,
}

impl PlanPromptContext {
    pub fn build(grounded: &GroundedContext, config: &Config) -> Self {
        let bounds = &config.prompt;
        let pack = &grounded.pack;
        let intent = &pack.intent;

        let skip = pack.recent.len().saturating_sub(bounds.transcript_turns);
        let transcript = pack.recent[skip..]
            .iter()
            .map(|turn| TranscriptLine {
                role: turn.role.as_str().to_string(),
                content: clip(&turn.content, bounds.transcript_chars),
            })
            .collect();

        let memories = memory_digest(grounded, bounds);

        let rules = grounding_lines(&grounded.grounding.rules, bounds.grounding_per_bucket);
        let places = grounding_lines(&grounded.grounding.places, bounds.grounding_per_bucket);

        let input = json!({
            "context_pack": {
                "thread_id": intent.thread_id,
                "message_id": intent.message_id,
                "last_user_message": pack.latest_user_text(),
                "window_summary": pack.window_summary,
                "anchors": pack.anchors,
                "time": intent.time,
                "geo_scope": intent.geo_scope,
                "constraints": intent.constraints,
                "api_intents": pack.api_intents,
                "weather_hint": grounded.grounding.weather_hint(),
            },
            "filters": enumerated_filters(intent),
        });

        Self {
            primary_region: config.vocab.primary_region_name.clone(),
            version: PLAN_VERSION.to_string(),
            thread_id: intent.thread_id.clone(),
            message_id: intent.message_id.clone(),
            last_user_message: pack.latest_user_text().map(|t| clip(t, bounds.transcript_chars)),
            window_summary: pack.window_summary.clone(),
            transcript,
            memories,
            rules,
            places,
            input_json: serde_json::to_string_pretty(&input).unwrap_or_else(|_| input.to_string()),
        }
    }
}

/// Long-term hits for the prompt, skipping the current turn's own memory
fn memory_digest(grounded: &GroundedContext, bounds: &PromptConfig) -> Vec<String> {
    let current = grounded.pack.intent.message_id.as_str();
    grounded
        .pack
        .long_term
        .iter()
        .filter(|hit| hit.message_id.as_deref() != Some(current))
        .take(bounds.memory_digest)
        .map(|hit| clip(&hit.text, bounds.transcript_chars))
        .collect()
}

fn grounding_lines(docs: &[GroundingDoc], limit: usize) -> Vec<GroundingLine> {
    docs.iter()
        .take(limit)
        .map(|doc| GroundingLine {
            name: doc.name().to_string(),
            kind: doc.doc_type.clone().unwrap_or_else(|| "DOC".to_string()),
            text: clip(&doc.text, GROUNDING_CHARS),
        })
        .collect()
}

/// Every filter key, present even when empty
pub fn enumerated_filters(intent: &NormalizedIntent) -> Value {
    let c = &intent.constraints;
    json!({
        "days": intent.time.days,
        "season": intent.time.season_hint,
        "destination": intent.destination_name(),
        "origin": intent.origin_name(),
        "out_of_scope": intent.geo_scope.out_of_scope,
        "trip_types": c.trip_types,
        "difficulty": c.difficulty.as_ref().map(|d| d.level.as_str()),
        "budget_band": c.budget.as_ref().map(|b| b.band.as_str()),
        "budget_ceiling_total": c.budget.as_ref().map(|b| b.ceiling_total),
        "budget_per_day": c.budget.as_ref().and_then(|b| b.per_day),
        "travel_modes_allowed": c.transport.allowed,
        "travel_modes_forbidden": c.transport.forbidden,
        "intercity_travel": c.transport.intercity_travel,
        "lodging_types": c.lodging.types,
        "pet_friendly_required": c.lodging.pet_friendly_required,
        "amenities": c.lodging.amenities,
        "diet": c.diet,
        "themes": c.themes,
        "must_include": c.poi_tags.must_include,
        "must_exclude": c.poi_tags.must_exclude,
        "group_type": c.group_type,
        "events_only": c.events_only,
    })
}

/// Trim to at most `max` characters, marking the cut
pub fn clip(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}
