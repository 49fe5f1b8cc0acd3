//! Per-turn context records: anchors, chat window, memory hits, grounding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::intent::NormalizedIntent;

/// Travel anchors recovered from free-text chat
///
/// Derived each turn from the visible window; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSet {
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub duration_days: Option<u32>,
    pub depart_time_hhmm: Option<String>,
    pub return_same_day: bool,
    pub travel_mode: Option<String>,
}

impl AnchorSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Lenient parse; unknown roles are treated as system messages
    pub fn parse(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Self::User,
            "assistant" | "ai" | "bot" => Self::Assistant,
            _ => Self::System,
        }
    }
}

/// One message of a thread's chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub message_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatTurn {
    pub fn user(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            role: ChatRole::User,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// A long-term memory recalled for this turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub message_id: Option<String>,
    pub role: Option<String>,
    pub score: f32,
}

/// A downstream data lookup the generator may use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiIntent {
    pub tool: String,
    pub params: Value,
}

/// Everything known about the turn before retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    /// Intent with anchors back-filled
    pub intent: NormalizedIntent,
    pub anchors: AnchorSet,
    /// Bounded recent window, oldest first
    pub recent: Vec<ChatTurn>,
    pub long_term: Vec<MemoryHit>,
    pub window_summary: String,
    pub api_intents: Vec<ApiIntent>,
    pub cache_keys: BTreeMap<String, String>,
}

impl ContextPack {
    /// Text of the newest user turn in the window
    pub fn latest_user_text(&self) -> Option<&str> {
        self.recent
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::User && !t.content.trim().is_empty())
            .map(|t| t.content.as_str())
    }
}

/// A curated document returned by retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingDoc {
    pub id: String,
    pub text: String,
    /// Metadata `type` (RULE, POI, EVENT, LODGING, WEATHER, ...)
    pub doc_type: Option<String>,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl GroundingDoc {
    /// Display name from metadata, falling back to the document id
    pub fn name(&self) -> &str {
        self.metadata
            .get("name")
            .or_else(|| self.metadata.get("title"))
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn type_is(&self, wanted: &str) -> bool {
        self.doc_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(wanted))
    }
}

/// Retrieved documents split by authority
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingBuckets {
    /// Authoritative rules
    pub rules: Vec<GroundingDoc>,
    /// POI, event, lodging and weather grounding
    pub places: Vec<GroundingDoc>,
}

impl GroundingBuckets {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.places.is_empty()
    }

    pub fn lodging_candidates(&self) -> impl Iterator<Item = &GroundingDoc> {
        self.places.iter().filter(|d| d.type_is("LODGING"))
    }

    /// Places worth a day slot: everything except lodging and weather notes
    pub fn poi_candidates(&self) -> impl Iterator<Item = &GroundingDoc> {
        self.places
            .iter()
            .filter(|d| !d.type_is("LODGING") && !d.type_is("WEATHER"))
    }

    pub fn weather_hint(&self) -> Option<&str> {
        self.places
            .iter()
            .find(|d| d.type_is("WEATHER"))
            .map(|d| d.meta_str("summary").unwrap_or(d.text.as_str()))
    }
}

/// Context pack plus the grounding retrieved for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundedContext {
    pub pack: ContextPack,
    pub grounding: GroundingBuckets,
    /// Query string that produced the grounding
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, doc_type: &str) -> GroundingDoc {
        GroundingDoc {
            id: id.to_string(),
            text: format!("{} text", id),
            doc_type: Some(doc_type.to_string()),
            metadata: json!({"name": id.to_uppercase()}).as_object().cloned().unwrap(),
            score: 0.5,
        }
    }

    #[test]
    fn test_bucket_views() {
        let buckets = GroundingBuckets {
            rules: vec![doc("fire", "RULE")],
            places: vec![doc("camp", "lodging"), doc("falls", "POI"), doc("forecast", "WEATHER")],
        };
        assert_eq!(buckets.lodging_candidates().count(), 1);
        let pois: Vec<&str> = buckets.poi_candidates().map(|d| d.id.as_str()).collect();
        assert_eq!(pois, vec!["falls"]);
        assert_eq!(buckets.weather_hint(), Some("forecast text"));
        assert_eq!(buckets.places[0].name(), "CAMP");
    }

    #[test]
    fn test_latest_user_text_skips_assistant() {
        let pack = ContextPack {
            recent: vec![
                ChatTurn::user("m1", "first"),
                ChatTurn {
                    message_id: "m2".to_string(),
                    role: ChatRole::Assistant,
                    content: "reply".to_string(),
                    created_at: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(pack.latest_user_text(), Some("first"));
    }

    #[test]
    fn test_role_parse_is_lenient() {
        assert_eq!(ChatRole::parse("USER"), ChatRole::User);
        assert_eq!(ChatRole::parse("assistant"), ChatRole::Assistant);
        assert_eq!(ChatRole::parse("tool"), ChatRole::System);
    }
}
