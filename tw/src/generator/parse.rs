//! Model output to `TripPlan`
//!
//! Model JSON is loose: code fences, a `{"reply": ...}` wrapper, numbers as
//! strings, bare activity names. Everything is coerced into the plan schema
//! before deserialisation so one malformed field does not discard the plan.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::{MAX_TRIP_DAYS, NormalizedIntent, PLAN_TYPE, PLAN_VERSION, TripPlan};

const MODES: &[&str] = &["GREETING_ONLY", "QUESTION_ANSWER", "TRIP_PLAN", "CLARIFY"];

const TEXT_FIELDS: &[&str] = &[
    "destination",
    "difficulty",
    "budget_band",
    "weather_hint",
    "window_summary",
    "intro_text",
    "closing_tips",
];

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("Model returned no content")]
    Empty,

    #[error("No JSON object in model output")]
    NoJsonObject,

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected reply type: {0}")]
    WrongType(String),
}

/// Parse raw model output into a plan for the given turn
pub fn parse_plan(raw: &str, intent: &NormalizedIntent) -> Result<TripPlan, PlanParseError> {
    debug!(len = raw.len(), "parse_plan: called");
    if raw.trim().is_empty() {
        return Err(PlanParseError::Empty);
    }

    let body = extract_json_object(raw).ok_or(PlanParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(body)?;
    let mut object = unwrap_reply(value)?;

    sanitize(&mut object);
    backfill(&mut object, intent);

    let mut plan: TripPlan = serde_json::from_value(Value::Object(object))?;
    if plan.repair_itinerary() {
        debug!(days = plan.days, "parse_plan: itinerary repaired");
    }
    Ok(plan)
}

/// Outermost `{...}` span, ignoring code fences and chatter around it
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn unwrap_reply(value: Value) -> Result<Map<String, Value>, PlanParseError> {
    let Value::Object(mut object) = value else {
        return Err(PlanParseError::WrongType("non-object".to_string()));
    };

    if let Some(Value::Object(reply)) = object.remove("reply") {
        return Ok(reply);
    }

    match object.get("type").and_then(Value::as_str) {
        Some(kind) if kind.eq_ignore_ascii_case(PLAN_TYPE) => Ok(object),
        Some(kind) => Err(PlanParseError::WrongType(kind.to_string())),
        None => Err(PlanParseError::WrongType("missing".to_string())),
    }
}

fn sanitize(object: &mut Map<String, Value>) {
    match object.get("days").filter(|v| !v.is_null()).map(as_count) {
        Some(days) => {
            object.insert("days".to_string(), Value::from(days.min(u64::from(MAX_TRIP_DAYS))));
        }
        None => {
            object.remove("days");
        }
    }

    let mode = object
        .get("mode")
        .and_then(Value::as_str)
        .map(|m| m.trim().to_ascii_uppercase().replace([' ', '-'], "_"))
        .filter(|m| MODES.contains(&m.as_str()));
    object.insert("mode".to_string(), mode.map(Value::from).unwrap_or(Value::Null));

    for field in TEXT_FIELDS {
        let text = object.get(*field).and_then(text_of);
        object.insert(field.to_string(), text.map(Value::from).unwrap_or(Value::Null));
    }

    let trip_types = object.get("trip_types").map(string_list).unwrap_or_default();
    object.insert("trip_types".to_string(), Value::from(trip_types));

    let lodging = object.get("lodging").and_then(sanitize_lodging);
    object.insert("lodging".to_string(), lodging.unwrap_or(Value::Null));

    let itinerary: Vec<Value> = object
        .get("itinerary")
        .and_then(Value::as_array)
        .map(|days| days.iter().filter_map(sanitize_day).collect())
        .unwrap_or_default();
    object.insert("itinerary".to_string(), Value::from(itinerary));
}

fn backfill(object: &mut Map<String, Value>, intent: &NormalizedIntent) {
    object.insert("type".to_string(), Value::from(PLAN_TYPE));
    object.insert("version".to_string(), Value::from(PLAN_VERSION));
    object.insert("thread_id".to_string(), Value::from(intent.thread_id.as_str()));
    object.insert("message_id".to_string(), Value::from(intent.message_id.as_str()));

    if !object.contains_key("days") {
        let listed = object.get("itinerary").and_then(Value::as_array).map_or(0, Vec::len) as u32;
        let days = intent.time.days.unwrap_or(listed).min(MAX_TRIP_DAYS);
        debug!(days, "backfill: days missing from reply");
        object.insert("days".to_string(), Value::from(days));
    }

    if object.get("destination").is_none_or(Value::is_null)
        && let Some(destination) = intent.destination_name()
    {
        object.insert("destination".to_string(), Value::from(destination));
    }
}

/// Non-negative whole number from a JSON number or numeric string
fn as_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| f.round() as u64)
            .unwrap_or(0),
        _ => 0,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        Value::String(s) => text_of(&Value::String(s.clone())).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn sanitize_lodging(value: &Value) -> Option<Value> {
    let lodging = value.as_object()?;
    let name = lodging.get("name").and_then(text_of)?;
    let mut out = Map::new();
    out.insert("name".to_string(), Value::from(name));
    for field in ["type", "location", "notes"] {
        let text = lodging.get(field).and_then(text_of);
        out.insert(field.to_string(), text.map(Value::from).unwrap_or(Value::Null));
    }
    Some(Value::Object(out))
}

fn sanitize_day(value: &Value) -> Option<Value> {
    let day = value.as_object()?;
    let mut out = Map::new();
    out.insert("day".to_string(), Value::from(day.get("day").map(as_count).unwrap_or(0)));
    out.insert(
        "title".to_string(),
        Value::from(day.get("title").and_then(text_of).unwrap_or_default()),
    );
    out.insert(
        "highlights".to_string(),
        Value::from(day.get("highlights").map(string_list).unwrap_or_default()),
    );
    let activities: Vec<Value> = day
        .get("activities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(sanitize_activity).collect())
        .unwrap_or_default();
    out.insert("activities".to_string(), Value::from(activities));
    Some(Value::Object(out))
}

fn sanitize_activity(value: &Value) -> Option<Value> {
    let mut out = Map::new();
    match value {
        Value::String(_) => {
            out.insert("name".to_string(), Value::from(text_of(value)?));
        }
        Value::Object(activity) => {
            let name = activity.get("name").or_else(|| activity.get("title")).and_then(text_of)?;
            out.insert("name".to_string(), Value::from(name));
            let description = activity.get("description").and_then(text_of);
            out.insert("description".to_string(), description.map(Value::from).unwrap_or(Value::Null));
            out.insert(
                "tags".to_string(),
                Value::from(activity.get("tags").map(string_list).unwrap_or_default()),
            );
            let hours = activity.get("estimated_time_hours").and_then(|h| match h {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            });
            let hours = hours.filter(|h| h.is_finite() && *h >= 0.0);
            out.insert("estimated_time_hours".to_string(), hours.map(Value::from).unwrap_or(Value::Null));
        }
        _ => return None,
    }
    Some(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Place, PlanMode};

    fn intent() -> NormalizedIntent {
        let mut intent = NormalizedIntent {
            thread_id: "t1".to_string(),
            message_id: "m9".to_string(),
            ..Default::default()
        };
        intent.geo_scope.destination = Some(Place::named("Truckee"));
        intent
    }

    #[test]
    fn test_reply_wrapper_in_code_fence() {
        let raw = r#"```json
{"reply": {"type": "trip_plan", "mode": "trip plan", "days": "2", "itinerary": [
  {"day": 1, "title": "Arrive", "highlights": ["Donner Lake"], "activities": ["Swim", {"name": "Hike", "estimated_time_hours": "2.5"}]},
  {"day": 2, "title": "Town", "activities": [{"description": "no name"}]}
]}}
```"#;
        let plan = parse_plan(raw, &intent()).unwrap();
        assert_eq!(plan.kind, "trip_plan");
        assert_eq!(plan.version, "v1");
        assert_eq!(plan.thread_id, "t1");
        assert_eq!(plan.message_id, "m9");
        assert_eq!(plan.destination.as_deref(), Some("Truckee"));
        assert_eq!(plan.mode, Some(PlanMode::TripPlan));
        assert_eq!(plan.days, 2);
        assert_eq!(plan.itinerary[0].activities.len(), 2);
        assert_eq!(plan.itinerary[0].activities[1].estimated_time_hours, Some(2.5));
        assert!(plan.itinerary[1].activities.is_empty());
    }

    #[test]
    fn test_bare_object_must_be_trip_plan() {
        let raw = r#"{"type": "weather_report", "days": 1}"#;
        assert!(matches!(parse_plan(raw, &intent()), Err(PlanParseError::WrongType(_))));

        let raw = r#"{"type": "trip_plan", "days": 0, "destination": "Reno", "itinerary": [{"day": 1}]}"#;
        let plan = parse_plan(raw, &intent()).unwrap();
        assert_eq!(plan.destination.as_deref(), Some("Reno"));
        assert!(plan.itinerary.is_empty());
    }

    #[test]
    fn test_unusable_output() {
        assert!(matches!(parse_plan("   ", &intent()), Err(PlanParseError::Empty)));
        assert!(matches!(parse_plan("sorry, I can't", &intent()), Err(PlanParseError::NoJsonObject)));
        assert!(matches!(parse_plan("{not json}", &intent()), Err(PlanParseError::Json(_))));
    }

    #[test]
    fn test_lodging_without_name_is_dropped() {
        let raw = r#"{"type": "trip_plan", "days": 1, "lodging": {"type": "CABIN"}}"#;
        let plan = parse_plan(raw, &intent()).unwrap();
        assert!(plan.lodging.is_none());
        assert_eq!(plan.itinerary.len(), 1);
        assert_eq!(plan.itinerary[0].title, "Day 1 in Truckee");

        let raw = r#"{"type": "trip_plan", "days": 1, "lodging": {"name": "Cedar House", "type": "HOTEL", "notes": 4}}"#;
        let lodging = parse_plan(raw, &intent()).unwrap().lodging.unwrap();
        assert_eq!(lodging.name, "Cedar House");
        assert_eq!(lodging.kind.as_deref(), Some("HOTEL"));
        assert_eq!(lodging.notes.as_deref(), Some("4"));
    }

    #[test]
    fn test_unknown_mode_and_bad_days_are_cleared() {
        let raw = r#"{"type": "TRIP_PLAN", "mode": "poem", "days": -3}"#;
        let plan = parse_plan(raw, &intent()).unwrap();
        assert_eq!(plan.mode, None);
        assert_eq!(plan.days, 0);
    }

    #[test]
    fn test_missing_days_taken_from_intent() {
        let mut with_days = intent();
        with_days.time.days = Some(2);
        let raw = r#"{"type": "trip_plan", "itinerary": [
            {"day": 1, "title": "Lake", "activities": ["Kayak"]},
            {"day": 2, "title": "Town", "activities": ["Coffee"]}
        ]}"#;
        let plan = parse_plan(raw, &with_days).unwrap();
        assert_eq!(plan.days, 2);
        assert_eq!(plan.itinerary.len(), 2);
        assert_eq!(plan.itinerary[1].title, "Town");

        let plan = parse_plan(raw, &intent()).unwrap();
        assert_eq!(plan.days, 2);
        assert!(plan.has_valid_itinerary());

        let raw = r#"{"type": "trip_plan", "days": null}"#;
        assert_eq!(parse_plan(raw, &intent()).unwrap().days, 0);
    }

    #[test]
    fn test_days_capped() {
        let raw = r#"{"type": "trip_plan", "days": 4000000000}"#;
        let plan = parse_plan(raw, &intent()).unwrap();
        assert_eq!(plan.days, MAX_TRIP_DAYS);
        assert_eq!(plan.itinerary.len(), MAX_TRIP_DAYS as usize);
    }
}
