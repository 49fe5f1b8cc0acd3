//! Deterministic recap of the conversation window

use crate::domain::{ChatRole, ChatTurn, NormalizedIntent};

/// Characters of the last user message kept in the recap
const PREVIEW_CHARS: usize = 160;

const EMPTY_SUMMARY: &str = "No trip details shared yet.";

/// Build the window summary from whatever intent fields are present
pub fn window_summary(intent: &NormalizedIntent, recent: &[ChatTurn]) -> String {
    let mut parts: Vec<String> = Vec::new();

    match (intent.destination_name(), intent.origin_name()) {
        (Some(dest), Some(origin)) => parts.push(format!("Trip to {} from {}", dest, origin)),
        (Some(dest), None) => parts.push(format!("Trip to {}", dest)),
        (None, Some(origin)) => parts.push(format!("Trip from {}", origin)),
        (None, None) => {}
    }

    let constraints = &intent.constraints;
    if !constraints.trip_types.is_empty() {
        parts.push(format!("Trip types: {}", constraints.trip_types.join(", ")));
    }
    if let Some(difficulty) = &constraints.difficulty {
        parts.push(format!("Difficulty: {}", difficulty.level));
    }
    if let Some(budget) = &constraints.budget {
        parts.push(format!("Budget: {}", budget.band));
    }
    if !constraints.transport.allowed.is_empty() {
        parts.push(format!("Travel modes: {}", constraints.transport.allowed.join(", ")));
    }

    let time = &intent.time;
    match (time.start, time.end, time.days) {
        (Some(start), Some(end), _) => parts.push(format!("Dates: {} to {}", start, end)),
        (_, _, Some(1)) => parts.push("Duration: 1 day".to_string()),
        (_, _, Some(days)) => parts.push(format!("Duration: {} days", days)),
        _ => {}
    }
    if let Some(season) = time.season_hint {
        parts.push(format!("Season: {}", season));
    }

    let last_user = recent
        .iter()
        .rev()
        .find(|t| t.role == ChatRole::User && !t.content.trim().is_empty())
        .map(|t| t.content.trim())
        .or(intent.user_text.as_deref().map(str::trim).filter(|t| !t.is_empty()));
    if let Some(text) = last_user {
        parts.push(format!("Last user message: \"{}\"", preview(text)));
    }

    if parts.is_empty() {
        EMPTY_SUMMARY.to_string()
    } else {
        format!("{}.", parts.join("; "))
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Budget, Place, Season};
    use chrono::NaiveDate;

    #[test]
    fn test_summary_of_empty_intent() {
        assert_eq!(window_summary(&NormalizedIntent::default(), &[]), EMPTY_SUMMARY);
    }

    #[test]
    fn test_summary_uses_present_fields_only() {
        let mut intent = NormalizedIntent::default();
        intent.geo_scope.destination = Some(Place::named("Big Sur"));
        intent.constraints.trip_types = vec!["ROAD_TRIP".to_string()];
        intent.constraints.budget = Some(Budget {
            band: "USD_500_1500".to_string(),
            ceiling_total: 1500,
            per_day: Some(500),
        });
        intent.time.days = Some(3);
        intent.time.season_hint = Some(Season::Summer);

        let recent = vec![ChatTurn::user("m1", "  coastal   drive please ")];
        let summary = window_summary(&intent, &recent);
        assert_eq!(
            summary,
            "Trip to Big Sur; Trip types: ROAD_TRIP; Budget: USD_500_1500; Duration: 3 days; Season: SUMMER; \
             Last user message: \"coastal drive please\"."
        );
        assert!(!summary.contains("Difficulty"));
    }

    #[test]
    fn test_summary_prefers_dates_and_truncates_preview() {
        let mut intent = NormalizedIntent::default();
        intent.time.start = NaiveDate::from_ymd_opt(2025, 7, 1);
        intent.time.end = NaiveDate::from_ymd_opt(2025, 7, 4);
        intent.time.days = Some(3);
        intent.user_text = Some("x".repeat(400));

        let summary = window_summary(&intent, &[]);
        assert!(summary.starts_with("Dates: 2025-07-01 to 2025-07-04"));
        assert!(!summary.contains("Duration"));
        assert!(summary.contains("..."));
        assert!(summary.len() < 260);
    }
}
