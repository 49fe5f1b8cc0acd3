//! Deterministic rule-based planner
//!
//! Used whenever the model is unavailable or its output is unusable. Pure
//! function of the grounded context: no I/O, no randomness, never fails.

use tracing::{debug, info};

use crate::domain::{Activity, DayPlan, GroundedContext, GroundingDoc, LodgingSummary, PlanMode, TripPlan};

/// POIs placed on a single day
pub const POIS_PER_DAY: usize = 3;

/// Hours budgeted per fallback activity
const ACTIVITY_HOURS: f32 = 2.0;

const UNKNOWN_DESTINATION: &str = "your destination";

pub fn fallback_plan(grounded: &GroundedContext) -> TripPlan {
    let pack = &grounded.pack;
    let intent = &pack.intent;
    let days = intent.days_or_zero();
    let place = intent.destination_name().unwrap_or(UNKNOWN_DESTINATION);
    debug!(days, %place, "fallback_plan: called");

    let mut plan = TripPlan::new(intent.thread_id.clone(), intent.message_id.clone());
    plan.destination = intent.destination_name().map(str::to_string);
    plan.days = days;
    plan.trip_types = intent.constraints.trip_types.clone();
    plan.difficulty = intent.constraints.difficulty.as_ref().map(|d| d.level.clone());
    plan.budget_band = intent.constraints.budget.as_ref().map(|b| b.band.clone());
    plan.lodging = grounded.grounding.lodging_candidates().next().map(lodging_summary);
    plan.weather_hint = grounded.grounding.weather_hint().map(str::to_string);
    plan.window_summary = Some(pack.window_summary.clone()).filter(|s| !s.is_empty());

    if days == 0 {
        plan.mode = Some(PlanMode::Clarify);
        plan.intro_text = Some(match intent.destination_name() {
            Some(destination) => format!("Happy to help you plan a trip to {}.", destination),
            None => "Happy to help you plan a trip.".to_string(),
        });
        plan.closing_tips = Some("How many days do you have for this trip?".to_string());
        info!(thread_id = %plan.thread_id, "fallback_plan: trip length unknown, asking");
        return plan;
    }

    let pois: Vec<&GroundingDoc> = grounded
        .grounding
        .poi_candidates()
        .take(days as usize * POIS_PER_DAY)
        .collect();
    let mut chunks = pois.chunks(POIS_PER_DAY);

    plan.mode = Some(PlanMode::TripPlan);
    plan.itinerary = (1..=days)
        .map(|n| {
            let activities: Vec<Activity> = chunks.next().unwrap_or_default().iter().copied().map(activity).collect();
            day_plan(n, days, place, activities)
        })
        .collect();
    plan.intro_text = Some(format!("Here is a {}-day plan for {}.", days, place));
    plan.closing_tips = Some(if pois.is_empty() {
        "Tell me what you enjoy most and I can suggest specific stops.".to_string()
    } else {
        "Check opening hours and conditions before you go.".to_string()
    });

    info!(thread_id = %plan.thread_id, days, pois = pois.len(), "fallback_plan: built itinerary");
    plan
}

fn day_plan(n: u32, days: u32, place: &str, activities: Vec<Activity>) -> DayPlan {
    let mut title = format!("Day {} in {}", n, place);
    if n == 1 {
        title.push_str(" – Arrival & Scenic Intro");
    } else if n == days {
        title.push_str(" – Wrap-up & Relax");
    }

    let mut highlights: Vec<String> = activities.iter().map(|a| a.name.clone()).collect();
    if highlights.is_empty() {
        highlights.push(format!("Explore {}", place));
    }

    DayPlan {
        day: n,
        title,
        highlights,
        activities,
    }
}

fn activity(doc: &GroundingDoc) -> Activity {
    let mut tags = doc.tags();
    if tags.is_empty()
        && let Some(categories) = doc.metadata.get("categories").and_then(|c| c.as_array())
    {
        tags = categories.iter().filter_map(|c| c.as_str()).map(str::to_string).collect();
    }

    Activity {
        name: doc.name().to_string(),
        description: doc
            .meta_str("description")
            .or_else(|| doc.meta_str("summary"))
            .or(Some(doc.text.as_str()))
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string),
        tags,
        estimated_time_hours: Some(ACTIVITY_HOURS),
    }
}

fn lodging_summary(doc: &GroundingDoc) -> LodgingSummary {
    LodgingSummary {
        name: doc.meta_str("name").unwrap_or("Suggested lodging").to_string(),
        kind: doc.meta_str("lodging_type").map(str::to_string),
        location: doc.meta_str("location").or_else(|| doc.meta_str("address")).map(str::to_string),
        notes: doc
            .meta_str("notes")
            .or_else(|| doc.meta_str("description"))
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GroundingBuckets, Place};
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(id: &str, doc_type: &str, meta: serde_json::Value) -> GroundingDoc {
        GroundingDoc {
            id: id.to_string(),
            text: format!("{} text", id),
            doc_type: Some(doc_type.to_string()),
            metadata: meta.as_object().cloned().unwrap_or_default(),
            score: 1.0,
        }
    }

    fn grounded(days: Option<u32>, pois: usize) -> GroundedContext {
        let mut grounded = GroundedContext::default();
        grounded.pack.intent.thread_id = "t1".to_string();
        grounded.pack.intent.message_id = "m1".to_string();
        grounded.pack.intent.time.days = days;
        grounded.pack.intent.geo_scope.destination = Some(Place::named("Big Sur"));
        let mut places: Vec<GroundingDoc> = (0..pois)
            .map(|i| doc(&format!("poi{}", i), "POI", json!({"name": format!("Stop {}", i), "tags": ["coast"]})))
            .collect();
        places.push(doc("inn", "LODGING", json!({"lodging_type": "INN", "address": "Hwy 1"})));
        places.push(doc("wx", "WEATHER", json!({"summary": "Foggy mornings"})));
        grounded.grounding = GroundingBuckets { rules: vec![], places };
        grounded
    }

    #[test]
    fn test_three_pois_per_day() {
        let plan = fallback_plan(&grounded(Some(3), 7));
        assert_eq!(plan.mode, Some(PlanMode::TripPlan));
        assert!(plan.has_valid_itinerary());
        let counts: Vec<usize> = plan.itinerary.iter().map(|d| d.activities.len()).collect();
        assert_eq!(counts, vec![3, 3, 1]);
        assert_eq!(plan.itinerary[0].title, "Day 1 in Big Sur – Arrival & Scenic Intro");
        assert_eq!(plan.itinerary[1].title, "Day 2 in Big Sur");
        assert_eq!(plan.itinerary[2].title, "Day 3 in Big Sur – Wrap-up & Relax");
        assert_eq!(plan.itinerary[2].highlights, vec!["Stop 6".to_string()]);
        assert_eq!(plan.itinerary[0].activities[0].estimated_time_hours, Some(2.0));
        assert_eq!(plan.weather_hint.as_deref(), Some("Foggy mornings"));
    }

    #[test]
    fn test_empty_retrieval_still_plans() {
        let mut ctx = grounded(Some(2), 0);
        ctx.grounding = GroundingBuckets::default();
        let plan = fallback_plan(&ctx);
        assert_eq!(plan.itinerary.len(), 2);
        assert_eq!(plan.itinerary[1].highlights, vec!["Explore Big Sur".to_string()]);
        assert!(plan.lodging.is_none());
        assert!(plan.weather_hint.is_none());
    }

    #[test]
    fn test_lodging_from_first_candidate() {
        let lodging = fallback_plan(&grounded(Some(1), 1)).lodging.unwrap();
        assert_eq!(lodging.name, "Suggested lodging");
        assert_eq!(lodging.kind.as_deref(), Some("INN"));
        assert_eq!(lodging.location.as_deref(), Some("Hwy 1"));
    }

    #[test]
    fn test_unknown_length_asks() {
        let plan = fallback_plan(&grounded(None, 4));
        assert_eq!(plan.mode, Some(PlanMode::Clarify));
        assert_eq!(plan.days, 0);
        assert!(plan.itinerary.is_empty());
        assert!(plan.closing_tips.unwrap().contains("How many days"));
    }

    proptest! {
        #[test]
        fn prop_itinerary_matches_days(days in 0u32..20, pois in 0usize..40) {
            let plan = fallback_plan(&grounded(Some(days), pois));
            prop_assert!(plan.has_valid_itinerary());
            prop_assert!(plan.itinerary.iter().all(|d| d.activities.len() <= POIS_PER_DAY));
        }
    }
}
