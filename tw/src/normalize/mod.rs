//! Request normalization
//!
//! Turns an arbitrary JSON payload into a `NormalizedIntent`. Enumerated
//! fields are canonicalized against the configured vocabularies and unknown
//! values are dropped. Nothing is invented: no default destination, no
//! default trip length, no default budget.

mod error;
mod raw;

pub use error::ValidationError;
pub use raw::{RawDates, RawFilters, RawPlace, RawRequest};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Config, VocabConfig};
use crate::domain::{
    Budget, Constraints, Difficulty, Effort, GeoScope, LodgingPrefs, MAX_TRIP_DAYS, NormalizedIntent, PoiTags, Season,
    TimeWindow, Transport,
};

/// Thread id used when the request carries none
pub const UNKNOWN_THREAD: &str = "t_unknown";

/// Message id used when the request carries none
pub const UNKNOWN_MESSAGE: &str = "m_unknown";

const PET_FRIENDLY: &str = "PET_FRIENDLY";

/// Validates raw requests and produces typed intents
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    vocab: VocabConfig,
}

impl RequestNormalizer {
    pub fn new(config: &Config) -> Self {
        Self {
            vocab: config.vocab.clone(),
        }
    }

    /// Normalize a raw JSON payload
    ///
    /// `constraints` is accepted as an alias for `user_filters`; when both are
    /// present `user_filters` wins.
    pub fn normalize(&self, payload: &Value) -> Result<NormalizedIntent, ValidationError> {
        debug!("normalize: called");
        let Value::Object(object) = payload else {
            return Err(ValidationError::NotAnObject(json_kind(payload)));
        };

        let mut object = object.clone();
        if let Some(constraints) = object.remove("constraints")
            && !object.contains_key("user_filters")
        {
            object.insert("user_filters".to_string(), constraints);
        }

        let raw: RawRequest = serde_json::from_value(Value::Object(object))?;
        let intent = self.normalize_raw(raw)?;
        info!(
            thread_id = %intent.thread_id,
            message_id = %intent.message_id,
            days = ?intent.time.days,
            destination = ?intent.destination_name(),
            "Normalized request"
        );
        Ok(intent)
    }

    /// Normalize an already-deserialized request
    pub fn normalize_raw(&self, raw: RawRequest) -> Result<NormalizedIntent, ValidationError> {
        debug!("normalize_raw: called");
        let filters = raw.user_filters.clone().unwrap_or_default();

        for (field, place) in [("destination", &raw.destination), ("origin", &raw.origin)] {
            if place.as_ref().is_some_and(|p| p.name().trim().is_empty()) {
                return Err(ValidationError::InvalidField {
                    field,
                    reason: "place name is empty".to_string(),
                });
            }
        }

        let time = self.time_window(&raw, &filters);
        let geo_scope = self.geo_scope(&raw);
        let constraints = self.constraints(&filters, time.days, raw.origin.is_some());

        let user_text = raw
            .content
            .or(raw.question)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(NormalizedIntent {
            thread_id: non_empty_or(raw.thread_id, UNKNOWN_THREAD),
            message_id: non_empty_or(raw.message_id, UNKNOWN_MESSAGE),
            request_id: raw.request_id,
            user_text,
            time,
            geo_scope,
            constraints,
        })
    }

    fn time_window(&self, raw: &RawRequest, filters: &RawFilters) -> TimeWindow {
        let (start, end) = raw
            .dates
            .as_ref()
            .map(|d| (d.start, d.end))
            .unwrap_or((None, None));

        let days = match (start, end) {
            (Some(start), Some(end)) => {
                let delta = (end - start).num_days().clamp(1, i64::from(MAX_TRIP_DAYS));
                Some(delta as u32)
            }
            _ => raw
                .duration_days
                .or(filters.duration_days)
                .filter(|d| *d > 0)
                .map(|d| d.min(MAX_TRIP_DAYS)),
        };
        debug!(?start, ?end, ?days, "time_window: computed days");

        TimeWindow {
            start,
            end,
            days,
            nights: days,
            season_hint: start.map(Season::of),
        }
    }

    fn geo_scope(&self, raw: &RawRequest) -> GeoScope {
        let out_of_scope = raw
            .destination
            .as_ref()
            .and_then(RawPlace::region_code)
            .is_some_and(|code| !code.trim().eq_ignore_ascii_case(&self.vocab.primary_region_code));

        let destination = raw.destination.clone().map(RawPlace::into_place);
        if out_of_scope {
            debug!(destination = ?destination, "geo_scope: destination outside primary region");
        }

        GeoScope {
            origin: raw.origin.clone().map(RawPlace::into_place),
            original_destination: if out_of_scope { destination.clone() } else { None },
            destination,
            in_scope_only: true,
            out_of_scope,
        }
    }

    fn constraints(&self, filters: &RawFilters, days: Option<u32>, has_origin: bool) -> Constraints {
        let vocab = &self.vocab;

        let difficulty = filters
            .difficulty
            .as_deref()
            .and_then(|d| VocabConfig::canonical(&vocab.difficulty_levels, d))
            .map(|level| Difficulty {
                effort: Effort::for_level(&level),
                level,
            });

        let budget = filters
            .budget_level
            .as_deref()
            .and_then(|band| vocab.budget_band(band))
            .map(|(band, range)| Budget {
                band,
                ceiling_total: range.high,
                per_day: days.filter(|d| *d >= 1).map(|d| (range.high / d).max(1)),
            });

        let forbidden = VocabConfig::canonical_list(&vocab.travel_modes, &filters.must_exclude);

        let pet_friendly_required = filters
            .accessibility
            .iter()
            .any(|a| a.trim().eq_ignore_ascii_case(PET_FRIENDLY));

        Constraints {
            trip_types: VocabConfig::canonical_list(&vocab.trip_types, &filters.trip_types),
            difficulty,
            transport: Transport {
                allowed: VocabConfig::canonical_list(&vocab.travel_modes, &filters.travel_modes),
                forbidden,
                intercity_travel: has_origin,
            },
            lodging: LodgingPrefs {
                types: VocabConfig::canonical_list(&vocab.lodging_types, &filters.accommodation),
                pet_friendly_required,
                amenities: VocabConfig::canonical_list(&vocab.amenities, &filters.amenities),
            },
            diet: clean_list(&filters.meal_preferences),
            themes: clean_list(&filters.interest_tags),
            poi_tags: PoiTags {
                must_include: clean_list(&filters.must_include),
                must_exclude: clean_list(&filters.must_exclude),
            },
            budget,
            group_type: filters
                .group_type
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
            events_only: filters.events_only,
        }
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Trim free-text tags, dropping blanks and duplicates
fn clean_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(value)) {
            out.push(value.to_string());
        }
    }
    out
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlaceKind;
    use serde_json::json;

    fn normalizer() -> RequestNormalizer {
        RequestNormalizer::new(&Config::default())
    }

    #[test]
    fn test_dates_give_days_and_season() {
        let intent = normalizer()
            .normalize(&json!({
                "thread_id": "t1",
                "message_id": "m1",
                "dates": {"start": "2025-06-01", "end": "2025-06-04"}
            }))
            .unwrap();

        assert_eq!(intent.time.days, Some(3));
        assert_eq!(intent.time.nights, Some(3));
        assert_eq!(intent.time.season_hint, Some(Season::Summer));
    }

    #[test]
    fn test_same_day_dates_clamp_to_one() {
        let intent = normalizer()
            .normalize(&json!({"dates": {"start": "2025-01-10", "end": "2025-01-10"}}))
            .unwrap();
        assert_eq!(intent.time.days, Some(1));
        assert_eq!(intent.time.season_hint, Some(Season::Winter));
    }

    #[test]
    fn test_no_dates_no_invented_length() {
        let intent = normalizer().normalize(&json!({})).unwrap();
        assert_eq!(intent.time.days, None);
        assert_eq!(intent.time.season_hint, None);
        assert_eq!(intent.thread_id, UNKNOWN_THREAD);
        assert_eq!(intent.message_id, UNKNOWN_MESSAGE);
        assert!(intent.constraints.budget.is_none());
        assert!(intent.constraints.difficulty.is_none());
        assert!(intent.geo_scope.destination.is_none());
    }

    #[test]
    fn test_trip_length_capped() {
        let intent = normalizer().normalize(&json!({"duration_days": 4000000000u32})).unwrap();
        assert_eq!(intent.time.days, Some(MAX_TRIP_DAYS));
        assert_eq!(intent.time.nights, Some(MAX_TRIP_DAYS));

        let intent = normalizer()
            .normalize(&json!({"dates": {"start": "2025-01-01", "end": "2999-12-31"}}))
            .unwrap();
        assert_eq!(intent.time.days, Some(MAX_TRIP_DAYS));
    }

    #[test]
    fn test_duration_hint_inside_filters() {
        let intent = normalizer()
            .normalize(&json!({"user_filters": {"duration_days": 4}}))
            .unwrap();
        assert_eq!(intent.time.days, Some(4));
    }

    #[test]
    fn test_constraints_alias_and_precedence() {
        let intent = normalizer()
            .normalize(&json!({"constraints": {"trip_types": ["camping"]}}))
            .unwrap();
        assert_eq!(intent.constraints.trip_types, vec!["CAMPING".to_string()]);

        let intent = normalizer()
            .normalize(&json!({
                "constraints": {"trip_types": ["camping"]},
                "user_filters": {"trip_types": ["beach"]}
            }))
            .unwrap();
        assert_eq!(intent.constraints.trip_types, vec!["BEACH".to_string()]);
    }

    #[test]
    fn test_budget_per_day() {
        let intent = normalizer()
            .normalize(&json!({"user_filters": {"budget_level": "USD_500_1000", "duration_days": 5}}))
            .unwrap();
        let budget = intent.constraints.budget.unwrap();
        assert_eq!(budget.band, "USD_500_1000");
        assert_eq!(budget.ceiling_total, 1000);
        assert_eq!(budget.per_day, Some(200));
    }

    #[test]
    fn test_budget_without_days_has_no_per_day() {
        let intent = normalizer()
            .normalize(&json!({"user_filters": {"budget_level": "usd_0_500"}}))
            .unwrap();
        let budget = intent.constraints.budget.unwrap();
        assert_eq!(budget.ceiling_total, 500);
        assert_eq!(budget.per_day, None);

        let intent = normalizer()
            .normalize(&json!({"user_filters": {"budget_level": "GOLD_BARS"}}))
            .unwrap();
        assert!(intent.constraints.budget.is_none());
    }

    #[test]
    fn test_unknown_vocabulary_dropped() {
        let intent = normalizer()
            .normalize(&json!({"user_filters": {
                "trip_types": ["Hiking", "moonwalk"],
                "difficulty": "moderate",
                "travel_modes": ["car", "hovercraft"],
                "accommodation": ["cabin", "castle"],
                "amenities": ["parking", "helipad"],
                "must_exclude": ["flight", "crowds"],
                "accessibility": ["pet_friendly"]
            }}))
            .unwrap();

        let c = &intent.constraints;
        assert_eq!(c.trip_types, vec!["HIKING".to_string()]);
        assert_eq!(
            c.difficulty,
            Some(Difficulty {
                level: "MODERATE".to_string(),
                effort: Effort::Medium
            })
        );
        assert_eq!(c.transport.allowed, vec!["CAR".to_string()]);
        assert_eq!(c.transport.forbidden, vec!["FLIGHT".to_string()]);
        assert_eq!(c.lodging.types, vec!["CABIN".to_string()]);
        assert_eq!(c.lodging.amenities, vec!["PARKING".to_string()]);
        assert!(c.lodging.pet_friendly_required);
        assert_eq!(c.poi_tags.must_exclude, vec!["flight".to_string(), "crowds".to_string()]);
    }

    #[test]
    fn test_out_of_scope_keeps_destination() {
        let intent = normalizer()
            .normalize(&json!({
                "destination": {"name": "Portland", "type": "city", "region_code": "US-OR"},
                "origin": "San Jose"
            }))
            .unwrap();

        let geo = &intent.geo_scope;
        assert!(geo.out_of_scope);
        assert_eq!(intent.destination_name(), Some("Portland"));
        assert_eq!(geo.original_destination.as_ref().unwrap().kind, Some(PlaceKind::City));
        assert_eq!(intent.origin_name(), Some("San Jose"));
        assert!(intent.constraints.transport.intercity_travel);
    }

    #[test]
    fn test_in_scope_destination() {
        let intent = normalizer()
            .normalize(&json!({"destination": {"name": "Big Sur", "type": "region", "region_code": "us-ca"}}))
            .unwrap();
        assert!(!intent.geo_scope.out_of_scope);
        assert!(intent.geo_scope.original_destination.is_none());
    }

    #[test]
    fn test_region_only_destination() {
        let intent = normalizer()
            .normalize(&json!({
                "dates": {"start": "2025-06-01", "end": "2025-06-04"},
                "destination": {"region_code": "US-CA"}
            }))
            .unwrap();
        let destination = intent.geo_scope.destination.as_ref().unwrap();
        assert!(destination.is_region_only());
        assert_eq!(destination.kind, Some(PlaceKind::Region));
        assert!(!intent.geo_scope.out_of_scope);
        assert_eq!(intent.time.days, Some(3));

        let err = normalizer().normalize(&json!({"destination": {"type": "city"}}));
        assert!(matches!(err, Err(ValidationError::InvalidField { field: "destination", .. })));
    }

    #[test]
    fn test_user_text_prefers_content() {
        let intent = normalizer()
            .normalize(&json!({"content": " plan a trip ", "question": "ignored"}))
            .unwrap();
        assert_eq!(intent.user_text.as_deref(), Some("plan a trip"));

        let intent = normalizer().normalize(&json!({"question": "is it open?"})).unwrap();
        assert_eq!(intent.user_text.as_deref(), Some("is it open?"));
    }

    #[test]
    fn test_null_lists_are_empty() {
        let intent = normalizer()
            .normalize(&json!({"user_filters": {"trip_types": null, "events_only": null}}))
            .unwrap();
        assert!(intent.constraints.trip_types.is_empty());
        assert!(!intent.constraints.events_only);
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let n = normalizer();
        assert!(matches!(n.normalize(&json!([1, 2])), Err(ValidationError::NotAnObject(_))));
        assert!(matches!(
            n.normalize(&json!({"dates": {"start": "June first"}})),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            n.normalize(&json!({"destination": {"name": "Mars", "type": "planet"}})),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            n.normalize(&json!({"user_filters": {"trip_types": "CAMPING"}})),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            n.normalize(&json!({"destination": "  "})),
            Err(ValidationError::InvalidField { .. })
        ));
    }
}
