//! Context assembly
//!
//! Reconciles the normalized intent with the thread's chat history: builds
//! the recent window, back-fills missing anchors, updates and queries
//! long-term memory, and derives the downstream api intents for the turn.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::anchors::AnchorExtractor;
use crate::config::Config;
use crate::domain::{AnchorSet, ApiIntent, ChatRole, ChatTurn, ContextPack, MemoryHit, NormalizedIntent, Place};
use crate::history::HistoryClient;
use crate::memory::{LongTermMemory, ShortTermMemory, window_summary};

/// Builds a `ContextPack` for each turn
pub struct ContextAssembler {
    short_term: ShortTermMemory,
    long_term: Arc<dyn LongTermMemory>,
    extractor: AnchorExtractor,
    long_term_top_k: usize,
    travel_modes: Vec<String>,
}

impl ContextAssembler {
    pub fn new(history: Arc<dyn HistoryClient>, long_term: Arc<dyn LongTermMemory>, config: &Config) -> Self {
        Self {
            short_term: ShortTermMemory::new(history, config),
            long_term,
            extractor: AnchorExtractor::new(),
            long_term_top_k: config.memory.long_term_top_k,
            travel_modes: config.vocab.travel_modes.clone(),
        }
    }

    /// Assemble the context pack for one turn
    ///
    /// Every collaborator failure is logged and degraded; this never fails.
    pub async fn assemble(&self, mut intent: NormalizedIntent) -> ContextPack {
        debug!(thread_id = %intent.thread_id, message_id = %intent.message_id, "assemble: called");

        let recent = self.short_term.recent_window(&intent).await;
        let anchors = self.extractor.extract_from_turns(&recent);
        backfill_anchors(&mut intent, &anchors, &self.travel_modes);

        let summary = window_summary(&intent, &recent);
        let long_term = self.recall(&intent, &recent, &summary).await;
        let api_intents = api_intents(&intent);
        let cache_keys = cache_keys(&intent);

        info!(
            thread_id = %intent.thread_id,
            recent = recent.len(),
            memories = long_term.len(),
            destination = intent.destination_name().unwrap_or("-"),
            days = intent.days_or_zero(),
            "assemble: context ready"
        );

        ContextPack {
            intent,
            anchors,
            recent,
            long_term,
            window_summary: summary,
            api_intents,
            cache_keys,
        }
    }

    /// Remember the newest user turn, then recall related turns of the thread
    async fn recall(&self, intent: &NormalizedIntent, recent: &[ChatTurn], summary: &str) -> Vec<MemoryHit> {
        let latest = recent
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::User && !t.content.trim().is_empty());

        if let Some(turn) = latest
            && let Err(e) = self
                .long_term
                .upsert(&intent.thread_id, &turn.message_id, ChatRole::User, &turn.content)
                .await
        {
            warn!(thread_id = %intent.thread_id, error = %e, "recall: memory upsert failed");
        }

        let query_text = latest.map(|t| t.content.as_str()).unwrap_or(summary);
        match self
            .long_term
            .query(&intent.thread_id, query_text, self.long_term_top_k)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(thread_id = %intent.thread_id, error = %e, "recall: memory query failed");
                Vec::new()
            }
        }
    }
}

/// Fill intent fields the request left empty from chat anchors
///
/// Anchors never overwrite what the request stated. A destination given only
/// as a region code counts as empty; the region code is kept.
pub fn backfill_anchors(intent: &mut NormalizedIntent, anchors: &AnchorSet, travel_modes: &[String]) {
    let geo = &mut intent.geo_scope;
    if geo.destination.as_ref().is_none_or(Place::is_region_only)
        && let Some(name) = &anchors.destination_name
    {
        debug!(%name, "backfill_anchors: destination from chat");
        let region_code = geo.destination.as_ref().and_then(|d| d.region_code.clone());
        geo.destination = Some(Place {
            region_code,
            ..Place::named(name.clone())
        });
    }
    if geo.origin.is_none()
        && let Some(name) = &anchors.origin_name
    {
        debug!(%name, "backfill_anchors: origin from chat");
        geo.origin = Some(Place::named(name.clone()));
    }

    let time = &mut intent.time;
    if time.days.is_none()
        && let Some(days) = anchors.duration_days
    {
        time.days = Some(days);
        if time.nights.is_none() {
            time.nights = Some(days);
        }
    }

    let transport = &mut intent.constraints.transport;
    if transport.allowed.is_empty()
        && let Some(mode) = &anchors.travel_mode
        && travel_modes.iter().any(|m| m == mode)
        && !transport.forbidden.contains(mode)
    {
        transport.allowed.push(mode.clone());
    }
}

/// Downstream lookups the generator may rely on
pub fn api_intents(intent: &NormalizedIntent) -> Vec<ApiIntent> {
    let Some(destination) = intent.destination_name() else {
        return Vec::new();
    };
    let c = &intent.constraints;

    let mut intents = vec![
        ApiIntent {
            tool: "get_weather".to_string(),
            params: json!({
                "destination": destination,
                "start": intent.time.start,
                "end": intent.time.end,
                "days": intent.time.days,
                "season": intent.time.season_hint,
            }),
        },
        ApiIntent {
            tool: "search_pois".to_string(),
            params: json!({
                "destination": destination,
                "trip_types": c.trip_types,
                "themes": c.themes,
                "must_include": c.poi_tags.must_include,
                "must_exclude": c.poi_tags.must_exclude,
                "events_only": c.events_only,
            }),
        },
    ];

    let overnight = intent.time.days.is_some_and(|d| d > 1);
    if overnight || !c.lodging.types.is_empty() {
        intents.push(ApiIntent {
            tool: "search_lodging".to_string(),
            params: json!({
                "destination": destination,
                "types": c.lodging.types,
                "pet_friendly": c.lodging.pet_friendly_required,
                "amenities": c.lodging.amenities,
                "nights": intent.time.nights,
            }),
        });
    }
    intents
}

/// Stable cache keys for the api intents
pub fn cache_keys(intent: &NormalizedIntent) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    let Some(destination) = intent.destination_name() else {
        return keys;
    };
    let place = slug(destination);
    let c = &intent.constraints;

    let when = match (intent.time.start, intent.time.season_hint) {
        (Some(start), _) => start.to_string(),
        (None, Some(season)) => season.as_str().to_lowercase(),
        (None, None) => "any".to_string(),
    };
    keys.insert("weather".to_string(), format!("weather:{}:{}", place, when));

    let mut tags: Vec<String> = c.trip_types.iter().chain(&c.themes).map(|t| slug(t)).collect();
    tags.sort();
    tags.dedup();
    let tags = if tags.is_empty() { "all".to_string() } else { tags.join("+") };
    keys.insert("pois".to_string(), format!("pois:{}:{}", place, tags));

    let pets = if c.lodging.pet_friendly_required { "pets" } else { "any" };
    keys.insert("lodging".to_string(), format!("lodging:{}:{}", place, pets));
    keys
}

fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use crate::memory::{LocalLongTermMemory, StoreError};
    use async_trait::async_trait;
    use memorystore::MemoryStore;

    struct BrokenMemory;

    #[async_trait]
    impl LongTermMemory for BrokenMemory {
        async fn upsert(&self, _: &str, _: &str, _: ChatRole, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
        async fn query(&self, _: &str, _: &str, _: usize) -> Result<Vec<MemoryHit>, StoreError> {
            Err(StoreError::Closed)
        }
        async fn delete_thread(&self, _: &str) -> Result<usize, StoreError> {
            Ok(0)
        }
        async fn delete_all(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn intent(message_id: &str, text: &str) -> NormalizedIntent {
        NormalizedIntent {
            thread_id: "t1".to_string(),
            message_id: message_id.to_string(),
            user_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn assembler(history: InMemoryHistory, memory: Arc<dyn LongTermMemory>) -> ContextAssembler {
        ContextAssembler::new(Arc::new(history), memory, &Config::default())
    }

    #[tokio::test]
    async fn test_anchors_backfill_missing_fields() {
        let history = InMemoryHistory::new().with_turns("t1", vec![ChatTurn::user("m1", "hi!")]);
        let memory = Arc::new(LocalLongTermMemory::new(Arc::new(MemoryStore::in_memory()), "memories", 2));
        let pack = assembler(history, memory)
            .assemble(intent("m2", "drive to Truckee from Fremont, one day trip, leave at 7am"))
            .await;

        assert_eq!(pack.recent.len(), 2);
        assert_eq!(pack.intent.destination_name(), Some("Truckee"));
        assert_eq!(pack.intent.origin_name(), Some("Fremont"));
        assert_eq!(pack.intent.time.days, Some(1));
        assert_eq!(pack.intent.time.nights, Some(1));
        assert_eq!(pack.intent.constraints.transport.allowed, vec!["CAR".to_string()]);
        assert_eq!(pack.anchors.depart_time_hhmm.as_deref(), Some("07:00"));
        assert!(pack.window_summary.contains("Truckee"));
        assert_eq!(pack.long_term.len(), 1);
        assert_eq!(pack.long_term[0].id, "t1:m2");
        assert_eq!(pack.api_intents.len(), 2);
        assert_eq!(pack.cache_keys["weather"], "weather:truckee:any");
    }

    #[test]
    fn test_backfilled_nights_mirror_days() {
        let mut request = intent("m1", "");
        let anchors = AnchorSet {
            duration_days: Some(3),
            ..Default::default()
        };
        backfill_anchors(&mut request, &anchors, &Config::default().vocab.travel_modes);
        assert_eq!(request.time.days, Some(3));
        assert_eq!(request.time.nights, Some(3));
    }

    #[tokio::test]
    async fn test_request_fields_win_over_anchors() {
        let mut request = intent("m1", "3 days in Napa, we'll fly");
        request.geo_scope.destination = Some(Place::named("Sonoma"));
        request.time.days = Some(2);
        request.constraints.transport.forbidden = vec!["FLIGHT".to_string()];

        let pack = assembler(InMemoryHistory::new(), Arc::new(BrokenMemory)).assemble(request).await;
        assert_eq!(pack.intent.destination_name(), Some("Sonoma"));
        assert_eq!(pack.intent.time.days, Some(2));
        assert!(pack.intent.constraints.transport.allowed.is_empty());
        assert!(pack.long_term.is_empty());
    }

    #[test]
    fn test_region_only_destination_takes_chat_place() {
        let mut intent = NormalizedIntent::default();
        intent.geo_scope.destination = Some(Place {
            region_code: Some("US-CA".to_string()),
            ..Place::named("US-CA")
        });
        let anchors = AnchorSet {
            destination_name: Some("Big Sur".to_string()),
            ..Default::default()
        };
        backfill_anchors(&mut intent, &anchors, &[]);
        let destination = intent.geo_scope.destination.unwrap();
        assert_eq!(destination.name, "Big Sur");
        assert_eq!(destination.region_code.as_deref(), Some("US-CA"));
    }

    #[tokio::test]
    async fn test_history_failure_degrades_to_current_turn() {
        let history = InMemoryHistory::new();
        history.set_fail_reads(true);
        let pack = assembler(history, Arc::new(BrokenMemory))
            .assemble(intent("m5", "weekend in Mendocino for 2 days"))
            .await;
        assert_eq!(pack.recent.len(), 1);
        assert_eq!(pack.recent[0].message_id, "m5");
        assert_eq!(pack.intent.time.days, Some(2));
        assert_eq!(pack.api_intents.last().map(|i| i.tool.as_str()), Some("search_lodging"));
    }

    #[test]
    fn test_no_destination_no_api_intents() {
        let intent = NormalizedIntent::default();
        assert!(api_intents(&intent).is_empty());
        assert!(cache_keys(&intent).is_empty());
    }

    #[test]
    fn test_cache_keys_are_order_independent() {
        let mut a = NormalizedIntent::default();
        a.geo_scope.destination = Some(Place::named("Big Sur"));
        a.constraints.trip_types = vec!["ROAD_TRIP".to_string(), "BEACH".to_string()];
        let mut b = a.clone();
        b.constraints.trip_types.reverse();
        assert_eq!(cache_keys(&a), cache_keys(&b));
        assert_eq!(cache_keys(&a)["pois"], "pois:big_sur:beach+road_trip");
    }
}
