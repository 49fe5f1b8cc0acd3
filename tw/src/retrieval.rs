//! Curated grounding retrieval
//!
//! One query per turn against the curated corpus. `RULE` documents are
//! authoritative; everything else is POI, event, lodging or weather grounding.
//! With live lookups enabled, the turn's api intents add more places.

use async_trait::async_trait;
use memorystore::{Filter, MemoryStore, QueryOptions, load_seed_file, seed_records};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{ContextPack, GroundedContext, GroundingBuckets, GroundingDoc};
use crate::lookups::{IntentExecutor, run_lookups};
use crate::memory::StoreError;

/// A query against the curated corpus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundingQuery {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub top_k: usize,
    pub region_code: Option<String>,
    pub pet_friendly: Option<bool>,
    pub doc_type: Option<String>,
}

impl GroundingQuery {
    fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(region) = &self.region_code {
            filter = filter.and_eq("region_code", region.as_str());
        }
        if let Some(pet_friendly) = self.pet_friendly {
            filter = filter.and_eq("pet_friendly", pet_friendly);
        }
        if let Some(doc_type) = &self.doc_type {
            filter = filter.and_eq("type", doc_type.as_str());
        }
        filter
    }
}

/// Curated-grounding collaborator
#[async_trait]
pub trait GroundingStore: Send + Sync {
    async fn query(&self, query: &GroundingQuery) -> Result<Vec<GroundingDoc>, StoreError>;
}

/// Grounding corpus kept in a local `memorystore` collection
pub struct LocalGroundingStore {
    store: Arc<MemoryStore>,
    collection: String,
    limiter: Arc<Semaphore>,
}

impl LocalGroundingStore {
    pub fn new(store: Arc<MemoryStore>, collection: impl Into<String>, permits: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            limiter: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Load `{docs: [{doc_id, text, metadata}]}` into the collection
    pub async fn seed_from_file(&self, path: &Path) -> Result<usize, StoreError> {
        info!(path = %path.display(), collection = %self.collection, "Seeding grounding corpus");
        let _permit = self.limiter.acquire().await.map_err(|_| StoreError::Closed)?;
        let store = self.store.clone();
        let collection = self.collection.clone();
        let path: PathBuf = path.to_path_buf();
        let seeded = tokio::task::spawn_blocking(move || -> eyre::Result<usize> {
            let seed = load_seed_file(&path)?;
            store.upsert_many(&collection, seed_records(&seed))
        })
        .await??;
        Ok(seeded)
    }
}

#[async_trait]
impl GroundingStore for LocalGroundingStore {
    async fn query(&self, query: &GroundingQuery) -> Result<Vec<GroundingDoc>, StoreError> {
        debug!(top_k = query.top_k, region = ?query.region_code, "LocalGroundingStore::query: called");
        let mut options = QueryOptions::text(query.text.clone(), query.top_k).filter(query.filter());
        if let Some(embedding) = &query.embedding {
            options = options.embedding(embedding.clone());
        }

        let _permit = self.limiter.acquire().await.map_err(|_| StoreError::Closed)?;
        let store = self.store.clone();
        let collection = self.collection.clone();
        let hits = tokio::task::spawn_blocking(move || store.query(&collection, &options)).await??;

        Ok(hits
            .into_iter()
            .filter(|hit| hit.score > 0.0)
            .map(|hit| GroundingDoc {
                doc_type: hit.metadata.get("type").and_then(|v| v.as_str()).map(str::to_string),
                id: hit.id,
                text: hit.text,
                metadata: hit.metadata,
                score: hit.score,
            })
            .collect())
    }
}

/// Builds the per-turn grounding query and buckets the results
pub struct Retriever {
    store: Arc<dyn GroundingStore>,
    lookups: Option<Arc<dyn IntentExecutor>>,
    top_k: usize,
    filter_by_region: bool,
    primary_region: String,
}

impl Retriever {
    pub fn new(store: Arc<dyn GroundingStore>, config: &Config) -> Self {
        Self {
            store,
            lookups: None,
            top_k: config.retrieval.top_k,
            filter_by_region: config.retrieval.filter_by_region,
            primary_region: config.vocab.primary_region_code.clone(),
        }
    }

    /// Execute the pack's api intents and append their results to the places bucket
    pub fn with_lookups(mut self, executor: Arc<dyn IntentExecutor>) -> Self {
        self.lookups = Some(executor);
        self
    }

    /// Query text from destination, trip types, themes, must-include tags,
    /// the pet-friendly requirement and the latest user text (or summary)
    pub fn build_query_text(pack: &ContextPack) -> String {
        let intent = &pack.intent;
        let constraints = &intent.constraints;
        let mut parts: Vec<String> = Vec::new();

        if let Some(dest) = intent.destination_name() {
            parts.push(dest.to_string());
        }
        parts.extend(constraints.trip_types.iter().map(|t| t.replace('_', " ").to_lowercase()));
        parts.extend(constraints.themes.iter().cloned());
        parts.extend(constraints.poi_tags.must_include.iter().cloned());
        if constraints.lodging.pet_friendly_required {
            parts.push("pet friendly".to_string());
        }
        match pack.latest_user_text() {
            Some(text) => parts.push(text.trim().to_string()),
            None if !pack.window_summary.is_empty() => parts.push(pack.window_summary.clone()),
            None => {}
        }

        parts.retain(|p| !p.trim().is_empty());
        parts.join(" ")
    }

    pub fn build_query(&self, pack: &ContextPack) -> GroundingQuery {
        let region_code = self.filter_by_region.then(|| {
            pack.intent
                .geo_scope
                .destination
                .as_ref()
                .and_then(|d| d.region_code.clone())
                .unwrap_or_else(|| self.primary_region.clone())
        });
        GroundingQuery {
            text: Self::build_query_text(pack),
            embedding: None,
            top_k: self.top_k,
            region_code,
            pet_friendly: pack.intent.constraints.lodging.pet_friendly_required.then_some(true),
            doc_type: None,
        }
    }

    /// Retrieve grounding for the turn; store failures degrade to empty buckets
    pub async fn retrieve(&self, pack: ContextPack) -> GroundedContext {
        let query = self.build_query(&pack);
        debug!(query = %query.text, "retrieve: called");

        let mut grounding = if query.text.is_empty() {
            GroundingBuckets::default()
        } else {
            match self.store.query(&query).await {
                Ok(docs) => bucket(docs),
                Err(e) => {
                    warn!(thread_id = %pack.intent.thread_id, error = %e, "retrieve: grounding query failed, continuing without grounding");
                    GroundingBuckets::default()
                }
            }
        };

        if let Some(executor) = &self.lookups
            && !pack.api_intents.is_empty()
        {
            let found = run_lookups(executor.as_ref(), &pack.api_intents, &pack.intent.thread_id).await;
            grounding.places.extend(found);
        }

        info!(
            thread_id = %pack.intent.thread_id,
            rules = grounding.rules.len(),
            places = grounding.places.len(),
            "Retrieved grounding"
        );
        GroundedContext {
            pack,
            grounding,
            query: query.text,
        }
    }
}

/// Split documents into authoritative rules and everything else, keeping rank order
pub fn bucket(docs: Vec<GroundingDoc>) -> GroundingBuckets {
    let (rules, places): (Vec<GroundingDoc>, Vec<GroundingDoc>) = docs
        .into_iter()
        .partition(|d| d.doc_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("RULE")));
    GroundingBuckets { rules, places }
}
