//! Core MemoryStore implementation

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::filter::Filter;
use crate::similarity::{embedding_cosine, lexical_cosine};

/// Unique identifier for a record within a collection
pub type RecordId = String;

/// Free-form record metadata
pub type Metadata = Map<String, Value>;

/// A record as persisted in a collection file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Write timestamp (unix ms)
    pub created_at: i64,
}

/// A record to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub id: RecordId,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

impl NewRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    fn into_stored(self) -> StoredRecord {
        StoredRecord {
            id: self.id,
            text: self.text,
            metadata: self.metadata,
            embedding: self.embedding,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Options for a similarity query
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Query text, scored lexically against record text
    pub text: Option<String>,
    /// Query embedding, used against records that carry one
    pub embedding: Option<Vec<f32>>,
    /// Maximum number of hits
    pub top_k: usize,
    /// Metadata equality filter applied before scoring
    pub filter: Filter,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            text: None,
            embedding: None,
            top_k: crate::DEFAULT_TOP_K,
            filter: Filter::default(),
        }
    }
}

impl QueryOptions {
    pub fn text(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: Some(text.into()),
            top_k,
            ..Default::default()
        }
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    fn is_empty(&self) -> bool {
        let no_text = self.text.as_deref().map(str::trim).is_none_or(str::is_empty);
        no_text && self.embedding.is_none()
    }

    fn score(&self, record: &StoredRecord) -> f32 {
        if let (Some(query), Some(stored)) = (&self.embedding, &record.embedding)
            && let Some(score) = embedding_cosine(query, stored)
        {
            return score;
        }
        self.text
            .as_deref()
            .map(|text| lexical_cosine(text, &record.text))
            .unwrap_or(0.0)
    }
}

/// A scored query result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryHit {
    pub id: RecordId,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Statistics for a collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    /// Number of records
    pub record_count: usize,
    /// Total bytes of record text
    pub total_bytes: u64,
    /// Records carrying an embedding
    pub embedded_count: usize,
}

/// The main memory store
///
/// Collections are loaded lazily and cached. Every mutation is applied to a
/// copy, written to `{name}.jsonl.tmp` and renamed into place before the
/// cache is updated, so a failed write leaves both disk and cache unchanged.
pub struct MemoryStore {
    /// Base path for storage; `None` keeps everything in memory
    base_path: Option<PathBuf>,
    collections: Mutex<HashMap<String, Vec<StoredRecord>>>,
}

impl MemoryStore {
    /// Open or create a file-backed store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        debug!(?base_path, "Opened memory store");
        Ok(Self {
            base_path: Some(base_path),
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Create a store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            base_path: None,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Insert a record, replacing any record with the same id
    pub fn upsert(&self, collection: &str, record: NewRecord) -> Result<()> {
        self.upsert_many(collection, vec![record]).map(|_| ())
    }

    /// Upsert a batch of records in one write; returns the number written
    pub fn upsert_many(&self, collection: &str, records: Vec<NewRecord>) -> Result<usize> {
        let written = records.len();
        self.mutate(collection, move |stored| {
            for record in records {
                stored.retain(|r| r.id != record.id);
                stored.push(record.into_stored());
            }
        })?;
        debug!(collection, written, "Upserted records");
        Ok(written)
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>> {
        self.read(collection, |stored| stored.iter().find(|r| r.id == id).cloned())
    }

    /// All records in insertion order
    pub fn records(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        self.read(collection, |stored| stored.clone())
    }

    /// Delete records by id; returns how many were removed
    pub fn delete(&self, collection: &str, ids: &[&str]) -> Result<usize> {
        let removed = self.mutate(collection, |stored| {
            let before = stored.len();
            stored.retain(|r| !ids.contains(&r.id.as_str()));
            before - stored.len()
        })?;
        info!(collection, removed, "Deleted records by id");
        Ok(removed)
    }

    /// Delete every record matching the filter; an empty filter is rejected
    pub fn delete_where(&self, collection: &str, filter: &Filter) -> Result<usize> {
        if filter.is_empty() {
            return Err(eyre!("Refusing to delete with an empty filter, use clear instead"));
        }
        let removed = self.mutate(collection, |stored| {
            let before = stored.len();
            stored.retain(|r| !filter.matches(&r.metadata));
            before - stored.len()
        })?;
        info!(collection, removed, "Deleted records by filter");
        Ok(removed)
    }

    /// Remove every record in a collection
    pub fn clear(&self, collection: &str) -> Result<usize> {
        let removed = self.mutate(collection, |stored| {
            let before = stored.len();
            stored.clear();
            before
        })?;
        info!(collection, removed, "Cleared collection");
        Ok(removed)
    }

    /// Top-k records by similarity, ties broken by id
    pub fn query(&self, collection: &str, options: &QueryOptions) -> Result<Vec<QueryHit>> {
        if options.is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }

        self.read(collection, |stored| {
            let mut hits: Vec<QueryHit> = stored
                .iter()
                .filter(|r| options.filter.matches(&r.metadata))
                .map(|r| QueryHit {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                    score: options.score(r),
                })
                .collect();

            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            hits.truncate(options.top_k);
            hits
        })
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        self.read(collection, |stored| stored.len())
    }

    pub fn stats(&self, collection: &str) -> Result<CollectionStats> {
        self.read(collection, |stored| CollectionStats {
            record_count: stored.len(),
            total_bytes: stored.iter().map(|r| r.text.len() as u64).sum(),
            embedded_count: stored.iter().filter(|r| r.embedding.is_some()).count(),
        })
    }

    /// List collection names, on disk and in memory
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .lock()
            .map_err(|_| eyre!("Memory store lock poisoned"))?
            .keys()
            .cloned()
            .collect();

        if let Some(base) = &self.base_path {
            for entry in fs::read_dir(base)? {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == "jsonl")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    fn read<T>(&self, collection: &str, f: impl FnOnce(&Vec<StoredRecord>) -> T) -> Result<T> {
        validate_collection_name(collection)?;
        let mut guard = self.collections.lock().map_err(|_| eyre!("Memory store lock poisoned"))?;
        let stored = match guard.entry(collection.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.load(collection)?),
        };
        Ok(f(stored))
    }

    fn mutate<T>(&self, collection: &str, f: impl FnOnce(&mut Vec<StoredRecord>) -> T) -> Result<T> {
        validate_collection_name(collection)?;
        let mut guard = self.collections.lock().map_err(|_| eyre!("Memory store lock poisoned"))?;
        let stored = match guard.entry(collection.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.load(collection)?),
        };

        let mut next = stored.clone();
        let out = f(&mut next);
        self.persist(collection, &next)?;
        *stored = next;
        Ok(out)
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.base_path
            .as_ref()
            .map(|base| base.join(format!("{}.jsonl", collection)))
    }

    fn load(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path).context(format!("Failed to open collection: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(collection, line = line_no + 1, error = %e, "Skipping corrupt record"),
            }
        }

        debug!(collection, count = records.len(), "Loaded collection");
        Ok(records)
    }

    fn persist(&self, collection: &str, records: &[StoredRecord]) -> Result<()> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(());
        };
        let tmp_path = path.with_extension("jsonl.tmp");

        {
            let file = fs::File::create(&tmp_path).context(format!("Failed to create {}", tmp_path.display()))?;
            let mut writer = BufWriter::new(file);
            for record in records {
                let line = serde_json::to_string(record)?;
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &path).context(format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(eyre!("Invalid collection name: '{}'", name))
    }
}
