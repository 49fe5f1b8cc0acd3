//! MemoryStore - keyed text store for conversational memory and curated docs
//!
//! Stores short text records in named collections and answers approximate
//! similarity queries over them. Writes are put-by-key: upserting an id that
//! already exists deletes the old record before inserting the new one, so
//! replaying the same write never produces a duplicate.
//!
//! # Architecture
//!
//! ```text
//! .memorystore/
//! ├── memories.jsonl      # one StoredRecord per line
//! └── travel_docs.jsonl
//! ```
//!
//! # Example
//!
//! ```ignore
//! use memorystore::{Filter, MemoryStore, NewRecord, QueryOptions};
//!
//! let mut store = MemoryStore::open(".memorystore")?;
//! store.upsert("memories", NewRecord::new("t1:m1", "3 days in Big Sur").with_meta("thread_id", "t1"))?;
//! let hits = store.query("memories", &QueryOptions::text("big sur camping", 6).filter(Filter::eq("thread_id", "t1")))?;
//! ```

pub mod cli;
pub mod config;
mod filter;
mod seed;
mod similarity;
mod store;

pub use filter::Filter;
pub use seed::{SeedDoc, SeedFile, load_seed_file, seed_records};
pub use similarity::{embedding_cosine, lexical_cosine, tokenize};
pub use store::{CollectionStats, Metadata, MemoryStore, NewRecord, QueryHit, QueryOptions, StoredRecord};

/// Default number of hits returned by a query
pub const DEFAULT_TOP_K: usize = 8;

/// Collection used for per-thread conversational memory
pub const MEMORIES_COLLECTION: &str = "memories";

/// Collection used for curated grounding documents
pub const TRAVEL_DOCS_COLLECTION: &str = "travel_docs";
