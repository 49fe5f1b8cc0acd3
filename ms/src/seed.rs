//! Seed files for curated document collections
//!
//! Format:
//!
//! ```json
//! {"docs": [{"doc_id": "ca_big_sur_camping", "text": "...", "metadata": {"region_code": "US-CA"}}]}
//! ```

use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::store::{Metadata, NewRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub docs: Vec<SeedDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDoc {
    #[serde(default, alias = "id")]
    pub doc_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

pub fn load_seed_file(path: &Path) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path).context(format!("Failed to read seed file: {}", path.display()))?;
    serde_json::from_str(&content).context(format!("Invalid seed file: {}", path.display()))
}

/// Convert seed docs to records
///
/// Docs without an id get `doc_{index}`. Every record carries `doc_id` and a
/// `source` (default `curated`) in its metadata. Docs with blank text are
/// skipped.
pub fn seed_records(seed: &SeedFile) -> Vec<NewRecord> {
    seed.docs
        .iter()
        .enumerate()
        .filter(|(_, doc)| !doc.text.trim().is_empty())
        .map(|(index, doc)| {
            let doc_id = doc.doc_id.clone().unwrap_or_else(|| format!("doc_{}", index));
            let mut metadata = doc.metadata.clone();
            metadata.insert("doc_id".to_string(), Value::String(doc_id.clone()));
            metadata
                .entry("source")
                .or_insert_with(|| Value::String("curated".to_string()));
            NewRecord::new(doc_id, doc.text.trim()).with_metadata(metadata)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_records_fill_ids_and_source() {
        let seed: SeedFile = serde_json::from_str(
            r#"{"docs": [
                {"doc_id": "rule_fire", "text": "Check fire restrictions.", "metadata": {"kind": "rule"}},
                {"text": "Pfeiffer Big Sur State Park campground", "metadata": {"source": "parks"}},
                {"text": "   "}
            ]}"#,
        )
        .unwrap();

        let records = seed_records(&seed);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "rule_fire");
        assert_eq!(records[0].metadata["source"], "curated");
        assert_eq!(records[0].metadata["kind"], "rule");
        assert_eq!(records[1].id, "doc_1");
        assert_eq!(records[1].metadata["source"], "parks");
        assert_eq!(records[1].metadata["doc_id"], "doc_1");
    }
}
