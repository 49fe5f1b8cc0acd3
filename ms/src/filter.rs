//! Metadata equality filters

use eyre::{Result, eyre};
use serde_json::Value;

use crate::store::Metadata;

/// Conjunction of `key == value` clauses over record metadata
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a single `key == value` clause
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(key, value)
    }

    /// Add another clause; all clauses must match
    pub fn and_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses
            .iter()
            .all(|(key, expected)| metadata.get(key).is_some_and(|actual| actual == expected))
    }

    /// Parse a CLI expression like `thread_id=t1,pet_friendly=true`
    ///
    /// Values that parse as JSON scalars (`true`, `42`) keep their type,
    /// everything else is a string.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut filter = Self::new();
        for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, raw) = part
                .split_once('=')
                .ok_or_else(|| eyre!("Invalid filter clause '{}', expected key=value", part))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(eyre!("Invalid filter clause '{}', empty key", part));
            }
            filter = filter.and_eq(key, parse_scalar(raw.trim()));
        }
        Ok(filter)
    }
}

/// Parse a CLI scalar, keeping booleans and numbers typed
pub(crate) fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&Metadata::new()));
    }

    #[test]
    fn test_all_clauses_must_match() {
        let filter = Filter::eq("thread_id", "t1").and_eq("role", "user");
        assert!(filter.matches(&meta(json!({"thread_id": "t1", "role": "user", "x": 1}))));
        assert!(!filter.matches(&meta(json!({"thread_id": "t1", "role": "assistant"}))));
        assert!(!filter.matches(&meta(json!({"role": "user"}))));
    }

    #[test]
    fn test_parse_keeps_scalar_types() {
        let filter = Filter::parse("region_code=US-CA, pet_friendly=true").unwrap();
        assert_eq!(
            filter.clauses(),
            &[
                ("region_code".to_string(), json!("US-CA")),
                ("pet_friendly".to_string(), json!(true)),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_missing_equals() {
        assert!(Filter::parse("thread_id").is_err());
        assert!(Filter::parse("=x").is_err());
    }
}
