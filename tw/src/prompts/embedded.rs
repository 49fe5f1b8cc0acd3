//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

/// Trip plan system prompt
pub const TRIP_PLAN: &str = include_str!("../../prompts/trip_plan.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "trip_plan" => Some(TRIP_PLAN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_trip_plan() {
        let prompt = get_embedded("trip_plan").unwrap();
        assert!(prompt.contains("GREETING_ONLY"));
        assert!(prompt.contains("QUESTION_ANSWER"));
        assert!(prompt.contains("TRIP_PLAN"));
        assert!(prompt.contains("{{input_json}}"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
