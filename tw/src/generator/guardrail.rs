//! Post-generation amenity guardrail

use tracing::debug;

use crate::domain::TripPlan;

/// Readable form of an amenity code: `EV_CHARGING` -> `ev charging`
fn amenity_phrase(amenity: &str) -> String {
    amenity.trim().replace(['_', '-'], " ").to_lowercase()
}

/// Note each required amenity the plan never mentions
///
/// Notes go on the lodging when there is one, else on `closing_tips`. The
/// note only asks the traveller to confirm; it never claims availability.
/// Returns the amenities that were noted.
pub fn apply_amenity_guardrail(plan: &mut TripPlan, required: &[String]) -> Vec<String> {
    debug!(required = required.len(), "apply_amenity_guardrail: called");
    let haystack = amenity_phrase(&plan.searchable_text());

    let missing: Vec<String> = required
        .iter()
        .map(|a| amenity_phrase(a))
        .filter(|phrase| !phrase.is_empty() && !haystack.contains(phrase.as_str()))
        .collect();

    for phrase in &missing {
        let note = format!("Confirm {} availability directly before booking.", phrase);
        let target = match plan.lodging.as_mut() {
            Some(lodging) => &mut lodging.notes,
            None => &mut plan.closing_tips,
        };
        append_sentence(target, &note);
    }

    if !missing.is_empty() {
        debug!(?missing, "apply_amenity_guardrail: notes added");
    }
    missing
}

fn append_sentence(target: &mut Option<String>, sentence: &str) {
    match target {
        Some(text) if !text.trim().is_empty() => {
            let trimmed = text.trim_end();
            let sep = if trimmed.ends_with(['.', '!', '?']) { " " } else { ". " };
            *text = format!("{}{}{}", trimmed, sep, sentence);
        }
        _ => *target = Some(sentence.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LodgingSummary;

    fn lodging(notes: Option<&str>) -> LodgingSummary {
        LodgingSummary {
            name: "Pine Lodge".to_string(),
            kind: Some("HOTEL".to_string()),
            location: None,
            notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_amenity_goes_to_lodging_notes() {
        let mut plan = TripPlan::new("t", "m");
        plan.lodging = Some(lodging(Some("Quiet rooms near the lake")));
        let noted = apply_amenity_guardrail(&mut plan, &["PARKING".to_string()]);
        assert_eq!(noted, vec!["parking".to_string()]);
        let notes = plan.lodging.unwrap().notes.unwrap();
        assert!(notes.starts_with("Quiet rooms near the lake. Confirm parking"));
    }

    #[test]
    fn test_mentioned_amenity_is_left_alone() {
        let mut plan = TripPlan::new("t", "m");
        plan.lodging = Some(lodging(Some("Free EV charging and Parking on site.")));
        let noted = apply_amenity_guardrail(&mut plan, &["PARKING".to_string(), "EV_CHARGING".to_string()]);
        assert!(noted.is_empty());
        assert_eq!(plan.lodging.unwrap().notes.as_deref(), Some("Free EV charging and Parking on site."));
    }

    #[test]
    fn test_without_lodging_uses_closing_tips() {
        let mut plan = TripPlan::new("t", "m");
        apply_amenity_guardrail(&mut plan, &["WIFI".to_string()]);
        assert_eq!(
            plan.closing_tips.as_deref(),
            Some("Confirm wifi availability directly before booking.")
        );

        let mut plan = TripPlan::new("t", "m");
        plan.lodging = Some(lodging(None));
        apply_amenity_guardrail(&mut plan, &["PARKING".to_string()]);
        assert!(plan.lodging.unwrap().notes.unwrap().contains("parking"));
    }
}
