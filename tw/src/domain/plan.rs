//! TripPlan - the structured output of a turn

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Value of the `type` field on every plan
pub const PLAN_TYPE: &str = "trip_plan";

/// Plan schema version
pub const PLAN_VERSION: &str = "v1";

/// Longest trip any input path may ask for
pub const MAX_TRIP_DAYS: u32 = 60;

/// What kind of reply the plan carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanMode {
    GreetingOnly,
    QuestionAnswer,
    TripPlan,
    /// Trip length unknown; the reply asks for it
    Clarify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    #[serde(default)]
    pub mode: Option<PlanMode>,
    pub thread_id: String,
    pub message_id: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub trip_types: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub budget_band: Option<String>,
    #[serde(default)]
    pub lodging: Option<LodgingSummary>,
    #[serde(default)]
    pub weather_hint: Option<String>,
    #[serde(default)]
    pub window_summary: Option<String>,
    #[serde(default)]
    pub intro_text: Option<String>,
    #[serde(default)]
    pub closing_tips: Option<String>,
    #[serde(default)]
    pub itinerary: Vec<DayPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingSummary {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default)]
    pub day: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_time_hours: Option<f32>,
}

impl TripPlan {
    /// Empty plan shell for a thread/message
    pub fn new(thread_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            kind: PLAN_TYPE.to_string(),
            version: PLAN_VERSION.to_string(),
            mode: None,
            thread_id: thread_id.into(),
            message_id: message_id.into(),
            destination: None,
            days: 0,
            trip_types: Vec::new(),
            difficulty: None,
            budget_band: None,
            lodging: None,
            weather_hint: None,
            window_summary: None,
            intro_text: None,
            closing_tips: None,
            itinerary: Vec::new(),
        }
    }

    /// `days == 0` means no itinerary; otherwise exactly `days` entries numbered `1..=days`
    pub fn has_valid_itinerary(&self) -> bool {
        if self.days == 0 {
            return self.itinerary.is_empty();
        }
        self.itinerary.len() == self.days as usize
            && self.itinerary.iter().zip(1..).all(|(d, n)| d.day == n)
    }

    /// Bring the itinerary in line with `days`
    ///
    /// Entries keep their order; extras are dropped, missing days are padded
    /// with a light exploration day, and everything is renumbered from 1.
    /// Returns true when anything changed.
    pub fn repair_itinerary(&mut self) -> bool {
        debug!(days = self.days, entries = self.itinerary.len(), "repair_itinerary: called");
        if self.has_valid_itinerary() {
            return false;
        }

        if self.days == 0 {
            self.itinerary.clear();
            return true;
        }

        let days = self.days as usize;
        self.itinerary.truncate(days);
        let place = self.destination.clone().unwrap_or_else(|| "the area".to_string());
        while self.itinerary.len() < days {
            let n = self.itinerary.len() as u32 + 1;
            self.itinerary.push(DayPlan {
                day: n,
                title: format!("Day {} in {}", n, place),
                highlights: vec![format!("Explore {}", place)],
                activities: Vec::new(),
            });
        }
        for (day, n) in self.itinerary.iter_mut().zip(1..) {
            day.day = n;
        }
        debug!(days, "repair_itinerary: repaired");
        true
    }

    /// All free text a reader sees about lodging and activities
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        if let Some(lodging) = &self.lodging {
            for part in [Some(&lodging.name), lodging.kind.as_ref(), lodging.location.as_ref(), lodging.notes.as_ref()]
                .into_iter()
                .flatten()
            {
                text.push_str(part);
                text.push(' ');
            }
        }
        for day in &self.itinerary {
            text.push_str(&day.title);
            text.push(' ');
            for highlight in &day.highlights {
                text.push_str(highlight);
                text.push(' ');
            }
            for activity in &day.activities {
                text.push_str(&activity.name);
                text.push(' ');
                if let Some(description) = &activity.description {
                    text.push_str(description);
                    text.push(' ');
                }
                for tag in &activity.tags {
                    text.push_str(tag);
                    text.push(' ');
                }
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> DayPlan {
        DayPlan {
            day: n,
            title: format!("d{}", n),
            highlights: vec![],
            activities: vec![],
        }
    }

    #[test]
    fn test_zero_days_clears_itinerary() {
        let mut plan = TripPlan::new("t", "m");
        plan.itinerary = vec![day(1)];
        assert!(plan.repair_itinerary());
        assert!(plan.itinerary.is_empty());
        assert!(plan.has_valid_itinerary());
    }

    #[test]
    fn test_repair_truncates_and_renumbers() {
        let mut plan = TripPlan::new("t", "m");
        plan.days = 2;
        plan.itinerary = vec![day(3), day(7), day(9)];
        assert!(plan.repair_itinerary());
        assert_eq!(plan.itinerary.iter().map(|d| d.day).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(plan.itinerary[0].title, "d3");
    }

    #[test]
    fn test_repair_pads_missing_days() {
        let mut plan = TripPlan::new("t", "m");
        plan.days = 3;
        plan.destination = Some("Big Sur".to_string());
        plan.itinerary = vec![day(1)];
        assert!(plan.repair_itinerary());
        assert_eq!(plan.itinerary.len(), 3);
        assert_eq!(plan.itinerary[2].highlights, vec!["Explore Big Sur".to_string()]);
        assert!(plan.has_valid_itinerary());
    }

    #[test]
    fn test_valid_itinerary_untouched() {
        let mut plan = TripPlan::new("t", "m");
        plan.days = 2;
        plan.itinerary = vec![day(1), day(2)];
        assert!(!plan.repair_itinerary());
    }

    #[test]
    fn test_serializes_type_field() {
        let json = serde_json::to_value(TripPlan::new("t1", "m1")).unwrap();
        assert_eq!(json["type"], "trip_plan");
        assert_eq!(json["version"], "v1");
        assert!(json["lodging"].is_null());
        assert!(json["weather_hint"].is_null());
    }
}
