//! NormalizedIntent - the typed record of one inbound turn

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Typed intent for a single turn
///
/// Created once by the normalizer; afterwards only anchor back-fill touches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIntent {
    pub thread_id: String,
    pub message_id: String,
    pub request_id: Option<String>,
    pub user_text: Option<String>,
    pub time: TimeWindow,
    pub geo_scope: GeoScope,
    pub constraints: Constraints,
}

impl NormalizedIntent {
    pub fn destination_name(&self) -> Option<&str> {
        self.geo_scope.destination.as_ref().map(|p| p.name.as_str())
    }

    pub fn origin_name(&self) -> Option<&str> {
        self.geo_scope.origin.as_ref().map(|p| p.name.as_str())
    }

    /// Known trip length, zero when unknown
    pub fn days_or_zero(&self) -> u32 {
        self.time.days.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub days: Option<u32>,
    pub nights: Option<u32>,
    pub season_hint: Option<Season>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Meteorological season of a date (DJF, MAM, JJA, SON)
    pub fn of(date: NaiveDate) -> Self {
        match date.month() {
            12 | 1 | 2 => Self::Winter,
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            _ => Self::Fall,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Winter => "WINTER",
            Self::Spring => "SPRING",
            Self::Summer => "SUMMER",
            Self::Fall => "FALL",
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of place a destination names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    Region,
    City,
    Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PlaceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl Place {
    /// A bare named place, as produced by anchor back-fill
    pub fn named(name: impl Into<String>) -> Self {
        debug!("Place::named: called");
        Self {
            name: name.into(),
            kind: None,
            region_code: None,
            lat: None,
            lon: None,
        }
    }

    /// A region given only by its code, with no specific place name
    pub fn is_region_only(&self) -> bool {
        self.region_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(&self.name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoScope {
    pub origin: Option<Place>,
    pub destination: Option<Place>,
    pub in_scope_only: bool,
    /// The caller's destination lies outside the primary region
    pub out_of_scope: bool,
    pub original_destination: Option<Place>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub trip_types: Vec<String>,
    pub difficulty: Option<Difficulty>,
    pub transport: Transport,
    pub lodging: LodgingPrefs,
    pub diet: Vec<String>,
    pub themes: Vec<String>,
    pub poi_tags: PoiTags,
    pub budget: Option<Budget>,
    pub group_type: Option<String>,
    pub events_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    /// EASY is low effort, MODERATE medium, anything harder high
    pub fn for_level(level: &str) -> Self {
        match level {
            "EASY" => Self::Low,
            "MODERATE" => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difficulty {
    pub level: String,
    pub effort: Effort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    pub allowed: Vec<String>,
    pub forbidden: Vec<String>,
    pub intercity_travel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodgingPrefs {
    pub types: Vec<String>,
    pub pet_friendly_required: bool,
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiTags {
    pub must_include: Vec<String>,
    pub must_exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub band: String,
    pub ceiling_total: u32,
    pub per_day: Option<u32>,
}
