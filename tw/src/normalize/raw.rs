//! Wire shapes of an inbound request

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::domain::{Place, PlaceKind};

/// Treat an explicit `null` the same as a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRequest {
    pub request_id: Option<String>,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub user_filters: Option<RawFilters>,
    pub dates: Option<RawDates>,
    pub destination: Option<RawPlace>,
    pub origin: Option<RawPlace>,
    pub content: Option<String>,
    pub question: Option<String>,
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDates {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFilters {
    #[serde(deserialize_with = "nullable")]
    pub trip_types: Vec<String>,
    pub difficulty: Option<String>,
    pub budget_level: Option<String>,
    pub duration_days: Option<u32>,
    pub group_type: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub travel_modes: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub accommodation: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub accessibility: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub meal_preferences: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub must_include: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub must_exclude: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub interest_tags: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub events_only: bool,
    #[serde(deserialize_with = "nullable")]
    pub amenities: Vec<String>,
}

/// A place given either as a bare name or as a structured object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPlace {
    Name(String),
    Detailed {
        #[serde(default, alias = "display_name")]
        name: Option<String>,
        #[serde(rename = "type", default)]
        kind: Option<PlaceKind>,
        #[serde(default)]
        region_code: Option<String>,
        #[serde(default)]
        lat: Option<f64>,
        #[serde(default)]
        lon: Option<f64>,
    },
}

impl RawPlace {
    /// Display name, falling back to the region code
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { name, region_code, .. } => name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .or(region_code.as_deref())
                .unwrap_or(""),
        }
    }

    pub fn region_code(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Detailed { region_code, .. } => region_code.as_deref(),
        }
    }

    pub fn into_place(self) -> Place {
        match self {
            Self::Name(name) => Place::named(name),
            Self::Detailed {
                name: Some(name),
                kind,
                region_code,
                lat,
                lon,
            } if !name.trim().is_empty() => Place {
                name,
                kind,
                region_code,
                lat,
                lon,
            },
            Self::Detailed {
                kind,
                region_code,
                lat,
                lon,
                ..
            } => Place {
                name: region_code.clone().unwrap_or_default(),
                kind: kind.or(Some(PlaceKind::Region)),
                region_code,
                lat,
                lon,
            },
        }
    }
}
