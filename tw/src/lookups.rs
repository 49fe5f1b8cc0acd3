//! Live lookups for the turn's api intents
//!
//! `get_weather` geocodes the destination and reads a daily forecast from
//! Open-Meteo, `search_pois` pulls Wikipedia intro extracts, and
//! `search_lodging` synthesizes candidates locally. Results come back as
//! grounding documents typed WEATHER, POI and LODGING.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LookupsConfig;
use crate::domain::{ApiIntent, GroundingDoc};

/// Longest forecast Open-Meteo serves
const MAX_FORECAST_DAYS: u64 = 16;
const DEFAULT_FORECAST_DAYS: u64 = 7;
const EXTRACT_CHARS: usize = 1200;
const DEFAULT_LODGING_TYPE: &str = "CAMPING";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no location found for '{0}'")]
    NotFound(String),

    #[error("intent is missing '{0}'")]
    MissingParam(&'static str),

    #[error("unknown lookup tool '{0}'")]
    UnknownTool(String),
}

/// Executes one api intent
#[async_trait]
pub trait IntentExecutor: Send + Sync {
    async fn execute(&self, intent: &ApiIntent) -> Result<Vec<GroundingDoc>, LookupError>;
}

/// Run every intent in order; a failed lookup is logged and skipped
pub async fn run_lookups(executor: &dyn IntentExecutor, intents: &[ApiIntent], thread_id: &str) -> Vec<GroundingDoc> {
    debug!(%thread_id, intents = intents.len(), "run_lookups: called");
    let mut docs = Vec::new();
    for intent in intents {
        match executor.execute(intent).await {
            Ok(found) => {
                debug!(tool = %intent.tool, found = found.len(), "run_lookups: lookup done");
                docs.extend(found);
            }
            Err(e) => warn!(%thread_id, tool = %intent.tool, error = %e, "run_lookups: lookup failed, skipping"),
        }
    }
    info!(%thread_id, docs = docs.len(), "Live lookups complete");
    docs
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodeHit {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    daily: DailyForecast,
}

#[derive(Debug, Default, Deserialize)]
struct DailyForecast {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

/// Open-Meteo and Wikipedia over HTTP; lodging stays local
pub struct HttpIntentExecutor {
    http: Client,
    config: LookupsConfig,
}

impl HttpIntentExecutor {
    pub fn new(config: &LookupsConfig) -> Result<Self, LookupError> {
        debug!(timeout_ms = config.timeout_ms, "HttpIntentExecutor::new: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    async fn weather(&self, params: &Value) -> Result<Vec<GroundingDoc>, LookupError> {
        let destination = param_str(params, "destination").ok_or(LookupError::MissingParam("destination"))?;
        debug!(%destination, "weather: called");

        let geocode: GeocodeResponse = self
            .http
            .get(&self.config.geocode_url)
            .query(&[("name", destination), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let hit = geocode
            .results
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::NotFound(destination.to_string()))?;

        let days = params
            .get("days")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_FORECAST_DAYS)
            .clamp(1, MAX_FORECAST_DAYS);
        let forecast: ForecastResponse = self
            .http
            .get(&self.config.forecast_url)
            .query(&[
                ("latitude", hit.latitude.to_string()),
                ("longitude", hit.longitude.to_string()),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_probability_max".to_string(),
                ),
                ("forecast_days", days.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(weather_doc(&hit, &forecast.daily).into_iter().collect())
    }

    async fn pois(&self, params: &Value) -> Result<Vec<GroundingDoc>, LookupError> {
        let destination = param_str(params, "destination").ok_or(LookupError::MissingParam("destination"))?;
        let query = poi_query(destination, params);
        debug!(%query, "pois: called");

        let limit = self.config.max_pois.to_string();
        let response: Value = self
            .http
            .get(&self.config.wiki_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("prop", "extracts|info"),
                ("explaintext", "1"),
                ("exintro", "1"),
                ("inprop", "url"),
                ("generator", "search"),
                ("gsrsearch", query.as_str()),
                ("gsrlimit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(wiki_docs(&response, destination, self.config.max_pois))
    }
}

#[async_trait]
impl IntentExecutor for HttpIntentExecutor {
    async fn execute(&self, intent: &ApiIntent) -> Result<Vec<GroundingDoc>, LookupError> {
        debug!(tool = %intent.tool, "execute: called");
        match intent.tool.as_str() {
            "get_weather" => self.weather(&intent.params).await,
            "search_pois" => self.pois(&intent.params).await,
            "search_lodging" => lodging_docs(&intent.params),
            other => Err(LookupError::UnknownTool(other.to_string())),
        }
    }
}

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

fn param_strings(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn slug(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

/// `"<destination> <must-include> <themes> things to do"`
fn poi_query(destination: &str, params: &Value) -> String {
    let mut parts = vec![destination.to_string()];
    parts.extend(param_strings(params, "must_include"));
    parts.extend(param_strings(params, "themes"));
    parts.push("things to do".to_string());
    parts.join(" ")
}

fn weather_doc(hit: &GeocodeHit, daily: &DailyForecast) -> Option<GroundingDoc> {
    let highs: Vec<f64> = daily.temperature_2m_max.iter().flatten().copied().collect();
    let lows: Vec<f64> = daily.temperature_2m_min.iter().flatten().copied().collect();
    if daily.time.is_empty() || highs.is_empty() || lows.is_empty() {
        return None;
    }
    let span = |v: &[f64]| {
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    };
    let (high_lo, high_hi) = span(&highs);
    let (low_lo, low_hi) = span(&lows);

    let mut summary = format!(
        "{}: highs {:.0}-{:.0}°C, lows {:.0}-{:.0}°C over {} days",
        hit.name,
        high_lo,
        high_hi,
        low_lo,
        low_hi,
        daily.time.len()
    );
    let rain = daily.precipitation_probability_max.iter().flatten().copied().fold(None, |acc: Option<f64>, p| {
        Some(acc.map_or(p, |a| a.max(p)))
    });
    if let Some(rain) = rain {
        summary.push_str(&format!(", rain chance up to {:.0}%", rain));
    }

    let days: Vec<Value> = daily
        .time
        .iter()
        .enumerate()
        .map(|(i, date)| {
            json!({
                "date": date,
                "temp_max_c": daily.temperature_2m_max.get(i).copied().flatten(),
                "temp_min_c": daily.temperature_2m_min.get(i).copied().flatten(),
                "precip_prob": daily.precipitation_probability_max.get(i).copied().flatten(),
            })
        })
        .collect();

    let mut metadata = Map::new();
    metadata.insert("type".to_string(), json!("WEATHER"));
    metadata.insert("name".to_string(), json!(format!("Forecast for {}", hit.name)));
    metadata.insert("summary".to_string(), json!(summary));
    metadata.insert("provider".to_string(), json!("open-meteo"));
    metadata.insert("country".to_string(), json!(hit.country));
    metadata.insert("latitude".to_string(), json!(hit.latitude));
    metadata.insert("longitude".to_string(), json!(hit.longitude));
    metadata.insert("daily".to_string(), Value::Array(days));

    Some(GroundingDoc {
        id: format!("weather-{}", slug(&hit.name)),
        text: summary,
        doc_type: Some("WEATHER".to_string()),
        metadata,
        score: 1.0,
    })
}

/// Pages from a `generator=search` query, in search rank order
fn wiki_docs(response: &Value, destination: &str, max: usize) -> Vec<GroundingDoc> {
    let Some(pages) = response.pointer("/query/pages").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut ranked: Vec<(u64, &String, &Value)> = pages
        .iter()
        .map(|(id, page)| (page.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX), id, page))
        .collect();
    ranked.sort_by_key(|(index, id, _)| (*index, (*id).clone()));

    ranked
        .into_iter()
        .filter_map(|(_, id, page)| {
            let title = page.get("title").and_then(Value::as_str)?;
            let extract = page.get("extract").and_then(Value::as_str).map(str::trim).unwrap_or("");
            if extract.is_empty() {
                return None;
            }
            let text: String = extract.chars().take(EXTRACT_CHARS).collect();

            let mut metadata = Map::new();
            metadata.insert("type".to_string(), json!("POI"));
            metadata.insert("name".to_string(), json!(title));
            metadata.insert("source".to_string(), json!("wikipedia"));
            metadata.insert("url".to_string(), json!(page.get("fullurl").and_then(Value::as_str)));
            metadata.insert("region_hint".to_string(), json!(destination));
            Some(GroundingDoc {
                id: format!("wiki-{}", id),
                text,
                doc_type: Some("POI".to_string()),
                metadata,
                score: 0.0,
            })
        })
        .take(max)
        .enumerate()
        .map(|(rank, mut doc)| {
            doc.score = 1.0 / (rank as f32 + 1.0);
            doc
        })
        .collect()
}

/// Two synthesized stays near the destination; pet-friendly requests keep
/// only the pet-friendly one
fn lodging_docs(params: &Value) -> Result<Vec<GroundingDoc>, LookupError> {
    let destination = param_str(params, "destination").ok_or(LookupError::MissingParam("destination"))?;
    let kind = param_strings(params, "types")
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_LODGING_TYPE.to_string())
        .to_uppercase();
    let pets_required = params.get("pet_friendly").and_then(Value::as_bool).unwrap_or(false);
    let label = kind.replace('_', " ").to_lowercase();
    let camping = kind == DEFAULT_LODGING_TYPE;
    debug!(%destination, %kind, pets_required, "lodging_docs: called");

    let candidates = [
        (
            "riverside",
            format!("{} Riverside {}", destination, title_case(&label)),
            true,
            if camping { 70 } else { 220 },
            format!("Quiet {} stay near the main sights of {}.", label, destination),
        ),
        (
            "viewpoint",
            format!("{} Viewpoint {}", destination, title_case(&label)),
            false,
            if camping { 50 } else { 180 },
            format!("Budget {} close to the popular viewpoints around {}.", label, destination),
        ),
    ];

    Ok(candidates
        .into_iter()
        .filter(|(_, _, pets, _, _)| !pets_required || *pets)
        .map(|(key, name, pets, price, text)| {
            let mut metadata = Map::new();
            metadata.insert("type".to_string(), json!("LODGING"));
            metadata.insert("name".to_string(), json!(name));
            metadata.insert("lodging_type".to_string(), json!(kind));
            metadata.insert("pet_friendly".to_string(), json!(pets));
            metadata.insert("approx_price_per_night_usd".to_string(), json!(price));
            GroundingDoc {
                id: format!("lodging-{}-{}", slug(destination), key),
                text,
                doc_type: Some("LODGING".to_string()),
                metadata,
                score: 0.5,
            }
        })
        .collect())
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
