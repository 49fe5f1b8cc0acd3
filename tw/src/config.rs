//! TripWeaver configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main TripWeaver configuration
///
/// Loaded once at startup and handed to component constructors; nothing
/// mutates it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation model configuration
    pub llm: LlmConfig,

    /// Chat history collaborator
    pub history: HistoryConfig,

    /// Short and long term memory
    pub memory: MemoryConfig,

    /// Curated grounding retrieval
    pub retrieval: RetrievalConfig,

    /// Live weather, POI and lodging lookups
    pub lookups: LookupsConfig,

    /// Queue worker loop
    pub worker: WorkerConfig,

    /// Prompt assembly bounds
    pub prompt: PromptConfig,

    /// Controlled vocabularies and budget bands
    pub vocab: VocabConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails fast on empty vocabularies, zero window sizes and malformed
    /// budget bands. A missing API key is not an error; the generator then
    /// runs fallback-only.
    pub fn validate(&self) -> Result<()> {
        let vocabularies = [
            ("trip-types", &self.vocab.trip_types),
            ("difficulty-levels", &self.vocab.difficulty_levels),
            ("travel-modes", &self.vocab.travel_modes),
            ("lodging-types", &self.vocab.lodging_types),
            ("amenities", &self.vocab.amenities),
        ];
        for (name, values) in vocabularies {
            if values.iter().all(|v| v.trim().is_empty()) {
                return Err(eyre!("vocab.{} must not be empty", name));
            }
        }

        if self.vocab.budget_bands.is_empty() {
            return Err(eyre!("vocab.budget-bands must not be empty"));
        }
        for (band, range) in &self.vocab.budget_bands {
            if range.high == 0 || range.low > range.high {
                return Err(eyre!(
                    "vocab.budget-bands.{} is malformed: low={} high={}",
                    band,
                    range.low,
                    range.high
                ));
            }
        }

        let windows = [
            ("memory.recent-window", self.memory.recent_window),
            ("memory.long-term-top-k", self.memory.long_term_top_k),
            ("memory.blocking-threads", self.memory.blocking_threads),
            ("retrieval.top-k", self.retrieval.top_k),
            ("history.page-size", self.history.page_size),
            ("prompt.transcript-turns", self.prompt.transcript_turns),
            ("prompt.transcript-chars", self.prompt.transcript_chars),
            ("worker.max-attempts", self.worker.max_attempts as usize),
            ("lookups.max-pois", self.lookups.max_pois),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(eyre!("{} must be greater than zero", name));
            }
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        #[derive(Deserialize)]
        struct LogLevelOnly {
            #[serde(rename = "log-level")]
            log_level: Option<String>,
        }

        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::candidate_paths().into_iter().find(|p| p.exists())?,
        };
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".tripweaver.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tripweaver").join("tripweaver.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" for any OpenAI-compatible endpoint, "none" for fallback-only)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 60_000,
            temperature: 0.4,
        }
    }
}

impl LlmConfig {
    /// The API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

/// Chat history collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Base URL of the history service; unset keeps history in process
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Messages requested per page
    #[serde(rename = "page-size")]
    pub page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 10_000,
            page_size: 100,
        }
    }
}

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory of the local long-term memory store
    #[serde(rename = "store-dir")]
    pub store_dir: PathBuf,

    /// Collection holding per-thread memories
    pub collection: String,

    /// Number of most recent messages kept in the short-term window
    #[serde(rename = "recent-window")]
    pub recent_window: usize,

    /// Long-term hits returned per turn
    #[serde(rename = "long-term-top-k")]
    pub long_term_top_k: usize,

    /// Concurrent blocking store operations
    #[serde(rename = "blocking-threads")]
    pub blocking_threads: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_dir: default_data_dir().join("memory"),
            collection: memorystore::MEMORIES_COLLECTION.to_string(),
            recent_window: 10,
            long_term_top_k: 6,
            blocking_threads: 4,
        }
    }
}

/// Curated grounding retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Collection holding curated documents
    pub collection: String,

    /// Documents returned per query
    #[serde(rename = "top-k")]
    pub top_k: usize,

    /// Restrict retrieval to the destination's region code
    #[serde(rename = "filter-by-region")]
    pub filter_by_region: bool,

    /// Optional `{"docs": [...]}` file loaded into the collection at startup
    #[serde(rename = "seed-file")]
    pub seed_file: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: memorystore::TRAVEL_DOCS_COLLECTION.to_string(),
            top_k: 12,
            filter_by_region: true,
            seed_file: None,
        }
    }
}

/// Live lookup configuration
///
/// Off by default; offline runs and tests never touch the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupsConfig {
    pub enabled: bool,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Wikipedia pages kept per POI search
    #[serde(rename = "max-pois")]
    pub max_pois: usize,

    #[serde(rename = "geocode-url")]
    pub geocode_url: String,

    #[serde(rename = "forecast-url")]
    pub forecast_url: String,

    #[serde(rename = "wiki-url")]
    pub wiki_url: String,
}

impl Default for LookupsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 10_000,
            max_pois: 10,
            geocode_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            wiki_url: "https://en.wikipedia.org/w/api.php".to_string(),
        }
    }
}

/// Queue worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue name requests arrive on
    #[serde(rename = "queue-name")]
    pub queue_name: String,

    /// Blocking pop timeout in milliseconds
    #[serde(rename = "poll-timeout-ms")]
    pub poll_timeout_ms: u64,

    /// Sleep after an empty poll in milliseconds
    #[serde(rename = "idle-sleep-ms")]
    pub idle_sleep_ms: u64,

    /// Attempts per request before it is dropped
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential retry backoff
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Ceiling of the retry backoff
    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "trip_requests".to_string(),
            poll_timeout_ms: 2_000,
            idle_sleep_ms: 1_000,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Prompt assembly bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Template name
    pub template: String,

    /// Transcript turns included in the prompt
    #[serde(rename = "transcript-turns")]
    pub transcript_turns: usize,

    /// Characters kept per transcript turn
    #[serde(rename = "transcript-chars")]
    pub transcript_chars: usize,

    /// Long-term memory hits included in the digest
    #[serde(rename = "memory-digest")]
    pub memory_digest: usize,

    /// Grounding documents included per bucket
    #[serde(rename = "grounding-per-bucket")]
    pub grounding_per_bucket: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: "trip_plan".to_string(),
            transcript_turns: 10,
            transcript_chars: 600,
            memory_digest: 6,
            grounding_per_bucket: 8,
        }
    }
}

/// Inclusive budget range in USD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub low: u32,
    pub high: u32,
}

/// Controlled vocabularies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabConfig {
    #[serde(rename = "trip-types")]
    pub trip_types: Vec<String>,

    #[serde(rename = "difficulty-levels")]
    pub difficulty_levels: Vec<String>,

    #[serde(rename = "travel-modes")]
    pub travel_modes: Vec<String>,

    #[serde(rename = "lodging-types")]
    pub lodging_types: Vec<String>,

    pub amenities: Vec<String>,

    #[serde(rename = "budget-bands")]
    pub budget_bands: BTreeMap<String, BudgetRange>,

    /// Region code the service plans for
    #[serde(rename = "primary-region-code")]
    pub primary_region_code: String,

    /// Human-readable name of the primary region
    #[serde(rename = "primary-region-name")]
    pub primary_region_name: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for VocabConfig {
    fn default() -> Self {
        let budget_bands = [
            ("USD_0_500", 0, 500),
            ("USD_500_1000", 500, 1_000),
            ("USD_1000_2500", 1_000, 2_500),
            ("USD_2500_5000", 2_500, 5_000),
            ("USD_5000_PLUS", 5_000, 10_000),
        ]
        .into_iter()
        .map(|(band, low, high)| (band.to_string(), BudgetRange { low, high }))
        .collect();

        Self {
            trip_types: strings(&[
                "CAMPING",
                "HIKING",
                "ROAD_TRIP",
                "BEACH",
                "CITY",
                "NATURE",
                "WINE",
                "FOOD",
                "SKI",
                "NATIONAL_PARKS",
                "FAMILY",
                "ROMANTIC",
                "ADVENTURE",
                "CULTURAL",
                "RELAXATION",
            ]),
            difficulty_levels: strings(&["EASY", "MODERATE", "HARD", "EXPERT"]),
            travel_modes: strings(&["CAR", "TRAIN", "BUS", "FLIGHT", "BIKE", "WALK", "RV"]),
            lodging_types: strings(&[
                "CAMPING",
                "HOTEL",
                "MOTEL",
                "HOSTEL",
                "CABIN",
                "RESORT",
                "VACATION_RENTAL",
                "GLAMPING",
                "RV_PARK",
                "BNB",
            ]),
            amenities: strings(&[
                "PARKING",
                "WIFI",
                "POOL",
                "EV_CHARGING",
                "KITCHEN",
                "BREAKFAST",
                "PET_FRIENDLY",
                "LAUNDRY",
                "AIR_CONDITIONING",
                "HOT_TUB",
                "FIREPLACE",
                "ACCESSIBLE",
            ]),
            budget_bands,
            primary_region_code: "US-CA".to_string(),
            primary_region_name: "California".to_string(),
        }
    }
}

impl VocabConfig {
    /// Canonical spelling of `value` in `vocabulary`, matched case-insensitively after trimming
    pub fn canonical(vocabulary: &[String], value: &str) -> Option<String> {
        let needle = value.trim();
        if needle.is_empty() {
            return None;
        }
        vocabulary.iter().find(|v| v.eq_ignore_ascii_case(needle)).cloned()
    }

    /// Canonicalize a list, dropping unknown values and duplicates while keeping order
    pub fn canonical_list(vocabulary: &[String], values: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in values {
            if let Some(canonical) = Self::canonical(vocabulary, value)
                && !out.contains(&canonical)
            {
                out.push(canonical);
            }
        }
        out
    }

    /// Budget band name and range, matched case-insensitively
    pub fn budget_band(&self, band: &str) -> Option<(String, BudgetRange)> {
        let needle = band.trim();
        self.budget_bands
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(needle))
            .map(|(name, range)| (name.clone(), *range))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripweaver")
}
