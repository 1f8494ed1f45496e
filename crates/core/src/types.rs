//! Core types shared across QueryDeck: editable query parameters, the wire
//! variant, display records, timing metrics, request state, and the snapshot
//! published to the rendering layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// User-facing message for every request failure. Details go to the log.
pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch results. Please try again.";

/// Default quiescence window before a request is issued.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub const DEFAULT_DATASET: &str = "reviews";
pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_LIMIT: u32 = 10;

// ---------------------------------------------------------------------------
// Processing speed
// ---------------------------------------------------------------------------

/// Processing-speed selector sent as `speed` (0, 1 or 2) by the extended variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Speed {
    #[default]
    Standard,
    Fast,
    Fastest,
}

impl Speed {
    pub fn as_u8(self) -> u8 {
        match self {
            Speed::Standard => 0,
            Speed::Fast => 1,
            Speed::Fastest => 2,
        }
    }
}

impl From<Speed> for u8 {
    fn from(speed: Speed) -> u8 {
        speed.as_u8()
    }
}

impl TryFrom<u8> for Speed {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Speed::Standard),
            1 => Ok(Speed::Fast),
            2 => Ok(Speed::Fastest),
            other => Err(format!("speed must be 0, 1 or 2 (got {other})")),
        }
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s.trim().parse().map_err(|_| format!("speed must be 0, 1 or 2 (got '{s}')"))?;
        Speed::try_from(n)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// Wire variant
// ---------------------------------------------------------------------------

/// Which shape of the search endpoint the client talks to.
///
/// `Extended` sends `speed` and `dataset` and expects every result's `text`
/// to carry a JSON-encoded record. `Simple` sends the four base parameters
/// and takes result objects as they come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    Simple,
    #[default]
    Extended,
}

impl FromStr for ApiVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(ApiVariant::Simple),
            "extended" => Ok(ApiVariant::Extended),
            other => Err(format!("unknown variant '{other}' (expected 'simple' or 'extended')")),
        }
    }
}

impl fmt::Display for ApiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVariant::Simple => f.write_str("simple"),
            ApiVariant::Extended => f.write_str("extended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Everything the user can edit. Each edit produces a whole new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub search_term: String,
    /// Relevance threshold in `[0, 1]`.
    pub threshold: f64,
    pub fast: bool,
    /// Maximum number of results, at least 1.
    pub limit: u32,
    pub speed: Speed,
    pub dataset: String,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            threshold: DEFAULT_THRESHOLD,
            fast: false,
            limit: DEFAULT_LIMIT,
            speed: Speed::Standard,
            dataset: DEFAULT_DATASET.to_string(),
        }
    }
}

impl QueryParams {
    /// True when the search term is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.search_term.trim().is_empty()
    }

    /// Copy with threshold clamped into `[0, 1]` and limit raised to at least 1.
    /// NaN thresholds fall back to the default.
    pub fn clamped(&self) -> Self {
        let threshold = if self.threshold.is_nan() {
            DEFAULT_THRESHOLD
        } else {
            self.threshold.clamp(0.0, 1.0)
        };
        Self { threshold, limit: self.limit.max(1), ..self.clone() }
    }
}

// ---------------------------------------------------------------------------
// Display records
// ---------------------------------------------------------------------------

/// One display-ready result. Unrecognized fields from simple-variant payloads
/// are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResult {
    /// Record holding only a raw text string.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }
}

/// Per-request timings in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// Server-reported embedding time.
    pub embeddings: f64,
    /// Server-reported search time.
    pub search: f64,
    /// Client-side wall clock from request start to decoded body.
    pub total: f64,
}

/// Nanoseconds (as reported by the server) to milliseconds.
pub fn ns_to_ms(ns: f64) -> f64 {
    ns / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Request state + snapshot
// ---------------------------------------------------------------------------

/// Exactly one of these is current at any time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Error { message: String },
    Success { results: Vec<SearchResult>, timing: TimingMetrics },
}

impl RequestState {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    /// Results of a successful request, empty otherwise.
    pub fn results(&self) -> &[SearchResult] {
        match self {
            RequestState::Success { results, .. } => results,
            _ => &[],
        }
    }

    pub fn timing(&self) -> Option<TimingMetrics> {
        match self {
            RequestState::Success { timing, .. } => Some(*timing),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RequestState::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Read-only view handed to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub params: QueryParams,
    pub request: RequestState,
}
