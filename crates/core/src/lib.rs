//! QueryDeck: a debounced client for a remote search endpoint.
//!
//! The search itself happens on the server. This crate owns everything the
//! client side needs to drive it from an interactive front end: editable query
//! parameters, a debounce-and-fetch controller, and defensive normalization of
//! the heterogeneous result payloads the endpoint returns.
//!
//! # Modules
//!
//! - [`types`]: Query parameters, display records, timings, request state
//! - [`request`]: Wire request and query-string encoding
//! - [`normalize`]: Body decoding and per-item result normalization
//! - [`transport`]: Transport seam and the reqwest-backed implementation
//! - [`fetch`]: Single request execution and terminal state mapping
//! - [`controller`]: Debounced query controller publishing snapshots
//! - [`error`]: Error types

pub mod controller;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod request;
pub mod transport;
pub mod types;

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use controller::ControllerConfig;
use error::ConfigError;
use types::*;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/search";

/// Name of the per-directory config file.
pub const CONFIG_FILE_NAME: &str = ".querydeck.toml";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Client configuration. Loaded from `.querydeck.toml` or defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDeckConfig {
    pub endpoint: String,
    pub variant: ApiVariant,
    pub debounce_ms: u64,
    /// Parameters a fresh session starts from.
    pub defaults: QueryParams,
}

impl Default for QueryDeckConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            variant: ApiVariant::default(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            defaults: QueryParams::default(),
        }
    }
}

impl QueryDeckConfig {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            variant: self.variant,
            debounce: Duration::from_millis(self.debounce_ms),
            initial: self.defaults.clone(),
        }
    }
}

/// Known keys in `.querydeck.toml` for config validation.
const KNOWN_CONFIG_KEYS: &[&str] =
    &["endpoint", "variant", "debounce_ms", "threshold", "limit", "fast", "speed", "dataset"];

/// Simple Levenshtein edit distance for typo suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Load `.querydeck.toml` from `dir`.
///
/// A missing file yields defaults; an unreadable or unparsable one yields
/// defaults with a warning.
pub fn load_querydeck_config(dir: &Path) -> QueryDeckConfig {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return QueryDeckConfig::default();
    }
    load_config_file(&path).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring config file");
        QueryDeckConfig::default()
    })
}

/// Load configuration from an explicit path. Read and parse failures are errors;
/// unknown keys and mistyped values only warn.
pub fn load_config_file(path: &Path) -> Result<QueryDeckConfig, ConfigError> {
    debug!(path = %path.display(), "Loading config");
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let table = content
        .parse::<toml::Table>()
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    let mut config = QueryDeckConfig::default();
    apply_config_table(&mut config, &table);
    Ok(config)
}

fn apply_config_table(config: &mut QueryDeckConfig, table: &toml::Table) {
    // Warn on unknown keys
    for key in table.keys() {
        if KNOWN_CONFIG_KEYS.contains(&key.as_str()) {
            continue;
        }
        let suggestion = KNOWN_CONFIG_KEYS.iter().min_by_key(|k| edit_distance(key, k));
        match suggestion {
            Some(suggestion) if edit_distance(key, suggestion) <= 3 => warn!(
                key = key.as_str(),
                suggestion = *suggestion,
                "Unknown key in {CONFIG_FILE_NAME}, did you mean '{suggestion}'?"
            ),
            _ => warn!(
                key = key.as_str(),
                "Unknown key in {CONFIG_FILE_NAME} (known keys: {})",
                KNOWN_CONFIG_KEYS.join(", ")
            ),
        }
    }

    let mistyped = |key: &str, expected: &str| {
        warn!(key, expected, "Config value has the wrong type, keeping default");
    };

    if let Some(v) = table.get("endpoint") {
        match v.as_str() {
            Some(s) => config.endpoint = s.to_string(),
            None => mistyped("endpoint", "string"),
        }
    }

    if let Some(v) = table.get("variant") {
        match v.as_str().map(str::parse::<ApiVariant>) {
            Some(Ok(variant)) => config.variant = variant,
            _ => mistyped("variant", "\"simple\" or \"extended\""),
        }
    }

    if let Some(v) = table.get("debounce_ms") {
        match v.as_integer().and_then(|n| u64::try_from(n).ok()) {
            Some(ms) => config.debounce_ms = ms,
            None => mistyped("debounce_ms", "non-negative integer"),
        }
    }

    // threshold accepts integers too (`threshold = 1`)
    if let Some(v) = table.get("threshold") {
        match v.as_float().or_else(|| v.as_integer().map(|n| n as f64)) {
            Some(t) => config.defaults.threshold = t,
            None => mistyped("threshold", "number"),
        }
    }

    if let Some(v) = table.get("limit") {
        match v.as_integer().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => config.defaults.limit = n,
            None => mistyped("limit", "positive integer"),
        }
    }

    if let Some(v) = table.get("fast") {
        match v.as_bool() {
            Some(b) => config.defaults.fast = b,
            None => mistyped("fast", "boolean"),
        }
    }

    if let Some(v) = table.get("speed") {
        match v.as_integer().and_then(|n| u8::try_from(n).ok()).map(Speed::try_from) {
            Some(Ok(speed)) => config.defaults.speed = speed,
            _ => mistyped("speed", "0, 1 or 2"),
        }
    }

    if let Some(v) = table.get("dataset") {
        match v.as_str() {
            Some(s) => config.defaults.dataset = s.to_string(),
            None => mistyped("dataset", "string"),
        }
    }

    config.defaults = config.defaults.clamped();
}
