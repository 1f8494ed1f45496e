//! Stub of the remote search endpoint.
//!
//! Serves the same wire contract as the real service from a JSON fixture so
//! QueryDeck can be developed and tested offline:
//!
//! - `GET /search`: extended body; each result's `text` carries the
//!   JSON-encoded fixture record, or the raw string for fixture strings
//! - `GET /search/simple`: bare array of matching fixture records
//! - `GET /health`
//!
//! Matching is a case-insensitive substring test over the record's string
//! fields. There is no ranking.

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use querydeck_core::types::{Speed, DEFAULT_DATASET};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Records served by the stub. Objects are structured records; strings are
/// plain-prose records that the client cannot parse.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub items: Vec<Value>,
}

impl Fixture {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} must contain a JSON array, found {found}", path.display())]
    NotAnArray { path: PathBuf, found: &'static str },
}

/// Load a fixture file: a JSON array of objects and/or strings.
pub fn load_fixture(path: &Path) -> Result<Fixture, FixtureError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| FixtureError::Read { path: path.to_path_buf(), source })?;
    let value = serde_json::from_str::<Value>(&raw)
        .map_err(|source| FixtureError::Parse { path: path.to_path_buf(), source })?;
    match value {
        Value::Array(items) => Ok(Fixture::new(items)),
        other => Err(FixtureError::NotAnArray {
            path: path.to_path_buf(),
            found: match other {
                Value::Object(_) => "an object",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                Value::Bool(_) => "a boolean",
                _ => "null",
            },
        }),
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Query as received on the wire, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub optimized: Option<String>,
    pub limit: Option<String>,
    pub threshold: Option<String>,
    pub speed: Option<String>,
    pub dataset: Option<String>,
}

pub struct StubState {
    fixture: Fixture,
    hits: AtomicUsize,
    last_query: Mutex<Option<SearchQuery>>,
}

impl StubState {
    pub fn new(fixture: Fixture) -> Arc<Self> {
        Arc::new(Self { fixture, hits: AtomicUsize::new(0), last_query: Mutex::new(None) })
    }

    /// Number of search requests received, valid or not.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<SearchQuery> {
        self.last_query.lock().ok().and_then(|q| q.clone())
    }

    fn record(&self, q: &SearchQuery) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(q.clone());
        }
    }
}

pub fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/health", get(api_health))
        .route("/search", get(api_search_extended))
        .route("/search/simple", get(api_search_simple))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the stub on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<StubState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, items = state.fixture.items.len(), "Stub search endpoint listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, Json<Value>);

fn bad_request(msg: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

/// Validated search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StubParams {
    pub term: String,
    pub limit: usize,
    pub threshold: f64,
    pub speed: Speed,
    pub dataset: String,
}

impl TryFrom<&SearchQuery> for StubParams {
    type Error = String;

    fn try_from(q: &SearchQuery) -> Result<Self, Self::Error> {
        let term = q.search.clone().filter(|s| !s.trim().is_empty()).ok_or("missing 'search'")?;
        let limit = q
            .limit
            .as_deref()
            .ok_or("missing 'limit'")?
            .parse::<usize>()
            .map_err(|_| "'limit' must be a non-negative integer".to_string())?;
        let threshold = match q.threshold.as_deref() {
            Some(t) => t.parse::<f64>().map_err(|_| "'threshold' must be a number".to_string())?,
            None => 0.0,
        };
        let speed = match q.speed.as_deref() {
            Some(s) => s.parse::<Speed>()?,
            None => Speed::default(),
        };
        let dataset = q.dataset.clone().unwrap_or_else(|| DEFAULT_DATASET.to_string());
        Ok(Self { term, limit, threshold, speed, dataset })
    }
}

pub async fn api_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn api_search_extended(
    State(state): State<Arc<StubState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    state.record(&q);
    let params = StubParams::try_from(&q).map_err(bad_request)?;

    let embed_start = Instant::now();
    let needle = params.term.to_lowercase();
    let embedding_time = embed_start.elapsed().as_nanos() as u64;

    let search_start = Instant::now();
    let matches = matching_items(&state.fixture, &needle, params.threshold, params.limit);
    let search_time = search_start.elapsed().as_nanos() as u64;

    let results: Vec<Value> = matches
        .into_iter()
        .map(|item| match item {
            Value::String(s) => json!({ "text": s }),
            other => json!({ "text": other.to_string() }),
        })
        .collect();

    info!(
        term = params.term.as_str(),
        dataset = params.dataset.as_str(),
        speed = params.speed.as_u8(),
        results = results.len(),
        "Stub search"
    );

    Ok(Json(json!({
        "embedding_time": embedding_time,
        "search_time": search_time,
        "results": results,
    })))
}

pub async fn api_search_simple(
    State(state): State<Arc<StubState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    state.record(&q);
    let params = StubParams::try_from(&q).map_err(bad_request)?;
    let needle = params.term.to_lowercase();

    let results: Vec<Value> = matching_items(&state.fixture, &needle, params.threshold, params.limit)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => json!({ "text": s }),
            other => other,
        })
        .collect();

    debug!(term = params.term.as_str(), results = results.len(), "Stub simple search");
    Ok(Json(Value::Array(results)))
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Fixture items containing `needle` (already lowercased), in fixture order.
/// Items with a numeric `score` below `threshold` are skipped.
pub fn matching_items(fixture: &Fixture, needle: &str, threshold: f64, limit: usize) -> Vec<Value> {
    fixture
        .items
        .iter()
        .filter(|item| item_matches(item, needle))
        .filter(|item| item.get("score").and_then(Value::as_f64).map_or(true, |s| s >= threshold))
        .take(limit)
        .cloned()
        .collect()
}

fn item_matches(item: &Value, needle: &str) -> bool {
    match item {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Object(obj) => obj
            .values()
            .filter_map(Value::as_str)
            .any(|s| s.to_lowercase().contains(needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Fixture {
        Fixture::new(vec![
            json!("Coffee here tastes burnt."),
            json!({ "name": "Blue Bottle", "text": "Great coffee", "score": 0.9 }),
            json!({ "name": "Corner Deli", "text": "Weak coffee", "score": 0.2 }),
            json!({ "name": "Tea House", "text": "Lovely oolong", "score": 0.95 }),
            json!(42),
        ])
    }

    #[test]
    fn matches_strings_and_object_fields_case_insensitively() {
        let hits = matching_items(&fixture(), "coffee", 0.0, 10);
        assert_eq!(hits.len(), 3);
        assert!(hits[0].is_string());
    }

    #[test]
    fn threshold_skips_low_scores_but_keeps_unscored() {
        let hits = matching_items(&fixture(), "coffee", 0.5, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1]["name"], "Blue Bottle");
    }

    #[test]
    fn limit_truncates_in_fixture_order() {
        let hits = matching_items(&fixture(), "coffee", 0.0, 1);
        assert_eq!(hits, vec![json!("Coffee here tastes burnt.")]);
    }

    #[test]
    fn params_require_search_and_limit() {
        let q = SearchQuery { limit: Some("5".into()), ..SearchQuery::default() };
        assert!(StubParams::try_from(&q).is_err());

        let q = SearchQuery { search: Some("tea".into()), ..SearchQuery::default() };
        assert!(StubParams::try_from(&q).is_err());

        let q = SearchQuery {
            search: Some("tea".into()),
            limit: Some("5".into()),
            speed: Some("2".into()),
            ..SearchQuery::default()
        };
        let p = StubParams::try_from(&q).unwrap();
        assert_eq!(p.limit, 5);
        assert_eq!(p.speed, Speed::Fastest);
        assert_eq!(p.dataset, "reviews");
    }

    #[test]
    fn invalid_speed_is_rejected() {
        let q = SearchQuery {
            search: Some("tea".into()),
            limit: Some("5".into()),
            speed: Some("9".into()),
            ..SearchQuery::default()
        };
        assert!(StubParams::try_from(&q).is_err());
    }

    #[test]
    fn load_fixture_requires_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");

        std::fs::write(&path, r#"[{"name":"A"}, "plain"]"#).unwrap();
        assert_eq!(load_fixture(&path).unwrap().items.len(), 2);

        std::fs::write(&path, r#"{"name":"A"}"#).unwrap();
        assert!(matches!(
            load_fixture(&path),
            Err(FixtureError::NotAnArray { found: "an object", .. })
        ));

        std::fs::write(&path, "[{").unwrap();
        assert!(matches!(load_fixture(&path), Err(FixtureError::Parse { .. })));

        let missing = dir.path().join("missing.json");
        let err = load_fixture(&missing).unwrap_err();
        assert!(matches!(err, FixtureError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn bundled_fixture_mixes_records_and_prose() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/reviews.json");
        let fixture = load_fixture(&path).unwrap();
        assert_eq!(fixture.items.len(), 6);
        assert_eq!(fixture.items.iter().filter(|i| i.is_string()).count(), 2);
        assert_eq!(matching_items(&fixture, "coffee", 0.5, 10).len(), 3);
    }
}
