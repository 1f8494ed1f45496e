//! One request, start to finish: send, check status, decode, time.

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::normalize::decode_body;
use crate::request::SearchRequest;
use crate::transport::SearchTransport;
use crate::types::{ns_to_ms, RequestState, SearchResult, TimingMetrics};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub results: Vec<SearchResult>,
    pub timing: TimingMetrics,
}

/// Execute a single request. Non-2xx statuses, transport failures and
/// undecodable bodies are errors; malformed result items are not.
pub async fn execute(
    transport: &dyn SearchTransport,
    request: &SearchRequest,
) -> Result<FetchOutcome, FetchError> {
    let start = Instant::now();
    let raw = transport.send(request).await?;
    if !raw.is_success() {
        return Err(FetchError::HttpStatus(raw.status));
    }

    let decoded = decode_body(&raw.body, request.variant)?;
    let total = start.elapsed().as_secs_f64() * 1000.0;

    Ok(FetchOutcome {
        results: decoded.results,
        timing: TimingMetrics {
            embeddings: ns_to_ms(decoded.embedding_ns),
            search: ns_to_ms(decoded.search_ns),
            total,
        },
    })
}

/// Terminal [`RequestState`] for a finished request. Error detail is logged
/// here and replaced by the generic user message.
pub fn settle(term: &str, result: Result<FetchOutcome, FetchError>) -> RequestState {
    match result {
        Ok(FetchOutcome { results, timing }) => {
            info!(
                term,
                results = results.len(),
                embeddings_ms = timing.embeddings,
                search_ms = timing.search,
                total_ms = timing.total,
                "Search complete"
            );
            RequestState::Success { results, timing }
        }
        Err(e) => {
            match &e {
                FetchError::HttpStatus(status) => {
                    warn!(term, status, "Search endpoint returned an error status")
                }
                other => warn!(term, error = %other, "Search request failed"),
            }
            RequestState::Error { message: e.user_message().to_string() }
        }
    }
}
