//! Debounced query controller.
//!
//! A [`QueryController`] owns the editable [`QueryParams`] and the derived
//! [`RequestState`]. Setters send edits to a worker task; the worker re-arms a
//! quiescence window on every edit and issues one request once the window
//! elapses, using only the values current at that moment. State is published
//! as a [`Snapshot`] on a watch channel for the rendering layer.
//!
//! Requests are never cancelled by newer edits, so several can be in flight
//! at once. Each carries a sequence number and only the latest live one may
//! publish its result; a blank search term invalidates everything in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetch::{self, FetchOutcome};
use crate::request::SearchRequest;
use crate::transport::SearchTransport;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub variant: ApiVariant,
    /// Quiescence window after the last edit before a request is issued.
    pub debounce: Duration,
    /// Parameters before the first edit.
    pub initial: QueryParams,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            variant: ApiVariant::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            initial: QueryParams::default(),
        }
    }
}

/// A single user edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    SearchTerm(String),
    Threshold(f64),
    Fast(bool),
    Limit(u32),
    Speed(Speed),
    Dataset(String),
    /// Replace every field at once.
    Replace(QueryParams),
}

impl Edit {
    /// The parameters after this edit, clamped into range.
    pub fn apply(self, current: &QueryParams) -> QueryParams {
        let next = match self {
            Edit::SearchTerm(search_term) => QueryParams { search_term, ..current.clone() },
            Edit::Threshold(threshold) => QueryParams { threshold, ..current.clone() },
            Edit::Fast(fast) => QueryParams { fast, ..current.clone() },
            Edit::Limit(limit) => QueryParams { limit, ..current.clone() },
            Edit::Speed(speed) => QueryParams { speed, ..current.clone() },
            Edit::Dataset(dataset) => QueryParams { dataset, ..current.clone() },
            Edit::Replace(params) => params,
        };
        let clamped = next.clamped();
        if clamped.threshold != next.threshold || clamped.limit != next.limit {
            warn!(
                threshold = next.threshold,
                limit = next.limit,
                "Query parameter out of range, clamped"
            );
        }
        clamped
    }
}

enum Command {
    Edit(Edit),
    Shutdown,
}

/// Handle to a running controller. Dropping it tears the controller down:
/// the pending window is dropped and in-flight requests are aborted.
pub struct QueryController {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl QueryController {
    /// Start the worker task. Must be called from within a Tokio runtime.
    pub fn spawn(transport: Arc<dyn SearchTransport>, config: ControllerConfig) -> Self {
        let initial = Snapshot { params: config.initial.clamped(), request: RequestState::Idle };
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            transport,
            variant: config.variant,
            debounce: config.debounce,
            params: initial.params,
            state_tx,
            deadline: None,
            next_seq: 0,
            live: None,
            in_flight: JoinSet::new(),
            seqs: HashMap::new(),
        };
        let task = tokio::spawn(worker.run(cmd_rx));

        Self { commands: cmd_tx, snapshot: state_rx, task: Some(task) }
    }

    /// Current state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub fn edit(&self, edit: Edit) {
        if self.commands.send(Command::Edit(edit)).is_err() {
            debug!("Edit ignored, controller already stopped");
        }
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        self.edit(Edit::SearchTerm(term.into()));
    }

    pub fn set_threshold(&self, threshold: f64) {
        self.edit(Edit::Threshold(threshold));
    }

    pub fn set_fast(&self, fast: bool) {
        self.edit(Edit::Fast(fast));
    }

    pub fn set_limit(&self, limit: u32) {
        self.edit(Edit::Limit(limit));
    }

    pub fn set_speed(&self, speed: Speed) {
        self.edit(Edit::Speed(speed));
    }

    pub fn set_dataset(&self, dataset: impl Into<String>) {
        self.edit(Edit::Dataset(dataset.into()));
    }

    pub fn replace_params(&self, params: QueryParams) {
        self.edit(Edit::Replace(params));
    }

    /// Stop the worker and wait for it. Nothing is published afterwards.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Query controller task failed");
                }
            }
        }
    }
}

impl Drop for QueryController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

type Completion = (String, Result<FetchOutcome, FetchError>);

struct Worker {
    transport: Arc<dyn SearchTransport>,
    variant: ApiVariant,
    debounce: Duration,
    params: QueryParams,
    state_tx: watch::Sender<Snapshot>,
    /// When the current quiescence window elapses.
    deadline: Option<Instant>,
    next_seq: u64,
    /// Sequence number allowed to publish a result.
    live: Option<u64>,
    in_flight: JoinSet<Completion>,
    /// Sequence number of each in-flight task, so a panicked task can still
    /// be matched against `live`.
    seqs: HashMap<Id, u64>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Edit(edit)) => self.on_edit(edit),
                    Some(Command::Shutdown) | None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.issue();
                }
                Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                    self.on_complete(joined);
                }
            }
        }

        self.in_flight.abort_all();
        debug!("Query controller stopped");
    }

    fn on_edit(&mut self, edit: Edit) {
        self.params = edit.apply(&self.params);

        if self.params.is_blank() {
            self.deadline = None;
            if let Some(seq) = self.live.take() {
                debug!(seq, "Search term cleared, in-flight result will be discarded");
            }
            self.publish(RequestState::Idle);
            return;
        }

        self.deadline = Some(Instant::now() + self.debounce);
        let params = self.params.clone();
        self.state_tx.send_modify(|s| s.params = params);
    }

    fn issue(&mut self) {
        self.deadline = None;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live = Some(seq);

        let request = SearchRequest::new(self.params.clone(), self.variant);
        info!(
            seq,
            term = request.params.search_term.as_str(),
            limit = request.params.limit,
            threshold = request.params.threshold,
            "Issuing search request"
        );
        self.publish(RequestState::Loading);

        let transport = Arc::clone(&self.transport);
        let handle = self.in_flight.spawn(async move {
            let result = fetch::execute(transport.as_ref(), &request).await;
            (request.params.search_term, result)
        });
        self.seqs.insert(handle.id(), seq);
    }

    fn on_complete(&mut self, joined: Result<(Id, Completion), JoinError>) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let Some(seq) = self.seqs.remove(&id) else {
            return;
        };
        if self.live != Some(seq) {
            debug!(seq, live = ?self.live, "Discarding stale search result");
            return;
        }

        match joined {
            Ok((_, (term, result))) => self.publish(fetch::settle(&term, result)),
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(seq, error = %e, "Search task panicked");
                self.live = None;
                self.publish(RequestState::Error { message: FETCH_ERROR_MESSAGE.to_string() });
            }
        }
    }

    fn publish(&self, request: RequestState) {
        self.state_tx.send_replace(Snapshot { params: self.params.clone(), request });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every request with one parsed item named after the search term.
    /// Terms starting with "slow" take 2s; everything else 10ms.
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<SearchRequest>>,
        status: u16,
    }

    impl Recording {
        fn ok() -> Arc<Self> {
            Arc::new(Self { status: 200, ..Self::default() })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self { status, ..Self::default() })
        }

        fn sent(&self) -> Vec<SearchRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchTransport for Recording {
        async fn send(&self, request: &SearchRequest) -> Result<RawResponse, FetchError> {
            self.sent.lock().unwrap().push(request.clone());
            let term = request.params.search_term.clone();
            let delay = if term.starts_with("slow") { 2_000 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let inner = serde_json::json!({ "name": term }).to_string();
            let body = serde_json::json!({
                "embedding_time": 1_000_000,
                "search_time": 2_000_000,
                "results": [{ "text": inner }],
            });
            Ok(RawResponse { status: self.status, body: body.to_string().into_bytes() })
        }
    }

    fn spawn(transport: &Arc<Recording>) -> QueryController {
        let transport: Arc<dyn SearchTransport> = transport.clone();
        QueryController::spawn(transport, ControllerConfig::default())
    }

    async fn wait_for_success(rx: &mut watch::Receiver<Snapshot>) -> Snapshot {
        rx.wait_for(|s| matches!(s.request, RequestState::Success { .. })).await.unwrap().clone()
    }

    fn first_name(snapshot: &Snapshot) -> Option<String> {
        snapshot.request.results().first().and_then(|r| r.name.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn edits_within_window_issue_one_request_with_final_values() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("c");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_search_term("co");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_limit(3);
        controller.set_fast(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_search_term("coffee");

        let snap = wait_for_success(&mut rx).await;
        assert_eq!(first_name(&snap).as_deref(), Some("coffee"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 1, "one request per settled window");
        assert_eq!(sent[0].params.search_term, "coffee");
        assert_eq!(sent[0].params.limit, 3);
        assert!(sent[0].params.fast);
    }

    #[tokio::test(start_paused = true)]
    async fn no_request_before_window_elapses() {
        let transport = Recording::ok();
        let controller = spawn(&transport);

        controller.set_search_term("tea");
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(transport.sent().is_empty());
        assert_eq!(controller.snapshot().params.search_term, "tea");
        assert_eq!(controller.snapshot().request, RequestState::Idle);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_carries_converted_timings() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("tea");
        let snap = wait_for_success(&mut rx).await;
        let timing = snap.request.timing().unwrap();
        assert_eq!(timing.embeddings, 1.0);
        assert_eq!(timing.search, 2.0);
        assert!(timing.total >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_term_resets_to_idle_without_request() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("tea");
        wait_for_success(&mut rx).await;

        controller.set_search_term("   ");
        let snap = rx.wait_for(|s| s.request == RequestState::Idle).await.unwrap().clone();
        assert!(snap.request.results().is_empty());
        assert!(snap.request.timing().is_none());

        controller.set_threshold(0.9);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(controller.snapshot().request, RequestState::Idle);
        assert_eq!(controller.snapshot().params.threshold, 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_term_discards_in_flight_result() {
        let transport = Recording::ok();
        let controller = spawn(&transport);

        controller.set_search_term("slow tea");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(controller.snapshot().request.is_loading());

        controller.set_search_term("");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.snapshot().request, RequestState::Idle);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_never_overwrites_newer_request() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("slow espresso");
        tokio::time::sleep(Duration::from_millis(600)).await;
        controller.set_search_term("latte");

        let snap = wait_for_success(&mut rx).await;
        assert_eq!(first_name(&snap).as_deref(), Some("latte"));

        // The slow request finishes well after this point.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(first_name(&controller.snapshot()).as_deref(), Some("latte"));
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_yields_generic_message() {
        let transport = Recording::failing(500);
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("tea");
        let snap = rx
            .wait_for(|s| matches!(s.request, RequestState::Error { .. }))
            .await
            .unwrap()
            .clone();
        let message = snap.request.error_message().unwrap();
        assert!(!message.is_empty());
        assert!(!message.contains("500"));
        assert!(snap.request.results().is_empty());
        assert_eq!(transport.sent().len(), 1, "errors are not retried");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_window() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let rx = controller.subscribe();

        controller.set_search_term("tea");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.shutdown().await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(transport.sent().is_empty());
        assert_eq!(rx.borrow().request, RequestState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_aborts_in_flight_request() {
        let transport = Recording::ok();
        let controller = spawn(&transport);
        let rx = controller.subscribe();

        controller.set_search_term("slow tea");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(rx.borrow().request.is_loading());
        drop(controller);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.borrow().request.is_loading(), "nothing published after teardown");
    }

    /// Panics for any term not starting with "slow"; "slow" terms take 2s.
    struct Exploding;

    #[async_trait]
    impl SearchTransport for Exploding {
        async fn send(&self, request: &SearchRequest) -> Result<RawResponse, FetchError> {
            if request.params.search_term.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(2)).await;
                return Ok(RawResponse { status: 200, body: br#"{"results":[]}"#.to_vec() });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            panic!("transport blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_live_request_leaves_loading_while_stale_one_runs() {
        let controller = QueryController::spawn(Arc::new(Exploding), ControllerConfig::default());

        controller.set_search_term("slow americano");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(controller.snapshot().request.is_loading());

        controller.set_search_term("boom");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(controller.snapshot().request.error_message(), Some(FETCH_ERROR_MESSAGE));

        // The superseded request finishes later and must not overwrite the error.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.snapshot().request.error_message(), Some(FETCH_ERROR_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_term_after_error_resets_to_idle() {
        let transport = Recording::failing(503);
        let controller = spawn(&transport);
        let mut rx = controller.subscribe();

        controller.set_search_term("tea");
        rx.wait_for(|s| matches!(s.request, RequestState::Error { .. })).await.unwrap();

        controller.set_search_term("");
        let snap = rx.wait_for(|s| s.request == RequestState::Idle).await.unwrap().clone();
        assert!(snap.request.error_message().is_none());
        assert!(snap.request.results().is_empty());
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn edit_clamps_out_of_range_values() {
        let p = Edit::Threshold(3.0).apply(&QueryParams::default());
        assert_eq!(p.threshold, 1.0);
        let p = Edit::Limit(0).apply(&p);
        assert_eq!(p.limit, 1);
        assert_eq!(p.threshold, 1.0, "other fields carried over");
    }
}
