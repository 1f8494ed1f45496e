//! Test harness for end-to-end tests against the stub search endpoint.
//!
//! Binds an axum server on an ephemeral localhost port and points a
//! reqwest-backed [`HttpTransport`] at it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use querydeck_core::controller::{ControllerConfig, QueryController};
use querydeck_core::transport::{HttpTransport, SearchTransport};
use querydeck_core::types::ApiVariant;
use querydeck_http::{router, Fixture, StubState};
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Option<Arc<StubState>>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Serve the stub router over `fixture`.
    pub async fn stub(fixture: Fixture) -> Self {
        let state = StubState::new(fixture);
        let mut server = Self::serve(router(state.clone())).await;
        server.state = Some(state);
        server
    }

    /// Serve an arbitrary router, e.g. one that always fails.
    pub async fn serve(app: Router) -> Self {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test port");
        let addr = listener.local_addr().expect("No local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });
        TestServer { addr, state: None, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stub_state(&self) -> &StubState {
        self.state.as_deref().expect("Not a stub server")
    }

    pub fn transport(&self, path: &str) -> Arc<dyn SearchTransport> {
        Arc::new(HttpTransport::new(self.url(path)).expect("Failed to build transport"))
    }

    pub fn controller(&self, path: &str, variant: ApiVariant) -> QueryController {
        let config = ControllerConfig { variant, ..ControllerConfig::default() };
        QueryController::spawn(self.transport(path), config)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
