//! HTTP server for receiving server info reports

use crate::config::Config;
use crate::report::{Report, ReportError};
use crate::storage::{ReportStore, StorageError};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// User agent every reporting client sends. This is a label, not a credential.
pub const EXPECTED_USER_AGENT: &str = "irmaserver";

/// Path reports are posted to
pub const REPORT_ROUTE: &str = "/";

/// Reports are two short strings; anything this large is not one.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared state for the report handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ReportStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Why a single report was not accepted
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("user agent {:?} is not \"irmaserver\"", .0.as_deref().unwrap_or("<none>"))]
    UnexpectedClient(Option<String>),
    #[error("could not read request body: {0}")]
    UnreadableBody(#[source] axum::Error),
    #[error(transparent)]
    InvalidReport(#[from] ReportError),
    #[error("failed to store report: {0}")]
    Storage(#[source] StorageError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::UnexpectedClient(_) => StatusCode::FORBIDDEN,
            IngestError::UnreadableBody(_) | IngestError::InvalidReport(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        // Details stay in the log
        self.status().into_response()
    }
}

/// Build the router serving the single report route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(REPORT_ROUTE, post(handle_report))
        .with_state(state)
}

async fn handle_report(State(state): State<AppState>, request: Request) -> Response {
    match ingest(state.store.as_ref(), request).await {
        Ok(report) => {
            info!(email = %report.email, version = %report.version, "Report stored");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            match &e {
                IngestError::Storage(_) => error!("{}", e),
                _ => warn!("Rejected report: {}", e),
            }
            e.into_response()
        }
    }
}

/// Validate, decode and store one report.
async fn ingest(store: &dyn ReportStore, request: Request) -> Result<Report, IngestError> {
    check_client(request.headers())?;

    let body = read_body(request.into_body()).await?;
    let report = Report::decode(&body)?;

    match store.insert_report(&report).await {
        Ok(()) => Ok(report),
        Err(StorageError::UniqueViolation) => {
            info!(email = %report.email, version = %report.version, "Report already stored");
            Ok(report)
        }
        Err(e) => Err(IngestError::Storage(e)),
    }
}

fn check_client(headers: &HeaderMap) -> Result<(), IngestError> {
    let user_agent = headers.get(header::USER_AGENT);
    match user_agent.map(|v| v.to_str()) {
        Some(Ok(agent)) if agent == EXPECTED_USER_AGENT => Ok(()),
        _ => Err(IngestError::UnexpectedClient(
            user_agent.map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
        )),
    }
}

async fn read_body(body: Body) -> Result<Vec<u8>, IngestError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(IngestError::UnreadableBody)?;
    Ok(bytes.to_vec())
}

/// Report server bound to its listening socket
pub struct ReportServer {
    listener: TcpListener,
    state: AppState,
}

impl ReportServer {
    /// Bind the configured port.
    pub async fn bind(config: Config, store: Arc<dyn ReportStore>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        Ok(Self {
            listener,
            state: AppState::new(config, store),
        })
    }

    /// Address actually bound (useful when the configured port is `0`)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening on {}", addr);
        }

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down...");
}
