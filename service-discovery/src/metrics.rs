use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};

use crate::error::MetricsError;

/// Build the router served on the monitoring port: a banner naming the
/// service on `/` and the Prometheus exposition on `/metrics`.
pub fn app(service_name: &str, metrics: Option<PrometheusHandle>) -> Router {
    let banner = format!("{} metrics", service_name);
    let service = service_name.to_owned();

    Router::new()
        .route("/", get(move || std::future::ready(banner.clone())))
        .route(
            "/metrics",
            get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .layer(axum::middleware::from_fn_with_state(service, track_metrics))
}

/// Install the process-wide Prometheus recorder. Fails if one is already installed.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Count and time every request to the monitoring endpoint, labelled with the
/// service it belongs to.
pub async fn track_metrics(
    State(service): State<String>,
    req: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("service", service),
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

/// Lifecycle of the metrics listener as observed by its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Binding,
    Listening(SocketAddr),
    Failed(MetricsError),
    Stopped,
}

impl ListenerState {
    fn is_terminal(&self) -> bool {
        matches!(self, ListenerState::Failed(_) | ListenerState::Stopped)
    }
}

/// Handle on a metrics listener running in its own task.
///
/// The task never terminates the process on its own: a bind or serve failure
/// is published as [`ListenerState::Failed`] and the supervisor decides what
/// to do. Dropping the handle leaves the listener running.
pub struct MetricsTask {
    state: watch::Receiver<ListenerState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MetricsTask {
    pub fn spawn(router: Router, bind: SocketAddr) -> Self {
        let (state_tx, state_rx) = watch::channel(ListenerState::Binding);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let state = match listen(router, bind, &state_tx, shutdown_rx).await {
                Ok(()) => ListenerState::Stopped,
                Err(err) => {
                    error!("{}", err);
                    ListenerState::Failed(err)
                }
            };
            drop(state_tx.send(state));
        });

        Self {
            state: state_rx,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Current state, without waiting.
    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    /// Wait until the listener is bound, returning the local address.
    pub async fn listening(&mut self) -> Result<SocketAddr, MetricsError> {
        let state = self
            .state
            .wait_for(|state| *state != ListenerState::Binding)
            .await
            .map_err(|_| MetricsError::Vanished)?
            .clone();

        match state {
            ListenerState::Listening(addr) => Ok(addr),
            ListenerState::Failed(err) => Err(err),
            ListenerState::Binding | ListenerState::Stopped => Err(MetricsError::Shutdown),
        }
    }

    /// Wait for the terminal outcome of the listener.
    pub async fn finished(&mut self) -> Result<(), MetricsError> {
        let state = self
            .state
            .wait_for(ListenerState::is_terminal)
            .await
            .map_err(|_| MetricsError::Vanished)?
            .clone();

        match state {
            ListenerState::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Ask the listener to stop accepting connections and drain.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            _ = sender.send(());
        }
    }
}

async fn listen(
    router: Router,
    bind: SocketAddr,
    state: &watch::Sender<ListenerState>,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), MetricsError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| MetricsError::Bind {
            addr: bind,
            reason: err.to_string(),
        })?;
    let addr = listener.local_addr().unwrap_or(bind);

    info!("start prometheus monitoring at {}", addr);
    drop(state.send(ListenerState::Listening(addr)));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // A dropped handle is not a shutdown request.
            if shutdown.await.is_err() {
                std::future::pending::<()>().await
            }
        })
        .await
        .map_err(|err| MetricsError::Serve {
            addr,
            reason: err.to_string(),
        })
}
