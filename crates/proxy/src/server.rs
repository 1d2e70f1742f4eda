//! Proxy lifecycle: ephemeral loopback listener, state, graceful shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{routing::any, Router};
use npm_bisect_common::{Error, Result, Timestamp};
use npm_bisect_registry_schema::TimelineEvent;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::intercept;

/// Canonical public registry.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Per-probe proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Publications strictly newer than this instant are hidden.
    pub cutoff: Timestamp,
    /// Base URL of the real registry the proxy forwards to.
    pub upstream: String,
    /// When set, observed timeline events are also written as JSON fragment
    /// files under this directory (first-probe mode).
    pub timeline_dir: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn new(cutoff: Timestamp) -> Self {
        Self {
            cutoff,
            upstream: DEFAULT_REGISTRY.to_string(),
            timeline_dir: None,
        }
    }
}

/// Shared state for one proxy instance.
///
/// The timeline accumulator lives here, scoped to the probe that owns the
/// instance, and is drained exactly once at shutdown.
pub(crate) struct ProxyState {
    pub(crate) config: ProxyConfig,
    pub(crate) client: reqwest::Client,
    pub(crate) timeline: Mutex<Vec<TimelineEvent>>,
    pub(crate) fragment_seq: AtomicU64,
}

/// A running proxy bound to an ephemeral loopback port.
pub struct ProxyHandle {
    addr: SocketAddr,
    state: Arc<ProxyState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    /// Registry base URL to hand to the package manager.
    pub fn registry_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// The bound loopback address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the server and return the timeline accumulated during the probe.
    pub async fn shutdown(mut self) -> Vec<TimelineEvent> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!("Proxy task did not shut down cleanly: {err}");
        }
        self.state.timeline.lock().await.split_off(0)
    }
}

/// Bind the intercept proxy on `127.0.0.1:0` and start serving.
pub async fn start(config: ProxyConfig) -> Result<ProxyHandle> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| Error::ProxyBind(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::ProxyBind(e.to_string()))?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| Error::Upstream(format!("failed to build upstream client: {e}")))?;

    let state = Arc::new(ProxyState {
        config,
        client,
        timeline: Mutex::new(Vec::new()),
        fragment_seq: AtomicU64::new(0),
    });

    let app = Router::new()
        .fallback(any(intercept::handle))
        .with_state(state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Proxy server error: {err}");
        }
    });

    info!("Intercept proxy listening on {addr}");
    Ok(ProxyHandle {
        addr,
        state,
        shutdown: Some(shutdown_tx),
        task,
    })
}
