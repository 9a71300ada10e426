use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Prometheus metrics describing the muxer's view of the kernel.
///
/// All metrics use the "tracemux" namespace.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Sessions currently admitted.
    pub sessions_admitted: Gauge,
    /// Sessions with kernel tracing turned on.
    pub sessions_active: Gauge,
    /// Kernel events held enabled by the muxer.
    pub events_enabled: Gauge,
    /// Per-CPU ring buffer size in pages.
    pub buffer_size_pages: Gauge,
    /// Admissions refused (contention or legacy helper limits).
    pub setup_rejections: Counter,
    /// Activations refused.
    pub activation_failures: Counter,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let sessions_admitted = Gauge::with_opts(
            Opts::new("sessions_admitted", "Sessions currently admitted.").namespace("tracemux"),
        )?;
        let sessions_active = Gauge::with_opts(
            Opts::new(
                "sessions_active",
                "Sessions with kernel tracing turned on.",
            )
            .namespace("tracemux"),
        )?;
        let events_enabled = Gauge::with_opts(
            Opts::new("events_enabled", "Kernel events held enabled.").namespace("tracemux"),
        )?;
        let buffer_size_pages = Gauge::with_opts(
            Opts::new("buffer_size_pages", "Per-CPU ring buffer size in pages.")
                .namespace("tracemux"),
        )?;
        let setup_rejections = Counter::with_opts(
            Opts::new("setup_rejections_total", "Total refused session admissions.")
                .namespace("tracemux"),
        )?;
        let activation_failures = Counter::with_opts(
            Opts::new(
                "activation_failures_total",
                "Total refused session activations.",
            )
            .namespace("tracemux"),
        )?;

        registry.register(Box::new(sessions_admitted.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;
        registry.register(Box::new(events_enabled.clone()))?;
        registry.register(Box::new(buffer_size_pages.clone()))?;
        registry.register(Box::new(setup_rejections.clone()))?;
        registry.register(Box::new(activation_failures.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            sessions_admitted,
            sessions_active,
            events_enabled,
            buffer_size_pages,
            setup_rejections,
            activation_failures,
        })
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9090"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let app_state = Arc::new(AppState {
            registry: self.registry.clone(),
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

fn encode_registry(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("converting metrics to string")
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
