//! Health-Check-Endpunkt fuer Treffpunkt
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Verbindungsauslastung

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub hub_ready: bool,
    pub open_connections: usize,
    pub max_connections: usize,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Der Server setzt `hub_ready` nach dem Binden des Listeners und nimmt es
/// beim Shutdown zurueck; `open_connections` zieht ein Hintergrund-Task nach.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    hub_ready: Arc<AtomicBool>,
    open_connections: Arc<AtomicUsize>,
    max_connections: usize,
}

impl HealthState {
    pub fn neu(max_connections: usize) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            hub_ready: Arc::new(AtomicBool::new(false)),
            open_connections: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn hub_bereit(&self) -> bool {
        self.hub_ready.load(Ordering::Relaxed)
    }

    pub fn bereit_setzen(&self, bereit: bool) {
        self.hub_ready.store(bereit, Ordering::Relaxed);
    }

    pub fn verbindungen_setzen(&self, anzahl: usize) {
        self.open_connections.store(anzahl, Ordering::Relaxed);
    }

    /// Healthy, solange der Hub annimmt und noch Plaetze frei sind
    pub fn status(&self) -> HealthStatus {
        if !self.hub_bereit() {
            HealthStatus::Unhealthy
        } else if self.open_connections.load(Ordering::Relaxed) >= self.max_connections {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            hub_ready: self.hub_bereit(),
            open_connections: self.open_connections.load(Ordering::Relaxed),
            max_connections: self.max_connections,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();

    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        // Voll ist kein Ausfall, die Probe soll nicht failen
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}
