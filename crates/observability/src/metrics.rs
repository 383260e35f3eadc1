//! Prometheus-kompatible Metriken fuer Treffpunkt
//!
//! Registrierte Metriken:
//! - `treffpunkt_connected_clients` – Gauge: Identitaeten mit aktiver Verbindung
//! - `treffpunkt_open_connections` – Gauge: Offene TCP-Verbindungen (auch ohne Identitaet)
//! - `treffpunkt_active_calls` – Gauge: Laufende Anrufe (klingelnd oder aktiv)
//! - `treffpunkt_events_delivered_total` – Counter: In Send-Queues gelegte Events
//! - `treffpunkt_call_logs_total` – Counter: Geschriebene Anruf-Logs (status)
//! - `treffpunkt_delivery_failures_total` – Counter: Verworfene Events (art)

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Treffpunkt-Prometheus-Metriken
#[derive(Clone)]
pub struct TreffpunktMetrics {
    pub registry: Arc<Registry>,

    // Verbindungen
    pub connected_clients: IntGauge,
    pub open_connections: IntGauge,

    // Anrufe
    pub active_calls: IntGauge,
    pub call_logs_total: IntCounterVec,

    // Zustellung
    pub events_delivered_total: IntCounter,
    pub delivery_failures_total: IntCounterVec,
}

impl TreffpunktMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "treffpunkt_connected_clients",
            "Anzahl Identitaeten mit aktiver Verbindung",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let open_connections = IntGauge::with_opts(Opts::new(
            "treffpunkt_open_connections",
            "Anzahl offener TCP-Verbindungen",
        ))?;
        registry.register(Box::new(open_connections.clone()))?;

        let active_calls = IntGauge::with_opts(Opts::new(
            "treffpunkt_active_calls",
            "Anzahl laufender Anrufe",
        ))?;
        registry.register(Box::new(active_calls.clone()))?;

        let call_logs_total = IntCounterVec::new(
            Opts::new("treffpunkt_call_logs_total", "Geschriebene Anruf-Logs"),
            &["status"],
        )?;
        registry.register(Box::new(call_logs_total.clone()))?;

        let events_delivered_total = IntCounter::with_opts(Opts::new(
            "treffpunkt_events_delivered_total",
            "In Send-Queues gelegte Events",
        ))?;
        registry.register(Box::new(events_delivered_total.clone()))?;

        let delivery_failures_total = IntCounterVec::new(
            Opts::new(
                "treffpunkt_delivery_failures_total",
                "Verworfene Events nach Art",
            ),
            &["art"],
        )?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            open_connections,
            active_calls,
            call_logs_total,
            events_delivered_total,
            delivery_failures_total,
        })
    }

    /// Zieht den Zustell-Counter auf einen absoluten Stand nach
    ///
    /// Der Hub zaehlt selbst monoton; hier wird nur die Differenz addiert.
    pub fn zugestellt_nachziehen(&self, gesamt: u64) {
        let bisher = self.events_delivered_total.get();
        if gesamt > bisher {
            self.events_delivered_total.inc_by(gesamt - bisher);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: TreffpunktMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<TreffpunktMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
