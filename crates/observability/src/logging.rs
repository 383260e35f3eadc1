//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `TP_LOG_LEVEL`: Filter-Ausdruck (z.B. `info` oder `treffpunkt_hub=debug`)
//! - `TP_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TP_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TP_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` und `format`.
/// Ein ungueltiger Filter faellt auf `info` zurueck.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    match format_env.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Log-Level aus der Umgebung, sonst `standard`
pub fn log_level_aus_env(standard: &str) -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| standard.to_string())
}

/// Log-Format aus der Umgebung, sonst `standard`
pub fn log_format_aus_env(standard: &str) -> String {
    std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| standard.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
