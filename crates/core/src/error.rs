//! Fehlertypen fuer Treffpunkt
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende.
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Treffpunkt
pub type Result<T> = std::result::Result<T, TreffpunktError>;

/// Crate-uebergreifende Fehler im Treffpunkt-System
#[derive(Debug, Error)]
pub enum TreffpunktError {
    #[error("Gruppe nicht gefunden: {0}")]
    GruppeNichtGefunden(String),
}
