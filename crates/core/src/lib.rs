//! treffpunkt-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Treffpunkt-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;
pub mod uhr;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, TreffpunktError};
pub use types::{CallId, ConnectionId, GroupId, Identity, MessageId, NachrichtenTyp};
pub use uhr::{ManuelleUhr, SystemUhr, Uhr};
