//! Fehlertypen fuer das Store-Crate

use thiserror::Error;
use treffpunkt_core::{MessageId, TreffpunktError};

/// Store-Fehlertypen
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Nachricht nicht gefunden: {0}")]
    NachrichtNichtGefunden(MessageId),

    #[error("Speicher nicht verfuegbar: {0}")]
    NichtVerfuegbar(String),

    #[error(transparent)]
    Core(#[from] TreffpunktError),
}

pub type StoreResult<T> = Result<T, StoreError>;
