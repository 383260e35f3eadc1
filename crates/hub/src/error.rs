//! Fehlertypen fuer den Hub

use thiserror::Error;
use treffpunkt_core::types::{CallId, Identity};
use treffpunkt_protocol::ErrorCode;
use treffpunkt_store::StoreError;

/// Fehlertyp fuer den Hub
#[derive(Debug, Error)]
pub enum HubError {
    /// Event auf einer Verbindung ohne Identity
    #[error("Verbindung hat keine Identity")]
    FehlendeIdentitaet,

    /// Zweites `connect` auf derselben Verbindung
    #[error("Verbindung ist bereits verbunden")]
    BereitsVerbunden,

    /// answer-call fuer eine callId ohne Sitzung (wird nie an Clients gemeldet)
    #[error("Unbekannter Anruf: {0}")]
    UnbekannterAnruf(CallId),

    /// answer/end von jemandem, der den Anruf nicht fuehren darf (nur Log)
    #[error("{identity} ist nicht Teilnehmer von {call_id}")]
    KeinTeilnehmer { call_id: CallId, identity: Identity },

    /// Nachricht verletzt die Eingaberegeln
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    /// Store-Aufruf fehlgeschlagen
    #[error("Persistenz fehlgeschlagen: {0}")]
    Persistenz(#[from] StoreError),

    /// Protokollfehler (ungueltiges Frame, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

impl HubError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Fehlercode fuer das `error`-Event auf dem Draht
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FehlendeIdentitaet => ErrorCode::MissingIdentity,
            Self::BereitsVerbunden => ErrorCode::AlreadyConnected,
            Self::UngueltigeNachricht(_)
            | Self::Protokoll(_)
            | Self::UnbekannterAnruf(_)
            | Self::KeinTeilnehmer { .. } => ErrorCode::InvalidRequest,
            Self::Persistenz(_) => ErrorCode::InternalError,
        }
    }
}

/// Result-Typ fuer den Hub
pub type HubResult<T> = Result<T, HubError>;
