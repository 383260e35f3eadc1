//! Repository-Traits der externen Stores
//!
//! Das Repository-Pattern entkoppelt den Hub von der konkreten Datenhaltung.
//! Jede Methode kann auf I/O warten; der Hub wertet Verbindungszustaende
//! deshalb erst nach dem `await` aus.

use treffpunkt_core::types::{GroupId, MessageId};

use crate::{
    error::StoreResult,
    types::{AngereicherteNachricht, CallLog, GruppenMitglieder, NeueNachricht},
};

/// Nachrichten anlegen und angereichert zuruecklesen
#[allow(async_fn_in_trait)]
pub trait MessageStore: Send + Sync {
    /// Nachricht persistieren, gibt die vergebene ID zurueck
    async fn create(&self, nachricht: NeueNachricht) -> StoreResult<MessageId>;

    /// Nachricht mit Sender-/Empfaenger-Profilen laden
    async fn get_enriched(&self, id: MessageId) -> StoreResult<AngereicherteNachricht>;
}

/// Gruppen-Zugriffe (aus Sicht des Hubs nur lesend plus Anhaengen)
#[allow(async_fn_in_trait)]
pub trait GroupStore: Send + Sync {
    /// Nachrichten-Referenz an die Nachrichtenliste der Gruppe haengen
    async fn append_message(&self, group_id: &GroupId, message_id: MessageId) -> StoreResult<()>;

    /// Mitglieder und Admin der Gruppe laden
    async fn members_and_admin(&self, group_id: &GroupId) -> StoreResult<GruppenMitglieder>;
}

/// Anruf-Logs schreiben
#[allow(async_fn_in_trait)]
pub trait CallLogStore: Send + Sync {
    async fn save(&self, log: CallLog) -> StoreResult<()>;
}
