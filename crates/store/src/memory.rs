//! In-Memory-Implementierung aller drei Store-Traits
//!
//! Fuer Entwicklung und Tests. Fehler und Latenz lassen sich gezielt
//! einschalten, um Persistenzfehler und Suspension-Points nachzustellen.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use treffpunkt_core::types::{GroupId, Identity, MessageId};
use treffpunkt_core::TreffpunktError;

use crate::{
    error::{StoreError, StoreResult},
    repository::{CallLogStore, GroupStore, MessageStore},
    types::{AngereicherteNachricht, CallLog, GruppenMitglieder, KontaktProfil, NeueNachricht},
};

#[derive(Debug, Clone)]
struct Gruppe {
    members: Vec<Identity>,
    admin: Identity,
    messages: Vec<MessageId>,
}

/// Store im Arbeitsspeicher
///
/// Thread-safe via DashMap; geeignet fuer `Arc`-Sharing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profile: DashMap<Identity, KontaktProfil>,
    nachrichten: DashMap<MessageId, NeueNachricht>,
    gruppen: DashMap<GroupId, Gruppe>,
    call_logs: Mutex<Vec<CallLog>>,
    /// Kuenstliche Wartezeit in `MessageStore::create`
    latenz: RwLock<Option<Duration>>,
    /// Kuenstliche Wartezeit in `CallLogStore::save`
    call_log_latenz: RwLock<Option<Duration>>,
    nachrichten_fehler: AtomicBool,
    call_log_fehler: AtomicBool,
}

impl MemoryStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt ein Anzeigeprofil an (oder ersetzt es)
    pub fn profil_anlegen(&self, profil: KontaktProfil) {
        self.profile.insert(profil.id.clone(), profil);
    }

    /// Legt eine Gruppe an (oder ersetzt sie)
    pub fn gruppe_anlegen(&self, group_id: GroupId, members: Vec<Identity>, admin: Identity) {
        self.gruppen.insert(
            group_id,
            Gruppe {
                members,
                admin,
                messages: Vec::new(),
            },
        );
    }

    /// Nachrichten-IDs einer Gruppe in Einfuegereihenfolge
    pub fn gruppen_nachrichten(&self, group_id: &GroupId) -> Vec<MessageId> {
        self.gruppen
            .get(group_id)
            .map(|g| g.messages.clone())
            .unwrap_or_default()
    }

    pub fn nachrichten_anzahl(&self) -> usize {
        self.nachrichten.len()
    }

    /// Kopie aller geschriebenen Anruf-Logs
    pub fn call_logs(&self) -> Vec<CallLog> {
        self.call_logs.lock().clone()
    }

    /// Laesst `create` vor dem Schreiben `dauer` warten
    pub fn latenz_setzen(&self, dauer: Option<Duration>) {
        *self.latenz.write() = dauer;
    }

    /// Laesst `save` vor dem Schreiben `dauer` warten
    pub fn call_log_latenz_setzen(&self, dauer: Option<Duration>) {
        *self.call_log_latenz.write() = dauer;
    }

    /// Laesst `MessageStore::create` fehlschlagen
    pub fn nachrichten_fehler_simulieren(&self, aktiv: bool) {
        self.nachrichten_fehler.store(aktiv, Ordering::SeqCst);
    }

    /// Laesst `CallLogStore::save` fehlschlagen
    pub fn call_log_fehler_simulieren(&self, aktiv: bool) {
        self.call_log_fehler.store(aktiv, Ordering::SeqCst);
    }

    fn profil(&self, id: &Identity) -> KontaktProfil {
        self.profile
            .get(id)
            .map(|p| p.clone())
            .unwrap_or_else(|| KontaktProfil::nur_id(id.clone()))
    }
}

impl MessageStore for MemoryStore {
    async fn create(&self, nachricht: NeueNachricht) -> StoreResult<MessageId> {
        let latenz = *self.latenz.read();
        if let Some(dauer) = latenz {
            tokio::time::sleep(dauer).await;
        }

        if self.nachrichten_fehler.load(Ordering::SeqCst) {
            return Err(StoreError::NichtVerfuegbar(
                "Nachrichten-Store simuliert Ausfall".into(),
            ));
        }

        let id = MessageId::new();
        self.nachrichten.insert(id, nachricht);
        tracing::trace!(message_id = %id, "Nachricht gespeichert");
        Ok(id)
    }

    async fn get_enriched(&self, id: MessageId) -> StoreResult<AngereicherteNachricht> {
        let nachricht = self
            .nachrichten
            .get(&id)
            .map(|n| n.clone())
            .ok_or(StoreError::NachrichtNichtGefunden(id))?;

        Ok(AngereicherteNachricht {
            id,
            sender: self.profil(&nachricht.sender),
            recipient: nachricht.recipient.as_ref().map(|r| self.profil(r)),
            content: nachricht.content,
            file_url: nachricht.file_url,
            message_type: nachricht.message_type,
            timestamp: nachricht.timestamp,
        })
    }
}

impl GroupStore for MemoryStore {
    async fn append_message(&self, group_id: &GroupId, message_id: MessageId) -> StoreResult<()> {
        let mut gruppe = self
            .gruppen
            .get_mut(group_id)
            .ok_or_else(|| TreffpunktError::GruppeNichtGefunden(group_id.0.clone()))?;
        gruppe.messages.push(message_id);
        Ok(())
    }

    async fn members_and_admin(&self, group_id: &GroupId) -> StoreResult<GruppenMitglieder> {
        let gruppe = self
            .gruppen
            .get(group_id)
            .ok_or_else(|| TreffpunktError::GruppeNichtGefunden(group_id.0.clone()))?;
        Ok(GruppenMitglieder {
            members: gruppe.members.clone(),
            admin: gruppe.admin.clone(),
        })
    }
}

impl CallLogStore for MemoryStore {
    async fn save(&self, log: CallLog) -> StoreResult<()> {
        let latenz = *self.call_log_latenz.read();
        if let Some(dauer) = latenz {
            tokio::time::sleep(dauer).await;
        }

        if self.call_log_fehler.load(Ordering::SeqCst) {
            return Err(StoreError::NichtVerfuegbar(
                "Call-Log-Store simuliert Ausfall".into(),
            ));
        }
        tracing::debug!(
            caller = %log.caller,
            recipient = %log.recipient,
            status = %log.status,
            "Anruf-Log gespeichert"
        );
        self.call_logs.lock().push(log);
        Ok(())
    }
}
