//! treffpunkt-store – Persistenz-Schnittstellen des Hubs
//!
//! Der Hub besitzt keine eigene Datenhaltung. Nachrichten, Gruppen und
//! Anruf-Logs liegen in externen Stores, die er ueber drei Traits anspricht:
//! - `MessageStore`: Nachricht anlegen, angereichert zuruecklesen
//! - `GroupStore`: Nachricht an Gruppe haengen, Mitglieder + Admin lesen
//! - `CallLogStore`: Anruf-Log nach jedem Endzustand schreiben
//!
//! `MemoryStore` implementiert alle drei im Speicher (Entwicklung, Tests).
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use treffpunkt_store::{MemoryStore, KontaktProfil};
//!
//! let store = Arc::new(MemoryStore::neu());
//! store.profil_anlegen(KontaktProfil::nur_id("u1".into()));
//! store.gruppe_anlegen("g1".into(), vec!["u1".into()], "u1".into());
//! ```

pub mod error;
pub mod memory;
pub mod repository;
pub mod types;


// Bequeme Re-Exporte
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repository::{CallLogStore, GroupStore, MessageStore};
pub use types::{
    AngereicherteNachricht, AnrufStatus, CallLog, GruppenMitglieder, KontaktProfil, NeueNachricht,
};
