//! Oeffentliche Typen der Persistenz-Schnittstellen

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treffpunkt_core::types::{Identity, MessageId, NachrichtenTyp};

/// Anzeigefelder eines Benutzers (fuer die Anreicherung von Nachrichten)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KontaktProfil {
    pub id: Identity,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub color: Option<u32>,
}

impl KontaktProfil {
    /// Profil ohne Anzeigefelder (unbekannter Benutzer)
    pub fn nur_id(id: Identity) -> Self {
        Self {
            id,
            email: String::new(),
            first_name: None,
            last_name: None,
            image: None,
            color: None,
        }
    }
}

/// Daten zum Anlegen einer Nachricht
///
/// `recipient` ist bei Gruppennachrichten `None`; die Gruppenzuordnung
/// entsteht erst ueber `GroupStore::append_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeueNachricht {
    pub sender: Identity,
    pub recipient: Option<Identity>,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
    pub timestamp: DateTime<Utc>,
}

/// Persistierte Nachricht mit aufgeloesten Sender-/Empfaenger-Profilen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngereicherteNachricht {
    pub id: MessageId,
    pub sender: KontaktProfil,
    pub recipient: Option<KontaktProfil>,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
    pub timestamp: DateTime<Utc>,
}

/// Mitglieder und Admin einer Gruppe
///
/// Der Admin muss nicht in `members` enthalten sein.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GruppenMitglieder {
    pub members: Vec<Identity>,
    pub admin: Identity,
}

/// Phase eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnrufStatus {
    Ringing,
    Ongoing,
    Ended,
    Missed,
    Disconnected,
}

impl AnrufStatus {
    /// Endzustand: kein weiterer Uebergang moeglich
    pub fn ist_endzustand(&self) -> bool {
        matches!(self, Self::Ended | Self::Missed | Self::Disconnected)
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
            Self::Missed => "missed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for AnrufStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Dauerhafter Datensatz, einmal pro Endzustand eines Anrufs geschrieben
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLog {
    pub caller: Identity,
    pub recipient: Identity,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Dauer in Millisekunden
    pub duration_ms: Option<i64>,
    pub is_video: bool,
    pub status: AnrufStatus,
}
