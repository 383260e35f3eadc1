//! Nachrichten-Fanout – Direkt- und Gruppennachrichten
//!
//! Ablauf: pruefen, persistieren, angereichert zuruecklesen, dann erst die
//! Empfaenger in der Registry aufloesen. Wer waehrend des Store-Zugriffs
//! geht oder kommt, wird nach dem `await` korrekt beruecksichtigt.

use std::collections::HashSet;
use std::sync::Arc;
use treffpunkt_core::{
    types::{GroupId, Identity, NachrichtenTyp},
    Uhr,
};
use treffpunkt_protocol::{
    event::{KontaktInfo, NachrichtInfo},
    Ausgehend,
};
use treffpunkt_store::{AngereicherteNachricht, GroupStore, KontaktProfil, MessageStore, NeueNachricht};

use crate::error::{HubError, HubResult};
use crate::registry::ConnectionRegistry;

/// Maximale Laenge von `content` in Zeichen
pub const MAX_INHALT_ZEICHEN: usize = 4096;

// ---------------------------------------------------------------------------
// Eingaben
// ---------------------------------------------------------------------------

/// Direktnachricht; `sender` ist die Identity der Verbindung
#[derive(Debug, Clone)]
pub struct DirektNachricht {
    pub sender: Identity,
    pub recipient: Identity,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
}

/// Gruppennachricht; `sender` ist die Identity der Verbindung
#[derive(Debug, Clone)]
pub struct GruppenNachricht {
    pub sender: Identity,
    pub group_id: GroupId,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
}

/// Prueft Typ gegen Inhalt
pub fn nachricht_pruefen(
    typ: NachrichtenTyp,
    content: Option<&str>,
    file_url: Option<&str>,
) -> HubResult<()> {
    match typ {
        NachrichtenTyp::Text => {
            if content.map_or(true, |c| c.trim().is_empty()) {
                return Err(HubError::UngueltigeNachricht(
                    "Textnachricht ohne Inhalt".into(),
                ));
            }
        }
        NachrichtenTyp::File => {
            if file_url.map_or(true, |u| u.trim().is_empty()) {
                return Err(HubError::UngueltigeNachricht(
                    "Dateinachricht ohne fileUrl".into(),
                ));
            }
        }
    }

    if let Some(c) = content {
        let laenge = c.chars().count();
        if laenge > MAX_INHALT_ZEICHEN {
            return Err(HubError::UngueltigeNachricht(format!(
                "Inhalt zu lang: {} Zeichen (Maximum: {})",
                laenge, MAX_INHALT_ZEICHEN
            )));
        }
    }
    Ok(())
}

fn kontakt_info(profil: KontaktProfil) -> KontaktInfo {
    KontaktInfo {
        id: profil.id,
        email: profil.email,
        first_name: profil.first_name,
        last_name: profil.last_name,
        image: profil.image,
        color: profil.color,
    }
}

fn nachricht_info(nachricht: AngereicherteNachricht, group_id: Option<GroupId>) -> NachrichtInfo {
    NachrichtInfo {
        id: nachricht.id,
        sender: kontakt_info(nachricht.sender),
        recipient: nachricht.recipient.map(kontakt_info),
        content: nachricht.content,
        file_url: nachricht.file_url,
        message_type: nachricht.message_type,
        timestamp: nachricht.timestamp,
        group_id,
    }
}

// ---------------------------------------------------------------------------
// Verteiler
// ---------------------------------------------------------------------------

/// Persistiert Nachrichten und verteilt sie an die Online-Empfaenger
pub struct NachrichtenVerteiler<M, G>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
{
    message_store: Arc<M>,
    group_store: Arc<G>,
    registry: ConnectionRegistry,
    uhr: Arc<dyn Uhr>,
}

impl<M, G> NachrichtenVerteiler<M, G>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
{
    pub fn neu(
        message_store: Arc<M>,
        group_store: Arc<G>,
        registry: ConnectionRegistry,
        uhr: Arc<dyn Uhr>,
    ) -> Self {
        Self {
            message_store,
            group_store,
            registry,
            uhr,
        }
    }

    /// Direktnachricht an Empfaenger und (Echo) Sender
    ///
    /// Gibt die Identities zurueck, bei denen die Nachricht eingereiht wurde.
    pub async fn direkt_senden(&self, nachricht: DirektNachricht) -> HubResult<Vec<Identity>> {
        nachricht_pruefen(
            nachricht.message_type,
            nachricht.content.as_deref(),
            nachricht.file_url.as_deref(),
        )?;

        let sender = nachricht.sender.clone();
        let recipient = nachricht.recipient.clone();

        let id = self
            .message_store
            .create(NeueNachricht {
                sender: nachricht.sender,
                recipient: Some(nachricht.recipient),
                content: nachricht.content,
                file_url: nachricht.file_url,
                message_type: nachricht.message_type,
                timestamp: self.uhr.jetzt(),
            })
            .await?;
        let angereichert = self.message_store.get_enriched(id).await?;

        // Erst jetzt aufloesen
        let event = Ausgehend::RecieveMessage(nachricht_info(angereichert, None));
        let ziele = if sender == recipient {
            vec![&recipient]
        } else {
            vec![&recipient, &sender]
        };
        let mut zugestellt = Vec::with_capacity(2);
        for ziel in ziele {
            if self.registry.an_identity_senden(ziel, event.clone()) {
                zugestellt.push(ziel.clone());
            }
        }

        tracing::debug!(
            message_id = %id,
            sender = %sender,
            recipient = %recipient,
            zugestellt = zugestellt.len(),
            "Direktnachricht verteilt"
        );
        Ok(zugestellt)
    }

    /// Gruppennachricht an alle Online-Mitglieder plus Admin
    ///
    /// Der Admin bekommt die Nachricht auch, wenn er nicht in `members`
    /// steht; doppelte Eintraege werden nur einmal bedient.
    pub async fn gruppe_senden(&self, nachricht: GruppenNachricht) -> HubResult<Vec<Identity>> {
        nachricht_pruefen(
            nachricht.message_type,
            nachricht.content.as_deref(),
            nachricht.file_url.as_deref(),
        )?;

        let sender = nachricht.sender.clone();
        let group_id = nachricht.group_id;

        let id = self
            .message_store
            .create(NeueNachricht {
                sender: nachricht.sender,
                recipient: None,
                content: nachricht.content,
                file_url: nachricht.file_url,
                message_type: nachricht.message_type,
                timestamp: self.uhr.jetzt(),
            })
            .await?;
        self.group_store.append_message(&group_id, id).await?;
        let gruppe = self.group_store.members_and_admin(&group_id).await?;
        let angereichert = self.message_store.get_enriched(id).await?;

        let event = Ausgehend::RecieveGroupMessage(nachricht_info(
            angereichert,
            Some(group_id.clone()),
        ));

        let mut gesehen = HashSet::new();
        let mut zugestellt = Vec::new();
        for ziel in gruppe.members.iter().chain(std::iter::once(&gruppe.admin)) {
            if !gesehen.insert(ziel) {
                continue;
            }
            if self.registry.an_identity_senden(ziel, event.clone()) {
                zugestellt.push(ziel.clone());
            }
        }

        tracing::debug!(
            message_id = %id,
            group_id = %group_id,
            sender = %sender,
            zugestellt = zugestellt.len(),
            "Gruppennachricht verteilt"
        );
        Ok(zugestellt)
    }
}
