//! Presence – Online-Liste und Last-Seen
//!
//! Jede echte An- oder Abmeldung veroeffentlicht die vollstaendige
//! Online-Liste ueber das `PresenceTopic`: als `online-users` an alle
//! registrierten Verbindungen und als `PresenceEvent` an In-Process-Abonnenten.
//! Beim Abmelden wird vorher der Last-Seen-Zeitpunkt gesetzt.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::broadcast;
use treffpunkt_core::{types::Identity, Uhr};
use treffpunkt_protocol::Ausgehend;

use crate::registry::ConnectionRegistry;

/// Standard-Datumsformat fuer Last-Seen aelter als eine Woche
pub const STANDARD_DATUMSFORMAT: &str = "%-m/%-d/%Y";

// ---------------------------------------------------------------------------
// Presence-Events
// ---------------------------------------------------------------------------

/// Events fuer In-Process-Abonnenten
///
/// `online` ist immer die vollstaendige Liste zum Zeitpunkt des Events.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Verbunden {
        identity: Identity,
        online: Arc<Vec<Identity>>,
    },
    Getrennt {
        identity: Identity,
        last_seen: DateTime<Utc>,
        online: Arc<Vec<Identity>>,
    },
}

/// Groesse des Broadcast-Kanals fuer Presence-Events
const EVENT_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// PresenceTopic
// ---------------------------------------------------------------------------

/// Verteilt Online-Listen an Verbindungen und Abonnenten
#[derive(Clone)]
pub struct PresenceTopic {
    registry: ConnectionRegistry,
    event_tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceTopic {
    pub fn neu(registry: ConnectionRegistry) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self { registry, event_tx }
    }

    /// Sendet die aktuelle Online-Liste an alle Verbindungen
    ///
    /// Liste und Empfaenger stammen aus demselben Registry-Snapshot.
    /// Gibt die Liste zurueck, damit der Aufrufer das passende Event bauen kann.
    fn online_liste_senden(&self) -> Arc<Vec<Identity>> {
        let (online, transports) = self.registry.snapshot();
        for transport in &transports {
            self.registry
                .zustellen(transport, Ausgehend::OnlineUsers(online.clone()));
        }
        tracing::debug!(
            online = online.len(),
            empfaenger = transports.len(),
            "Online-Liste verteilt"
        );
        Arc::new(online)
    }

    fn veroeffentlichen(&self, event: PresenceEvent) {
        // Keine Abonnenten: kein Fehler
        let _ = self.event_tx.send(event);
    }

    /// Abonniert Presence-Events
    pub fn abonnieren(&self) -> broadcast::Receiver<PresenceEvent> {
        self.event_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// PresenceTracker
// ---------------------------------------------------------------------------

/// Antwort auf eine Last-Seen-Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeenAuskunft {
    pub online: bool,
    pub last_seen: Option<String>,
}

/// Online-Status und Last-Seen-Zeitpunkte
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    registry: ConnectionRegistry,
    topic: PresenceTopic,
    last_seen: DashMap<Identity, DateTime<Utc>>,
    uhr: Arc<dyn Uhr>,
    datumsformat: String,
}

impl PresenceTracker {
    pub fn neu(registry: ConnectionRegistry, uhr: Arc<dyn Uhr>, datumsformat: String) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                topic: PresenceTopic::neu(registry.clone()),
                registry,
                last_seen: DashMap::new(),
                uhr,
                datumsformat,
            }),
        }
    }

    /// Nach `register`: Online-Liste an alle
    pub fn verbunden(&self, identity: &Identity) {
        tracing::info!(identity = %identity, "Client online");
        let online = self.inner.topic.online_liste_senden();
        self.inner.topic.veroeffentlichen(PresenceEvent::Verbunden {
            identity: identity.clone(),
            online,
        });
    }

    /// Nach erfolgreichem `unregister`: Last-Seen setzen, Online-Liste an alle
    pub fn getrennt(&self, identity: &Identity) {
        let jetzt = self.inner.uhr.jetzt();
        self.inner.last_seen.insert(identity.clone(), jetzt);
        tracing::info!(identity = %identity, "Client offline");

        let online = self.inner.topic.online_liste_senden();
        self.inner.topic.veroeffentlichen(PresenceEvent::Getrennt {
            identity: identity.clone(),
            last_seen: jetzt,
            online,
        });
    }

    /// Online-Status bzw. formatierter Last-Seen-Zeitpunkt von `ziel`
    pub fn get_last_seen(&self, ziel: &Identity) -> LastSeenAuskunft {
        if self.inner.registry.ist_online(ziel) {
            return LastSeenAuskunft {
                online: true,
                last_seen: None,
            };
        }

        let last_seen = self.inner.last_seen.get(ziel).map(|zeitpunkt| {
            last_seen_formatieren(*zeitpunkt, self.inner.uhr.jetzt(), &self.inner.datumsformat)
        });

        LastSeenAuskunft {
            online: false,
            last_seen,
        }
    }

    /// Roher Last-Seen-Zeitpunkt (None wenn nie getrennt)
    pub fn last_seen_zeitpunkt(&self, identity: &Identity) -> Option<DateTime<Utc>> {
        self.inner.last_seen.get(identity).map(|z| *z)
    }

    pub fn topic(&self) -> &PresenceTopic {
        &self.inner.topic
    }

    /// Abonniert Presence-Events
    pub fn abonnieren(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.topic.abonnieren()
    }
}

// ---------------------------------------------------------------------------
// Formatierung
// ---------------------------------------------------------------------------

/// Formatiert einen Last-Seen-Zeitpunkt relativ zu `jetzt`
///
/// Unter einer Woche relativ ("Just now", "5m ago", "3h ago", "2d ago"),
/// danach als Datum im `datumsformat` (strftime, UTC). Zeitpunkte in der
/// Zukunft gelten als "Just now". Ein ungueltiges Format faellt auf
/// `STANDARD_DATUMSFORMAT` zurueck.
pub fn last_seen_formatieren(
    zeitpunkt: DateTime<Utc>,
    jetzt: DateTime<Utc>,
    datumsformat: &str,
) -> String {
    let sekunden = (jetzt - zeitpunkt).num_seconds().max(0);
    let minuten = sekunden / 60;
    let stunden = minuten / 60;
    let tage = stunden / 24;

    if sekunden < 60 {
        "Just now".to_string()
    } else if stunden < 1 {
        format!("{}m ago", minuten)
    } else if tage < 1 {
        format!("{}h ago", stunden)
    } else if tage < 7 {
        format!("{}d ago", tage)
    } else {
        let mut datum = String::new();
        if write!(datum, "{}", zeitpunkt.format(datumsformat)).is_err() {
            tracing::warn!(format = datumsformat, "Ungueltiges Datumsformat");
            datum.clear();
            let _ = write!(datum, "{}", zeitpunkt.format(STANDARD_DATUMSFORMAT));
        }
        datum
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
