//! Connection-Registry – Identity -> aktive Verbindung
//!
//! Haelt pro Identity genau einen `Transport` (Handle auf die Send-Queue
//! einer Verbindung). Ein erneutes `register` ueberschreibt den alten Eintrag
//! ohne die alte Verbindung zu schliessen; `unregister` entfernt nur, wenn
//! der Eintrag noch zur selben Verbindung gehoert.
//!
//! Die Tabelle liegt hinter einem einzigen `RwLock`, damit `snapshot` die
//! Online-Menge atomar liest.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use treffpunkt_core::types::{ConnectionId, Identity};
use treffpunkt_protocol::Ausgehend;

use crate::failure::{FehlerBeobachter, SendeGrund, Zustellfehler};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer verbundenen Identity
///
/// Gleichheit ueber `connection_id`.
#[derive(Clone, Debug)]
pub struct Transport {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Ausgehend>,
}

impl Transport {
    pub fn neu(
        connection_id: ConnectionId,
        identity: Identity,
        connected_at: DateTime<Utc>,
        tx: mpsc::Sender<Ausgehend>,
    ) -> Self {
        Self {
            connection_id,
            identity,
            connected_at,
            tx,
        }
    }

    /// Reiht ein Event nicht-blockierend ein
    pub fn senden(&self, event: Ausgehend) -> Result<(), SendeGrund> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendeGrund::QueueVoll,
            mpsc::error::TrySendError::Closed(_) => SendeGrund::Geschlossen,
        })
    }
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.connection_id == other.connection_id
    }
}

impl Eq for Transport {}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Zentrale Zuordnung Identity -> Transport
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    transports: RwLock<HashMap<Identity, Transport>>,
    beobachter: Arc<dyn FehlerBeobachter>,
    /// Erfolgreich eingereihte Events (fuer Metriken)
    zugestellt: AtomicU64,
}

impl ConnectionRegistry {
    pub fn neu(beobachter: Arc<dyn FehlerBeobachter>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transports: RwLock::new(HashMap::new()),
                beobachter,
                zugestellt: AtomicU64::new(0),
            }),
        }
    }

    /// Setzt den Eintrag fuer `transport.identity`, gibt den verdraengten zurueck
    pub fn register(&self, transport: Transport) -> Option<Transport> {
        let identity = transport.identity.clone();
        let connection_id = transport.connection_id;
        let alt = self.inner.transports.write().insert(identity.clone(), transport);

        if let Some(ref alt) = alt {
            tracing::debug!(
                identity = %identity,
                alt = %alt.connection_id,
                neu = %connection_id,
                "Doppelte Anmeldung, alter Eintrag verdraengt"
            );
        }
        alt
    }

    /// Entfernt den Eintrag nur, wenn er noch zu `connection_id` gehoert
    ///
    /// Gibt `true` zurueck wenn tatsaechlich entfernt wurde.
    pub fn unregister(&self, identity: &Identity, connection_id: ConnectionId) -> bool {
        let mut transports = self.inner.transports.write();
        match transports.get(identity) {
            Some(t) if t.connection_id == connection_id => {
                transports.remove(identity);
                true
            }
            Some(t) => {
                tracing::debug!(
                    identity = %identity,
                    veraltet = %connection_id,
                    aktuell = %t.connection_id,
                    "Trennung einer verdraengten Verbindung ignoriert"
                );
                false
            }
            None => false,
        }
    }

    pub fn resolve(&self, identity: &Identity) -> Option<Transport> {
        self.inner.transports.read().get(identity).cloned()
    }

    pub fn ist_online(&self, identity: &Identity) -> bool {
        self.inner.transports.read().contains_key(identity)
    }

    /// Sortierte Online-Menge
    pub fn online_identities(&self) -> Vec<Identity> {
        self.snapshot().0
    }

    /// Online-Menge und alle Transports, unter einer Sperre gelesen
    pub fn snapshot(&self) -> (Vec<Identity>, Vec<Transport>) {
        let transports = self.inner.transports.read();
        let mut identities: Vec<Identity> = transports.keys().cloned().collect();
        identities.sort();
        (identities, transports.values().cloned().collect())
    }

    pub fn anzahl(&self) -> usize {
        self.inner.transports.read().len()
    }

    /// Sendet an die aktuell registrierte Verbindung von `identity`
    ///
    /// Offline ist kein Fehler: `false`, ohne Meldung.
    pub fn an_identity_senden(&self, identity: &Identity, event: Ausgehend) -> bool {
        match self.resolve(identity) {
            Some(transport) => self.zustellen(&transport, event),
            None => {
                tracing::debug!(identity = %identity, event = event.name(), "Empfaenger offline");
                false
            }
        }
    }

    /// Reiht `event` bei `transport` ein; Fehlschlaege gehen an den Beobachter
    pub fn zustellen(&self, transport: &Transport, event: Ausgehend) -> bool {
        let name = event.name();
        match transport.senden(event) {
            Ok(()) => {
                self.inner.zugestellt.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(identity = %transport.identity, event = name, "Event eingereiht");
                true
            }
            Err(grund) => {
                self.inner
                    .beobachter
                    .melden(Zustellfehler::SendenFehlgeschlagen {
                        empfaenger: transport.identity.clone(),
                        event: name,
                        grund,
                    });
                false
            }
        }
    }

    pub fn beobachter(&self) -> &Arc<dyn FehlerBeobachter> {
        &self.inner.beobachter
    }

    pub fn zugestellt_gesamt(&self) -> u64 {
        self.inner.zugestellt.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
