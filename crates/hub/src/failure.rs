//! Zustellfehler – Explizite Meldung verworfener Events
//!
//! Der Hub arbeitet fire-and-forget: schlaegt Persistenz oder Zustellung
//! fehl, wird das Event verworfen und der Absender nicht benachrichtigt.
//! Jeder solche Fall geht an einen `FehlerBeobachter`. Standard ist
//! `ProtokollBeobachter` (nur Log); `KanalBeobachter` reicht die Faelle an
//! eine Queue weiter, damit eine strengere Einbettung sie auswerten kann.

use std::fmt;
use tokio::sync::mpsc;
use treffpunkt_core::types::{CallId, Identity};
use treffpunkt_store::AnrufStatus;

// ---------------------------------------------------------------------------
// Fehlerfaelle
// ---------------------------------------------------------------------------

/// Grund warum ein Event nicht in die Send-Queue gelangt ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendeGrund {
    /// Queue voll (langsamer Client)
    QueueVoll,
    /// Queue geschlossen (Verbindung wird gerade abgebaut)
    Geschlossen,
}

impl fmt::Display for SendeGrund {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueVoll => f.write_str("queue voll"),
            Self::Geschlossen => f.write_str("queue geschlossen"),
        }
    }
}

/// Ein verworfenes Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Zustellfehler {
    /// Direkt- oder Gruppennachricht wurde nicht zugestellt
    NachrichtVerworfen { sender: Identity, grund: String },
    /// Anruf-Log konnte nicht geschrieben werden
    CallLogVerloren {
        call_id: CallId,
        status: AnrufStatus,
        grund: String,
    },
    /// Event kam nicht in die Send-Queue einer Verbindung
    SendenFehlgeschlagen {
        empfaenger: Identity,
        event: &'static str,
        grund: SendeGrund,
    },
}

// ---------------------------------------------------------------------------
// Beobachter
// ---------------------------------------------------------------------------

/// Empfaenger fuer verworfene Events
pub trait FehlerBeobachter: Send + Sync {
    fn melden(&self, fehler: Zustellfehler);
}

/// Standard: schreibt jeden Fall als Warnung ins Log
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtokollBeobachter;

impl FehlerBeobachter for ProtokollBeobachter {
    fn melden(&self, fehler: Zustellfehler) {
        match fehler {
            Zustellfehler::NachrichtVerworfen { sender, grund } => {
                tracing::warn!(sender = %sender, grund = %grund, "Nachricht verworfen");
            }
            Zustellfehler::CallLogVerloren {
                call_id,
                status,
                grund,
            } => {
                tracing::warn!(
                    call_id = %call_id,
                    status = %status,
                    grund = %grund,
                    "Anruf-Log konnte nicht gespeichert werden"
                );
            }
            Zustellfehler::SendenFehlgeschlagen {
                empfaenger,
                event,
                grund,
            } => {
                tracing::warn!(
                    identity = %empfaenger,
                    event,
                    grund = %grund,
                    "Event nicht zugestellt"
                );
            }
        }
    }
}

/// Reicht jeden Fall an eine unbegrenzte Queue weiter (und loggt ihn)
#[derive(Debug, Clone)]
pub struct KanalBeobachter {
    tx: mpsc::UnboundedSender<Zustellfehler>,
}

impl KanalBeobachter {
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<Zustellfehler>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FehlerBeobachter for KanalBeobachter {
    fn melden(&self, fehler: Zustellfehler) {
        ProtokollBeobachter.melden(fehler.clone());
        // Empfaenger weg: Log reicht
        let _ = self.tx.send(fehler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanal_beobachter_reicht_weiter() {
        let (beobachter, mut rx) = KanalBeobachter::neu();
        beobachter.melden(Zustellfehler::NachrichtVerworfen {
            sender: Identity::from("u1"),
            grund: "leer".into(),
        });

        let fall = rx.try_recv().expect("Fehlerfall erwartet");
        assert!(matches!(fall, Zustellfehler::NachrichtVerworfen { ref sender, .. } if sender.as_str() == "u1"));
    }

    #[test]
    fn kanal_beobachter_ohne_empfaenger_panict_nicht() {
        let (beobachter, rx) = KanalBeobachter::neu();
        drop(rx);
        beobachter.melden(Zustellfehler::SendenFehlgeschlagen {
            empfaenger: Identity::from("u2"),
            event: "typing",
            grund: SendeGrund::QueueVoll,
        });
    }
}
