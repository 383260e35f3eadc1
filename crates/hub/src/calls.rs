//! Anruf-Koordinator – Signaling-State-Machine pro callId
//!
//! ```text
//!            call-user (callee online)
//!   (keine) ---------------------------> RINGING
//!      |                                  |  answer-call
//!      | call-user (callee offline)       v
//!      +------> MISSED                  ONGOING
//!                                         |
//!   end-call: RINGING/ONGOING -> ENDED    |
//!   Trennung: RINGING/ONGOING -> DISCONNECTED
//! ```
//!
//! Endzustaende entfernen die Sitzung atomar aus der Tabelle und schreiben
//! danach genau ein Anruf-Log. Wer die Sitzung zuerst entfernt (end-call,
//! Trennung oder Klingel-Timeout), schreibt; alle anderen sehen nichts mehr.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;
use treffpunkt_core::{
    types::{CallId, Identity},
    Uhr,
};
use treffpunkt_protocol::{
    event::{CallAcceptedInfo, CallEndedInfo, CallMissedInfo, IncomingCallInfo},
    Ausgehend,
};
use treffpunkt_store::{AnrufStatus, CallLog, CallLogStore};

use crate::error::{HubError, HubResult};
use crate::failure::Zustellfehler;
use crate::registry::ConnectionRegistry;

/// Grund im `call-missed`-Event: Callee war beim Anruf offline
pub const GRUND_OFFLINE: &str = "user-offline";
/// Grund im `call-missed`-Event: Klingel-Timeout abgelaufen
pub const GRUND_KEINE_ANTWORT: &str = "no-answer";

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

/// Laufender Anruf (nur RINGING oder ONGOING liegen in der Tabelle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnrufSitzung {
    pub call_id: CallId,
    pub caller: Identity,
    pub callee: Identity,
    pub is_video: bool,
    pub status: AnrufStatus,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
}

impl AnrufSitzung {
    pub fn ist_beteiligt(&self, identity: &Identity) -> bool {
        &self.caller == identity || &self.callee == identity
    }

    /// Die jeweils andere Partei
    pub fn gegenueber(&self, identity: &Identity) -> &Identity {
        if &self.caller == identity {
            &self.callee
        } else {
            &self.caller
        }
    }

    /// Anruf-Log fuer einen Endzustand
    ///
    /// Dauer ab Annahme, bei nie angenommenen Anrufen ab Start.
    fn abschluss_log(&self, status: AnrufStatus, ende: DateTime<Utc>) -> CallLog {
        let beginn = self.answer_time.unwrap_or(self.start_time);
        CallLog {
            caller: self.caller.clone(),
            recipient: self.callee.clone(),
            start_time: self.start_time,
            answer_time: self.answer_time,
            end_time: Some(ende),
            duration_ms: Some((ende - beginn).num_milliseconds().max(0)),
            is_video: self.is_video,
            status,
        }
    }
}

/// Eingehender Anrufwunsch; `caller` ist die Identity der Verbindung
#[derive(Debug, Clone)]
pub struct Einladung {
    pub call_id: CallId,
    pub caller: Identity,
    pub callee: Identity,
    pub signal: serde_json::Value,
    pub is_video: bool,
    pub name: Option<String>,
}

/// Ergebnis von `einladen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EinladungsErgebnis {
    /// Sitzung angelegt, Callee benachrichtigt
    Klingelt,
    /// Callee offline, Caller benachrichtigt, Log geschrieben
    Verpasst,
    /// callId existiert bereits, verworfen
    Doppelt,
}

// ---------------------------------------------------------------------------
// AnrufKoordinator
// ---------------------------------------------------------------------------

pub struct AnrufKoordinator<L>
where
    L: CallLogStore + 'static,
{
    sitzungen: DashMap<CallId, AnrufSitzung>,
    call_logs: Arc<L>,
    registry: ConnectionRegistry,
    uhr: Arc<dyn Uhr>,
}

impl<L> AnrufKoordinator<L>
where
    L: CallLogStore + 'static,
{
    pub fn neu(call_logs: Arc<L>, registry: ConnectionRegistry, uhr: Arc<dyn Uhr>) -> Self {
        Self {
            sitzungen: DashMap::new(),
            call_logs,
            registry,
            uhr,
        }
    }

    /// `call-user`: Sitzung anlegen und Callee anklingeln
    pub async fn einladen(&self, einladung: Einladung) -> EinladungsErgebnis {
        let jetzt = self.uhr.jetzt();
        let call_id = einladung.call_id.clone();

        let mut angelegt = match self.sitzungen.entry(call_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(call_id = %call_id, "Doppelte callId, Einladung verworfen");
                return EinladungsErgebnis::Doppelt;
            }
            Entry::Vacant(frei) if self.registry.ist_online(&einladung.callee) => {
                frei.insert(AnrufSitzung {
                    call_id: call_id.clone(),
                    caller: einladung.caller.clone(),
                    callee: einladung.callee.clone(),
                    is_video: einladung.is_video,
                    status: AnrufStatus::Ringing,
                    start_time: jetzt,
                    answer_time: None,
                });
                true
            }
            Entry::Vacant(_) => false,
        };

        // Callee kann zwischen Pruefung und Einfuegen gegangen sein; seine
        // Trennung hat die Sitzung dann nicht mehr gesehen.
        if angelegt
            && !self.registry.ist_online(&einladung.callee)
            && self
                .sitzungen
                .remove_if(&call_id, |_, s| s.status == AnrufStatus::Ringing)
                .is_some()
        {
            angelegt = false;
        }

        if !angelegt {
            tracing::info!(
                call_id = %call_id,
                caller = %einladung.caller,
                callee = %einladung.callee,
                "Callee offline, Anruf verpasst"
            );
            self.registry.an_identity_senden(
                &einladung.caller,
                Ausgehend::CallMissed(CallMissedInfo {
                    to: einladung.callee.clone(),
                    call_id: call_id.clone(),
                    reason: GRUND_OFFLINE.to_string(),
                }),
            );
            let log = CallLog {
                caller: einladung.caller,
                recipient: einladung.callee,
                start_time: jetzt,
                answer_time: None,
                end_time: Some(jetzt),
                duration_ms: Some(0),
                is_video: einladung.is_video,
                status: AnrufStatus::Missed,
            };
            self.log_speichern(&call_id, log).await;
            return EinladungsErgebnis::Verpasst;
        }

        tracing::info!(
            call_id = %call_id,
            caller = %einladung.caller,
            callee = %einladung.callee,
            is_video = einladung.is_video,
            "Anruf klingelt"
        );

        self.registry.an_identity_senden(
            &einladung.callee,
            Ausgehend::IncomingCall(IncomingCallInfo {
                from: einladung.caller,
                name: einladung.name,
                signal: einladung.signal,
                is_video: einladung.is_video,
                call_id,
            }),
        );
        EinladungsErgebnis::Klingelt
    }

    /// `answer-call`: RINGING -> ONGOING, Caller bekommt das Signal
    ///
    /// Unbekannte callId und Antworten von jemand anderem als dem Callee
    /// sind Fehler, die der Dispatcher nur loggt. Ein zweites `answer-call`
    /// auf einen laufenden Anruf aendert nichts.
    pub fn annehmen(
        &self,
        call_id: &CallId,
        signal: serde_json::Value,
        antwortender: &Identity,
    ) -> HubResult<()> {
        let caller = {
            let mut sitzung = self
                .sitzungen
                .get_mut(call_id)
                .ok_or_else(|| HubError::UnbekannterAnruf(call_id.clone()))?;
            if &sitzung.callee != antwortender {
                return Err(HubError::KeinTeilnehmer {
                    call_id: call_id.clone(),
                    identity: antwortender.clone(),
                });
            }
            if sitzung.status != AnrufStatus::Ringing {
                tracing::debug!(call_id = %call_id, status = %sitzung.status, "Doppeltes answer-call ignoriert");
                return Ok(());
            }
            sitzung.status = AnrufStatus::Ongoing;
            sitzung.answer_time = Some(self.uhr.jetzt());
            sitzung.caller.clone()
        };

        tracing::info!(call_id = %call_id, callee = %antwortender, "Anruf angenommen");
        self.registry.an_identity_senden(
            &caller,
            Ausgehend::CallAccepted(CallAcceptedInfo {
                signal,
                from: antwortender.clone(),
                call_id: call_id.clone(),
            }),
        );
        Ok(())
    }

    /// `end-call`: Auflegen, Ablehnen oder Abbrechen
    ///
    /// Nur Caller oder Callee duerfen eine Sitzung beenden. Ohne Sitzung
    /// wird `ziel` trotzdem benachrichtigt. Gibt `true` zurueck, wenn dieser
    /// Aufruf die Sitzung beendet hat.
    pub async fn beenden(
        &self,
        call_id: &CallId,
        anfragender: &Identity,
        ziel: &Identity,
    ) -> HubResult<bool> {
        let beendet = match self
            .sitzungen
            .remove_if(call_id, |_, s| s.ist_beteiligt(anfragender))
        {
            Some((_, sitzung)) => {
                let log = sitzung.abschluss_log(AnrufStatus::Ended, self.uhr.jetzt());
                tracing::info!(
                    call_id = %call_id,
                    identity = %anfragender,
                    dauer_ms = log.duration_ms.unwrap_or_default(),
                    "Anruf beendet"
                );
                self.log_speichern(call_id, log).await;
                true
            }
            None if self.sitzungen.contains_key(call_id) => {
                return Err(HubError::KeinTeilnehmer {
                    call_id: call_id.clone(),
                    identity: anfragender.clone(),
                });
            }
            None => {
                tracing::debug!(call_id = %call_id, "end-call ohne Sitzung, Ziel wird trotzdem benachrichtigt");
                false
            }
        };

        self.registry.an_identity_senden(
            ziel,
            Ausgehend::CallEnded(CallEndedInfo {
                from: Some(anfragender.clone()),
                call_id: call_id.clone(),
            }),
        );
        Ok(beendet)
    }

    /// Trennung: alle Sitzungen mit `identity` als DISCONNECTED abschliessen
    ///
    /// Gibt die Anzahl der hier beendeten Sitzungen zurueck.
    pub async fn verbindung_getrennt(&self, identity: &Identity) -> usize {
        let kandidaten: Vec<CallId> = self
            .sitzungen
            .iter()
            .filter(|s| s.ist_beteiligt(identity))
            .map(|s| s.key().clone())
            .collect();

        let mut beendet = 0;
        for call_id in kandidaten {
            let Some((_, sitzung)) = self
                .sitzungen
                .remove_if(&call_id, |_, s| s.ist_beteiligt(identity))
            else {
                continue;
            };
            beendet += 1;

            let gegenueber = sitzung.gegenueber(identity).clone();
            self.registry.an_identity_senden(
                &gegenueber,
                Ausgehend::CallEnded(CallEndedInfo {
                    from: None,
                    call_id: call_id.clone(),
                }),
            );

            let log = sitzung.abschluss_log(AnrufStatus::Disconnected, self.uhr.jetzt());
            tracing::info!(
                call_id = %call_id,
                identity = %identity,
                gegenueber = %gegenueber,
                "Anruf durch Trennung beendet"
            );
            self.log_speichern(&call_id, log).await;
        }
        beendet
    }

    /// Beendet RINGING-Sitzungen, die laenger als `timeout` klingeln
    ///
    /// Caller bekommt `call-missed{reason: "no-answer"}`, Callee `call-ended`.
    pub async fn abgelaufene_beenden(&self, timeout: Duration) -> usize {
        // Nicht als chrono::Duration darstellbar: laeuft nie ab
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return 0;
        };
        let jetzt = self.uhr.jetzt();
        // Differenz statt start_time + timeout: kein Ueberlauf bei grossem Timeout
        let abgelaufen = |s: &AnrufSitzung| {
            s.status == AnrufStatus::Ringing && jetzt - s.start_time >= timeout
        };

        let kandidaten: Vec<CallId> = self
            .sitzungen
            .iter()
            .filter(|s| abgelaufen(s.value()))
            .map(|s| s.key().clone())
            .collect();

        let mut beendet = 0;
        for call_id in kandidaten {
            let Some((_, sitzung)) = self.sitzungen.remove_if(&call_id, |_, s| abgelaufen(s))
            else {
                continue;
            };
            beendet += 1;

            tracing::info!(call_id = %call_id, callee = %sitzung.callee, "Klingel-Timeout, Anruf verpasst");
            self.registry.an_identity_senden(
                &sitzung.caller,
                Ausgehend::CallMissed(CallMissedInfo {
                    to: sitzung.callee.clone(),
                    call_id: call_id.clone(),
                    reason: GRUND_KEINE_ANTWORT.to_string(),
                }),
            );
            self.registry.an_identity_senden(
                &sitzung.callee,
                Ausgehend::CallEnded(CallEndedInfo {
                    from: None,
                    call_id: call_id.clone(),
                }),
            );

            let log = sitzung.abschluss_log(AnrufStatus::Missed, jetzt);
            self.log_speichern(&call_id, log).await;
        }
        beendet
    }

    /// Periodischer Klingel-Timeout bis zum Shutdown
    pub async fn klingel_reaper(
        &self,
        timeout: Duration,
        pruef_intervall: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut intervall = tokio::time::interval(pruef_intervall);
        intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(timeout_sek = timeout.as_secs(), "Klingel-Reaper gestartet");

        loop {
            tokio::select! {
                _ = intervall.tick() => {
                    let n = self.abgelaufene_beenden(timeout).await;
                    if n > 0 {
                        tracing::debug!(anzahl = n, "Unbeantwortete Anrufe beendet");
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Klingel-Reaper gestoppt");
    }

    /// Kopie einer laufenden Sitzung
    pub fn sitzung(&self, call_id: &CallId) -> Option<AnrufSitzung> {
        self.sitzungen.get(call_id).map(|s| s.clone())
    }

    pub fn aktive_anzahl(&self) -> usize {
        self.sitzungen.len()
    }

    async fn log_speichern(&self, call_id: &CallId, log: CallLog) {
        let status = log.status;
        if let Err(e) = self.call_logs.save(log).await {
            self.registry
                .beobachter()
                .melden(Zustellfehler::CallLogVerloren {
                    call_id: call_id.clone(),
                    status,
                    grund: e.to_string(),
                });
        }
    }
}
