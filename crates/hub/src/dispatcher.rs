//! Message-Dispatcher – Routet eingehende Events an die Komponenten
//!
//! Jede Verbindung hat einen `DispatcherContext`. Das erste Frame muss
//! `connect` sein; es bindet die Identity an die Verbindung und registriert
//! die Send-Queue als `Transport`. Alle weiteren Events (ausser ping/pong)
//! brauchen eine Identity, sonst antwortet der Hub mit `MISSING_IDENTITY`.
//!
//! Absender ist immer die Identity der Verbindung, nie ein Feld im Payload.
//! Fehler beim Persistieren werden nicht an den Client gemeldet, sondern an
//! den `FehlerBeobachter`.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use treffpunkt_core::types::{ConnectionId, Identity};
use treffpunkt_protocol::{
    event::{ConnectRequest, LastSeenInfo},
    Ausgehend, Eingehend,
};
use treffpunkt_store::{CallLogStore, GroupStore, MessageStore};

use crate::calls::Einladung;
use crate::error::{HubError, HubResult};
use crate::failure::Zustellfehler;
use crate::fanout::{DirektNachricht, GruppenNachricht};
use crate::registry::Transport;
use crate::state::HubState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    /// Server-vergebene Kennung dieser Verbindung
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
    /// Gebundene Identity (None ohne bzw. vor `connect`)
    pub identity: Option<Identity>,
    /// Erstes Frame verarbeitet; danach ist kein `connect` mehr erlaubt
    pub eroeffnet: bool,
    /// Eigene Send-Queue, wird beim `connect` registriert
    pub sende_tx: mpsc::Sender<Ausgehend>,
}

impl DispatcherContext {
    pub fn neu(peer_addr: SocketAddr, sende_tx: mpsc::Sender<Ausgehend>) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            peer_addr,
            identity: None,
            eroeffnet: false,
            sende_tx,
        }
    }
}

/// Zentraler Dispatcher
pub struct MessageDispatcher<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    state: Arc<HubState<M, G, L>>,
}

impl<M, G, L> MessageDispatcher<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<HubState<M, G, L>>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein eingehendes Event
    ///
    /// Gibt die direkte Antwort an diese Verbindung zurueck (pong,
    /// last-seen, error) oder `None`.
    pub async fn dispatch(
        &self,
        event: Eingehend,
        ctx: &mut DispatcherContext,
    ) -> Option<Ausgehend> {
        let name = event.name();
        match self.verarbeiten(event, ctx).await {
            Ok(antwort) => antwort,
            Err(e) => {
                tracing::warn!(
                    peer = %ctx.peer_addr,
                    event = name,
                    fehler = %e,
                    "Event abgelehnt"
                );
                Some(Ausgehend::error(e.code(), e.to_string()))
            }
        }
    }

    async fn verarbeiten(
        &self,
        event: Eingehend,
        ctx: &mut DispatcherContext,
    ) -> HubResult<Option<Ausgehend>> {
        match event {
            // -------------------------------------------------------------------
            // Keepalive (immer erlaubt)
            // -------------------------------------------------------------------
            Eingehend::Ping(ping) => {
                let server_ts = self.state.uhr.jetzt().timestamp_millis().max(0) as u64;
                Ok(Some(Ausgehend::pong(ping.timestamp_ms, server_ts)))
            }

            Eingehend::Pong(_) => {
                tracing::trace!(peer = %ctx.peer_addr, "Pong empfangen");
                Ok(None)
            }

            // -------------------------------------------------------------------
            // Verbindungsaufbau
            // -------------------------------------------------------------------
            Eingehend::Connect(req) => {
                if ctx.eroeffnet {
                    return Err(HubError::BereitsVerbunden);
                }
                ctx.eroeffnet = true;
                self.verbinden(req, ctx)
            }

            // -------------------------------------------------------------------
            // Identity erfordernde Events
            // -------------------------------------------------------------------
            event => {
                ctx.eroeffnet = true;
                let identity = ctx.identity.clone().ok_or(HubError::FehlendeIdentitaet)?;
                self.verarbeiten_als(identity, event).await
            }
        }
    }

    fn verbinden(
        &self,
        req: ConnectRequest,
        ctx: &mut DispatcherContext,
    ) -> HubResult<Option<Ausgehend>> {
        let identity = match req.user_id {
            Some(id) if !id.as_str().trim().is_empty() => id,
            _ => {
                tracing::warn!(
                    peer = %ctx.peer_addr,
                    connection_id = %ctx.connection_id,
                    "Verbindung ohne Identity, wird nicht registriert"
                );
                return Err(HubError::FehlendeIdentitaet);
            }
        };

        let transport = Transport::neu(
            ctx.connection_id,
            identity.clone(),
            self.state.uhr.jetzt(),
            ctx.sende_tx.clone(),
        );
        self.state.registry.register(transport);
        ctx.identity = Some(identity.clone());

        tracing::debug!(
            identity = %identity,
            connection_id = %ctx.connection_id,
            peer = %ctx.peer_addr,
            "Verbindung identifiziert"
        );
        self.state.presence.verbunden(&identity);
        Ok(None)
    }

    async fn verarbeiten_als(
        &self,
        identity: Identity,
        event: Eingehend,
    ) -> HubResult<Option<Ausgehend>> {
        match event {
            Eingehend::SendMessage(req) => {
                absender_pruefen(&identity, req.sender.as_ref(), "sendMessage");
                let nachricht = DirektNachricht {
                    sender: identity.clone(),
                    recipient: req.recipient,
                    content: req.content,
                    file_url: req.file_url,
                    message_type: req.message_type,
                };
                if let Err(e) = self.state.fanout.direkt_senden(nachricht).await {
                    self.nachricht_verworfen(identity, e);
                }
                Ok(None)
            }

            Eingehend::SendGroupMessage(req) => {
                absender_pruefen(&identity, req.sender.as_ref(), "send-group-message");
                let nachricht = GruppenNachricht {
                    sender: identity.clone(),
                    group_id: req.group_id,
                    content: req.content,
                    file_url: req.file_url,
                    message_type: req.message_type,
                };
                if let Err(e) = self.state.fanout.gruppe_senden(nachricht).await {
                    self.nachricht_verworfen(identity, e);
                }
                Ok(None)
            }

            Eingehend::Typing(req) => {
                self.state.typing.tippt(&identity, &req.recipient);
                Ok(None)
            }

            Eingehend::StopTyping(req) => {
                self.state.typing.tippt_nicht_mehr(&identity, &req.recipient);
                Ok(None)
            }

            Eingehend::GetLastSeen(req) => {
                let auskunft = self.state.presence.get_last_seen(&req.user_id);
                Ok(Some(Ausgehend::LastSeen(LastSeenInfo {
                    user_id: req.user_id,
                    last_seen: auskunft.last_seen,
                })))
            }

            Eingehend::CallUser(req) => {
                absender_pruefen(&identity, req.from.as_ref(), "call-user");
                self.state
                    .anrufe
                    .einladen(Einladung {
                        call_id: req.call_id,
                        caller: identity,
                        callee: req.to,
                        signal: req.signal,
                        is_video: req.is_video,
                        name: req.name,
                    })
                    .await;
                Ok(None)
            }

            Eingehend::AnswerCall(req) => {
                if let Err(e) = self
                    .state
                    .anrufe
                    .annehmen(&req.call_id, req.signal, &identity)
                {
                    anruf_ignoriert(&identity, "answer-call", e);
                }
                Ok(None)
            }

            Eingehend::EndCall(req) => {
                if let Err(e) = self
                    .state
                    .anrufe
                    .beenden(&req.call_id, &identity, &req.to)
                    .await
                {
                    anruf_ignoriert(&identity, "end-call", e);
                }
                Ok(None)
            }

            Eingehend::Connect(_) | Eingehend::Ping(_) | Eingehend::Pong(_) => {
                Err(HubError::protokoll("Event bereits im Dispatcher behandelt"))
            }
        }
    }

    fn nachricht_verworfen(&self, sender: Identity, fehler: HubError) {
        self.state
            .registry
            .beobachter()
            .melden(Zustellfehler::NachrichtVerworfen {
                sender,
                grund: fehler.to_string(),
            });
    }

    /// Aufraeumen nach dem Ende einer Verbindung
    ///
    /// Nur wenn die Registry den Eintrag wirklich entfernt (die Verbindung
    /// war nicht verdraengt): Last-Seen setzen, Online-Liste verteilen,
    /// laufende Anrufe als getrennt abschliessen.
    pub async fn verbindung_getrennt(&self, ctx: &DispatcherContext) {
        let Some(identity) = ctx.identity.as_ref() else {
            return;
        };

        if !self
            .state
            .registry
            .unregister(identity, ctx.connection_id)
        {
            return;
        }

        self.state.presence.getrennt(identity);
        let beendet = self.state.anrufe.verbindung_getrennt(identity).await;

        tracing::debug!(
            identity = %identity,
            connection_id = %ctx.connection_id,
            anrufe_beendet = beendet,
            "Verbindungs-Ressourcen bereinigt"
        );
    }
}

/// Abgelehnte Anruf-Events gehen nie an den Client zurueck
fn anruf_ignoriert(identity: &Identity, event: &'static str, fehler: HubError) {
    tracing::debug!(identity = %identity, event, fehler = %fehler, "Anruf-Event ignoriert");
}

/// Payload-Absender gegen die Verbindungs-Identity pruefen (nur Log)
fn absender_pruefen(identity: &Identity, angegeben: Option<&Identity>, event: &'static str) {
    if let Some(angegeben) = angegeben {
        if angegeben != identity {
            tracing::debug!(
                identity = %identity,
                angegeben = %angegeben,
                event,
                "Absender im Payload weicht ab, Verbindungs-Identity gilt"
            );
        }
    }
}
