//! Client-Connection – Verwaltet eine einzelne Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen Task.
//! Die Schleife liest Frames, dispatcht sie, schreibt Antworten und leert
//! die eigene Send-Queue (Events anderer Verbindungen an diese Identity).
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt
//!
//! Jedes Ende der Schleife (EOF, Lesefehler, Timeout, Shutdown) laeuft durch
//! `MessageDispatcher::verbindung_getrennt`.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use treffpunkt_protocol::{Ausgehend, ErrorCode, ServerCodec};
use treffpunkt_store::{CallLogStore, GroupStore, MessageStore};

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::state::HubState;

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    state: Arc<HubState<M, G, L>>,
    peer_addr: SocketAddr,
}

impl<M, G, L> ClientConnection<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<HubState<M, G, L>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal eingeht.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: tokio::sync::watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let mut framed = Framed::new(stream, ServerCodec::new());

        // Send-Queue dieser Verbindung (Registry -> Socket)
        let (sende_tx, mut sende_rx) =
            mpsc::channel::<Ausgehend>(self.state.config.send_queue_groesse.max(1));

        let mut ctx = DispatcherContext::neu(peer_addr, sende_tx);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        tracing::info!(peer = %peer_addr, connection_id = %ctx.connection_id, "Neue Verbindung");

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            let timeout_zeitpunkt = letzter_empfang + timeout_dauer;

            tokio::select! {
                // Eingehendes Frame
                frame = framed.next() => {
                    match frame {
                        Some(Ok(event)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(peer = %peer_addr, event = event.name(), "Event empfangen");

                            if let Some(antwort) = dispatcher.dispatch(event, &mut ctx).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            let _ = framed
                                .send(Ausgehend::error(ErrorCode::InvalidRequest, e.to_string()))
                                .await;
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Event aus der eigenen Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Queue-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep_until(naechster_ping) => {
                    let ts = self.state.uhr.jetzt().timestamp_millis().max(0) as u64;
                    if let Err(e) = framed.send(Ausgehend::ping(ts)).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                    naechster_ping = Instant::now() + keepalive_intervall;
                }

                // Inaktivitaet
                _ = tokio::time::sleep_until(timeout_zeitpunkt) => {
                    tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                    break;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal, Verbindung wird getrennt");
                        let abschied = Ausgehend::error(
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        dispatcher.verbindung_getrennt(&ctx).await;
        tracing::info!(peer = %peer_addr, connection_id = %ctx.connection_id, "Verbindungs-Task beendet");
    }
}
