//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `HubServer` bindet einen TCP-Socket und startet fuer jede eingehende
//! Verbindung einen eigenen Task mit einer `ClientConnection`.
//!
//! ## Concurrency-Modell
//! Die Store-Traits verwenden async fn ohne Send-Garantie
//! (async_fn_in_trait). Alle Verbindungs-Tasks und der Klingel-Reaper laufen
//! deshalb in einer `tokio::task::LocalSet`. Die geteilten Tabellen sind
//! trotzdem thread-safe (RwLock/DashMap).

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinSet, LocalSet};
use treffpunkt_protocol::{wire, Ausgehend, ErrorCode};
use treffpunkt_store::{CallLogStore, GroupStore, MessageStore};

use crate::connection::ClientConnection;
use crate::state::HubState;

/// Belegter Verbindungsplatz, wird beim Drop freigegeben
struct VerbindungsPlatz<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    state: Arc<HubState<M, G, L>>,
}

impl<M, G, L> Drop for VerbindungsPlatz<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    fn drop(&mut self) {
        self.state.verbindung_freigeben();
    }
}

/// TCP-Hub-Server
///
/// Jede Verbindung wird als lokaler Task in der `LocalSet` ausgefuehrt.
pub struct HubServer<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    state: Arc<HubState<M, G, L>>,
    bind_addr: SocketAddr,
}

impl<M, G, L> HubServer<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    /// Erstellt einen neuen HubServer
    pub fn neu(state: Arc<HubState<M, G, L>>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet `bind_addr` und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.mit_listener(listener, shutdown_rx).await
    }

    /// Wie `starten`, aber mit bereits gebundenem Listener
    pub async fn mit_listener(
        self,
        listener: TcpListener,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let local = LocalSet::new();
        local.run_until(self.accept_loop(listener, shutdown_rx)).await
    }

    /// Interne Accept-Loop (laeuft innerhalb der LocalSet)
    async fn accept_loop(
        self,
        listener: TcpListener,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            server = %self.state.config.server_name,
            "TCP Hub-Server gestartet"
        );

        // Verbindungs-Tasks und Reaper; beim Shutdown wird auf alle gewartet
        let mut tasks = JoinSet::new();

        if let (Some(timeout), Some(intervall)) = (
            self.state.config.klingel_timeout(),
            self.state.config.reaper_intervall(),
        ) {
            let state = Arc::clone(&self.state);
            let rx = shutdown_rx.clone();
            tasks.spawn_local(async move {
                state.anrufe.klingel_reaper(timeout, intervall, rx).await;
            });
        }

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.annehmen(stream, peer_addr, &shutdown_rx, &mut tasks).await;
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Beendete Tasks einsammeln
                Some(ergebnis) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = ergebnis {
                        tracing::error!(fehler = %e, "Verbindungs-Task abgebrochen");
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Hub-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        // Jede Verbindung durchlaeuft noch ihren Trennungspfad
        drop(listener);
        let offen = tasks.len();
        while tasks.join_next().await.is_some() {}
        tracing::info!(verbindungen = offen, "TCP Hub-Server gestoppt");
        Ok(())
    }

    async fn annehmen(
        &self,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: &tokio::sync::watch::Receiver<bool>,
        tasks: &mut JoinSet<()>,
    ) {
        // Client-Limit pruefen
        if !self.state.verbindung_reservieren() {
            tracing::warn!(
                peer = %peer_addr,
                max = self.state.config.max_clients,
                "Server voll, Verbindung abgelehnt"
            );
            let voll = Ausgehend::error(ErrorCode::ServerFull, "Server ist voll");
            let _ = wire::write_frame(&mut stream, &voll, wire::DEFAULT_MAX_FRAME_SIZE).await;
            return;
        }
        let platz = VerbindungsPlatz {
            state: Arc::clone(&self.state),
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr);
        let shutdown_rx = shutdown_rx.clone();

        // Lokaler Task – kein Send erforderlich
        tasks.spawn_local(async move {
            verbindung.verarbeiten(stream, shutdown_rx).await;
            drop(platz);
        });
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
