//! treffpunkt-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Stores, Hub und Observability und stellt den
//! oeffentlichen Einstiegspunkt fuer Tests bereit.

pub mod config;
pub mod metriken;

use anyhow::{Context, Result};
use config::ServerConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use treffpunkt_core::SystemUhr;
use treffpunkt_hub::{HubServer, HubState};
use treffpunkt_observability::{observability_server_starten, HealthState, TreffpunktMetrics};
use treffpunkt_store::MemoryStore;

use metriken::{MetrikBeobachter, ZaehlenderCallLogStore, METRIK_INTERVALL};

/// Haelt den Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let laufen = self.laufen(shutdown_rx);
        tokio::pin!(laufen);

        tokio::select! {
            // Startfehler (z.B. Port belegt) enden ohne Signal
            ergebnis = &mut laufen => return ergebnis,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen, beende"),
            },
        }

        let _ = shutdown_tx.send(true);
        laufen.await
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown_rx` auf `true` wechselt
    ///
    /// Reihenfolge:
    /// 1. Metriken und Health-Zustand anlegen
    /// 2. Stores und Hub-Zustand verdrahten
    /// 3. TCP-Listener binden (danach meldet `/health` bereit)
    /// 4. Hub, Observability-Server und Metrik-Task parallel ausfuehren
    pub async fn laufen(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let metriken = TreffpunktMetrics::neu().context("Metriken-Initialisierung fehlgeschlagen")?;
        let health = HealthState::neu(self.config.server.max_clients as usize);

        // Externe Stores: im Standalone-Betrieb alle im Arbeitsspeicher
        let store = Arc::new(MemoryStore::neu());
        let call_logs = Arc::new(ZaehlenderCallLogStore::neu(
            Arc::clone(&store),
            metriken.clone(),
        ));

        let state = HubState::mit_optionen(
            self.config.hub_config(),
            Arc::clone(&store),
            Arc::clone(&store),
            call_logs,
            Arc::new(SystemUhr),
            Arc::new(MetrikBeobachter::neu(metriken.clone())),
        );

        let bind_addr = self.config.tcp_bind_adresse()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Hub-Listener auf {bind_addr} nicht bindbar"))?;
        let lokale_addr = listener.local_addr()?;
        health.bereit_setzen(true);

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %lokale_addr,
            max_clients = self.config.server.max_clients,
            klingel_timeout_sek = ?self.config.hub.klingel_timeout_sek,
            "Hub bereit"
        );

        let hub = HubServer::neu(Arc::clone(&state), lokale_addr)
            .mit_listener(listener, shutdown_rx.clone());

        let observability = {
            let metriken = metriken.clone();
            let health = health.clone();
            let shutdown_rx = shutdown_rx.clone();
            let aktiviert = self.config.observability.aktiviert;
            let addr = self.config.observability_bind_adresse();
            async move {
                if !aktiviert {
                    return;
                }
                let ergebnis = match addr {
                    Ok(addr) => observability_server_starten(addr, metriken, health, shutdown_rx).await,
                    Err(e) => Err(e),
                };
                // Ohne Metriken laeuft der Hub weiter
                if let Err(e) = ergebnis {
                    tracing::error!(fehler = %e, "Observability-Server fehlgeschlagen");
                }
            }
        };

        let nachziehen = metriken::metriken_nachziehen(
            Arc::clone(&state),
            metriken,
            health,
            METRIK_INTERVALL,
            shutdown_rx,
        );

        let (hub_ergebnis, (), ()) = tokio::join!(hub, observability, nachziehen);
        hub_ergebnis.context("Hub-Listener fehlgeschlagen")?;

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.netzwerk.bind_adresse = "127.0.0.1".into();
        config.netzwerk.tcp_port = 0;
        config.observability.aktiviert = false;
        config
    }

    #[tokio::test]
    async fn laeuft_bis_shutdown() {
        let (tx, rx) = watch::channel(false);

        let stoppen = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };

        let (ergebnis, ()) = tokio::join!(Server::neu(test_config()).laufen(rx), stoppen);
        ergebnis.unwrap();
    }

    #[tokio::test]
    async fn belegter_port_ist_fehler() {
        let belegt = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.netzwerk.tcp_port = belegt.local_addr().unwrap().port();

        let (_tx, rx) = watch::channel(false);
        let ergebnis = Server::neu(config).laufen(rx).await;
        assert!(ergebnis.is_err());
    }
}
