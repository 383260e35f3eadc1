//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use treffpunkt_hub::HubConfig;
use treffpunkt_observability::logging::log_format_gueltig;

/// Obergrenze fuer `hub.klingel_timeout_sek` (ein Tag)
pub const MAX_KLINGEL_TIMEOUT_SEK: u64 = 86_400;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Hub-Einstellungen (Keepalive, Queues, Anrufe, Last-Seen)
    pub hub: HubEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Treffpunkt".into(),
            max_clients: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Hub und Observability
    pub bind_adresse: String,
    /// Port fuer die Hub-Verbindungen
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9870,
        }
    }
}

/// Hub-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubEinstellungen {
    /// Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Stille Verbindungen werden nach dieser Zeit geschlossen
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Klingel-Timeout in Sekunden (fehlt = kein Timeout)
    pub klingel_timeout_sek: Option<u64>,
    /// strftime-Format fuer Last-Seen aelter als eine Woche
    pub datumsformat: String,
}

impl Default for HubEinstellungen {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            keepalive_sek: hub.keepalive_sek,
            verbindungs_timeout_sek: hub.verbindungs_timeout_sek,
            send_queue_groesse: hub.send_queue_groesse,
            klingel_timeout_sek: hub.klingel_timeout_sek,
            datumsformat: hub.datumsformat,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Ausdruck (z.B. "info,treffpunkt_hub=debug")
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.server.max_clients == 0 {
            bail!("server.max_clients muss groesser als 0 sein");
        }
        if self.hub.send_queue_groesse == 0 {
            bail!("hub.send_queue_groesse muss groesser als 0 sein");
        }
        if self.hub.keepalive_sek == 0 {
            bail!("hub.keepalive_sek muss groesser als 0 sein");
        }
        if self.hub.verbindungs_timeout_sek <= self.hub.keepalive_sek {
            bail!(
                "hub.verbindungs_timeout_sek ({}) muss groesser als hub.keepalive_sek ({}) sein",
                self.hub.verbindungs_timeout_sek,
                self.hub.keepalive_sek
            );
        }
        if self.hub.klingel_timeout_sek == Some(0) {
            bail!("hub.klingel_timeout_sek muss groesser als 0 sein (oder weglassen)");
        }
        if let Some(sek) = self.hub.klingel_timeout_sek {
            if sek > MAX_KLINGEL_TIMEOUT_SEK {
                bail!(
                    "hub.klingel_timeout_sek ({}) darf hoechstens {} sein",
                    sek,
                    MAX_KLINGEL_TIMEOUT_SEK
                );
            }
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!(
                "logging.format '{}' ungueltig (erlaubt: text, json)",
                self.logging.format
            );
        }
        Ok(())
    }

    /// Projektion auf die Hub-Konfiguration
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.hub.keepalive_sek,
            verbindungs_timeout_sek: self.hub.verbindungs_timeout_sek,
            send_queue_groesse: self.hub.send_queue_groesse,
            klingel_timeout_sek: self.hub.klingel_timeout_sek,
            datumsformat: self.hub.datumsformat.clone(),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer den Hub zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }
}

fn bind_adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
}
