//! Gemeinsamer Hub-Zustand
//!
//! Haelt Registry, Presence, Typing-Relay, Fanout und Anruf-Koordinator als
//! geteilte Komponenten. Die drei Store-Typen sind generisch; der Hub selbst
//! besitzt keine Datenhaltung.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use treffpunkt_core::{SystemUhr, Uhr};
use treffpunkt_store::{CallLogStore, GroupStore, MessageStore};

use crate::calls::AnrufKoordinator;
use crate::failure::{FehlerBeobachter, ProtokollBeobachter};
use crate::fanout::NachrichtenVerteiler;
use crate::presence::{PresenceTracker, STANDARD_DATUMSFORMAT};
use crate::registry::ConnectionRegistry;
use crate::typing::TypingRelay;

/// Konfiguration fuer den Hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Klingel-Timeout in Sekunden (None = Anrufe klingeln unbegrenzt)
    pub klingel_timeout_sek: Option<u64>,
    /// strftime-Format fuer Last-Seen aelter als eine Woche
    pub datumsformat: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server_name: "Treffpunkt".to_string(),
            max_clients: 1024,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: 64,
            klingel_timeout_sek: None,
            datumsformat: STANDARD_DATUMSFORMAT.to_string(),
        }
    }
}

impl HubConfig {
    /// Klingel-Timeout als Duration
    pub fn klingel_timeout(&self) -> Option<Duration> {
        self.klingel_timeout_sek.map(Duration::from_secs)
    }

    /// Pruefintervall des Klingel-Reapers: ein Viertel des Timeouts, 1..=30 s
    pub fn reaper_intervall(&self) -> Option<Duration> {
        self.klingel_timeout_sek
            .map(|t| Duration::from_secs((t / 4).clamp(1, 30)))
    }
}

/// Gemeinsamer Hub-Zustand (Arc-geteilt)
pub struct HubState<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    /// Hub-Konfiguration
    pub config: Arc<HubConfig>,
    /// Identity -> aktive Verbindung
    pub registry: ConnectionRegistry,
    /// Online-Liste und Last-Seen
    pub presence: PresenceTracker,
    /// Tipp-Indikatoren
    pub typing: TypingRelay,
    /// Direkt- und Gruppennachrichten
    pub fanout: NachrichtenVerteiler<M, G>,
    /// Anruf-Sitzungen
    pub anrufe: AnrufKoordinator<L>,
    /// Zeitquelle fuer Last-Seen, Anrufdauer und Nachrichten-Zeitstempel
    pub uhr: Arc<dyn Uhr>,
    /// Offene TCP-Verbindungen (auch ohne Identity)
    verbindungen: AtomicUsize,
    /// Startzeitpunkt (fuer Uptime)
    pub start_time: Instant,
}

impl<M, G, L> HubState<M, G, L>
where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    /// Erstellt den Zustand mit Systemuhr und Log-Beobachter
    pub fn neu(
        config: HubConfig,
        message_store: Arc<M>,
        group_store: Arc<G>,
        call_log_store: Arc<L>,
    ) -> Arc<Self> {
        Self::mit_optionen(
            config,
            message_store,
            group_store,
            call_log_store,
            Arc::new(SystemUhr),
            Arc::new(ProtokollBeobachter),
        )
    }

    /// Erstellt den Zustand mit eigener Uhr und eigenem Fehler-Beobachter
    pub fn mit_optionen(
        config: HubConfig,
        message_store: Arc<M>,
        group_store: Arc<G>,
        call_log_store: Arc<L>,
        uhr: Arc<dyn Uhr>,
        beobachter: Arc<dyn FehlerBeobachter>,
    ) -> Arc<Self> {
        let registry = ConnectionRegistry::neu(beobachter);
        let presence =
            PresenceTracker::neu(registry.clone(), Arc::clone(&uhr), config.datumsformat.clone());

        Arc::new(Self {
            typing: TypingRelay::neu(registry.clone()),
            fanout: NachrichtenVerteiler::neu(
                message_store,
                group_store,
                registry.clone(),
                Arc::clone(&uhr),
            ),
            anrufe: AnrufKoordinator::neu(call_log_store, registry.clone(), Arc::clone(&uhr)),
            config: Arc::new(config),
            registry,
            presence,
            uhr,
            verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz; `false` wenn `max_clients` erreicht
    pub fn verbindung_reservieren(&self) -> bool {
        let max = self.config.max_clients as usize;
        self.verbindungen
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    pub fn verbindung_freigeben(&self) {
        self.verbindungen.fetch_sub(1, Ordering::SeqCst);
    }

    /// Offene TCP-Verbindungen
    pub fn verbindungen_anzahl(&self) -> usize {
        self.verbindungen.load(Ordering::SeqCst)
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
