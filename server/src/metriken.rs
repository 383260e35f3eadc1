//! Verbindung zwischen Hub und Prometheus-Metriken
//!
//! Der Hub kennt keine Metriken. Zaehler fuer verworfene Events und
//! geschriebene Anruf-Logs haengen an den beiden Nahtstellen, die der Hub
//! ohnehin anbietet (`FehlerBeobachter`, `CallLogStore`); Gauges zieht ein
//! periodischer Task aus dem Hub-Zustand nach.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use treffpunkt_hub::failure::SendeGrund;
use treffpunkt_hub::{FehlerBeobachter, HubState, ProtokollBeobachter, Zustellfehler};
use treffpunkt_observability::{HealthState, TreffpunktMetrics};
use treffpunkt_store::{CallLog, CallLogStore, GroupStore, MessageStore, StoreResult};

/// Intervall fuer das Nachziehen der Gauges
pub const METRIK_INTERVALL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Zustellfehler -> Counter
// ---------------------------------------------------------------------------

/// Label `art` fuer `treffpunkt_delivery_failures_total`
pub fn fehler_art(fehler: &Zustellfehler) -> &'static str {
    match fehler {
        Zustellfehler::NachrichtVerworfen { .. } => "nachricht_verworfen",
        Zustellfehler::CallLogVerloren { .. } => "call_log_verloren",
        Zustellfehler::SendenFehlgeschlagen {
            grund: SendeGrund::QueueVoll,
            ..
        } => "queue_voll",
        Zustellfehler::SendenFehlgeschlagen {
            grund: SendeGrund::Geschlossen,
            ..
        } => "queue_geschlossen",
    }
}

/// Zaehlt jeden Fall und loggt ihn wie der Standard-Beobachter
pub struct MetrikBeobachter {
    metriken: TreffpunktMetrics,
}

impl MetrikBeobachter {
    pub fn neu(metriken: TreffpunktMetrics) -> Self {
        Self { metriken }
    }
}

impl FehlerBeobachter for MetrikBeobachter {
    fn melden(&self, fehler: Zustellfehler) {
        self.metriken
            .delivery_failures_total
            .with_label_values(&[fehler_art(&fehler)])
            .inc();
        ProtokollBeobachter.melden(fehler);
    }
}

// ---------------------------------------------------------------------------
// CallLogStore mit Zaehler
// ---------------------------------------------------------------------------

/// Zaehlt erfolgreich geschriebene Anruf-Logs nach Status
pub struct ZaehlenderCallLogStore<L: CallLogStore> {
    inner: Arc<L>,
    metriken: TreffpunktMetrics,
}

impl<L: CallLogStore> ZaehlenderCallLogStore<L> {
    pub fn neu(inner: Arc<L>, metriken: TreffpunktMetrics) -> Self {
        Self { inner, metriken }
    }
}

impl<L: CallLogStore> CallLogStore for ZaehlenderCallLogStore<L> {
    async fn save(&self, log: CallLog) -> StoreResult<()> {
        let status = log.status;
        self.inner.save(log).await?;
        self.metriken
            .call_logs_total
            .with_label_values(&[status.als_str()])
            .inc();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gauges
// ---------------------------------------------------------------------------

/// Uebertraegt den aktuellen Hub-Zustand in Metriken und Health
pub fn metriken_aktualisieren<M, G, L>(
    state: &HubState<M, G, L>,
    metriken: &TreffpunktMetrics,
    health: &HealthState,
) where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    let offen = state.verbindungen_anzahl();
    metriken.connected_clients.set(state.registry.anzahl() as i64);
    metriken.open_connections.set(offen as i64);
    metriken.active_calls.set(state.anrufe.aktive_anzahl() as i64);
    metriken.zugestellt_nachziehen(state.registry.zugestellt_gesamt());
    health.verbindungen_setzen(offen);
}

/// Zieht die Gauges alle `intervall` nach, bis `shutdown_rx` auf `true` wechselt
///
/// Beim Shutdown wird der Health-Status auf nicht bereit gesetzt.
pub async fn metriken_nachziehen<M, G, L>(
    state: Arc<HubState<M, G, L>>,
    metriken: TreffpunktMetrics,
    health: HealthState,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    M: MessageStore + 'static,
    G: GroupStore + 'static,
    L: CallLogStore + 'static,
{
    let mut ticker = tokio::time::interval(intervall);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                metriken_aktualisieren(&state, &metriken, &health);
            }
            ergebnis = shutdown_rx.changed() => {
                if ergebnis.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    health.bereit_setzen(false);
    metriken_aktualisieren(&state, &metriken, &health);
}
