//! Uhr-Abstraktion
//!
//! Anrufdauer und Last-Seen-Angaben haengen an der Wanduhr. Der Hub liest
//! die Zeit nur ueber `Uhr`, damit Tests die Zeit gezielt vorstellen koennen.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Quelle fuer den aktuellen Zeitpunkt
pub trait Uhr: Send + Sync + 'static {
    fn jetzt(&self) -> DateTime<Utc>;
}

/// Systemuhr (Standard im Betrieb)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUhr;

impl Uhr for SystemUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manuell gestellte Uhr fuer Tests
///
/// Clone teilt den inneren Zeitpunkt.
#[derive(Debug, Clone)]
pub struct ManuelleUhr {
    zeit: Arc<Mutex<DateTime<Utc>>>,
}

impl ManuelleUhr {
    pub fn neu(start: DateTime<Utc>) -> Self {
        Self {
            zeit: Arc::new(Mutex::new(start)),
        }
    }

    /// Stellt die Uhr um `dauer` vor
    pub fn vorstellen(&self, dauer: Duration) {
        let mut zeit = self.zeit.lock();
        *zeit += dauer;
    }

    pub fn stellen(&self, zeitpunkt: DateTime<Utc>) {
        *self.zeit.lock() = zeitpunkt;
    }
}

impl Default for ManuelleUhr {
    fn default() -> Self {
        Self::neu(Utc::now())
    }
}

impl Uhr for ManuelleUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        *self.zeit.lock()
    }
}
