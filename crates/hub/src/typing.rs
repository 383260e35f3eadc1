//! Typing-Relay – Leitet Tipp-Indikatoren weiter
//!
//! Zustandslos: kein Debounce, kein Timeout. Der Client sendet `stopTyping`
//! selbst nach einer Pause.

use treffpunkt_core::types::Identity;
use treffpunkt_protocol::{event::TypingInfo, Ausgehend};

use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct TypingRelay {
    registry: ConnectionRegistry,
}

impl TypingRelay {
    pub fn neu(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// `typing{sender: von}` an `an`, falls online
    pub fn tippt(&self, von: &Identity, an: &Identity) -> bool {
        self.registry.an_identity_senden(
            an,
            Ausgehend::Typing(TypingInfo {
                sender: von.clone(),
            }),
        )
    }

    /// `stopTyping{sender: von}` an `an`, falls online
    pub fn tippt_nicht_mehr(&self, von: &Identity, an: &Identity) -> bool {
        self.registry.an_identity_senden(
            an,
            Ausgehend::StopTyping(TypingInfo {
                sender: von.clone(),
            }),
        )
    }
}
