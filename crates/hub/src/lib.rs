//! treffpunkt-hub – Echtzeit-Hub fuer Chat und Anruf-Signaling
//!
//! Der Hub haelt die fluechtigen Zustaende aller verbundenen Clients und
//! verteilt Events zwischen ihnen. Persistenz liegt in externen Stores
//! (siehe `treffpunkt-store`).
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (HubServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  erstes Frame: connect{userId}
//!     v
//! MessageDispatcher
//!     |
//!     +-- ConnectionRegistry  (Identity -> Transport)
//!     +-- PresenceTracker     (online-users, Last-Seen)
//!     +-- TypingRelay         (typing / stopTyping)
//!     +-- NachrichtenVerteiler (Direkt- und Gruppennachrichten)
//!     +-- AnrufKoordinator    (call-user, answer-call, end-call)
//!
//! FehlerBeobachter – verworfene Events (Persistenz, volle Queues)
//! ```

pub mod calls;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod failure;
pub mod fanout;
pub mod presence;
pub mod registry;
pub mod state;
pub mod tcp;
pub mod typing;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use calls::{AnrufKoordinator, AnrufSitzung, EinladungsErgebnis};
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{HubError, HubResult};
pub use failure::{FehlerBeobachter, KanalBeobachter, ProtokollBeobachter, Zustellfehler};
pub use presence::{PresenceEvent, PresenceTracker};
pub use registry::{ConnectionRegistry, Transport};
pub use state::{HubConfig, HubState};
pub use tcp::HubServer;
