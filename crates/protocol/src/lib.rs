//! treffpunkt-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Events die zwischen Client und Hub
//! ausgetauscht werden, sowie das Frame-Format auf der TCP-Verbindung.

pub mod event;
pub mod wire;

pub use event::{Ausgehend, Eingehend, ErrorCode, NachrichtInfo};
pub use wire::{ClientCodec, FrameCodec, ServerCodec};
