//! Hub-Events
//!
//! Definiert alle Events die ueber die TCP-Verbindung zwischen Client und
//! Hub ausgetauscht werden.
//!
//! ## Design
//! - Umschlag `{"event": "<name>", "data": {...}}` (adjacently tagged)
//! - Event-Namen entsprechen dem Browser-Client (`sendMessage`,
//!   `call-user`, `recieveMessage`, ...), inklusive historischer Schreibweisen
//! - JSON-Serialisierung via serde, Feldnamen in camelCase
//! - Signaling-Payloads (SDP/ICE) bleiben opakes JSON

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treffpunkt_core::types::{CallId, GroupId, Identity, MessageId, NachrichtenTyp};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    /// Verbindung ohne Identity hat ein identitaetspflichtiges Event gesendet
    MissingIdentity,
    /// `connect` auf einer bereits identifizierten Verbindung
    AlreadyConnected,
    ServerFull,
}

// ---------------------------------------------------------------------------
// Eingehende Payloads (Client -> Hub)
// ---------------------------------------------------------------------------

/// Verbindungs-Metadaten, erstes Frame jeder Verbindung
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Fehlt bei nicht angemeldeten Clients
    #[serde(default)]
    pub user_id: Option<Identity>,
}

/// Direktnachricht
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirektNachrichtRequest {
    /// Vom Client behauptet; massgeblich ist die Identity der Verbindung
    #[serde(default)]
    pub sender: Option<Identity>,
    pub recipient: Identity,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
}

/// Gruppennachricht
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GruppenNachrichtRequest {
    #[serde(default)]
    pub sender: Option<Identity>,
    pub group_id: GroupId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
}

/// Tipp-Signal (typing / stopTyping)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingRequest {
    pub recipient: Identity,
}

/// Last-Seen-Abfrage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSeenRequest {
    pub user_id: Identity,
}

/// Anruf einleiten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUserRequest {
    pub to: Identity,
    #[serde(default)]
    pub from: Option<Identity>,
    /// Opakes Signaling-Payload (SDP-Angebot o.ae.)
    #[serde(default)]
    pub signal: serde_json::Value,
    #[serde(default)]
    pub is_video: bool,
    pub call_id: CallId,
    /// Anzeigename des Anrufers
    #[serde(default)]
    pub name: Option<String>,
}

/// Anruf annehmen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCallRequest {
    /// Der Anrufer
    pub to: Identity,
    #[serde(default)]
    pub signal: serde_json::Value,
    pub call_id: CallId,
}

/// Auflegen, Ablehnen oder Abbrechen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCallRequest {
    pub to: Identity,
    pub call_id: CallId,
}

/// Keepalive-Ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMessage {
    pub timestamp_ms: u64,
}

/// Keepalive-Pong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

/// Alle Events die ein Client senden darf
///
/// `disconnect` gibt es nicht als Frame: er ergibt sich aus dem Ende
/// der Transport-Verbindung.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Eingehend {
    #[serde(rename = "connect")]
    Connect(ConnectRequest),
    #[serde(rename = "sendMessage")]
    SendMessage(DirektNachrichtRequest),
    #[serde(rename = "send-group-message")]
    SendGroupMessage(GruppenNachrichtRequest),
    #[serde(rename = "typing")]
    Typing(TypingRequest),
    #[serde(rename = "stopTyping")]
    StopTyping(TypingRequest),
    #[serde(rename = "get-last-seen")]
    GetLastSeen(LastSeenRequest),
    #[serde(rename = "call-user")]
    CallUser(CallUserRequest),
    #[serde(rename = "answer-call")]
    AnswerCall(AnswerCallRequest),
    #[serde(rename = "end-call")]
    EndCall(EndCallRequest),
    #[serde(rename = "ping")]
    Ping(PingMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

impl Eingehend {
    /// Event-Name wie auf dem Draht (fuer Logs)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::SendMessage(_) => "sendMessage",
            Self::SendGroupMessage(_) => "send-group-message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stopTyping",
            Self::GetLastSeen(_) => "get-last-seen",
            Self::CallUser(_) => "call-user",
            Self::AnswerCall(_) => "answer-call",
            Self::EndCall(_) => "end-call",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Payloads (Hub -> Client)
// ---------------------------------------------------------------------------

/// Anzeigefelder eines Kontakts (aus dem Benutzer-Store angereichert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KontaktInfo {
    pub id: Identity,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub color: Option<u32>,
}

/// Persistierte, angereicherte Nachricht wie sie Clients erhalten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NachrichtInfo {
    pub id: MessageId,
    pub sender: KontaktInfo,
    pub recipient: Option<KontaktInfo>,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub message_type: NachrichtenTyp,
    pub timestamp: DateTime<Utc>,
    /// Nur bei Gruppennachrichten gesetzt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSeenInfo {
    pub user_id: Identity,
    /// `None` wenn online oder nie offline gesehen
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingInfo {
    pub sender: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallInfo {
    pub from: Identity,
    pub name: Option<String>,
    pub signal: serde_json::Value,
    pub is_video: bool,
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAcceptedInfo {
    pub signal: serde_json::Value,
    pub from: Identity,
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndedInfo {
    /// Fehlt wenn der Hub den Anruf beendet (Disconnect, Timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Identity>,
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMissedInfo {
    pub to: Identity,
    pub call_id: CallId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

/// Alle Events die der Hub an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Ausgehend {
    /// Vollstaendige Online-Liste (kein Delta)
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<Identity>),
    #[serde(rename = "last-seen")]
    LastSeen(LastSeenInfo),
    #[serde(rename = "recieveMessage")]
    RecieveMessage(NachrichtInfo),
    #[serde(rename = "recieve-group-message")]
    RecieveGroupMessage(NachrichtInfo),
    #[serde(rename = "typing")]
    Typing(TypingInfo),
    #[serde(rename = "stopTyping")]
    StopTyping(TypingInfo),
    #[serde(rename = "incoming-call")]
    IncomingCall(IncomingCallInfo),
    #[serde(rename = "call-accepted")]
    CallAccepted(CallAcceptedInfo),
    #[serde(rename = "call-ended")]
    CallEnded(CallEndedInfo),
    #[serde(rename = "call-missed")]
    CallMissed(CallMissedInfo),
    #[serde(rename = "error")]
    Error(ErrorInfo),
    #[serde(rename = "ping")]
    Ping(PingMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

impl Ausgehend {
    /// Erstellt ein Fehler-Event
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorInfo {
            code,
            message: message.into(),
        })
    }

    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping(PingMessage { timestamp_ms })
    }

    pub fn pong(echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::Pong(PongMessage {
            echo_timestamp_ms,
            server_timestamp_ms,
        })
    }

    /// Event-Name wie auf dem Draht (fuer Logs)
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "online-users",
            Self::LastSeen(_) => "last-seen",
            Self::RecieveMessage(_) => "recieveMessage",
            Self::RecieveGroupMessage(_) => "recieve-group-message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stopTyping",
            Self::IncomingCall(_) => "incoming-call",
            Self::CallAccepted(_) => "call-accepted",
            Self::CallEnded(_) => "call-ended",
            Self::CallMissed(_) => "call-missed",
            Self::Error(_) => "error",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
