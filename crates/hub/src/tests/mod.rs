//! Szenario-Tests fuer den Hub
//!
//! Gemeinsame Helfer: ein Hub mit `MemoryStore`, manueller Uhr und
//! Kanal-Beobachter sowie Test-Clients, die direkt ueber den Dispatcher
//! sprechen (ohne Socket).

mod anruf_tests;
mod verbindung_tests;

use chrono::{TimeZone, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use treffpunkt_core::{
    types::{CallId, GroupId, Identity, NachrichtenTyp},
    ManuelleUhr,
};
use treffpunkt_protocol::{
    event::{
        AnswerCallRequest, CallUserRequest, ConnectRequest, DirektNachrichtRequest,
        EndCallRequest, GruppenNachrichtRequest,
    },
    Ausgehend, Eingehend,
};
use treffpunkt_store::MemoryStore;

use crate::{
    dispatcher::{DispatcherContext, MessageDispatcher},
    failure::{KanalBeobachter, Zustellfehler},
    state::{HubConfig, HubState},
};

pub(crate) type TestState = HubState<MemoryStore, MemoryStore, MemoryStore>;

pub(crate) struct TestHub {
    pub state: Arc<TestState>,
    pub store: Arc<MemoryStore>,
    pub uhr: ManuelleUhr,
    pub fehler_rx: mpsc::UnboundedReceiver<Zustellfehler>,
    dispatcher: MessageDispatcher<MemoryStore, MemoryStore, MemoryStore>,
}

pub(crate) struct TestClient {
    pub ctx: DispatcherContext,
    pub rx: mpsc::Receiver<Ausgehend>,
}

pub(crate) fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

pub(crate) fn test_hub() -> TestHub {
    test_hub_mit(HubConfig::default())
}

pub(crate) fn test_hub_mit(config: HubConfig) -> TestHub {
    let store = Arc::new(MemoryStore::neu());
    let uhr = ManuelleUhr::neu(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    let (beobachter, fehler_rx) = KanalBeobachter::neu();
    let state = HubState::mit_optionen(
        config,
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::new(uhr.clone()),
        Arc::new(beobachter),
    );
    TestHub {
        dispatcher: MessageDispatcher::neu(Arc::clone(&state)),
        state,
        store,
        uhr,
        fehler_rx,
    }
}

impl TestHub {
    /// Neue Verbindung ohne Frames
    pub fn roh_verbinden(&self) -> TestClient {
        let (tx, rx) = mpsc::channel(64);
        TestClient {
            ctx: DispatcherContext::neu(peer(), tx),
            rx,
        }
    }

    /// Neue Verbindung mit `connect{userId: id}`
    pub async fn verbinden(&self, id: &str) -> TestClient {
        let mut client = self.roh_verbinden();
        let antwort = self
            .dispatch(
                &mut client,
                Eingehend::Connect(ConnectRequest {
                    user_id: Some(Identity::from(id)),
                }),
            )
            .await;
        assert!(antwort.is_none(), "connect sollte ohne Antwort gelingen");
        client
    }

    pub async fn dispatch(&self, client: &mut TestClient, event: Eingehend) -> Option<Ausgehend> {
        self.dispatcher.dispatch(event, &mut client.ctx).await
    }

    pub async fn trennen(&self, client: &TestClient) {
        self.dispatcher.verbindung_getrennt(&client.ctx).await;
    }

    pub fn fehler(&mut self) -> Vec<Zustellfehler> {
        let mut faelle = Vec::new();
        while let Ok(f) = self.fehler_rx.try_recv() {
            faelle.push(f);
        }
        faelle
    }
}

impl TestClient {
    /// Alle wartenden Events ausser `online-users`
    pub fn events(&mut self) -> Vec<Ausgehend> {
        self.alle_events()
            .into_iter()
            .filter(|e| !matches!(e, Ausgehend::OnlineUsers(_)))
            .collect()
    }

    /// Alle wartenden Events
    pub fn alle_events(&mut self) -> Vec<Ausgehend> {
        let mut events = Vec::new();
        while let Ok(e) = self.rx.try_recv() {
            events.push(e);
        }
        events
    }
}

// ---------------------------------------------------------------------------
// Event-Bausteine
// ---------------------------------------------------------------------------

pub(crate) fn text_an(an: &str, text: &str) -> Eingehend {
    Eingehend::SendMessage(DirektNachrichtRequest {
        sender: None,
        recipient: Identity::from(an),
        content: Some(text.to_string()),
        file_url: None,
        message_type: NachrichtenTyp::Text,
    })
}

pub(crate) fn text_an_gruppe(gruppe: &str, text: &str) -> Eingehend {
    Eingehend::SendGroupMessage(GruppenNachrichtRequest {
        sender: None,
        group_id: GroupId::from(gruppe),
        content: Some(text.to_string()),
        file_url: None,
        message_type: NachrichtenTyp::Text,
    })
}

pub(crate) fn anrufen(an: &str, call_id: &str, is_video: bool) -> Eingehend {
    Eingehend::CallUser(CallUserRequest {
        to: Identity::from(an),
        from: None,
        signal: serde_json::json!({"type": "offer", "sdp": "v=0"}),
        is_video,
        call_id: CallId::from(call_id),
        name: Some("Test".to_string()),
    })
}

pub(crate) fn annehmen(an: &str, call_id: &str) -> Eingehend {
    Eingehend::AnswerCall(AnswerCallRequest {
        to: Identity::from(an),
        signal: serde_json::json!({"type": "answer", "sdp": "v=0"}),
        call_id: CallId::from(call_id),
    })
}

pub(crate) fn auflegen(an: &str, call_id: &str) -> Eingehend {
    Eingehend::EndCall(EndCallRequest {
        to: Identity::from(an),
        call_id: CallId::from(call_id),
    })
}
