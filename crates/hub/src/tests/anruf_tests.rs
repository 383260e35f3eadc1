//! Anruf-Signaling: Lebenszyklus, verpasste Anrufe, Trennung, Klingel-Timeout

use chrono::Duration;
use std::time::Duration as StdDuration;
use treffpunkt_core::types::{CallId, Identity};
use treffpunkt_core::Uhr;
use treffpunkt_protocol::{
    event::{CallAcceptedInfo, CallEndedInfo, CallMissedInfo, IncomingCallInfo},
    Ausgehend,
};
use treffpunkt_store::AnrufStatus;

use super::*;
use crate::calls::{EinladungsErgebnis, GRUND_KEINE_ANTWORT, GRUND_OFFLINE};
use crate::error::HubError;

#[tokio::test]
async fn test_beispiel_videoanruf_fuenf_sekunden() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    u1.events();
    u2.events();

    hub.dispatch(&mut u1, anrufen("u2", "c1", true)).await;
    match u2.events().as_slice() {
        [Ausgehend::IncomingCall(IncomingCallInfo {
            from,
            call_id,
            is_video,
            ..
        })] => {
            assert_eq!(from, &Identity::from("u1"));
            assert_eq!(call_id, &CallId::from("c1"));
            assert!(is_video);
        }
        andere => panic!("incoming-call erwartet, bekam {:?}", andere),
    }

    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    match u1.events().as_slice() {
        [Ausgehend::CallAccepted(CallAcceptedInfo { from, call_id, .. })] => {
            assert_eq!(from, &Identity::from("u2"));
            assert_eq!(call_id, &CallId::from("c1"));
        }
        andere => panic!("call-accepted erwartet, bekam {:?}", andere),
    }

    hub.uhr.vorstellen(Duration::milliseconds(5000));
    hub.dispatch(&mut u1, auflegen("u2", "c1")).await;

    assert_eq!(
        u2.events(),
        vec![Ausgehend::CallEnded(CallEndedInfo {
            from: Some(Identity::from("u1")),
            call_id: CallId::from("c1"),
        })]
    );

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.caller, Identity::from("u1"));
    assert_eq!(log.recipient, Identity::from("u2"));
    assert!(log.is_video);
    assert_eq!(log.status, AnrufStatus::Ended);
    assert_eq!(log.duration_ms, Some(5000));
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);
}

#[tokio::test]
async fn test_lebenszyklus_ringing_ongoing_ended() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    let c1 = CallId::from("c1");

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    let sitzung = hub.state.anrufe.sitzung(&c1).expect("Sitzung erwartet");
    assert_eq!(sitzung.status, AnrufStatus::Ringing);
    assert_eq!(sitzung.start_time, hub.uhr.jetzt());
    assert!(sitzung.answer_time.is_none());

    hub.uhr.vorstellen(Duration::seconds(3));
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    let sitzung = hub.state.anrufe.sitzung(&c1).expect("Sitzung erwartet");
    assert_eq!(sitzung.status, AnrufStatus::Ongoing);
    assert_eq!(sitzung.answer_time, Some(hub.uhr.jetzt()));

    hub.uhr.vorstellen(Duration::seconds(10));
    hub.dispatch(&mut u2, auflegen("u1", "c1")).await;

    assert!(hub.state.anrufe.sitzung(&c1).is_none());
    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Ended);
    assert_eq!(logs[0].duration_ms, Some(10_000));
}

#[tokio::test]
async fn test_callee_offline_ergibt_verpasst() {
    let mut hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    u1.events();

    hub.dispatch(&mut u1, anrufen("u9", "c1", false)).await;

    assert_eq!(
        u1.events(),
        vec![Ausgehend::CallMissed(CallMissedInfo {
            to: Identity::from("u9"),
            call_id: CallId::from("c1"),
            reason: GRUND_OFFLINE.to_string(),
        })]
    );
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Missed);
    assert_eq!(logs[0].duration_ms, Some(0));
    assert!(hub.fehler().is_empty());
}

#[tokio::test]
async fn test_doppeltes_auflegen_schreibt_ein_log() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    u2.events();

    hub.dispatch(&mut u1, auflegen("u2", "c1")).await;
    hub.dispatch(&mut u1, auflegen("u2", "c1")).await;

    assert_eq!(hub.store.call_logs().len(), 1);
    // Auch ohne Sitzung wird das Ziel benachrichtigt
    assert_eq!(u2.events().len(), 2);
}

#[tokio::test]
async fn test_auflegen_ohne_sitzung_benachrichtigt_ziel() {
    let hub = test_hub();
    let _u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    u2.events();

    let beendet = hub
        .state
        .anrufe
        .beenden(&CallId::from("alt"), &Identity::from("u1"), &Identity::from("u2"))
        .await
        .unwrap();
    assert!(!beendet);
    assert!(hub.store.call_logs().is_empty());
    assert!(matches!(u2.events().as_slice(), [Ausgehend::CallEnded(_)]));
}

#[tokio::test]
async fn test_trennung_beendet_laufenden_anruf_einmal() {
    let hub = test_hub();
    let mut a = hub.verbinden("a").await;
    let mut b = hub.verbinden("b").await;

    hub.dispatch(&mut a, anrufen("b", "c1", false)).await;
    hub.dispatch(&mut b, annehmen("a", "c1")).await;
    b.events();

    hub.uhr.vorstellen(Duration::seconds(4));
    hub.trennen(&a).await;

    assert_eq!(
        b.events(),
        vec![Ausgehend::CallEnded(CallEndedInfo {
            from: None,
            call_id: CallId::from("c1"),
        })]
    );
    assert!(hub.state.anrufe.sitzung(&CallId::from("c1")).is_none());

    hub.trennen(&b).await;

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Disconnected);
    assert_eq!(logs[0].duration_ms, Some(4_000));
}

#[tokio::test]
async fn test_trennung_waehrend_klingeln() {
    let hub = test_hub();
    let mut a = hub.verbinden("a").await;
    let b = hub.verbinden("b").await;

    hub.dispatch(&mut a, anrufen("b", "c1", true)).await;
    a.events();
    hub.trennen(&b).await;

    assert!(matches!(a.events().as_slice(), [Ausgehend::CallEnded(_)]));
    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Disconnected);
    assert!(logs[0].answer_time.is_none());
}

#[tokio::test]
async fn test_annehmen_unbekannt_oder_fremd_ist_noop() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let _u2 = hub.verbinden("u2").await;
    let mut u3 = hub.verbinden("u3").await;

    // Unbekannte callId
    assert!(hub.dispatch(&mut u1, annehmen("u2", "gibtsnicht")).await.is_none());
    assert!(matches!(
        hub.state.anrufe.annehmen(
            &CallId::from("gibtsnicht"),
            serde_json::Value::Null,
            &Identity::from("u1"),
        ),
        Err(HubError::UnbekannterAnruf(_))
    ));

    // Nur der Callee darf annehmen
    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    u1.events();
    hub.dispatch(&mut u3, annehmen("u1", "c1")).await;

    let sitzung = hub.state.anrufe.sitzung(&CallId::from("c1")).expect("Sitzung erwartet");
    assert_eq!(sitzung.status, AnrufStatus::Ringing);
    assert!(u1.events().is_empty());
}

#[tokio::test]
async fn test_auflegen_durch_fremden_ist_noop() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    let mut u3 = hub.verbinden("u3").await;

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    u1.events();
    u2.events();
    u3.events();

    assert!(hub.dispatch(&mut u3, auflegen("u1", "c1")).await.is_none());

    let sitzung = hub.state.anrufe.sitzung(&CallId::from("c1")).expect("Sitzung erwartet");
    assert_eq!(sitzung.status, AnrufStatus::Ongoing);
    assert!(hub.store.call_logs().is_empty());
    assert!(u1.events().is_empty());
    assert!(u2.events().is_empty());
    assert!(u3.events().is_empty());

    let ergebnis = hub
        .state
        .anrufe
        .beenden(&CallId::from("c1"), &Identity::from("u3"), &Identity::from("u2"))
        .await;
    assert!(matches!(ergebnis, Err(HubError::KeinTeilnehmer { .. })));
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 1);

    // Der Callee darf weiterhin auflegen
    hub.dispatch(&mut u2, auflegen("u1", "c1")).await;
    assert_eq!(hub.store.call_logs().len(), 1);
    assert!(matches!(u1.events().as_slice(), [Ausgehend::CallEnded(_)]));
}

#[tokio::test]
async fn test_doppelte_call_id_wird_verworfen() {
    let hub = test_hub();
    let _u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    let _u3 = hub.verbinden("u3").await;
    u2.events();

    let einladung = |caller: &str| crate::calls::Einladung {
        call_id: CallId::from("c1"),
        caller: Identity::from(caller),
        callee: Identity::from("u2"),
        signal: serde_json::Value::Null,
        is_video: false,
        name: None,
    };

    assert_eq!(
        hub.state.anrufe.einladen(einladung("u1")).await,
        EinladungsErgebnis::Klingelt
    );
    assert_eq!(
        hub.state.anrufe.einladen(einladung("u3")).await,
        EinladungsErgebnis::Doppelt
    );

    let sitzung = hub.state.anrufe.sitzung(&CallId::from("c1")).expect("Sitzung erwartet");
    assert_eq!(sitzung.caller, Identity::from("u1"));
    assert_eq!(u2.events().len(), 1);
}

#[tokio::test]
async fn test_klingel_timeout_beendet_als_verpasst() {
    let hub = test_hub_mit(HubConfig {
        klingel_timeout_sek: Some(30),
        ..HubConfig::default()
    });
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    let timeout = hub.state.config.klingel_timeout().expect("Timeout konfiguriert");

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    u1.events();
    u2.events();

    hub.uhr.vorstellen(Duration::seconds(29));
    assert_eq!(hub.state.anrufe.abgelaufene_beenden(timeout).await, 0);

    hub.uhr.vorstellen(Duration::seconds(1));
    assert_eq!(hub.state.anrufe.abgelaufene_beenden(timeout).await, 1);

    assert_eq!(
        u1.events(),
        vec![Ausgehend::CallMissed(CallMissedInfo {
            to: Identity::from("u2"),
            call_id: CallId::from("c1"),
            reason: GRUND_KEINE_ANTWORT.to_string(),
        })]
    );
    assert!(matches!(u2.events().as_slice(), [Ausgehend::CallEnded(_)]));

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Missed);
    assert_eq!(logs[0].duration_ms, Some(30_000));
}

#[tokio::test]
async fn test_klingel_timeout_laesst_angenommene_anrufe_stehen() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    hub.uhr.vorstellen(Duration::minutes(10));

    assert_eq!(
        hub.state.anrufe.abgelaufene_beenden(StdDuration::from_secs(30)).await,
        0
    );
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 1);
}

#[tokio::test]
async fn test_riesiger_klingel_timeout_laeuft_nie_ab() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let _u2 = hub.verbinden("u2").await;

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.uhr.vorstellen(Duration::days(365));

    for timeout in [StdDuration::from_secs(10_000_000_000_000), StdDuration::MAX] {
        assert_eq!(hub.state.anrufe.abgelaufene_beenden(timeout).await, 0);
    }
    let sitzung = hub.state.anrufe.sitzung(&CallId::from("c1")).expect("Sitzung erwartet");
    assert_eq!(sitzung.status, AnrufStatus::Ringing);
    assert!(hub.store.call_logs().is_empty());
}

#[tokio::test]
async fn test_call_log_fehler_geht_an_beobachter() {
    let mut hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let _u2 = hub.verbinden("u2").await;
    hub.store.call_log_fehler_simulieren(true);

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u1, auflegen("u2", "c1")).await;

    assert!(hub.store.call_logs().is_empty());
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);
    assert!(matches!(
        hub.fehler().as_slice(),
        [Zustellfehler::CallLogVerloren {
            status: AnrufStatus::Ended,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_verdraengte_verbindung_beendet_keine_anrufe() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let u2_alt = hub.verbinden("u2").await;
    let _u2_neu = hub.verbinden("u2").await;

    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.trennen(&u2_alt).await;

    assert_eq!(hub.state.anrufe.aktive_anzahl(), 1);
    assert!(hub.store.call_logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_klingel_reaper_stoppt_bei_shutdown() {
    let hub = test_hub_mit(HubConfig {
        klingel_timeout_sek: Some(8),
        ..HubConfig::default()
    });
    let mut u1 = hub.verbinden("u1").await;
    let _u2 = hub.verbinden("u2").await;
    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.uhr.vorstellen(Duration::seconds(9));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper = hub.state.anrufe.klingel_reaper(
        StdDuration::from_secs(8),
        hub.state.config.reaper_intervall().expect("Intervall erwartet"),
        shutdown_rx,
    );
    let stopper = async {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        shutdown_tx.send(true).expect("Reaper lauscht");
    };
    tokio::join!(reaper, stopper);

    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);
    assert_eq!(hub.store.call_logs()[0].status, AnrufStatus::Missed);
}

#[tokio::test(start_paused = true)]
async fn test_auflegen_und_trennung_gleichzeitig_ein_log() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    hub.store.call_log_latenz_setzen(Some(StdDuration::from_secs(1)));

    tokio::join!(hub.dispatch(&mut u1, auflegen("u2", "c1")), hub.trennen(&u2));

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Ended);
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_trennung_und_auflegen_gleichzeitig_ein_log() {
    let hub = test_hub();
    let mut u1 = hub.verbinden("u1").await;
    let mut u2 = hub.verbinden("u2").await;
    hub.dispatch(&mut u1, anrufen("u2", "c1", false)).await;
    hub.dispatch(&mut u2, annehmen("u1", "c1")).await;
    hub.store.call_log_latenz_setzen(Some(StdDuration::from_secs(1)));

    tokio::join!(hub.trennen(&u2), hub.dispatch(&mut u1, auflegen("u2", "c1")));

    let logs = hub.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, AnrufStatus::Disconnected);
    assert_eq!(hub.state.anrufe.aktive_anzahl(), 0);
}
