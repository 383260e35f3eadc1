//! Verbindungs-Task und TCP-Server ueber echte Streams

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::LocalSet;
use tokio_util::codec::Framed;
use treffpunkt_core::types::Identity;
use treffpunkt_protocol::{
    event::{ConnectRequest, PingMessage},
    Ausgehend, ClientCodec, Eingehend, ErrorCode,
};

use super::*;
use crate::connection::ClientConnection;
use crate::tcp::HubServer;

async fn naechstes<S>(client: &mut Framed<S, ClientCodec>) -> Ausgehend
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("Zeitlimit beim Lesen")
        .expect("Stream unerwartet beendet")
        .expect("Frame-Fehler")
}

fn connect(id: &str) -> Eingehend {
    Eingehend::Connect(ConnectRequest {
        user_id: Some(Identity::from(id)),
    })
}

#[tokio::test]
async fn test_verbindung_bis_eof() {
    let hub = test_hub();
    let u1 = Identity::from("u1");

    LocalSet::new()
        .run_until(async {
            let (client_io, server_io) = tokio::io::duplex(64 * 1024);
            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let verbindung = ClientConnection::neu(Arc::clone(&hub.state), peer());
            let task = tokio::task::spawn_local(verbindung.verarbeiten(server_io, shutdown_rx));

            let mut client = Framed::new(client_io, ClientCodec::new());
            client.send(connect("u1")).await.unwrap();
            assert_eq!(
                naechstes(&mut client).await,
                Ausgehend::OnlineUsers(vec![u1.clone()])
            );

            client
                .send(Eingehend::Ping(PingMessage { timestamp_ms: 7 }))
                .await
                .unwrap();
            match naechstes(&mut client).await {
                Ausgehend::Pong(pong) => assert_eq!(pong.echo_timestamp_ms, 7),
                anderes => panic!("Pong erwartet, bekam {:?}", anderes),
            }

            drop(client);
            task.await.unwrap();
        })
        .await;

    assert!(!hub.state.registry.ist_online(&u1));
    assert!(hub.state.presence.last_seen_zeitpunkt(&u1).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_inaktive_verbindung_wird_getrennt() {
    let hub = test_hub_mit(HubConfig {
        keepalive_sek: 1,
        verbindungs_timeout_sek: 3,
        ..HubConfig::default()
    });

    LocalSet::new()
        .run_until(async {
            let (client_io, server_io) = tokio::io::duplex(64 * 1024);
            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let verbindung = ClientConnection::neu(Arc::clone(&hub.state), peer());
            let task = tokio::task::spawn_local(verbindung.verarbeiten(server_io, shutdown_rx));

            let mut client = Framed::new(client_io, ClientCodec::new());
            client.send(connect("still")).await.unwrap();

            // Client antwortet nie auf Pings
            task.await.unwrap();

            let mut pings = 0;
            while let Some(Ok(event)) = client.next().await {
                if matches!(event, Ausgehend::Ping(_)) {
                    pings += 1;
                }
            }
            assert!(pings >= 2, "mindestens zwei Keepalive-Pings erwartet, bekam {}", pings);
        })
        .await;

    assert!(!hub.state.registry.ist_online(&Identity::from("still")));
}

#[tokio::test]
async fn test_shutdown_trennt_mit_abschied() {
    let hub = test_hub();

    LocalSet::new()
        .run_until(async {
            let (client_io, server_io) = tokio::io::duplex(64 * 1024);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let verbindung = ClientConnection::neu(Arc::clone(&hub.state), peer());
            let task = tokio::task::spawn_local(verbindung.verarbeiten(server_io, shutdown_rx));

            let mut client = Framed::new(client_io, ClientCodec::new());
            client.send(connect("u1")).await.unwrap();
            naechstes(&mut client).await;

            shutdown_tx.send(true).unwrap();
            match naechstes(&mut client).await {
                Ausgehend::Error(info) => assert_eq!(info.code, ErrorCode::InternalError),
                anderes => panic!("Abschied erwartet, bekam {:?}", anderes),
            }
            task.await.unwrap();
            assert!(client.next().await.is_none());
        })
        .await;

    assert_eq!(hub.state.registry.anzahl(), 0);
}

#[tokio::test]
async fn test_tcp_ende_zu_ende() {
    let hub = test_hub();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HubServer::neu(Arc::clone(&hub.state), addr);

    let clients = async {
        let mut u1 = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
        u1.send(connect("u1")).await.unwrap();
        assert_eq!(
            naechstes(&mut u1).await,
            Ausgehend::OnlineUsers(vec![Identity::from("u1")])
        );

        let mut u2 = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
        u2.send(connect("u2")).await.unwrap();
        let beide = Ausgehend::OnlineUsers(vec![Identity::from("u1"), Identity::from("u2")]);
        assert_eq!(naechstes(&mut u2).await, beide);
        assert_eq!(naechstes(&mut u1).await, beide);

        u1.send(text_an("u2", "ueber TCP")).await.unwrap();
        for client in [&mut u2, &mut u1] {
            match naechstes(client).await {
                Ausgehend::RecieveMessage(n) => {
                    assert_eq!(n.content.as_deref(), Some("ueber TCP"));
                    assert_eq!(n.sender.id, Identity::from("u1"));
                }
                anderes => panic!("recieveMessage erwartet, bekam {:?}", anderes),
            }
        }

        shutdown_tx.send(true).unwrap();
        assert!(matches!(naechstes(&mut u1).await, Ausgehend::Error(_)));
    };

    let (ergebnis, ()) = tokio::join!(server.mit_listener(listener, shutdown_rx), clients);
    ergebnis.unwrap();
    assert_eq!(hub.store.nachrichten_anzahl(), 1);
}

#[tokio::test]
async fn test_tcp_server_voll() {
    let hub = test_hub_mit(HubConfig {
        max_clients: 1,
        ..HubConfig::default()
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HubServer::neu(Arc::clone(&hub.state), addr);

    let clients = async {
        let mut erster = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
        erster.send(connect("u1")).await.unwrap();
        naechstes(&mut erster).await;

        let mut zweiter = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
        match naechstes(&mut zweiter).await {
            Ausgehend::Error(info) => assert_eq!(info.code, ErrorCode::ServerFull),
            anderes => panic!("SERVER_FULL erwartet, bekam {:?}", anderes),
        }

        shutdown_tx.send(true).unwrap();
    };

    let (ergebnis, ()) = tokio::join!(server.mit_listener(listener, shutdown_rx), clients);
    ergebnis.unwrap();
}
