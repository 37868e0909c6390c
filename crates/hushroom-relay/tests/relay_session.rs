#![allow(clippy::unwrap_used, clippy::panic)]
//! End-to-end tests against a relay bound to an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use hushroom_core::RelayConfig;
use hushroom_crypto::{ClientKeyAgreement, RelayVerifyingKey, ServerKey, test_signing_key};
use hushroom_proto::{HandshakeReply, ServerAction, ServerKeyAnnouncement};
use hushroom_relay::server::RelayServer;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ROOM: &str = "c4b4b2c1d2b5e9bb2d3dd2e7b9f4cf3e5f71a0e68b1a1c9c3d6b9f08e1a2b3c4";

async fn start_relay() -> SocketAddr {
    let config = RelayConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        ..RelayConfig::default()
    };
    let server = RelayServer::bind(&config, test_signing_key().clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(std::future::pending()));
    addr
}

async fn next_message(ws: &mut Ws) -> Option<Message> {
    timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .and_then(Result::ok)
}

async fn next_text(ws: &mut Ws) -> String {
    loop {
        match next_message(ws).await {
            Some(Message::Text(text)) => return text,
            Some(_) => {}
            None => panic!("connection closed while waiting for a text frame"),
        }
    }
}

async fn next_action(ws: &mut Ws, key: &ServerKey) -> ServerAction {
    key.decrypt(&next_text(ws).await).unwrap()
}

async fn send_action(ws: &mut Ws, key: &ServerKey, action: &ServerAction) {
    ws.send(Message::Text(key.encrypt(action).unwrap()))
        .await
        .unwrap();
}

async fn connect(addr: SocketAddr) -> (Ws, RelayVerifyingKey) {
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let announcement = ServerKeyAnnouncement::parse(&next_text(&mut ws).await).unwrap();
    let relay_key = RelayVerifyingKey::from_spki_base64(&announcement.key).unwrap();
    (ws, relay_key)
}

async fn connect_secured(addr: SocketAddr) -> (Ws, ServerKey) {
    let (mut ws, relay_key) = connect(addr).await;
    let agreement = ClientKeyAgreement::new();
    ws.send(Message::Text(agreement.public_hex())).await.unwrap();
    let reply: HandshakeReply = next_text(&mut ws).await.parse().unwrap();
    let key = agreement
        .complete(&reply.public_key_hex, &reply.signature_b64, &relay_key)
        .unwrap();
    (ws, key)
}

fn join() -> ServerAction {
    ServerAction::Join {
        channel_hash: ROOM.into(),
    }
}

#[tokio::test]
async fn announces_its_signing_key() {
    let addr = start_relay().await;
    let (_ws, relay_key) = connect(addr).await;
    assert_eq!(relay_key, test_signing_key().verifying_key());
}

#[tokio::test]
async fn ping_is_answered_in_both_phases() {
    let addr = start_relay().await;
    let (mut ws, _) = connect(addr).await;
    ws.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "pong");

    let (mut secured, _) = connect_secured(addr).await;
    secured.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_text(&mut secured).await, "pong");
}

#[tokio::test]
async fn invalid_handshake_closes_connection() {
    let addr = start_relay().await;
    let (mut ws, _) = connect(addr).await;
    ws.send(Message::Text("not a public key".into()))
        .await
        .unwrap();
    assert!(!matches!(next_message(&mut ws).await, Some(Message::Text(_))));
}

#[tokio::test]
async fn members_route_opaque_payloads() {
    let addr = start_relay().await;
    let (mut a, key_a) = connect_secured(addr).await;
    let (mut b, key_b) = connect_secured(addr).await;

    send_action(&mut a, &key_a, &join()).await;
    assert_eq!(
        next_action(&mut a, &key_a).await,
        ServerAction::Members { members: vec![] }
    );

    send_action(&mut b, &key_b, &join()).await;
    let ServerAction::Members { members } = next_action(&mut a, &key_a).await else {
        panic!("expected a member list");
    };
    assert_eq!(members.len(), 1);
    let b_id = members[0].clone();

    let ServerAction::Members { members } = next_action(&mut b, &key_b).await else {
        panic!("expected a member list");
    };
    let a_id = members[0].clone();

    let opaque = "AAECAwQFBgcICQoL|AQEBAQ==|ZW5jcnlwdGVk".to_string();
    send_action(
        &mut a,
        &key_a,
        &ServerAction::Direct {
            payload: opaque.clone(),
            peer: b_id,
        },
    )
    .await;
    assert_eq!(
        next_action(&mut b, &key_b).await,
        ServerAction::Direct {
            payload: opaque,
            peer: a_id,
        }
    );

    drop(a);
    assert_eq!(
        next_action(&mut b, &key_b).await,
        ServerAction::Members { members: vec![] }
    );
}
