//! End-to-end tests: a real server, real WebSocket clients, JSON frames.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use skulk::prelude::*;
use tokio::io::AsyncReadExt;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn builder() -> SkulkServerBuilder {
    let settings = RoomSettings {
        rng_seed: Some(7),
        ..RoomSettings::default()
    };
    SkulkServer::builder().bind("127.0.0.1:0").settings(settings)
}

/// Builds the server, spawns its accept loop, and returns the address.
async fn start_with(builder: SkulkServerBuilder) -> String {
    let server = builder.build().await.expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    start_with(builder()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_raw(ws: &mut ClientWs, text: &str) {
    ws.send(Message::Text(text.to_owned().into()))
        .await
        .expect("send");
}

async fn send(ws: &mut ClientWs, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).expect("encode");
    send_raw(ws, &text).await;
}

/// Next event as raw JSON.
async fn recv_json(ws: &mut ClientWs) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("recv");
        if msg.is_text() {
            return serde_json::from_slice(&msg.into_data()).expect("decode");
        }
    }
}

async fn recv(ws: &mut ClientWs) -> ServerMessage {
    serde_json::from_value(recv_json(ws).await).expect("known event")
}

/// Skips events until one matches.
async fn recv_until(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let msg = recv(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
}

/// Connects, consumes the greeting, and authenticates.
async fn player(addr: &str, address: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Welcome { .. }));
    assert!(matches!(recv(&mut ws).await, ServerMessage::RoomList { .. }));
    let auth = ClientMessage::Authenticate {
        address: Address::new(address),
        name: None,
    };
    send(&mut ws, &auth).await;
    ws
}

async fn create_room(ws: &mut ClientWs) -> RoomId {
    let create = ClientMessage::CreateRoom {
        max_players: None,
        impostor_count: None,
    };
    send(ws, &create).await;
    match recv_until(ws, |m| matches!(m, ServerMessage::RoomCreated { .. })).await {
        ServerMessage::RoomCreated { room } => room.room_id,
        _ => unreachable!(),
    }
}

fn join(room_id: RoomId) -> ClientMessage {
    ClientMessage::JoinRoom {
        room_id,
        color: None,
        as_spectator: false,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_greeting_is_welcome_then_room_list() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let welcome = recv_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    assert!(welcome["connection_id"].is_u64());
    assert!(welcome["server_time"].as_i64().unwrap() > 0);

    let list = recv_json(&mut ws).await;
    assert_eq!(list["type"], "room_list");
    assert_eq!(list["rooms"], serde_json::json!([]));
}

#[tokio::test]
async fn test_malformed_frames_are_rejected_and_connection_survives() {
    let addr = start_server().await;
    let mut ws = player(&addr, "0xaa").await;

    for frame in [
        "{{{",
        r#"{"type":"teleport","room_id":1}"#,
        r#"{"type":"vote","room_id":"one","target":null}"#,
    ] {
        send_raw(&mut ws, frame).await;
        let err = recv_json(&mut ws).await;
        assert_eq!(err["type"], "error");
        assert_eq!(err["code"], "INVALID_MESSAGE");
    }

    let room_id = create_room(&mut ws).await;
    assert_eq!(room_id, RoomId(1));
}

#[tokio::test]
async fn test_precondition_errors_carry_codes() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    recv(&mut ws).await;
    recv(&mut ws).await;

    send(&mut ws, &join(RoomId(42))).await;
    let err = recv_json(&mut ws).await;
    assert_eq!(err["code"], "ROOM_NOT_FOUND");

    let room_id = create_room(&mut ws).await;
    send(&mut ws, &join(room_id)).await;
    let err = recv_until(&mut ws, |m| matches!(m, ServerMessage::Error { .. })).await;
    assert!(matches!(
        err,
        ServerMessage::Error { code: ErrorCode::NotAuthenticated, .. }
    ));
}

#[tokio::test]
async fn test_four_players_start_a_game() {
    let addr = start_server().await;
    let mut clients = Vec::new();
    for i in 0..4 {
        clients.push(player(&addr, &format!("0x{i}")).await);
    }
    let room_id = create_room(&mut clients[0]).await;
    for ws in &mut clients {
        send(ws, &join(room_id)).await;
        recv_until(ws, |m| matches!(m, ServerMessage::RoomUpdate { .. })).await;
    }

    send(&mut clients[0], &ClientMessage::StartGame { room_id }).await;
    for ws in &mut clients {
        let changed = loop {
            let v = recv_json(ws).await;
            if v["type"] == "phase_changed" {
                break v;
            }
        };
        // Integer phase codes on the wire.
        assert_eq!(changed["phase"], 1);
        assert_eq!(changed["previous_phase"], 0);
        assert_eq!(changed["round"], 1);
        assert_eq!(changed["room_id"], room_id.0);

        let update = recv(ws).await;
        let ServerMessage::RoomUpdate { room } = update else {
            panic!("expected room_update, got {update:?}");
        };
        assert_eq!(room.phase, Phase::ActionCommit);
        assert_eq!(room.players.len(), 4);
    }
}

#[tokio::test]
async fn test_disconnect_is_a_leave() {
    let addr = start_server().await;
    let mut a = player(&addr, "0xa").await;
    let mut b = player(&addr, "0xb").await;
    let room_id = create_room(&mut a).await;
    send(&mut a, &join(room_id)).await;
    send(&mut b, &join(room_id)).await;
    recv_until(&mut a, |m| {
        matches!(m, ServerMessage::RoomUpdate { room } if room.players.len() == 2)
    })
    .await;

    drop(b);

    let left = recv_until(&mut a, |m| matches!(m, ServerMessage::PlayerLeft { .. })).await;
    assert!(matches!(
        left,
        ServerMessage::PlayerLeft { spectator: false, address: Some(ref who), .. }
            if who.as_str() == "0xb"
    ));
}

#[tokio::test]
async fn test_idle_socket_does_not_block_accepts() {
    let addr = start_server().await;

    // Opens TCP and never sends the upgrade request.
    let _idle = tokio::net::TcpStream::connect(&addr).await.expect("tcp");

    let mut ws = tokio::time::timeout(Duration::from_secs(3), connect(&addr))
        .await
        .expect("second client should not wait on the idle socket");
    assert!(matches!(recv(&mut ws).await, ServerMessage::Welcome { .. }));
}

#[tokio::test]
async fn test_handshake_timeout_drops_idle_socket() {
    let addr = start_with(builder().handshake_timeout(Duration::from_millis(100))).await;

    let mut idle = tokio::net::TcpStream::connect(&addr).await.expect("tcp");
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
        .await
        .expect("server should close the idle socket");
    // EOF or reset, never data.
    assert!(matches!(read, Ok(0) | Err(_)));

    // The server keeps serving.
    let mut ws = connect(&addr).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Welcome { .. }));
}
