mod support;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message, protocol::frame::coding::CloseCode},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn ws_url(base_url: &str, room_id: &str) -> String {
    format!(
        "{}/ws?room_id={room_id}",
        base_url.replacen("http://", "ws://", 1)
    )
}

async fn connect(room_id: &str) -> Socket {
    let base_url = support::ensure_server();
    let (socket, _) = connect_async(ws_url(base_url, room_id))
        .await
        .expect("websocket should connect");
    socket
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

// Next server message of the given type, skipping room updates and control frames.
async fn next_of_type(socket: &mut Socket, wanted: &str) -> Value {
    next_of_type_within(socket, wanted, Duration::from_secs(5)).await
}

async fn next_of_type_within(socket: &mut Socket, wanted: &str, limit: Duration) -> Value {
    let read = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).expect("server sends json");
                    if value["type"] == wanted {
                        return value;
                    }
                }
                Some(Ok(Message::Close(frame))) => panic!("socket closed early: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("socket error: {e}"),
                None => panic!("socket ended before {wanted}"),
            }
        }
    };
    tokio::time::timeout(limit, read)
        .await
        .expect("message should arrive in time")
}

async fn next_close(socket: &mut Socket) -> (CloseCode, String) {
    let read = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(Some(frame)))) => {
                    return (frame.code, frame.reason.as_str().to_string());
                }
                Some(Ok(Message::Close(None))) | None => panic!("closed without a frame"),
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("socket error: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("close should arrive in time")
}

#[tokio::test]
async fn test_join_then_leave_settles_balance() {
    let mut socket = connect("main").await;
    let player_id = 4101;

    send_json(
        &mut socket,
        json!({ "type": "Join", "data": { "session_token": format!("player-{player_id}") } }),
    )
    .await;

    let identity = next_of_type(&mut socket, "Identity").await;
    assert_eq!(identity["data"]["player_id"], player_id.to_string());

    let joined = next_of_type(&mut socket, "Joined").await;
    assert_eq!(joined["data"]["name"], format!("Tester{player_id}"));
    assert_eq!(joined["data"]["balance"], support::ENTRY_FEE);
    assert_eq!(joined["data"]["length"], 10);

    // The snake shows up in the room's broadcast.
    let update = loop {
        let update = next_of_type(&mut socket, "WorldUpdate").await;
        let snakes = update["data"]["snakes"].as_array().cloned().unwrap_or_default();
        if snakes.iter().any(|s| s["id"] == player_id.to_string()) {
            break update;
        }
    };
    assert_eq!(update["data"]["room_id"], "main");

    send_json(
        &mut socket,
        json!({ "type": "Input", "data": { "heading": 1.0, "boosting": false } }),
    )
    .await;
    send_json(&mut socket, json!({ "type": "Leave" })).await;

    let saved = next_of_type(&mut socket, "BalanceSaved").await;
    let final_balance = saved["data"]["final_balance"]
        .as_u64()
        .expect("final balance");
    // Pellets eaten on the way can only add to the entry fee.
    assert!(final_balance >= support::ENTRY_FEE);
    assert_eq!(
        support::settlements_for(&support::session_id_for(player_id)),
        vec![final_balance]
    );

    let (code, reason) = next_close(&mut socket).await;
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(reason, "left");
}

// Heading that points the snake at the closest edge of the 3000x3000 world.
fn heading_to_nearest_wall(head: &Value) -> f64 {
    let x = head[0].as_f64().expect("head x");
    let y = head[1].as_f64().expect("head y");
    let size = 3000.0;
    let walls = [
        (x, std::f64::consts::PI),
        (size - x, 0.0),
        (y, -std::f64::consts::FRAC_PI_2),
        (size - y, std::f64::consts::FRAC_PI_2),
    ];
    walls
        .iter()
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, heading)| *heading)
        .expect("four walls")
}

#[tokio::test]
async fn test_death_reports_died_and_settles_zero() {
    let mut socket = connect("main").await;
    let player_id = 4102;

    send_json(
        &mut socket,
        json!({ "type": "Join", "data": { "session_token": format!("player-{player_id}") } }),
    )
    .await;
    next_of_type(&mut socket, "Identity").await;
    let joined = next_of_type(&mut socket, "Joined").await;
    let heading = heading_to_nearest_wall(&joined["data"]["body"][0]);

    send_json(
        &mut socket,
        json!({ "type": "Input", "data": { "heading": heading, "boosting": true } }),
    )
    .await;

    // At most half the world away; boosting covers that well inside the limit.
    let died = next_of_type_within(&mut socket, "Died", Duration::from_secs(20)).await;
    assert!(died["data"]["transferred_amount"].is_u64());

    let (code, reason) = next_close(&mut socket).await;
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(reason, "died");
    // A killed player cashes out nothing.
    assert_eq!(
        support::settlements_for(&support::session_id_for(player_id)),
        vec![0]
    );
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let mut socket = connect("main").await;

    send_json(
        &mut socket,
        json!({ "type": "Join", "data": { "session_token": "not-a-player" } }),
    )
    .await;

    let (code, reason) = next_close(&mut socket).await;
    assert_eq!(code, CloseCode::Policy);
    assert_eq!(reason, "invalid session token");
}

#[tokio::test]
async fn test_insufficient_funds_is_rejected() {
    let mut socket = connect("main").await;

    send_json(
        &mut socket,
        json!({ "type": "Join", "data": { "session_token": "broke-7" } }),
    )
    .await;

    let (code, reason) = next_close(&mut socket).await;
    assert_eq!(code, CloseCode::Policy);
    assert_eq!(reason, "insufficient funds");
}

#[tokio::test]
async fn test_input_before_join_is_rejected() {
    let mut socket = connect("main").await;

    send_json(&mut socket, json!({ "type": "Input", "data": { "heading": 0.5 } })).await;

    let (code, reason) = next_close(&mut socket).await;
    assert_eq!(code, CloseCode::Policy);
    assert_eq!(reason, "join required");
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let base_url = support::ensure_server();

    let result = connect_async(ws_url(base_url, "no-such-room")).await;

    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 404),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should be refused"),
    }
}
