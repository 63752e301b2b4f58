// Shared bootstrap for integration tests: one fake ledger and one game server per test binary.
#![allow(dead_code)]

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use serde_json::{Value, json};
use snake_arena::ServerConfig;
use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

// Entry fee the fake ledger charges for every verified token.
pub const ENTRY_FEE: u64 = 25;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();
// Settlements received by the fake ledger, as (session_id, final_balance).
static SETTLEMENTS: Mutex<Vec<(String, u64)>> = Mutex::new(Vec::new());

/// Ensure the fake ledger and game server are running and return the game server URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // An OS thread so the servers outlive individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let ledger_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ledger port");
                let ledger_addr = ledger_listener.local_addr().expect("ledger addr");
                tokio::spawn(async move {
                    axum::serve(ledger_listener, fake_ledger())
                        .await
                        .expect("fake ledger failed");
                });

                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));

                let config = ServerConfig {
                    ledger_service_url: format!("http://{}", ledger_addr),
                    ledger_timeout: Duration::from_millis(1500),
                    room_ids: vec!["main".to_string()],
                    room_seed: 7,
                };
                snake_arena::serve(listener, config)
                    .await
                    .expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

/// Final balances the fake ledger has been asked to settle for a session.
pub fn settlements_for(session_id: &str) -> Vec<u64> {
    SETTLEMENTS
        .lock()
        .expect("settlements lock")
        .iter()
        .filter(|(id, _)| id == session_id)
        .map(|(_, balance)| *balance)
        .collect()
}

/// Session id the fake ledger hands out for a `player-<id>` token.
pub fn session_id_for(player_id: u64) -> String {
    format!("sess-{player_id}")
}

fn fake_ledger() -> Router {
    Router::new()
        .route("/ledger/verify-entry", post(verify_entry))
        .route("/ledger/settle", post(settle))
}

// Tokens look like `player-<id>`; `broke-<id>` simulates an empty wallet.
async fn verify_entry(Json(body): Json<Value>) -> impl IntoResponse {
    let token = body["token"].as_str().unwrap_or_default();
    if let Some(id) = token.strip_prefix("broke-") {
        return (StatusCode::PAYMENT_REQUIRED, Json(json!({ "error": id }))).into_response();
    }
    let Some(player_id) = token
        .strip_prefix("player-")
        .and_then(|id| id.parse::<u64>().ok())
    else {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid token" })))
            .into_response();
    };

    Json(json!({
        "player_id": player_id,
        "display_name": format!("Tester{player_id}"),
        "entry_fee": ENTRY_FEE,
        "session_id": session_id_for(player_id),
    }))
    .into_response()
}

async fn settle(Json(body): Json<Value>) -> impl IntoResponse {
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    let final_balance = body["final_balance"].as_u64().unwrap_or_default();
    SETTLEMENTS
        .lock()
        .expect("settlements lock")
        .push((session_id, final_balance));
    StatusCode::NO_CONTENT
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}
