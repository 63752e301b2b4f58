// Framework bootstrap for the game server runtime.

use crate::domain::tuning::RoomTuning;
use crate::frameworks::config::{self, ServerConfig};
use crate::interface_adapters::clients::ledger::LedgerClient;
use crate::interface_adapters::net::{
    create_room_handler, room_snapshot_handler, spawn_orphan_settler, spawn_room_serializer,
    ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RoomRegistry, RoomSettings};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    serve(listener, ServerConfig::from_env()).await
}

pub async fn serve(listener: tokio::net::TcpListener, server_config: ServerConfig) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(server_config).await?;

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", post(create_room_handler))
        .route("/rooms/{room_id}/snapshot", get(room_snapshot_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn build_state(server_config: ServerConfig) -> Result<Arc<AppState>> {
    let ledger_base_url = server_config.ledger_service_url;
    let ledger_timeout = server_config.ledger_timeout;
    let ledger_client = LedgerClient::new(ledger_base_url.clone(), ledger_timeout)
        .map_err(|e| std::io::Error::other(format!("failed to initialize ledger client: {e}")))?;
    tracing::debug!(
        ledger_base_url = %ledger_base_url,
        ledger_timeout_ms = ledger_timeout.as_millis(),
        "ledger client configured"
    );

    let seed = server_config.room_seed;
    let room_registry = Arc::new(RoomRegistry::new(RoomSettings {
        event_channel_capacity: config::EVENT_CHANNEL_CAPACITY,
        update_broadcast_capacity: config::UPDATE_BROADCAST_CAPACITY,
        tick_interval: config::TICK_INTERVAL,
        tuning: RoomTuning::default(),
        seed,
    }));
    let ledger_client = Arc::new(ledger_client);
    spawn_orphan_settler(room_registry.subscribe_orphans(), ledger_client.clone());
    room_registry.spawn_tick_scheduler();

    // Boot rooms from configuration; the first is the default.
    let room_ids = server_config.room_ids;
    for room_id in &room_ids {
        let room = room_registry
            .create_room(room_id.clone())
            .await
            .map_err(|e| std::io::Error::other(format!("failed to create room {room_id}: {e:?}")))?;
        spawn_room_serializer(&room);
    }
    tracing::info!(
        rooms = ?room_ids,
        seed,
        tick_ms = config::TICK_INTERVAL.as_millis(),
        "rooms ready"
    );

    let default_room_id = room_ids
        .first()
        .map(String::as_str)
        .unwrap_or(config::DEFAULT_ROOM_ID);

    Ok(Arc::new(AppState {
        room_registry,
        default_room_id: Arc::from(default_room_id),
        ledger_client,
    }))
}
