use crate::domain::{KillEvent, PlayerInput, RoomError};
use crate::interface_adapters::clients::ledger::{
    LedgerClient, LedgerError, SettleRequest, VerifiedEntry,
};
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{ClientMessage, ServerMessage, SnakeDto, WorldUpdateDto};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::conn_id;
use crate::use_cases::{InputDelivery, OrphanedBalance, RoomHandle, RoomUpdate};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    RoomClosed,
    UpdatesClosed,
    JoinRequired,
    JoinTimeout,
    LedgerVerify,
    #[allow(dead_code)]
    RoomJoin(RoomError),
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct RoomQuery {
    // The room id the client wants to join.
    #[serde(default)]
    room_id: Option<String>,
}

pub async fn room_update_serializer(
    mut update_rx: broadcast::Receiver<RoomUpdate>,
    update_bytes_tx: broadcast::Sender<Utf8Bytes>,
    update_latest_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each room update once and broadcast the shared bytes.
    loop {
        match update_rx.recv().await {
            Ok(update) => {
                let msg = ServerMessage::WorldUpdate(WorldUpdateDto::from(&update));
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, tick = update.tick, "failed to serialize room update");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                // Latest bytes back lag recovery and the snapshot route.
                let _ = update_latest_tx.send(bytes.clone());
                let _ = update_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "room serializer lagged; skipping to latest update");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("room updates channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub fn spawn_room_serializer(room: &RoomHandle) {
    tokio::spawn(
        room_update_serializer(
            room.update_tx.subscribe(),
            room.update_bytes_tx.clone(),
            room.update_latest_tx.clone(),
        )
        .instrument(info_span!("serializer", room_id = %room.room_id)),
    );
}

/// Settles balances of joins whose connection went away before the snake was confirmed.
pub async fn orphan_settler(
    mut orphan_rx: broadcast::Receiver<OrphanedBalance>,
    ledger: Arc<LedgerClient>,
) {
    loop {
        match orphan_rx.recv().await {
            Ok(orphan) => {
                let saved = settle_balance(
                    &ledger,
                    &orphan.session_id,
                    orphan.player_id,
                    orphan.balance,
                )
                .await;
                info!(
                    player_id = orphan.player_id,
                    balance = orphan.balance,
                    saved,
                    "orphaned join settled"
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                error!(missed = n, critical = true, "orphaned balances dropped before settlement");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("orphan channel closed; settler exiting");
                break;
            }
        }
    }
}

pub fn spawn_orphan_settler(
    orphan_rx: broadcast::Receiver<OrphanedBalance>,
    ledger: Arc<LedgerClient>,
) {
    tokio::spawn(orphan_settler(orphan_rx, ledger).instrument(info_span!("orphans")));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> impl IntoResponse {
    let room_id = query
        .room_id
        .unwrap_or_else(|| state.default_room_id.to_string());

    let Some(room) = state.room_registry.get_room(&room_id).await else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };

    let ledger = state.ledger_client.clone();
    ws.on_upgrade(move |socket| {
        // Separate connection id for correlating logs before/after a player_id exists.
        let span = info_span!(
            "conn",
            conn_id = conn_id(),
            room_id = %room.room_id,
            player_id = tracing::field::Empty
        );
        handle_socket(socket, room, ledger).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, room: RoomHandle, ledger: Arc<LedgerClient>) {
    let mut ctx = match bootstrap_connection(&mut socket, &room, ledger).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client disconnected before join handshake");
            return;
        }
        Err(e) => {
            warn!(error = ?e, "failed to bootstrap connection");
            return;
        }
    };

    tracing::Span::current().record("player_id", ctx.player_id);
    info!(
        player_id = ctx.player_id,
        session_id = %ctx.session_id,
        display_name = %ctx.display_name,
        "client joined room"
    );

    let end = match run_client_loop(&mut socket, &mut ctx).await {
        Ok(end) => end,
        Err(e) => {
            warn!(error = ?e, "client loop exited with error");
            SessionEnd::Disconnected
        }
    };

    finish_session(&mut socket, &ctx, end).await;
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    pub player_id: u64,
    pub session_id: String,
    pub display_name: String,
    pub room: RoomHandle,
    pub ledger: Arc<LedgerClient>,
    pub update_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    pub update_latest_rx: watch::Receiver<Utf8Bytes>,
    pub kill_rx: broadcast::Receiver<KillEvent>,
    // Count lag recovery snapshots sent to this client.
    pub lag_recovery_count: u64,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_input_full_log: Instant,
    pub last_update_lag_log: Instant,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

/// How a joined session ended; decides what gets settled.
#[derive(Debug)]
enum SessionEnd {
    Died(KillEvent),
    // The client asked to cash out; the socket is still open.
    Left,
    Disconnected,
}

struct JoinHandshake {
    entry: VerifiedEntry,
    bytes_in: u64,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    room: &RoomHandle,
    ledger: Arc<LedgerClient>,
) -> Result<ConnCtx, NetError> {
    // Subscribe before any await so no update or kill is missed once joined.
    let update_bytes_rx = room.update_bytes_tx.subscribe();
    let update_latest_rx = room.update_latest_tx.subscribe();
    let kill_rx = room.kill_tx.subscribe();

    let join = match timeout(
        JOIN_HANDSHAKE_TIMEOUT,
        read_join_handshake(socket, ledger.as_ref()),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
            return Err(NetError::JoinTimeout);
        }
    };
    let entry = join.entry;
    let player_id = entry.player_id;

    let identity_msg = ServerMessage::Identity {
        player_id: player_id.to_string(),
    };
    if let Err(err) = send_message(socket, &identity_msg).await {
        // The fee is already charged; hand it back.
        refund_entry(&ledger, &entry).await;
        return Err(err);
    }

    // The room applies the join at the start of its next tick.
    let snake = match room
        .join(
            player_id,
            entry.display_name.clone(),
            entry.entry_fee,
            entry.session_id.clone(),
        )
        .await
    {
        Ok(snake) => snake,
        Err(e) => {
            let reason = match e {
                RoomError::AlreadyJoined => "already in room",
                RoomError::InvalidInput(_) => "invalid player",
                RoomError::RoomClosed | RoomError::UnknownPlayer => "room unavailable",
            };
            refund_entry(&ledger, &entry).await;
            let _ = send_close_with_reason(socket, close_code::POLICY, reason).await;
            return Err(NetError::RoomJoin(e));
        }
    };

    let joined_msg = ServerMessage::Joined(SnakeDto::from(&snake));
    let msgs_out = match send_message(socket, &joined_msg).await {
        Ok(_) => 2,
        Err(err) => {
            // Spawned but unreachable: cash the snake straight back out.
            if let Ok(balance) = room.leave(player_id).await {
                settle_balance(&ledger, &entry.session_id, player_id, balance).await;
            }
            return Err(err);
        }
    };

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        player_id,
        session_id: entry.session_id,
        display_name: entry.display_name,
        room: room.clone(),
        ledger,
        update_bytes_rx,
        update_latest_rx,
        kill_rx,
        lag_recovery_count: 0,

        msgs_in: 1,
        msgs_out,
        bytes_in: join.bytes_in,
        bytes_out: 0,

        invalid_json: 0,

        last_input_full_log: now,
        last_update_lag_log: now,
        last_invalid_input_log: now,

        close_frame: None,
    })
}

enum LoopControl {
    Continue,
    Leave,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_SESSION_TOKEN_LEN: usize = 4096;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

async fn read_join_handshake(
    socket: &mut WebSocket,
    ledger: &LedgerClient,
) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(payload)) => payload,
                    Ok(ClientMessage::Input(_) | ClientMessage::Leave) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid join payload",
                        )
                        .await;
                        return Err(NetError::JoinRequired);
                    }
                };

                let session_token = payload.session_token.trim();
                if session_token.is_empty() || session_token.len() > MAX_SESSION_TOKEN_LEN {
                    let _ =
                        send_close_with_reason(socket, close_code::POLICY, "invalid session token")
                            .await;
                    return Err(NetError::LedgerVerify);
                }

                let entry = match ledger.verify_entry(session_token).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        let (code, reason) = match e {
                            LedgerError::InvalidToken => {
                                (close_code::POLICY, "invalid session token")
                            }
                            LedgerError::InsufficientFunds => {
                                (close_code::POLICY, "insufficient funds")
                            }
                            LedgerError::UpstreamUnavailable | LedgerError::SettleUnconfirmed => {
                                (close_code::ERROR, "ledger unavailable")
                            }
                        };
                        debug!(error = ?e, "entry verification failed");
                        let _ = send_close_with_reason(socket, code, reason).await;
                        return Err(NetError::LedgerVerify);
                    }
                };

                return Ok(JoinHandshake { entry, bytes_in });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

fn process_input_message(
    player_id: u64,
    room: &RoomHandle,
    input: PlayerInput,
    last_input_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
) -> Result<LoopControl, NetError> {
    match room.apply_input(player_id, input) {
        Ok(InputDelivery::Queued) => Ok(LoopControl::Continue),
        Ok(InputDelivery::Dropped) => {
            if should_log(last_input_full_log) {
                warn!(player_id, "room queue full; dropping input");
            }
            Ok(LoopControl::Continue)
        }
        Err(RoomError::RoomClosed) => Err(NetError::RoomClosed),
        Err(e) => {
            if should_log(last_invalid_input_log) {
                warn!(player_id, error = ?e, "invalid input; dropping");
            }
            Ok(LoopControl::Continue)
        }
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<SessionEnd, NetError> {
    let player_id = ctx.player_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        room,
        update_bytes_rx,
        update_latest_rx,
        kill_rx,
        lag_recovery_count,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_input_full_log,
        last_update_lag_log,
        last_invalid_input_log,
        close_frame,
        ..
    } = ctx;

    let end = loop {
        let control: Result<LoopControl, NetError> = tokio::select! {
            incoming = socket.recv() => {
                handle_incoming_ws(
                    incoming,
                    player_id,
                    room,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_input_full_log,
                    last_invalid_input_log,
                    close_frame,
                )
            }

            update = update_bytes_rx.recv() => {
                match update {
                    Ok(bytes) => Ok(forward_update_bytes(bytes, socket, msgs_out, bytes_out).await),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_update_lag_log) {
                            warn!(missed = n, "room updates lagged; sending snapshot");
                        }

                        // Resync strategy: send the latest room snapshot.
                        let latest = update_latest_rx.borrow().clone();
                        if latest.is_empty() {
                            Ok(LoopControl::Continue)
                        } else {
                            *lag_recovery_count += 1;
                            Ok(forward_update_bytes(latest, socket, msgs_out, bytes_out).await)
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => Err(NetError::UpdatesClosed),
                }
            }

            kill = kill_rx.recv() => {
                match kill {
                    Ok(event) if event.victim_id == player_id => {
                        break SessionEnd::Died(event);
                    }
                    Ok(_) => Ok(LoopControl::Continue),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // A missed own death surfaces later as UnknownPlayer on leave.
                        warn!(missed = n, "kill events lagged");
                        Ok(LoopControl::Continue)
                    }
                    Err(broadcast::error::RecvError::Closed) => Err(NetError::RoomClosed),
                }
            }
        };

        match control {
            Ok(LoopControl::Continue) => {}
            Ok(LoopControl::Leave) => break SessionEnd::Left,
            Ok(LoopControl::Disconnect) => break SessionEnd::Disconnected,
            Err(e) => {
                // The room is gone; still try to cash out whatever it will report.
                warn!(error = ?e, "connection loop failed");
                break SessionEnd::Disconnected;
            }
        }
    };

    debug!(
        player_id,
        msgs_in = *msgs_in,
        msgs_out = *msgs_out,
        bytes_in = *bytes_in,
        bytes_out = *bytes_out,
        invalid_json = *invalid_json,
        lag_recovery_count = *lag_recovery_count,
        "connection stats"
    );
    Ok(end)
}

#[allow(clippy::too_many_arguments)]
fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    player_id: u64,
    room: &RoomHandle,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_input_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(_)) => {
                        // Repeated Join packets are ignored to keep the session stable.
                        if should_log(last_invalid_input_log) {
                            warn!(player_id, "duplicate join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Input(input)) => process_input_message(
                        player_id,
                        room,
                        input.into(),
                        last_input_full_log,
                        last_invalid_input_log,
                    ),
                    Ok(ClientMessage::Leave) => Ok(LoopControl::Leave),
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                player_id,
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(player_id, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(player_id, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_update_bytes(
    update: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = update.len();
    match socket.send(Message::Text(update)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send room update");
            LoopControl::Disconnect
        }
    }
}

/// Settles the session with the ledger and closes the socket.
async fn finish_session(socket: &mut WebSocket, ctx: &ConnCtx, end: SessionEnd) {
    let player_id = ctx.player_id;

    match end {
        SessionEnd::Died(event) => {
            let died = ServerMessage::Died {
                killer_id: event.killer_id.map(|id| id.to_string()),
                transferred_amount: event.transferred_amount,
            };
            if let Err(e) = send_message(socket, &died).await {
                debug!(error = ?e, "failed to send death notice");
            }
            // The balance went to the killer or the house; the session closes at zero.
            settle_balance(&ctx.ledger, &ctx.session_id, player_id, 0).await;
            info!(player_id, killer_id = ?event.killer_id, "player died");
            let _ = send_close_with_reason(socket, close_code::NORMAL, "died").await;
        }
        SessionEnd::Left | SessionEnd::Disconnected => {
            let final_balance = match ctx.room.leave(player_id).await {
                Ok(balance) => Some(balance),
                // Died in the same tick the leave was applied.
                Err(RoomError::UnknownPlayer) => Some(0),
                Err(e) => {
                    error!(
                        player_id,
                        session_id = %ctx.session_id,
                        error = ?e,
                        critical = true,
                        "room unavailable on leave; balance unknown"
                    );
                    None
                }
            };

            let saved = match final_balance {
                Some(balance) => {
                    settle_balance(&ctx.ledger, &ctx.session_id, player_id, balance).await
                }
                None => false,
            };

            if matches!(end, SessionEnd::Left) {
                let balance = final_balance.unwrap_or(0);
                let msg = if saved {
                    ServerMessage::BalanceSaved {
                        final_balance: balance,
                    }
                } else {
                    ServerMessage::BalanceNotSaved {
                        final_balance: balance,
                    }
                };
                if let Err(e) = send_message(socket, &msg).await {
                    debug!(error = ?e, "failed to send settlement result");
                }
                let _ = send_close_with_reason(socket, close_code::NORMAL, "left").await;
            } else {
                if let Some(frame) = ctx.close_frame.clone() {
                    let _ = socket.send(Message::Close(Some(frame))).await;
                }
                if let Err(err) = socket.close().await {
                    debug!(error = ?err, "socket close error");
                }
            }
            info!(player_id, final_balance = ?final_balance, saved, "client disconnected");
        }
    }
}

/// Reports a final balance; returns whether the ledger confirmed it.
async fn settle_balance(
    ledger: &LedgerClient,
    session_id: &str,
    player_id: u64,
    final_balance: u64,
) -> bool {
    let request = SettleRequest {
        session_id: session_id.to_string(),
        player_id,
        final_balance,
    };
    match ledger.settle(&request).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                player_id,
                session_id,
                final_balance,
                error = ?e,
                critical = true,
                "balance settlement unconfirmed"
            );
            false
        }
    }
}

// Fee was charged but the player never spawned.
async fn refund_entry(ledger: &LedgerClient, entry: &VerifiedEntry) {
    settle_balance(ledger, &entry.session_id, entry.player_id, entry.entry_fee).await;
}
