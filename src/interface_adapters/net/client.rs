use crate::domain::{Difficulty, ParticipantId, Snapshot};
use crate::interface_adapters::protocol::{
    ClientMessage, CreateMatchPayload, DEFAULT_PARTICIPANT_NAME, JoinMatchPayload,
    MatchBindingDto, ServerMessage, SnapshotDto,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{MatchError, MatchHandle, MatchNotice, MatchRegistry, MatchStatus};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    SnapshotsClosed,
    StatusClosed,
    BindTimeout,
    ClosedBeforeBind,
    Unsupported,
    TooManyInvalid,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_NAME_LEN: usize = 32;
// Idle sockets that never create or join a match are dropped.
const BIND_TIMEOUT: Duration = Duration::from_secs(60);

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub async fn snapshot_serializer(
    mut snapshot_rx: broadcast::Receiver<Arc<Snapshot>>,
    snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    snapshot_latest_bytes_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each snapshot once and broadcast the shared bytes.
    loop {
        match snapshot_rx.recv().await {
            Ok(snapshot) => {
                let msg = ServerMessage::StateUpdate(SnapshotDto::from(snapshot.as_ref()));
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize snapshot");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                let _ = snapshot_latest_bytes_tx.send_replace(bytes.clone());
                let _ = snapshot_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "snapshot serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("snapshot channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub fn spawn_match_serializer(handle: &MatchHandle) {
    tokio::spawn(snapshot_serializer(
        handle.snapshot_tx.subscribe(),
        handle.snapshot_bytes_tx.clone(),
        handle.snapshot_latest_bytes_tx.clone(),
    ));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(mut socket: WebSocket, registry: Arc<MatchRegistry>) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let span = info_span!(
        "conn",
        conn_id,
        match_id = tracing::field::Empty,
        participant_id = tracing::field::Empty
    );
    let _enter = span.enter();

    let mut ctx = match timeout(BIND_TIMEOUT, bind_connection(&mut socket, registry)).await {
        Ok(Ok(ctx)) => ctx,
        Ok(Err(NetError::ClosedBeforeBind)) => {
            info!("client disconnected before joining a match");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "failed to bind connection");
            let _ = socket.close().await;
            return;
        }
        Err(_) => {
            info!(error = ?NetError::BindTimeout, "no match created or joined in time");
            let _ = send_close_with_reason(&mut socket, close_code::POLICY, "bind timeout").await;
            return;
        }
    };

    span.record("match_id", &*ctx.match_id);
    span.record("participant_id", ctx.participant_id);
    info!(name = %ctx.name, "client bound to match");

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
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

async fn send_match_error(socket: &mut WebSocket, err: &MatchError) -> Result<usize, NetError> {
    send_message(socket, &ServerMessage::error(err.code(), err.to_string())).await
}

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

struct ConnCtx {
    participant_id: ParticipantId,
    name: String,
    // Match this connection is bound to; fixed for the connection's lifetime.
    match_id: Arc<str>,
    registry: Arc<MatchRegistry>,
    snapshot_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    snapshot_latest_rx: watch::Receiver<Utf8Bytes>,
    status_rx: watch::Receiver<MatchStatus>,
    notice_rx: broadcast::Receiver<MatchNotice>,
    lag_recovery_count: u64,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_lag_log: Instant,
    last_invalid_input_log: Instant,

    close_frame: Option<CloseFrame>,
}

// Receivers taken before the participant is added, so nothing after the join is missed.
struct Subscriptions {
    snapshot_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    snapshot_latest_rx: watch::Receiver<Utf8Bytes>,
    status_rx: watch::Receiver<MatchStatus>,
    notice_rx: broadcast::Receiver<MatchNotice>,
}

impl Subscriptions {
    fn new(handle: &MatchHandle) -> Self {
        Self {
            snapshot_bytes_rx: handle.snapshot_bytes_tx.subscribe(),
            snapshot_latest_rx: handle.snapshot_latest_bytes_tx.subscribe(),
            status_rx: handle.status_tx.subscribe(),
            notice_rx: handle.notice_tx.subscribe(),
        }
    }
}

struct Binding {
    handle: MatchHandle,
    participant_id: ParticipantId,
    name: String,
    snapshot: Arc<Snapshot>,
    subscriptions: Subscriptions,
}

fn participant_name(raw: Option<String>) -> String {
    let name: String = raw
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() {
        DEFAULT_PARTICIPANT_NAME.to_string()
    } else {
        name
    }
}

async fn create_and_join(
    registry: &MatchRegistry,
    payload: CreateMatchPayload,
) -> Result<Binding, MatchError> {
    let handle = registry.create(registry.settings().defaults.clone()).await?;
    spawn_match_serializer(&handle);
    let subscriptions = Subscriptions::new(&handle);

    let difficulty =
        Difficulty::parse_or_default(payload.ai_difficulty.as_deref().unwrap_or_default());
    let add_ai = payload.add_ai;
    let name = participant_name(payload.player_name);
    let joined = async {
        let (participant_id, _) = registry.join(&handle.match_id, &name).await?;
        if add_ai {
            registry.add_controller(&handle.match_id, difficulty).await?;
        }
        Ok::<_, MatchError>(participant_id)
    }
    .await;

    match joined {
        Ok(participant_id) => Ok(Binding {
            snapshot: handle.latest_snapshot(),
            handle,
            participant_id,
            name,
            subscriptions,
        }),
        Err(e) => {
            // Nobody else can reach a match its creator never joined.
            registry.remove(&handle.match_id).await;
            Err(e)
        }
    }
}

async fn join_existing(
    registry: &MatchRegistry,
    payload: JoinMatchPayload,
) -> Result<Binding, MatchError> {
    let handle = registry
        .get(&payload.match_id)
        .await
        .ok_or(MatchError::NotFound("match"))?;
    let subscriptions = Subscriptions::new(&handle);

    let name = participant_name(payload.player_name);
    let (participant_id, snapshot) = registry.join(&handle.match_id, &name).await?;
    Ok(Binding {
        handle,
        participant_id,
        name,
        snapshot,
        subscriptions,
    })
}

async fn bind_connection(
    socket: &mut WebSocket,
    registry: Arc<MatchRegistry>,
) -> Result<ConnCtx, NetError> {
    let mut msgs_in = 0u64;
    let mut bytes_in = 0u64;
    let mut invalid_json = 0u32;

    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeBind);
        };

        let text = match incoming.map_err(NetError::Ws)? {
            Message::Text(text) => text,
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::Unsupported);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err(NetError::ClosedBeforeBind),
        };
        msgs_in += 1;
        bytes_in += text.len() as u64;

        let (bound, created) = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::CreateMatch(payload)) => {
                (create_and_join(&registry, payload).await, true)
            }
            Ok(ClientMessage::JoinMatch(payload)) => {
                (join_existing(&registry, payload).await, false)
            }
            Ok(ClientMessage::StartMatch | ClientMessage::SetDirection(_)) => {
                let msg = ServerMessage::error("not_in_match", "create or join a match first");
                send_message(socket, &msg).await?;
                continue;
            }
            Err(e) => {
                invalid_json += 1;
                debug!(error = %e, "failed to parse client message before binding");
                if invalid_json > MAX_INVALID_JSON {
                    let _ = send_close_with_reason(
                        socket,
                        close_code::POLICY,
                        "too many invalid messages",
                    )
                    .await;
                    return Err(NetError::TooManyInvalid);
                }
                let msg = ServerMessage::error("invalid_message", e.to_string());
                send_message(socket, &msg).await?;
                continue;
            }
        };

        let binding = match bound {
            Ok(binding) => binding,
            Err(e) => {
                debug!(error = %e, "create/join rejected");
                send_match_error(socket, &e).await?;
                continue;
            }
        };

        let match_id = binding.handle.match_id.clone();
        if registry.register_connection(&match_id).await.is_none() {
            // Reaped between the join and registration.
            warn!(%match_id, "match missing during connection registration");
            send_match_error(socket, &MatchError::NotFound("match")).await?;
            continue;
        }

        let dto = MatchBindingDto {
            match_id: match_id.to_string(),
            participant_id: binding.participant_id,
            snapshot: SnapshotDto::from(binding.snapshot.as_ref()),
        };
        let reply = if created {
            ServerMessage::MatchCreated(dto)
        } else {
            ServerMessage::MatchJoined(dto)
        };
        let mut ctx = ConnCtx::new(binding, registry, msgs_in, bytes_in);
        match send_message(socket, &reply).await {
            Ok(bytes) => {
                ctx.msgs_out += 1;
                ctx.bytes_out += bytes as u64;
                return Ok(ctx);
            }
            Err(e) => {
                ctx.registry.register_disconnect(&ctx.match_id).await;
                return Err(e);
            }
        }
    }
}

impl ConnCtx {
    fn new(binding: Binding, registry: Arc<MatchRegistry>, msgs_in: u64, bytes_in: u64) -> Self {
        let now = Instant::now() - LOG_THROTTLE;
        let Subscriptions {
            snapshot_bytes_rx,
            snapshot_latest_rx,
            status_rx,
            notice_rx,
        } = binding.subscriptions;
        Self {
            participant_id: binding.participant_id,
            name: binding.name,
            match_id: binding.handle.match_id.clone(),
            registry,
            snapshot_bytes_rx,
            snapshot_latest_rx,
            status_rx,
            notice_rx,
            lag_recovery_count: 0,

            msgs_in,
            msgs_out: 0,
            bytes_in,
            bytes_out: 0,

            invalid_json: 0,

            last_lag_log: now,
            last_invalid_input_log: now,

            close_frame: None,
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

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(socket, incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            snapshot = ctx.snapshot_bytes_rx.recv() => {
                match snapshot {
                    Ok(bytes) => matches!(
                        forward_bytes(bytes, socket, ctx).await,
                        LoopControl::Disconnect
                    ),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut ctx.last_lag_log) {
                            warn!(missed = n, "snapshots lagged; sending latest");
                        }

                        // Resync with the latest snapshot only.
                        let latest = ctx.snapshot_latest_rx.borrow().clone();
                        if latest.is_empty() {
                            false
                        } else {
                            ctx.lag_recovery_count += 1;
                            matches!(
                                forward_bytes(latest, socket, ctx).await,
                                LoopControl::Disconnect
                            )
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::SnapshotsClosed);
                        true
                    }
                }
            }

            changed = ctx.status_rx.changed() => {
                match changed {
                    Ok(()) => {
                        let status = *ctx.status_rx.borrow_and_update();
                        let msg = ServerMessage::MatchStatus(status.into());
                        matches!(forward_message(&msg, socket, ctx).await, LoopControl::Disconnect)
                    }
                    Err(_) => {
                        fatal = Some(NetError::StatusClosed);
                        true
                    }
                }
            }

            notice = ctx.notice_rx.recv() => {
                match notice {
                    Ok(MatchNotice::ParticipantJoined { participant_id, name }) => {
                        if participant_id == ctx.participant_id {
                            false
                        } else {
                            let msg = ServerMessage::ParticipantJoined { participant_id, name };
                            matches!(
                                forward_message(&msg, socket, ctx).await,
                                LoopControl::Disconnect
                            )
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(missed = n, "notices lagged");
                        false
                    }
                    // Notices stop once the match is gone; snapshots and status decide.
                    Err(broadcast::error::RecvError::Closed) => false,
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    disconnect_cleanup(ctx).await;

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    let participant_id = ctx.participant_id;
    let msg = match incoming {
        Some(Ok(msg)) => msg,
        Some(Err(e)) => {
            warn!(participant_id, error = %e, "websocket recv error");
            return Ok(LoopControl::Disconnect);
        }
        None => {
            info!(participant_id, "websocket closed");
            return Ok(LoopControl::Disconnect);
        }
    };

    let text = match msg {
        Message::Text(text) => text,
        Message::Binary(_) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            return Ok(LoopControl::Disconnect);
        }
        Message::Ping(_) | Message::Pong(_) => return Ok(LoopControl::Continue),
        Message::Close(_) => return Ok(LoopControl::Disconnect),
    };
    ctx.msgs_in += 1;
    ctx.bytes_in += text.len() as u64;

    let result = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::SetDirection(payload)) => {
            let vector = (payload.direction.x, payload.direction.y);
            ctx.registry
                .set_intent(&ctx.match_id, participant_id, vector)
                .await
        }
        Ok(ClientMessage::StartMatch) => {
            let result = ctx.registry.start(&ctx.match_id).await;
            if result.is_ok() {
                info!(participant_id, "match started");
            }
            result
        }
        Ok(ClientMessage::CreateMatch(_) | ClientMessage::JoinMatch(_)) => {
            let msg = ServerMessage::error("already_in_match", "connection is bound to a match");
            return Ok(forward_message(&msg, socket, ctx).await);
        }
        Err(parse_err) => {
            ctx.invalid_json += 1;
            if should_log(&mut ctx.last_invalid_input_log) {
                warn!(
                    participant_id,
                    bytes = text.len(),
                    error = %parse_err,
                    "failed to parse client message"
                );
            }
            if ctx.invalid_json > MAX_INVALID_JSON {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "too many invalid messages".into(),
                });
                return Ok(LoopControl::Disconnect);
            }
            let msg = ServerMessage::error("invalid_message", parse_err.to_string());
            return Ok(forward_message(&msg, socket, ctx).await);
        }
    };

    match result {
        Ok(()) => Ok(LoopControl::Continue),
        Err(e) => {
            if should_log(&mut ctx.last_invalid_input_log) {
                debug!(participant_id, error = %e, "command rejected");
            }
            let msg = ServerMessage::error(e.code(), e.to_string());
            Ok(forward_message(&msg, socket, ctx).await)
        }
    }
}

async fn forward_bytes(bytes: Utf8Bytes, socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let bytes_len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send snapshot");
            LoopControl::Disconnect
        }
    }
}

async fn forward_message(
    msg: &ServerMessage,
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
) -> LoopControl {
    match send_message(socket, msg).await {
        Ok(bytes) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send message");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(ctx: &ConnCtx) {
    // The last connection out tears the match down.
    ctx.registry.register_disconnect(&ctx.match_id).await;

    debug!(
        participant_id = ctx.participant_id,
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        "connection stats"
    );
    info!(participant_id = ctx.participant_id, "client disconnected");
}
