//! WebSocket endpoint for point-earning clients.
//!
//! Flow:
//! 1. Client connects to `/ws?token=<token>` (or sends `Authorization: Bearer`)
//! 2. The token is resolved; with no token the guest identity is used when
//!    enabled, otherwise the client gets `auth_failed` and is closed
//! 3. Session registered, wallet ensured, `connected` sent
//! 4. Writer task, heartbeat task and reader loop run until any of them ends
//! 5. Teardown deregisters the session exactly once, even after a panic

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use pm_protocol::{BalancePayload, Inbound, Outbound, TimestampPayload, UserPayload};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::{bearer_token, AuthenticatedUser};
use crate::sessions::notify::reply;
use crate::sessions::registry::{ConnectionHandle, SessionSink};
use crate::state::AppState;

const INVALID_TOKEN: &str = "Invalid or expired token";
const TOKEN_REQUIRED: &str = "Token is required";
const BALANCE_UNAVAILABLE: &str = "Failed to retrieve balance";

/// How long teardown waits for the writer to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws: upgrade to WebSocket.
///
/// Authentication happens after the upgrade so a rejection can be reported
/// to the client as an `auth_failed` message.
pub async fn session_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_owned));
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

async fn handshake(
    state: &AppState,
    token: Option<&str>,
) -> Result<AuthenticatedUser, &'static str> {
    match token {
        Some(token) => state.auth.resolve(token).await.map_err(|e| {
            tracing::warn!(error = %e, "handshake token rejected");
            INVALID_TOKEN
        }),
        None => state.guest.clone().ok_or(TOKEN_REQUIRED),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut ws_sink, ws_stream) = socket.split();

    let user = match handshake(&state, token.as_deref()).await {
        Ok(user) => user,
        Err(reason) => {
            let _ = send_outbound(&mut ws_sink, &Outbound::AuthFailed(reason.into())).await;
            let _ = ws_sink.close().await;
            return;
        }
    };

    let (outbound_tx, outbound_rx) =
        mpsc::channel(state.config.connection.outbound_buffer.max(1));
    let conn = ConnectionHandle::new(outbound_tx.clone());
    let conn_id = conn.conn_id;
    let cancel = conn.cancel.clone();

    state.sessions.add(user.user_id, &user.username, conn);
    if let Err(e) = state.store.get_or_create(&user.user_id).await {
        tracing::warn!(user_id = %user.user_id, error = %e, "failed to ensure wallet");
    }

    tracing::info!(
        user_id = %user.user_id,
        username = %user.username,
        conn_id = %conn_id,
        "client connected"
    );

    let mut writer = tokio::spawn(write_loop(ws_sink, outbound_rx, cancel.clone()));
    let heartbeat = tokio::spawn(heartbeat_loop(
        outbound_tx.clone(),
        state.config.connection.heartbeat_interval(),
        cancel.clone(),
    ));

    let connected = Outbound::Connected(UserPayload {
        user_id: user.user_id,
        username: user.username.clone(),
    });
    let identity = Arc::new(Mutex::new(user));

    if queue(&outbound_tx, connected, &cancel).await {
        let ctx = ConnCtx {
            state: state.clone(),
            conn_id,
            sink: outbound_tx,
            cancel: cancel.clone(),
            identity: identity.clone(),
        };
        // A panic inside the loop surfaces here as a JoinError and falls
        // through to the normal teardown below.
        match tokio::spawn(read_loop(ctx, ws_stream)).await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                tracing::error!(conn_id = %conn_id, "connection loop panicked");
            }
            Err(e) => tracing::warn!(conn_id = %conn_id, error = %e, "connection loop aborted"),
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────
    cancel.cancel();
    let user = identity.lock().clone();
    state.sessions.remove_connection(&user.user_id, conn_id);
    heartbeat.abort();
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(
        user_id = %user.user_id,
        conn_id = %conn_id,
        "client disconnected"
    );
}

/// Drains the outbound queue into the socket. Ends on cancellation, when
/// every sender is gone, or on the first failed write. A write to a peer
/// that stopped reading is abandoned as soon as the connection is cancelled.
async fn write_loop<S>(mut sink: S, mut rx: mpsc::Receiver<Outbound>, cancel: CancellationToken)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = send_outbound(&mut sink, &msg) => sent,
        };
        if let Err(e) = sent {
            tracing::debug!(kind = msg.kind(), error = %e, "websocket write failed");
            break;
        }
    }
    cancel.cancel();
    let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
}

async fn heartbeat_loop(sink: SessionSink, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let msg = Outbound::Heartbeat(TimestampPayload {
                    timestamp: Utc::now().timestamp(),
                });
                if !queue(&sink, msg, &cancel).await {
                    break;
                }
            }
        }
    }
    cancel.cancel();
}

async fn send_outbound(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &Outbound,
) -> anyhow::Result<()> {
    let json = msg.to_text()?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reader loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ConnCtx {
    state: AppState,
    conn_id: Uuid,
    sink: SessionSink,
    cancel: CancellationToken,
    /// Identity currently bound to this connection; changes on in-band auth.
    identity: Arc<Mutex<AuthenticatedUser>>,
}

async fn read_loop(ctx: ConnCtx, mut stream: SplitStream<WebSocket>) {
    let max_frame = ctx.state.config.connection.max_frame_bytes;

    loop {
        let frame = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if text.len() > max_frame {
                    tracing::warn!(
                        conn_id = %ctx.conn_id,
                        len = text.len(),
                        max_frame,
                        "dropping oversized frame"
                    );
                    continue;
                }
                if dispatch(&ctx, &text).await.is_break() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(conn_id = %ctx.conn_id, "ignoring binary frame");
            }
            // axum answers pings itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(conn_id = %ctx.conn_id, error = %e, "websocket read failed");
                break;
            }
        }
    }
    ctx.cancel.cancel();
}

async fn dispatch(ctx: &ConnCtx, text: &str) -> ControlFlow<()> {
    let user = ctx.identity.lock().clone();

    match Inbound::decode(text) {
        Ok(Inbound::Heartbeat { .. }) => {
            ctx.state.sessions.update_heartbeat(&user.user_id);
            tracing::trace!(user_id = %user.user_id, "heartbeat received");
            ControlFlow::Continue(())
        }
        Ok(Inbound::BalanceRequest) => {
            let msg = match ctx.state.store.balance(&user.user_id).await {
                Ok(balance) => Outbound::Balance(BalancePayload {
                    balance: balance.points(),
                }),
                Err(e) => {
                    tracing::warn!(user_id = %user.user_id, error = %e, "balance lookup failed");
                    Outbound::Error(BALANCE_UNAVAILABLE.into())
                }
            };
            send(ctx, msg).await
        }
        Ok(Inbound::Auth { token }) => handle_auth(ctx, &user, &token).await,
        Ok(Inbound::Unknown { kind }) => {
            tracing::warn!(user_id = %user.user_id, kind = %kind, "unknown message type");
            ControlFlow::Continue(())
        }
        Err(e) if e.is_auth() => send(ctx, Outbound::AuthFailed(e.to_string())).await,
        Err(e) => {
            tracing::debug!(user_id = %user.user_id, error = %e, "ignoring malformed frame");
            ControlFlow::Continue(())
        }
    }
}

/// In-band `auth`: on success the session moves to the new identity and the
/// client gets `auth_success` followed by a `balance_update`. On failure the
/// session is left as it was.
async fn handle_auth(
    ctx: &ConnCtx,
    current: &AuthenticatedUser,
    token: &str,
) -> ControlFlow<()> {
    let user = match ctx.state.auth.resolve(token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(user_id = %current.user_id, error = %e, "in-band auth rejected");
            return send(ctx, Outbound::AuthFailed(INVALID_TOKEN.into())).await;
        }
    };

    if !ctx
        .state
        .sessions
        .rekey(&current.user_id, ctx.conn_id, user.user_id, &user.username)
    {
        // Taken over by another connection; this one is closing.
        return ControlFlow::Break(());
    }
    *ctx.identity.lock() = user.clone();

    tracing::info!(
        from = %current.user_id,
        user_id = %user.user_id,
        username = %user.username,
        "in-band auth succeeded"
    );

    let wallet = ctx.state.store.get_or_create(&user.user_id).await;
    let flow = send(
        ctx,
        Outbound::AuthSuccess(UserPayload {
            user_id: user.user_id,
            username: user.username.clone(),
        }),
    )
    .await;

    match wallet {
        Ok(wallet) if flow.is_continue() => {
            ctx.state
                .notifier
                .balance_update(&user.user_id, wallet.balance.points());
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(user_id = %user.user_id, error = %e, "failed to ensure wallet"),
    }
    flow
}

/// Queue `msg` on the connection's own sink, giving up if the connection is
/// cancelled while the queue is full.
async fn queue(sink: &SessionSink, msg: Outbound, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        queued = reply(sink, msg) => queued,
    }
}

async fn send(ctx: &ConnCtx, msg: Outbound) -> ControlFlow<()> {
    if queue(&ctx.sink, msg, &ctx.cancel).await {
        ControlFlow::Continue(())
    } else {
        ControlFlow::Break(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(text: &str) -> Outbound {
        Outbound::Error(text.into())
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_gives_up_once_cancelled() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(queue(&tx, error("fills the queue"), &CancellationToken::new()).await);

        let cancel = CancellationToken::new();
        let blocked = tokio::spawn({
            let (tx, cancel) = (tx.clone(), cancel.clone());
            async move { queue(&tx, error("never fits"), &cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!blocked.is_finished());

        cancel.cancel();
        assert!(!blocked.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_stops_when_peer_never_reads() {
        // A sink whose writes never complete, like a client that stopped
        // reading once the TCP window filled.
        let stalled = Box::pin(futures_util::sink::unfold((), |(), _: Message| {
            std::future::pending::<Result<(), axum::Error>>()
        }));
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let writer = tokio::spawn(write_loop(stalled, rx, cancel.clone()));

        tx.send(error("stuck in flight")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!writer.is_finished());

        cancel.cancel();
        tokio::time::timeout(CLOSE_GRACE * 2, writer)
            .await
            .expect("writer still blocked after cancel")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_stops_when_queue_stays_full() {
        let (tx, _rx) = mpsc::channel(1);
        tx.send(error("fills the queue")).await.unwrap();
        let cancel = CancellationToken::new();
        let beat = tokio::spawn(heartbeat_loop(tx, Duration::from_secs(1), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!beat.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), beat)
            .await
            .expect("heartbeat still blocked after cancel")
            .unwrap();
    }
}
