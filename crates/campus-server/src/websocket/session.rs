//! WebSocket session lifecycle: handles a single client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use campus_auth::{RejectReason, VerificationError};
use campus_core::events;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::connection::{ClientConnection, CloseRequest};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::lifecycle::LifecycleController;
use super::protocol::{self, CLOSE_GOING_AWAY, ClientFrame};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Upper bound on flushing the final frames of a closing session.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const SHUTDOWN_CLOSE: CloseRequest = CloseRequest {
    code: CLOSE_GOING_AWAY,
    reason: "Server shutting down",
};

const HEARTBEAT_CLOSE: CloseRequest = CloseRequest {
    code: CLOSE_GOING_AWAY,
    reason: "Heartbeat timeout",
};

/// Per-session timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    /// Interval between server-initiated Ping frames and liveness checks.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the client is dropped.
    pub heartbeat_timeout: Duration,
    /// Time allowed for a first `auth` frame when the upgrade carried no
    /// credential.
    pub auth_grace: Duration,
}

/// Result of waiting for the first client frame.
enum FirstFrame {
    Credential(Option<String>),
    TimedOut,
    Closed,
    Shutdown,
}

/// Run a WebSocket session for an upgraded client.
///
/// 1. Obtains a credential: from the upgrade request, or else from a first
///    `{"type":"auth"}` frame within the grace period
/// 2. Authenticates and activates through the lifecycle controller, sending
///    a close frame with the rejection code on failure
/// 3. Sends `connection.established`, then serves join/leave/ping frames
/// 4. Forwards queued events and periodic Pings from a writer task
/// 5. Tears down through the controller on close, heartbeat timeout,
///    slow-consumer eviction, or shutdown
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    mut ws: WebSocket,
    credential: Option<String>,
    controller: Arc<LifecycleController>,
    timings: SessionTimings,
    shutdown: CancellationToken,
) {
    let (conn, send_rx) = controller.accept();
    let _ = Span::current().record("conn_id", tracing::field::display(&conn.id));

    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let credential = match credential {
        Some(token) => Some(token),
        None => match first_frame(&mut ws, timings.auth_grace, &shutdown).await {
            FirstFrame::Credential(token) => token,
            FirstFrame::TimedOut => {
                let err = controller.reject(
                    &conn,
                    VerificationError::invalid(RejectReason::HandshakeTimeout),
                );
                close_handshake(ws, &err).await;
                return finish(&controller, &conn);
            }
            FirstFrame::Closed => {
                debug!("client left before authenticating");
                return finish(&controller, &conn);
            }
            FirstFrame::Shutdown => {
                send_close(&mut ws, SHUTDOWN_CLOSE).await;
                return finish(&controller, &conn);
            }
        },
    };

    let identity = match controller.authenticate(&conn, credential.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            close_handshake(ws, &err).await;
            return finish(&controller, &conn);
        }
    };

    // Queue the welcome before activation so it precedes any event.
    let rooms = identity.derived_rooms();
    if let Some(frame) = protocol::welcome(conn.id.as_str(), &identity, &rooms) {
        let _ = conn.send(frame);
    }
    if !controller.activate(&conn) {
        send_close(&mut ws, SHUTDOWN_CLOSE).await;
        return finish(&controller, &conn);
    }
    let _active = ActiveGauge::acquire();
    info!(subject_id = identity.subject_id(), rooms = rooms.len(), "client connected");

    let (ws_tx, mut ws_rx) = ws.split();

    let stop_writer = CancellationToken::new();
    let writer = tokio::spawn(
        write_loop(ws_tx, send_rx, timings.heartbeat_interval, stop_writer.clone())
            .instrument(Span::current()),
    );

    let stop_heartbeat = CancellationToken::new();
    let heartbeat = {
        let conn = conn.clone();
        let cancel = stop_heartbeat.clone();
        tokio::spawn(
            async move {
                let result = run_heartbeat(
                    conn.clone(),
                    timings.heartbeat_interval,
                    timings.heartbeat_timeout,
                    cancel,
                )
                .await;
                if result == HeartbeatResult::TimedOut {
                    warn!(silent_for = ?conn.last_pong_elapsed(), "client unresponsive, disconnecting");
                    let _ = conn.request_close(HEARTBEAT_CLOSE);
                }
            }
            .instrument(Span::current()),
        )
    };

    let close = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(msg)) => {
                    conn.mark_alive();
                    match msg {
                        Message::Text(text) => handle_text(&controller, &conn, text.as_str()),
                        Message::Binary(data) => match std::str::from_utf8(&data) {
                            Ok(text) => handle_text(&controller, &conn, text),
                            Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                        },
                        Message::Close(_) => {
                            debug!("client sent close frame");
                            break None;
                        }
                        Message::Ping(_) | Message::Pong(_) => {}
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break None;
                }
                None => break None,
            },
            () = conn.closed() => break conn.close_request(),
            () = shutdown.cancelled() => break Some(SHUTDOWN_CLOSE),
        }
    };

    // Unregister first so no new events are queued while the socket closes.
    let _ = controller.disconnect(&conn);
    stop_heartbeat.cancel();
    stop_writer.cancel();

    let abort_writer = writer.abort_handle();
    match tokio::time::timeout(CLOSE_TIMEOUT, writer).await {
        Ok(Ok(mut ws_tx)) => {
            let closing = async {
                if let Some(request) = close {
                    let _ = ws_tx.send(close_message(request)).await;
                }
                let _ = ws_tx.close().await;
            };
            if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
                debug!("close handshake timed out");
            }
        }
        Ok(Err(e)) => debug!(error = %e, "writer task failed"),
        Err(_) => {
            abort_writer.abort();
            debug!("writer did not stop in time, aborted");
        }
    }
    let _ = heartbeat.await;

    info!(
        reason = close.map_or("client closed", |c| c.reason),
        dropped = conn.drop_count(),
        "client disconnected"
    );
    finish(&controller, &conn);
}

/// Wait for the first frame of an unauthenticated session.
async fn first_frame(ws: &mut WebSocket, grace: Duration, shutdown: &CancellationToken) -> FirstFrame {
    let read = async {
        loop {
            let text = match ws.recv().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => return FirstFrame::Credential(None),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_)) | Err(_)) | None => return FirstFrame::Closed,
            };
            return match ClientFrame::parse(&text) {
                Ok(ClientFrame::Auth { token }) => FirstFrame::Credential(Some(token)),
                _ => FirstFrame::Credential(None),
            };
        }
    };

    tokio::select! {
        result = tokio::time::timeout(grace, read) => result.unwrap_or(FirstFrame::TimedOut),
        () = shutdown.cancelled() => FirstFrame::Shutdown,
    }
}

/// Dispatch one inbound text frame and queue the reply, if any.
fn handle_text(controller: &LifecycleController, conn: &Arc<ClientConnection>, text: &str) {
    let reply = match ClientFrame::parse(text) {
        Ok(ClientFrame::Join { room }) => controller
            .join(conn, &room)
            .and_then(|key| protocol::room_ack(events::ROOM_JOINED, &key)),
        Ok(ClientFrame::Leave { room }) => controller
            .leave(conn, &room)
            .and_then(|key| protocol::room_ack(events::ROOM_LEFT, &key)),
        Ok(ClientFrame::Ping) => protocol::reply(events::PONG, json!({})),
        Ok(ClientFrame::Auth { .. }) => protocol::error("already authenticated"),
        Err(e) => {
            debug!(error = %e, "unparseable client frame");
            protocol::error("invalid frame")
        }
    };
    if let Some(frame) = reply {
        if !conn.send(frame) {
            debug!("failed to enqueue reply (channel full or closed)");
        }
    }
}

/// Drain the outbound queue into the socket and send periodic Pings.
///
/// Returns the sink so the session can send the final close frame.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    ping_every: Duration,
    stop: CancellationToken,
) -> SplitSink<WebSocket, Message> {
    let mut ping = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    ws_tx
}

fn close_message(request: CloseRequest) -> Message {
    Message::Close(Some(CloseFrame {
        code: request.code,
        reason: request.reason.into(),
    }))
}

async fn send_close(ws: &mut WebSocket, request: CloseRequest) {
    let _ = ws.send(close_message(request)).await;
}

/// Close a rejected handshake with the error's code and reason.
async fn close_handshake(mut ws: WebSocket, err: &VerificationError) {
    send_close(
        &mut ws,
        CloseRequest {
            code: err.close_code(),
            reason: err.close_reason(),
        },
    )
    .await;
}

/// One unit of the active-session gauge, held from activation until the
/// session task ends.
struct ActiveGauge;

impl ActiveGauge {
    fn acquire() -> Self {
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ActiveGauge {
    fn drop(&mut self) {
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Common exit path: make sure the controller saw the teardown and record
/// the session's metrics.
fn finish(controller: &LifecycleController, conn: &Arc<ClientConnection>) {
    let _ = controller.disconnect(conn);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // Full sessions need a real socket; see tests/integration.rs.

    #[test]
    fn active_gauge_tracks_activated_sessions_only() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            // Accepted but not yet activated: nothing recorded.
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
            assert!(!handle.render().contains(WS_CONNECTIONS_ACTIVE));

            let first = ActiveGauge::acquire();
            let second = ActiveGauge::acquire();
            assert!(handle.render().contains("ws_connections_active 2\n"));

            drop(first);
            assert!(handle.render().contains("ws_connections_active 1\n"));
            drop(second);
            assert!(handle.render().contains("ws_connections_active 0\n"));
        });
    }

    #[test]
    fn close_message_carries_code_and_reason() {
        let Message::Close(Some(frame)) = close_message(HEARTBEAT_CLOSE) else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, 1001);
        assert_eq!(frame.reason.as_str(), "Heartbeat timeout");
    }

    #[test]
    fn shutdown_and_heartbeat_use_going_away() {
        assert_eq!(SHUTDOWN_CLOSE.code, CLOSE_GOING_AWAY);
        assert_eq!(HEARTBEAT_CLOSE.code, CLOSE_GOING_AWAY);
        assert_ne!(SHUTDOWN_CLOSE.reason, HEARTBEAT_CLOSE.reason);
    }
}
