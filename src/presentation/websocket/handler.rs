//! WebSocket Connection Handler
//!
//! Drives one socket through its lifecycle: Hello, Identify (JWT
//! validated, with timeout), READY, then the main loop multiplexing
//! client operations, call bridge events, and heartbeat supervision.
//! Unauthenticated handshakes are rejected with InvalidSession.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout};

use super::messages::{
    CallDialPayload, ErrorNotice, GatewayReceive, GatewaySend, HelloPayload, IdentifyPayload,
    JoinPayload, LeavePayload, OpCode, ReadyPayload, ResumePayload, ResumedPayload,
};
use super::session::SessionState;
use crate::application::services::call_bridge::{CallBridge, CallSession};
use crate::domain::call::CallEvent;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// JWT claims for token validation
#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut session_state = SessionState::new();

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewaySend>();

    // Hello carries the heartbeat contract.
    let heartbeat_interval_ms = state.settings.websocket.heartbeat_interval_ms;
    let hello = GatewaySend {
        op: OpCode::Hello as u8,
        d: serde_json::to_value(HelloPayload {
            heartbeat_interval: heartbeat_interval_ms,
        })
        .ok(),
        s: None,
        t: None,
    };
    if let Ok(text) = serde_json::to_string(&hello) {
        if sender.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    } else {
        return;
    }

    // Writer task: the only place frames touch the socket. Broadcast
    // delivery stays fire-and-forget behind this channel.
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Wait for Identify (with timeout)
    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let identify_result = timeout(identify_timeout, async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(frame) = serde_json::from_str::<GatewayReceive>(&text) {
                        if frame.op == OpCode::Identify as u8 {
                            if let Some(d) = frame.d {
                                if let Ok(identify) =
                                    serde_json::from_value::<IdentifyPayload>(d)
                                {
                                    return Some(identify);
                                }
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => return None,
                Err(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await;

    let identify = match identify_result {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::debug!("Connection closed before Identify");
            sender_task.abort();
            return;
        }
        Err(_) => {
            tracing::debug!("Identify timeout");
            send_invalid_session(&tx).await;
            sender_task.abort();
            return;
        }
    };

    let user_id = match validate_token(&identify.token, &state) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid token");
            send_invalid_session(&tx).await;
            sender_task.abort();
            return;
        }
    };

    session_state.user_id = user_id;
    session_state.identified = true;

    // Register with the gateway and attach the user's call bridge.
    let connection = state.gateway.register(user_id, tx.clone());
    let bridge = state.calls.bridge_for(user_id);
    let mut call_events = bridge.subscribe();

    let ready = serde_json::to_value(ReadyPayload {
        connection_id: connection.id,
        user_id,
    })
    .unwrap_or_default();
    if !connection.dispatch("READY", ready) {
        state.gateway.unregister(connection.id);
        sender_task.abort();
        return;
    }

    tracing::info!(user_id, connection_id = %connection.id, "User connected and identified");

    let mut heartbeat_check = interval(Duration::from_millis(heartbeat_interval_ms + 10000));
    heartbeat_check.tick().await; // Skip first immediate tick

    // Main message loop
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_message(
                            &text,
                            &mut session_state,
                            &connection,
                            &bridge,
                            &state,
                        ).await {
                            tracing::debug!(
                                connection_id = %connection.id,
                                error = %e,
                                "Error handling message"
                            );
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection.id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection.id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            event = call_events.recv() => {
                match event {
                    Ok(event) => forward_call_event(&bridge, &connection, event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %connection.id,
                            skipped = n,
                            "Call event receiver lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Bridge dropped; call events stop flowing but the
                        // chat connection stays up.
                        tracing::debug!(connection_id = %connection.id, "Call bridge closed");
                    }
                }
            }

            _ = heartbeat_check.tick() => {
                let timeout_ms = heartbeat_interval_ms + 10000; // 10 second grace period
                if !session_state.is_alive(timeout_ms) {
                    tracing::info!(
                        connection_id = %connection.id,
                        "Heartbeat timeout, closing connection"
                    );
                    break;
                }
            }
        }
    }

    // Cleanup: drop all group memberships, then the bridge if this was the
    // user's last device.
    state.gateway.unregister(connection.id);
    if !state.gateway.is_user_online(user_id) {
        state.calls.shutdown_user(user_id).await;
    }
    sender_task.abort();

    tracing::info!(user_id, connection_id = %connection.id, "User disconnected");
}

/// Handle one incoming client frame after identification.
async fn handle_message(
    text: &str,
    session_state: &mut SessionState,
    connection: &std::sync::Arc<super::gateway::Connection>,
    bridge: &std::sync::Arc<CallBridge>,
    state: &AppState,
) -> Result<(), String> {
    let frame: GatewayReceive =
        serde_json::from_str(text).map_err(|e| format!("Invalid frame: {}", e))?;
    let data = frame.d.unwrap_or(serde_json::Value::Null);

    match frame.op {
        op if op == OpCode::Heartbeat as u8 => {
            session_state.heartbeat();
            connection.send(GatewaySend {
                op: OpCode::HeartbeatAck as u8,
                d: None,
                s: None,
                t: None,
            });
        }

        op if op == OpCode::JoinGroup as u8 => {
            let join: JoinPayload =
                serde_json::from_value(data).map_err(|e| format!("Invalid join payload: {}", e))?;
            match state
                .router
                .join(connection.id, connection.user_id, join.scope)
                .await
            {
                Ok(group) => {
                    connection.dispatch("GROUP_JOINED", json!({ "group": group }));
                }
                Err(e) => notify_error(connection, &e),
            }
        }

        op if op == OpCode::LeaveGroup as u8 => {
            let leave: LeavePayload = serde_json::from_value(data)
                .map_err(|e| format!("Invalid leave payload: {}", e))?;
            state.router.leave(connection.id, &leave.group);
            connection.dispatch("GROUP_LEFT", json!({ "group": leave.group }));
        }

        op if op == OpCode::Resume as u8 => {
            let resume: ResumePayload = serde_json::from_value(data)
                .map_err(|e| format!("Invalid resume payload: {}", e))?;
            let groups = state
                .router
                .rejoin(connection.id, connection.user_id, &resume.groups)
                .await;
            let resumed =
                serde_json::to_value(ResumedPayload { groups }).unwrap_or_default();
            connection.dispatch("RESUMED", resumed);
        }

        op if op == OpCode::CallDial as u8 => {
            let dial: CallDialPayload =
                serde_json::from_value(data).map_err(|e| format!("Invalid dial payload: {}", e))?;
            if let Err(e) = bridge.dial(dial.remote_id).await {
                notify_error(connection, &e);
            }
        }

        op if op == OpCode::CallAnswer as u8 => {
            if let Err(e) = bridge.answer().await {
                notify_error(connection, &e);
            }
        }

        op if op == OpCode::CallReject as u8 => {
            if let Err(e) = bridge.reject().await {
                notify_error(connection, &e);
            }
        }

        op if op == OpCode::CallHangup as u8 => {
            if let Err(e) = bridge.hangup().await {
                notify_error(connection, &e);
            }
        }

        _ => {
            tracing::debug!(connection_id = %connection.id, op = frame.op, "Unknown opcode");
        }
    }

    Ok(())
}

/// Forward a call lifecycle event to the client as a CALL_* dispatch.
fn forward_call_event(
    bridge: &std::sync::Arc<CallBridge>,
    connection: &std::sync::Arc<super::gateway::Connection>,
    event: CallEvent,
) {
    let name = match &event {
        CallEvent::Connecting { .. } => "CALL_CONNECTING",
        CallEvent::Progress { .. } => "CALL_PROGRESS",
        CallEvent::Confirmed { .. } => "CALL_CONFIRMED",
        CallEvent::Failed { .. } => "CALL_FAILED",
        CallEvent::Ended { .. } => "CALL_ENDED",
    };

    let mut data = serde_json::to_value(&event).unwrap_or_default();
    if let Some(session) = bridge.find_session(event.call_id()) {
        attach_session_detail(&mut data, &session);
    }
    connection.dispatch(name, data);
}

fn attach_session_detail(data: &mut serde_json::Value, session: &CallSession) {
    if let Some(map) = data.as_object_mut() {
        map.insert(
            "direction".into(),
            serde_json::to_value(session.direction).unwrap_or_default(),
        );
        map.insert("remote_id".into(), json!(session.remote_id));
    }
}

/// Surface a typed error to the client without dropping the connection.
fn notify_error(connection: &super::gateway::Connection, error: &AppError) {
    let notice = ErrorNotice {
        kind: error.kind(),
        message: error.to_string(),
    };
    connection.dispatch("ERROR", serde_json::to_value(notice).unwrap_or_default());
}

async fn send_invalid_session(tx: &mpsc::UnboundedSender<GatewaySend>) {
    let _ = tx.send(GatewaySend {
        op: OpCode::InvalidSession as u8,
        d: Some(json!(false)),
        s: None,
        t: None,
    });
    // Give the writer a moment to flush before teardown.
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Validate JWT token and return the user id.
fn validate_token(token: &str, state: &AppState) -> Result<i64, String> {
    let secret = &state.settings.jwt.secret;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| format!("Invalid token: {}", e))?;

    token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|e| format!("Invalid user ID in token: {}", e))
}
