//! The connection supervisor.
//!
//! Runs one upgraded WebSocket to completion: admission checks, then
//! an inbound loop (decode, dispatch into the engine) and an outbound
//! loop (drain the session queue onto the wire) raced against each
//! other. Every failure here is scoped to this one connection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, Stream, StreamExt};
use glimpse_audit::{AuditEvent, AuditRecord};
use glimpse_core::RelayError;
use glimpse_relay::{OutboundFrame, SessionHandle};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::AppState;

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub(crate) struct ConnectQuery {
    /// Bearer token; consumed during the handshake, never re-sent.
    token: Option<String>,
}

/// `GET /screenshare` upgrade handler.
///
/// The blocked-IP check runs before the upgrade completes and never
/// awaits storage; a blocked peer gets a plain 403.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ip = resolve_ip(&headers, addr, state.trust_proxy_headers);

    if state.engine.throttle().is_blocked_sync(&ip) {
        state
            .engine
            .audit()
            .record(
                AuditRecord::new(AuditEvent::ConnectionBlocked)
                    .with_ip(ip.clone())
                    .with_detail("connection refused, IP blocked"),
            )
            .await;
        warn!(ip, "refused connection from blocked IP");
        return (StatusCode::FORBIDDEN, "blocked").into_response();
    }

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, ip, query.token))
}

/// The peer IP, honoring `X-Forwarded-For` only when configured.
fn resolve_ip(headers: &HeaderMap, addr: SocketAddr, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_owned();
        }
    }
    addr.ip().to_string()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, ip: String, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    // Steps before a session exists: token presence, then validation.
    let Some(token) = token else {
        reject(&mut sink, &RelayError::MissingToken).await;
        return;
    };
    let identity = match state.validator.validate(&token).await {
        Ok(identity) => {
            state.engine.throttle().clear_failures(&ip);
            identity
        }
        Err(e) => {
            debug!(ip, error = %e, "token validation failed");
            state
                .engine
                .audit()
                .record(
                    AuditRecord::new(AuditEvent::InvalidToken)
                        .with_ip(ip.clone())
                        .with_detail("bearer token rejected"),
                )
                .await;
            if let Some(block) = state.engine.throttle().record_auth_failure(&ip).await {
                state
                    .engine
                    .audit()
                    .record(
                        AuditRecord::new(AuditEvent::IpBlocked)
                            .with_ip(block.ip.clone())
                            .with_detail(block.reason.clone()),
                    )
                    .await;
            }
            reject(&mut sink, &RelayError::InvalidToken).await;
            return;
        }
    };

    let (session, rx) = state.engine.register_session(identity, ip).await;
    let cancelled = session.cancelled();

    let outbound = outbound_loop(sink, rx);
    let inbound = inbound_loop(&state, &session, &mut stream);

    // Either loop finishing (peer close, write failure, close
    // sentinel) tears the connection down; the cancellation token
    // covers a force-close with a jammed queue.
    tokio::select! {
        () = inbound => {}
        () = outbound => {}
        () = cancelled.cancelled() => {}
    }

    state.engine.disconnect(session.id).await;
}

/// Send one fatal error frame and close, without a session.
async fn reject(sink: &mut (impl Sink<Message> + Unpin), error: &RelayError) {
    if let Ok(json) = serde_json::to_string(&error.to_message()) {
        let _ = sink.send(Message::Text(json.into())).await;
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Drain the session queue onto the wire.
async fn outbound_loop(
    mut sink: impl Sink<Message> + Unpin,
    mut rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            OutboundFrame::Message(msg) => match serde_json::to_string(&msg) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    warn!(error = %e, "dropping unserializable frame");
                    continue;
                }
            },
            OutboundFrame::Media(bytes) => Message::Binary(bytes),
            OutboundFrame::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

/// Read frames, dispatch into the engine, surface errors as frames.
async fn inbound_loop(
    state: &Arc<AppState>,
    session: &Arc<SessionHandle>,
    stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
) {
    while let Some(message) = stream.next().await {
        let result = match message {
            Ok(Message::Text(text)) => state.engine.handle_text(session, text.as_str()).await,
            Ok(Message::Binary(payload)) => state.engine.handle_binary(session, payload),
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => break,
        };
        if let Err(error) = result {
            session.send_message(error.to_message());
            if error.is_fatal() {
                session.close();
                break;
            }
        }
    }
    debug!(session_id = %session.id, "inbound stream ended");
}
