//! Per-connection handshake and frame pump.
//!
//! Every accepted connection gets a driver task that walks the session
//! lifecycle: insert into the registry, send `Hello` (or reject on an
//! unsupported content type), pump frames to the dispatcher until the
//! connection closes, then remove the session and notify the observer.
//! Encoding is negotiated once from the upgrade request's `Content-Type`
//! header and never changes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pylon_auth::ServerAuth;
use pylon_core::{CloseCode, Encoding, HelloAuthentication, ServerMessage, SessionHandle};

use crate::dispatch::IncomingFrame;
use crate::server::AppState;
use crate::websocket::session::{OutboundFrame, Session};

/// Depth of each session's outbound frame queue.
const OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// RFC 6455 reserved code for connections that ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// `GET /ws`: negotiate the encoding and hand the socket to a driver task.
///
/// The upgrade itself always proceeds; an unsupported `Content-Type` is
/// rejected after the upgrade with a close frame, so the client sees a
/// proper close code instead of a failed HTTP request.
pub(crate) async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let negotiated = Encoding::from_content_type(content_type);
    let tracker = state.session_tasks.clone();
    ws.on_upgrade(move |socket| tracker.track_future(run_session(state, socket, peer, negotiated)))
}

/// Drive one connection from accept to teardown.
async fn run_session(
    state: AppState,
    socket: WebSocket,
    peer: SocketAddr,
    negotiated: Option<Encoding>,
) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let encoding = negotiated.unwrap_or_default();
    let session = Arc::new(Session::new(
        SessionHandle::new(),
        peer.to_string(),
        encoding,
        tx,
    ));
    state.registry.insert(session.clone());
    state.observer.on_client_connected(&session.snapshot());
    info!(handle = %session.handle, remote = %session.remote_address, ?encoding, "websocket session opened");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(outbound_writer(sink, rx));

    if negotiated.is_none() {
        warn!(handle = %session.handle, "unsupported content type, rejecting session");
        let _ = session.request_close(CloseCode::InvalidContentType);
    } else if !send_hello(&session, &state.auth) {
        warn!(handle = %session.handle, "failed to queue hello");
    }

    let mut peer_close_code = None;
    loop {
        let received = tokio::select! {
            received = stream.next() => received,
            () = state.halt.cancelled() => {
                debug!(handle = %session.handle, "halt requested, ending read loop");
                break;
            }
        };
        let Some(received) = received else { break };
        let frame = match received {
            Ok(frame) => frame,
            Err(err) => {
                debug!(handle = %session.handle, error = %err, "websocket read failed");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                session.count_incoming();
                if !session.is_closing() {
                    state
                        .dispatcher
                        .on_message(
                            &session,
                            &state.auth,
                            IncomingFrame::Text(text.as_str().to_owned()),
                        )
                        .await;
                }
            }
            Message::Binary(payload) => {
                session.count_incoming();
                if !session.is_closing() {
                    state
                        .dispatcher
                        .on_message(&session, &state.auth, IncomingFrame::Binary(payload.to_vec()))
                        .await;
                }
            }
            Message::Close(frame) => {
                peer_close_code = frame.map(|f| f.code);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = state.registry.remove(&session.handle);
    let was_identified = session.is_identified();
    let snapshot = session.snapshot();
    let close_code = session
        .requested_close_code()
        .or(peer_close_code)
        .unwrap_or(ABNORMAL_CLOSURE);
    writer.abort();

    state.observer.on_client_disconnected(&snapshot, close_code);
    if was_identified {
        state
            .observer
            .on_identified_client_disconnected(&snapshot, close_code);
    }
    info!(handle = %snapshot.handle, close_code, was_identified, "websocket session closed");
}

/// Forward queued frames to the socket; a close frame ends the task.
async fn outbound_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Binary(payload) => {
                if sink.send(Message::Binary(payload)).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Close(code) => {
                let frame = CloseFrame {
                    code: code.code(),
                    reason: Utf8Bytes::from_static(code.reason()),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}

/// Build, serialize, and queue the `Hello` for a freshly opened session.
///
/// When auth is required, issues a per-session challenge and stores it for
/// the dispatcher's identify step; the salt is the per-start value shared by
/// every session of this server generation.
fn send_hello(session: &Session, auth: &ServerAuth) -> bool {
    let authentication = auth.required.then(|| {
        let challenge = pylon_auth::generate_salt();
        session.set_auth_challenge(challenge.clone());
        HelloAuthentication {
            challenge,
            salt: auth.salt.clone(),
        }
    });
    let hello = ServerMessage::hello(authentication);
    match session.encoding {
        Encoding::Json => match serde_json::to_string(&hello) {
            Ok(json) => session.send_text(json),
            Err(err) => {
                warn!(error = %err, "failed to serialize hello as json");
                false
            }
        },
        Encoding::MsgPack => match rmp_serde::to_vec_named(&hello) {
            Ok(bytes) => session.send_binary(bytes),
            Err(err) => {
                warn!(error = %err, "failed to serialize hello as msgpack");
                false
            }
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
