//! WebSocket endpoint: the hosting side of the transport collaborator
//!
//! Issues a connection handle per attempt, forwards the signed handshake
//! headers to the admission flow, pumps dispatched payloads out to the
//! socket, and runs disconnect cleanup when the socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::server::AppState;
use crate::session::{AdmissionError, HandshakeMeta};

pub const SESSION_HEADER: &str = "x-session";
pub const TIMESTAMP_HEADER: &str = "x-date-time";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// WebSocket upgrade handler. Admission runs before the upgrade so a bad
/// handshake is refused with a plain HTTP status instead of a socket close.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state, headers))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let meta = extract_handshake(&headers);
    let connection_handle = Uuid::new_v4().simple().to_string();

    // Attach the outbound channel before the registry write; once `admit`
    // returns, a broadcast may resolve this handle at any moment and the
    // transport must already know it. Frames land in the channel until the
    // socket finishes upgrading.
    let (tx, rx) = mpsc::channel::<Vec<u8>>(state.settings.websocket.send_buffer);
    state.transport.attach(&connection_handle, tx);

    let session_id = match state.admission.admit(&meta, &connection_handle).await {
        Ok(session_id) => session_id,
        Err(e) => {
            state.transport.detach(&connection_handle);
            tracing::warn!(error = %e, "Connection rejected");
            return (rejection_status(&e), e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, connection_handle, rx))
}

fn rejection_status(error: &AdmissionError) -> StatusCode {
    match error {
        AdmissionError::MissingHeaders => StatusCode::BAD_REQUEST,
        AdmissionError::ExpiredOrInvalidTimestamp | AdmissionError::InvalidSignature => {
            StatusCode::FORBIDDEN
        }
        AdmissionError::SecretUnavailable(_) | AdmissionError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn extract_handshake(headers: &HeaderMap) -> HandshakeMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    HandshakeMeta {
        session_id: header(SESSION_HEADER),
        timestamp: header(TIMESTAMP_HEADER),
        signature: header(SIGNATURE_HEADER),
    }
}

/// Pump dispatched payloads to the socket until either side goes away.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, rx),
    fields(session_id = %session_id, connection_handle = %connection_handle)
)]
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    connection_handle: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    tracing::info!("Connection accepted");
    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(payload) = outbound else { break };
                // Payloads are delivered verbatim; UTF-8 goes out as a text
                // frame so browser clients see strings, anything else as binary.
                let frame = match String::from_utf8(payload) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => Message::Binary(e.into_bytes().into()),
                };
                if ws_sender.send(frame).await.is_err() {
                    break;
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    // This is a push-only endpoint; inbound frames are drained
                    // and ignored.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.transport.detach(&connection_handle);
    if let Err(e) = state.disconnect.run(&connection_handle).await {
        // Non-fatal: the connection is gone either way, and a later
        // broadcast will evict any record the cleanup missed.
        tracing::warn!(error = %e, "Disconnect cleanup failed");
    }
    tracing::info!("Connection closed");
}
