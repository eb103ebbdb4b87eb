//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::http::AppError;
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::channel::SessionId;
use crate::ws::protocol::{ClientMsg, ProtocolError, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Player name, unique among connected players
    pub name: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let (tx, rx) = mpsc::channel(state.config.session_queue_capacity);

    // Claim the name before upgrading so duplicates get a plain HTTP error
    let (session, name) = match state.lobby.connect(&query.name, tx) {
        Ok(registered) => registered,
        Err(e) => {
            warn!(name = %query.name, error = %e, "WebSocket connection refused");
            return AppError::from(e).into_response();
        }
    };

    info!(session_id = %session, name = %name, "WebSocket upgrade");

    let failed_state = state.clone();
    ws.max_message_size(state.config.max_message_bytes)
        .on_failed_upgrade(move |e| {
            warn!(session_id = %session, error = %e, "WebSocket upgrade failed");
            tokio::spawn(async move {
                failed_state.lobby.disconnect(session).await;
            });
        })
        .on_upgrade(move |socket| handle_socket(socket, session, name, rx, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    session: SessionId,
    name: String,
    outbound_rx: mpsc::Receiver<Bytes>,
    state: AppState,
) {
    info!(session_id = %session, name = %name, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    run_session(session, ws_sink, ws_stream, outbound_rx, &state).await;

    // Cleanup on disconnect
    state.lobby.disconnect(session).await;

    info!(session_id = %session, name = %name, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session: SessionId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    state: &AppState,
) {
    let rate_limiter = SessionRateLimiter::new(state.config.input_rate_limit);
    let max_message_bytes = state.config.max_message_bytes;
    let ping_interval = state.config.ping_interval;

    // Spawn writer task: outbound queue + keepalive -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        let mut keepalive = interval(if ping_interval.is_zero() {
            Duration::from_secs(3600)
        } else {
            ping_interval
        });
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        keepalive.tick().await;

        loop {
            let frame = tokio::select! {
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!(session_id = %session, "Outbound queue closed");
                        break;
                    }
                },
                _ = keepalive.tick(), if !ping_interval.is_zero() => ServerMsg::Ping.encode(),
            };

            if let Err(e) = ws_sink.send(Message::Binary(frame.to_vec())).await {
                debug!(session_id = %session, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> lobby / room, until either side stops
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut writer_handle => {
                info!(session_id = %session, "Outbound side closed, ending session");
                break;
            }
        };

        match result {
            Ok(Message::Binary(data)) => match decode_frame(&data, max_message_bytes) {
                Ok(msg) => {
                    if is_rate_limited(&msg) && !rate_limiter.check_input() {
                        warn!(session_id = %session, "Rate limited move dropped");
                        continue;
                    }
                    state.lobby.handle(session, msg).await;
                }
                Err(e) => {
                    warn!(session_id = %session, error = %e, "Protocol desync, closing");
                    break;
                }
            },
            Ok(Message::Text(_)) => {
                warn!(session_id = %session, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(session_id = %session, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(session_id = %session, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Figure moves are the only inputs a client can flood; lobby and room
/// control messages always go through.
pub fn is_rate_limited(msg: &ClientMsg) -> bool {
    matches!(msg, ClientMsg::Move { .. })
}

/// Size-check and decode one inbound frame
pub fn decode_frame(data: &[u8], max_message_bytes: usize) -> Result<ClientMsg, ProtocolError> {
    if data.len() > max_message_bytes {
        return Err(ProtocolError::TooLarge {
            size: data.len(),
            limit: max_message_bytes,
        });
    }
    ClientMsg::decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::MoveAction;

    #[test]
    fn only_moves_are_rate_limited() {
        assert!(is_rate_limited(&ClientMsg::Move {
            action: MoveAction::Down,
            expected: None,
        }));
        for msg in [
            ClientMsg::Abandon,
            ClientMsg::GameStart,
            ClientMsg::RoomJoined { room_id: 1 },
            ClientMsg::JoinRoom { room_id: 1 },
            ClientMsg::RequestLobbyData,
        ] {
            assert!(!is_rate_limited(&msg), "{msg:?}");
        }
    }

    #[test]
    fn oversized_frames_are_rejected_before_decoding() {
        let frame = ClientMsg::Chat {
            text: "x".repeat(100),
        }
        .encode();
        assert!(decode_frame(&frame, 1024).is_ok());
        assert_eq!(
            decode_frame(&frame, 16),
            Err(ProtocolError::TooLarge {
                size: 104,
                limit: 16
            })
        );
    }
}
