//! Pub/sub WebSocket gateway.
//!
//! One socket per client: a dedicated writer task drains the client's
//! bounded outbound queue (fed by the event bus), the read loop handles
//! subscribe/unsubscribe/ping frames, and a server-side heartbeat
//! terminates clients that miss two successive pings.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, trace, warn};

use crate::api::ApiState;
use crate::events::WireMessage;
use crate::order::now_ms;
use crate::service::NodeService;

pub async fn ws_handler(State(state): State<ApiState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(state.service, socket))
}

async fn client_session(service: Arc<NodeService>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let bus = service.bus().clone();
    let (client_id, mut outbound) = bus.register();
    debug!(client_id, "gateway client connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(client_id, %err, "dropping unserializable frame");
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut heartbeat = tokio::time::interval(service.config().heartbeat_interval());
    heartbeat.tick().await;
    let mut unanswered_pings = 0u8;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(frame)) = incoming else { break };
                match frame {
                    Message::Text(text) => {
                        if !handle_frame(&bus, client_id, &text, &mut unanswered_pings) {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // Binary frames are not part of the protocol; control
                    // frames are handled by axum.
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if unanswered_pings >= 2 {
                    warn!(client_id, "two heartbeats unanswered; terminating client");
                    break;
                }
                unanswered_pings += 1;
                if !bus.direct(client_id, WireMessage::Ping { timestamp: now_ms() }) {
                    break;
                }
            }
        }
    }

    bus.release(client_id);
    writer.abort();
    debug!(client_id, "gateway client disconnected");
}

/// Returns false when the client is gone and the session should end.
fn handle_frame(
    bus: &crate::events::EventBus,
    client_id: u64,
    text: &str,
    unanswered_pings: &mut u8,
) -> bool {
    let message: WireMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            trace!(client_id, %err, "unparseable frame");
            return bus.direct(
                client_id,
                WireMessage::Error {
                    message: format!("unrecognized message: {err}"),
                },
            );
        }
    };
    match message {
        WireMessage::Subscribe { channel } => {
            bus.subscribe(client_id, &channel);
            bus.direct(client_id, WireMessage::Subscribed { channel })
        }
        WireMessage::Unsubscribe { channel } => {
            bus.unsubscribe(client_id, &channel);
            bus.direct(client_id, WireMessage::Unsubscribed { channel })
        }
        WireMessage::Ping { timestamp } => {
            bus.direct(client_id, WireMessage::Pong { timestamp })
        }
        WireMessage::Pong { .. } => {
            *unanswered_pings = 0;
            true
        }
        other => {
            trace!(client_id, ?other, "client sent a server-only frame");
            bus.direct(
                client_id,
                WireMessage::Error {
                    message: "unexpected message type".into(),
                },
            )
        }
    }
}
