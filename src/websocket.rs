use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::RequestBroker;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionRegistry, PeerChannel};
use crate::relay::{ProgressSettings, RelayEngine};

/// Shared state for the signaling endpoint.
///
/// The registry owns the identifier→channel map and the broker owns the
/// pending-request set; neither is reachable except through these handles.
#[derive(Clone)]
pub struct SignalingState {
    pub registry: Arc<ConnectionRegistry>,
    pub broker: Arc<RequestBroker>,
    pub relay: Arc<RelayEngine>,
}

impl SignalingState {
    pub fn new(settings: ProgressSettings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broker: Arc::new(RequestBroker::new()),
            relay: Arc::new(RelayEngine::new(Arc::clone(&registry), settings)),
            registry,
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SignalingState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection from accept to close.
async fn handle_socket(socket: WebSocket, state: SignalingState) {
    let (mut sender, mut receiver) = socket.split();

    // Outbound queue for this peer; components only ever see this handle.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let channel = PeerChannel::new(tx);
    let channel_id = channel.channel_id();

    // Writer task: serialize queued messages onto the socket.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        debug!(%channel_id, "writer task ended");
    });

    debug!(%channel_id, "websocket connected");

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!(%channel_id, error = %e, "websocket error");
                break;
            }
        };

        match frame {
            Message::Text(text) => dispatch_frame(&text, &channel, &state),
            Message::Binary(data) => {
                // Some clients send JSON in binary frames; accept those too.
                match String::from_utf8(data) {
                    Ok(text) => dispatch_frame(&text, &channel, &state),
                    Err(_) => {
                        debug!(%channel_id, "discarding non-UTF-8 binary frame");
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/Pong are answered by the transport layer.
            _ => {}
        }
    }

    state.registry.unbind(channel_id);
    debug!(%channel_id, "websocket disconnected");
}

/// Parse one frame and dispatch it.
///
/// Every failure is absorbed here: malformed frames and unrecognized message
/// types are logged and dropped without touching the connection, and nothing
/// is echoed back to the offending peer.
fn dispatch_frame(text: &str, channel: &PeerChannel, state: &SignalingState) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "discarding malformed frame");
            return;
        }
    };

    let message = match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(m) => m,
        Err(e) => {
            let kind = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("<missing>");
            warn!(kind, error = %e, "discarding unrecognized frame");
            return;
        }
    };

    route_message(message, channel, state);
}

/// Dispatch a parsed message to its owning component. Runs to completion
/// before the next frame on this channel is read, so registry and broker
/// mutations are ordered per peer.
fn route_message(message: ClientMessage, channel: &PeerChannel, state: &SignalingState) {
    match message {
        ClientMessage::Register { user_id } | ClientMessage::RegisterReceiver { user_id } => {
            // Clients re-register on a timer to keep the binding fresh;
            // the overwrite is unconditional either way.
            state.registry.register(&user_id, channel.clone());
        }

        ClientMessage::ConnectionRequest {
            sender_id,
            receiver_id,
            ..
        } => {
            // The inbound timestamp is ignored; the forwarded request
            // carries server time.
            if let Err(err) = state
                .broker
                .create_request(&state.registry, &sender_id, &receiver_id)
            {
                debug!(%err, "connection request not delivered");
            }
        }

        ClientMessage::ConnectionResponse {
            request_id,
            receiver_id,
            accepted,
            ..
        } => {
            if let Err(err) =
                state
                    .broker
                    .resolve(&state.registry, request_id, accepted, &receiver_id)
            {
                debug!(%err, "connection response ignored");
            }
        }

        ClientMessage::File(transfer) => {
            if let Err(err) = state.relay.relay(transfer) {
                warn!(%err, "file transfer dropped");
            }
        }
    }
}
