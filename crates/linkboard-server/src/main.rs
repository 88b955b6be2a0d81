//! Linkboard WebSocket Relay Server
//!
//! Forwards whole entities between the clients of a board and keeps the latest
//! copy of each one so late joiners receive the current state.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "board": "board-id", "user": { "name": "Ada", "color": "#3366ff" } }
//! { "type": "update_shape", "id": "<uuid>", "shape": { ... } }
//! { "type": "presence", "cursor": { "x": 100, "y": 200 } }
//! ```

mod room;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use linkboard_core::sync::{ClientMessage, ServerMessage};
use room::{Envelope, Relay};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "linkboard-server", about = "WebSocket relay for Linkboard boards")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LINKBOARD_ADDR", default_value = "0.0.0.0:3030")]
    addr: SocketAddr,

    /// Per-room broadcast buffer; slower clients past this lag and drop messages
    #[arg(long, env = "LINKBOARD_CHANNEL_CAPACITY", default_value_t = 256)]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkboard_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let relay = Arc::new(Relay::new(args.channel_capacity));

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay);

    info!("Linkboard relay listening on {}", args.addr);
    info!("WebSocket endpoint: ws://{}/ws", args.addr);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> &'static str {
    "Linkboard Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            None
        }
    }
}

/// Board membership of one connection.
struct Membership {
    board: String,
    rx: broadcast::Receiver<Envelope>,
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let session_id = Uuid::new_v4().to_string();
    info!("New connection: {}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let mut membership: Option<Membership> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Join { board, user }) => {
                            if let Some(old) = membership.take() {
                                relay.leave(&old.board, &session_id);
                            }
                            let (rx, joined) = relay.join(&board, &session_id, user);
                            membership = Some(Membership { board, rx });
                            Some(joined)
                        }
                        Ok(ClientMessage::Leave) => {
                            if let Some(old) = membership.take() {
                                relay.leave(&old.board, &session_id);
                            }
                            None
                        }
                        Ok(message) => match &membership {
                            Some(m) => relay.relay(&m.board, &session_id, message),
                            None => Some(room::error("join a board first")),
                        },
                        Err(e) => {
                            warn!("Invalid message from {}: {}", session_id, e);
                            Some(room::error(&format!("Invalid message: {}", e)))
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong is handled by axum; binary frames are not part of the protocol.
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", session_id, e);
                        break;
                    }
                };
                if let Some(frame) = reply.as_ref().and_then(encode) {
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
            }

            envelope = async {
                match membership.as_mut() {
                    Some(m) => m.rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match envelope {
                    Ok((from, message)) => {
                        // Don't echo back to sender
                        if from == session_id {
                            continue;
                        }
                        if let Some(frame) = encode(&message) {
                            if sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Session {} lagged, {} messages dropped; resyncing", session_id, skipped);
                        let snapshot = membership
                            .as_ref()
                            .and_then(|m| relay.resync(&m.board, &session_id));
                        if let Some(frame) = snapshot.as_ref().and_then(encode) {
                            if sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => membership = None,
                }
            }
        }
    }

    if let Some(m) = membership {
        relay.leave(&m.board, &session_id);
    }
    info!("Connection closed: {}", session_id);
}
