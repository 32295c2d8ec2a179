use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::game::Transition;
use crate::game_loop::{GameCommand, JoinReply};
use pong_shared::protocol::{ClientMsg, ServerMsg};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
}

/// Join parameters carried on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub room: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<JoinQuery>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, app_state))
}

async fn handle_socket(socket: WebSocket, query: JoinQuery, app_state: AppState) {
    let player_id = Uuid::new_v4().to_string();
    let name = query.name.unwrap_or_else(|| "anonymous".to_string());
    let room_id = query.room;

    let (mut sink, mut stream) = socket.split();

    // Join the room
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::Join {
            room_id: room_id.clone(),
            player_id: player_id.clone(),
            name,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let JoinReply { mut events, world } = match resp_rx.await {
        Ok(reply) => reply,
        Err(_) => {
            tracing::error!("Failed to receive join reply");
            return;
        }
    };

    tracing::info!(room = %room_id, "Player {} connected", player_id);

    // Tell the connection who it is, then hand it the current world.
    for msg in [
        ServerMsg::MeEnter {
            id: player_id.clone(),
        },
        ServerMsg::Snapshot { world },
    ] {
        let Ok(json) = serde_json::to_string(&msg) else {
            return;
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(client_msg) = serde_json::from_str::<ClientMsg>(&text) {
                            let command = match client_msg {
                                ClientMsg::X { value } => GameCommand::SetX {
                                    room_id: room_id.clone(),
                                    player_id: player_id.clone(),
                                    value,
                                },
                                ClientMsg::Start => transition(&room_id, Transition::Start),
                                ClientMsg::End => transition(&room_id, Transition::End),
                                ClientMsg::Back => transition(&room_id, Transition::Back),
                            };
                            let _ = app_state.game_tx.send(command).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (room broadcast)
            result = events.recv() => {
                match result {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Player {} lagged by {} messages", player_id, n);
                        // Dropped frames leave this client without a valid
                        // delta base; request a full snapshot.
                        let _ = app_state.game_tx.send(GameCommand::Resync {
                            room_id: room_id.clone(),
                        }).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .game_tx
        .send(GameCommand::Leave {
            room_id: room_id.clone(),
            player_id: player_id.clone(),
        })
        .await;
    tracing::info!(room = %room_id, "Player {} disconnected", player_id);
}

fn transition(room_id: &str, transition: Transition) -> GameCommand {
    GameCommand::Transition {
        room_id: room_id.to_string(),
        transition,
    }
}
