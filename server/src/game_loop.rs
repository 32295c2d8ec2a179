//! The single task that owns all rooms. A fixed-rate timer advances every
//! simulation and publishes snapshots; an mpsc channel carries commands from
//! the connection handlers. One room's fault never takes down the loop.

use crate::config::{GameConfig, ServerConfig};
use crate::game::Transition;
use crate::manager::GameManager;
use pong_shared::protocol::WorldSnapshot;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Commands from client connections to the game loop
pub enum GameCommand {
    Join {
        room_id: String,
        player_id: String,
        name: String,
        response: oneshot::Sender<JoinReply>,
    },
    Leave {
        room_id: String,
        player_id: String,
    },
    SetX {
        room_id: String,
        player_id: String,
        value: f64,
    },
    Transition {
        room_id: String,
        transition: Transition,
    },
    /// Deferred ball respawn; a no-op if the room is gone by now.
    SpawnBall {
        room_id: String,
    },
    /// A subscriber lost broadcast frames; restart the room's delta chain
    /// with a full snapshot.
    Resync {
        room_id: String,
    },
}

pub struct JoinReply {
    /// Subscription to the room's broadcasts.
    pub events: broadcast::Receiver<String>,
    /// Full snapshot for the new connection.
    pub world: WorldSnapshot,
}

/// Run the main game loop. Owns all game state.
///
/// `cmd_tx` is the loop's own command sender, used to schedule deferred ball
/// respawns back through the queue.
pub async fn run_game_loop(
    cmd_tx: mpsc::Sender<GameCommand>,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    server_config: ServerConfig,
    game_config: GameConfig,
) {
    let respawn_delay = Duration::from_millis(game_config.respawn_delay_ms);
    let mut manager = GameManager::new(&server_config, game_config);

    let dt = 1.0 / server_config.tick_rate_hz as f64;
    let mut tick_interval = tokio::time::interval(Duration::from_secs_f64(dt));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let respawns = manager.update(dt);
                manager.publish();

                // Respawns run on wall-clock delay, off the tick path.
                for room_id in respawns {
                    let tx = cmd_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(respawn_delay).await;
                        let _ = tx.send(GameCommand::SpawnBall { room_id }).await;
                    });
                }
            }

            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    GameCommand::Join { room_id, player_id, name, response } => {
                        let (events, world) = manager.add(&room_id, &player_id, &name);
                        tracing::info!(room = %room_id, player = %player_id, "player joined");
                        let _ = response.send(JoinReply { events, world });
                    }
                    GameCommand::Leave { room_id, player_id } => {
                        match manager.remove(&room_id, &player_id) {
                            Ok(()) => tracing::info!(room = %room_id, player = %player_id, "player left"),
                            Err(e) => tracing::warn!(room = %room_id, "leave failed: {e}"),
                        }
                    }
                    GameCommand::SetX { room_id, player_id, value } => {
                        manager.set_player_x(&room_id, &player_id, value);
                    }
                    GameCommand::Transition { room_id, transition } => {
                        if let Err(e) = manager.transition(&room_id, transition) {
                            tracing::warn!(room = %room_id, "transition rejected: {e}");
                        }
                    }
                    GameCommand::SpawnBall { room_id } => {
                        manager.spawn_ball(&room_id);
                    }
                    GameCommand::Resync { room_id } => {
                        manager.request_full_snapshot(&room_id);
                    }
                }
            }

            else => break,
        }
    }

    tracing::info!("Game loop ended");
}
