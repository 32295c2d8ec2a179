//! Room manager: owns the room -> simulation mapping, routes joins and
//! leaves, drives every room on the shared tick and fans snapshots out to
//! per-room subscribers, diffed against the last sent state.

use crate::config::{GameConfig, ServerConfig};
use crate::error::GameError;
use crate::game::{Game, GameEvent, Transition};
use pong_shared::delta::{self, DeltaError};
use pong_shared::protocol::{BallPoint, ServerMsg, WorldSnapshot};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Capacity of each room's broadcast channel. Snapshots are fire-and-forget;
/// a lagging subscriber just skips ahead.
const ROOM_CHANNEL_CAPACITY: usize = 64;

struct Room {
    game: Game,
    tx: broadcast::Sender<String>,
    /// Snapshot value the next delta is computed against. `None` forces a
    /// full snapshot on the next publish.
    last_snapshot: Option<Value>,
}

/// Diagnostic listing of one room, in room-id order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RoomEntry {
    pub id: String,
    pub game: WorldSnapshot,
}

pub struct GameManager {
    rooms: BTreeMap<String, Room>,
    game_config: GameConfig,
    rng: ChaCha8Rng,
}

impl GameManager {
    pub fn new(server_config: &ServerConfig, game_config: GameConfig) -> Self {
        Self {
            rooms: BTreeMap::new(),
            game_config,
            rng: ChaCha8Rng::seed_from_u64(server_config.rng_seed),
        }
    }

    pub fn respawn_delay_ms(&self) -> u64 {
        self.game_config.respawn_delay_ms
    }

    /// Get-or-create the room and join the player. Returns a subscription to
    /// the room's broadcasts plus the full snapshot for the new connection.
    /// Caller guarantees `player_id` is unique within the room.
    pub fn add(
        &mut self,
        room_id: &str,
        player_id: &str,
        name: &str,
    ) -> (broadcast::Receiver<String>, WorldSnapshot) {
        let seed = self.rng.gen();
        let game_config = self.game_config.clone();
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
            Room {
                game: Game::new(game_config, ChaCha8Rng::seed_from_u64(seed)),
                tx,
                last_snapshot: None,
            }
        });

        room.game.add_player(player_id, name);
        let _ = room.tx.send(encode(&ServerMsg::PlayerEnter {
            id: player_id.to_string(),
        }));

        // Membership changed: existing subscribers get a full snapshot and
        // the delta chain restarts from it.
        let world = room.game.serialize();
        room.last_snapshot = serde_json::to_value(&world).ok();
        let _ = room.tx.send(encode(&ServerMsg::Snapshot {
            world: world.clone(),
        }));

        (room.tx.subscribe(), world)
    }

    /// Remove a player; deletes the room once it is empty. Dropping the room
    /// drops its broadcast sender, which disconnects remaining subscribers.
    pub fn remove(&mut self, room_id: &str, player_id: &str) -> Result<(), GameError> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Err(GameError::RoomNotFound(room_id.to_string()));
        };

        if !room.game.remove_player(player_id) {
            // Unknown player id: nothing changed, nothing to announce.
            return Ok(());
        }
        if room.game.players().is_empty() {
            self.rooms.remove(room_id);
            return Ok(());
        }

        let _ = room.tx.send(encode(&ServerMsg::PlayerLeave {
            id: player_id.to_string(),
        }));
        let world = room.game.serialize();
        room.last_snapshot = serde_json::to_value(&world).ok();
        let _ = room.tx.send(encode(&ServerMsg::Snapshot { world }));
        Ok(())
    }

    /// Route a player's paddle input to its room. Unknown rooms or players
    /// are ignored; clamping happens in the simulation.
    pub fn set_player_x(&mut self, room_id: &str, player_id: &str, value: f64) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.game.set_player_x(player_id, value);
        }
    }

    pub fn transition(&mut self, room_id: &str, transition: Transition) -> Result<(), GameError> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Err(GameError::RoomNotFound(room_id.to_string()));
        };
        room.game.transition(transition)
    }

    /// Restart a room's delta chain so the next publish broadcasts a full
    /// snapshot. Used when a subscriber dropped frames and can no longer
    /// apply patches to its base.
    pub fn request_full_snapshot(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.last_snapshot = None;
        }
    }

    /// Spawn a replacement ball. No-op when the room no longer exists by the
    /// time a deferred respawn fires, or when the target count is met.
    pub fn spawn_ball(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.game.spawn_ball();
        }
    }

    /// Advance every room by the same `dt`, broadcasting ball events as they
    /// happen. Returns one room id per destroyed ball so the caller can
    /// schedule deferred respawns.
    pub fn update(&mut self, dt: f64) -> Vec<String> {
        let mut respawns = Vec::new();
        for (id, room) in &mut self.rooms {
            for event in room.game.update(dt) {
                match event {
                    GameEvent::BallOut { sector } => {
                        let _ = room.tx.send(encode(&ServerMsg::BallOut {
                            index: sector as u32,
                        }));
                        respawns.push(id.clone());
                    }
                    GameEvent::BallHit { x, y } => {
                        let _ = room.tx.send(encode(&ServerMsg::BallHit {
                            ball: BallPoint { x, y },
                        }));
                    }
                }
            }
        }
        respawns
    }

    /// Serialize every room and broadcast the diff against the last sent
    /// snapshot, falling back to a full snapshot when the codec cannot
    /// express the change.
    pub fn publish(&mut self) {
        for (id, room) in &mut self.rooms {
            let world = room.game.serialize();
            let Ok(current) = serde_json::to_value(&world) else {
                continue;
            };
            let msg = match &room.last_snapshot {
                Some(previous) => match delta::delta(previous, &current) {
                    Ok(Some(patch)) => ServerMsg::SnapshotDelta { world: patch },
                    Ok(None) => ServerMsg::Snapshot { world },
                    Err(DeltaError::UnsupportedDelete { .. }) => {
                        tracing::debug!(room = %id, "structural change, sending full snapshot");
                        ServerMsg::Snapshot { world }
                    }
                },
                None => ServerMsg::Snapshot { world },
            };
            room.last_snapshot = Some(current);
            let _ = room.tx.send(encode(&msg));
        }
    }

    /// Ordered listing of all rooms, for diagnostics and tests.
    pub fn serialize(&self) -> Vec<RoomEntry> {
        self.rooms
            .iter()
            .map(|(id, room)| RoomEntry {
                id: id.clone(),
                game: room.game.serialize(),
            })
            .collect()
    }
}

fn encode(msg: &ServerMsg) -> String {
    // ServerMsg contains no non-string keys or non-finite floats.
    serde_json::to_string(msg).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pong_shared::protocol::PlayerWire;

    fn test_manager() -> GameManager {
        let server_config = ServerConfig {
            rng_seed: 12345,
            ..Default::default()
        };
        GameManager::new(&server_config, GameConfig::default())
    }

    fn wire(id: &str, index: u32) -> PlayerWire {
        PlayerWire {
            id: id.to_string(),
            name: id.to_string(),
            index,
            x: 0.5,
            score: 0,
        }
    }

    #[test]
    fn add_creates_the_room() {
        let mut manager = test_manager();
        manager.add("r1", "p1", "p1");
        assert_eq!(
            manager.serialize(),
            vec![RoomEntry {
                id: "r1".to_string(),
                game: WorldSnapshot {
                    players: vec![wire("p1", 0)],
                    balls: vec![],
                },
            }]
        );
    }

    #[test]
    fn remove_deletes_only_empty_rooms() {
        let mut manager = test_manager();
        manager.add("r1", "p1", "p1");
        manager.add("r1", "p2", "p2");
        manager.add("r2", "p3", "p3");
        manager.remove("r2", "p3").unwrap();
        assert_eq!(
            manager.serialize(),
            vec![RoomEntry {
                id: "r1".to_string(),
                game: WorldSnapshot {
                    players: vec![wire("p1", 0), wire("p2", 1)],
                    balls: vec![],
                },
            }]
        );
    }

    #[test]
    fn remove_reindexes_survivors() {
        let mut manager = test_manager();
        manager.add("r1", "p1", "p1");
        manager.add("r1", "p2", "p2");
        manager.add("r2", "p3", "p3");
        manager.remove("r1", "p1").unwrap();
        assert_eq!(
            manager.serialize(),
            vec![
                RoomEntry {
                    id: "r1".to_string(),
                    game: WorldSnapshot {
                        players: vec![wire("p2", 0)],
                        balls: vec![],
                    },
                },
                RoomEntry {
                    id: "r2".to_string(),
                    game: WorldSnapshot {
                        players: vec![wire("p3", 0)],
                        balls: vec![],
                    },
                },
            ]
        );
    }

    #[test]
    fn removing_everyone_removes_every_room() {
        let mut manager = test_manager();
        manager.add("r1", "p1", "p1");
        manager.add("r1", "p2", "p2");
        manager.add("r2", "p3", "p3");
        manager.remove("r1", "p2").unwrap();
        manager.remove("r2", "p3").unwrap();
        manager.remove("r1", "p1").unwrap();
        assert_eq!(manager.serialize(), vec![]);
    }

    #[test]
    fn remove_on_unknown_room_fails() {
        let mut manager = test_manager();
        assert_eq!(
            manager.remove("nowhere", "p1"),
            Err(GameError::RoomNotFound("nowhere".to_string()))
        );
    }

    #[test]
    fn respawn_for_deleted_room_is_a_noop() {
        let mut manager = test_manager();
        manager.add("r1", "p1", "p1");
        manager.remove("r1", "p1").unwrap();
        manager.spawn_ball("r1");
        assert_eq!(manager.serialize(), vec![]);
    }

    #[test]
    fn publish_sends_deltas_after_the_full_snapshot() {
        let mut manager = test_manager();
        let (mut rx, world) = manager.add("r1", "p1", "p1");
        assert_eq!(world.players.len(), 1);

        manager.publish();
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "snapshotDelta");

        // An idle room diffs to empty player objects.
        assert_eq!(msg["world"]["players"], serde_json::json!([{}]));
    }

    #[test]
    fn membership_change_broadcasts_a_full_snapshot() {
        let mut manager = test_manager();
        let (mut rx, _) = manager.add("r1", "p1", "p1");
        manager.add("r1", "p2", "p2");

        let enter: serde_json::Value =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(enter["type"], "playerEnter");
        assert_eq!(enter["id"], "p2");

        let snapshot: serde_json::Value =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["world"]["players"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn removing_unknown_player_broadcasts_nothing() {
        let mut manager = test_manager();
        let (mut rx, _) = manager.add("r1", "p1", "p1");
        manager.remove("r1", "ghost").unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(manager.serialize()[0].game.players.len(), 1);
    }

    #[test]
    fn resync_restarts_the_delta_chain() {
        let mut manager = test_manager();
        let (mut rx, _) = manager.add("r1", "p1", "p1");

        manager.publish();
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "snapshotDelta");

        // A lagged subscriber has no base for further patches.
        manager.request_full_snapshot("r1");
        manager.publish();
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "snapshot");
        assert_eq!(msg["world"]["players"].as_array().unwrap().len(), 1);

        // The chain resumes from the fresh snapshot.
        manager.publish();
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "snapshotDelta");
    }

    #[test]
    fn transition_on_unknown_room_fails() {
        let mut manager = test_manager();
        assert!(matches!(
            manager.transition("nowhere", Transition::Start),
            Err(GameError::RoomNotFound(_))
        ));
    }
}
