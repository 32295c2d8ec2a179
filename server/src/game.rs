//! Per-room simulation: players on angular sectors, balls, the
//! Idle/Playing/Result state machine and the scoring rules.

use crate::config::GameConfig;
use crate::error::GameError;
use crate::physics::{ArenaPhysics, BodyHandle, PhysicsEvent};
use pong_shared::protocol::{round4, BallWire, PlayerWire, WorldSnapshot};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Idle,
    Playing,
    Result,
}

/// State machine events, one per guarded transition.
#[derive(Debug, Clone, Copy)]
pub enum Transition {
    Start,
    End,
    Back,
}

pub struct Player {
    pub id: String,
    pub name: String,
    /// 0-based position in the current player list. Not stable: recomputed
    /// whenever any player leaves.
    pub index: usize,
    x: f64,
    pub score: u32,
    paddle: BodyHandle,
}

impl Player {
    /// Normalized position along this player's sector, always in [0, 1].
    pub fn x(&self) -> f64 {
        self.x
    }
}

pub struct Ball {
    pub id: String,
    body: BodyHandle,
    /// Id of the last player whose paddle touched this ball. Cleared only by
    /// ball destruction.
    last_hit: Option<String>,
}

/// Game-level events produced while interpreting one tick's physics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    /// A ball left through this sector; the ball was destroyed and a
    /// replacement should be scheduled.
    BallOut { sector: usize },
    /// A paddle touched a ball at this position.
    BallHit { x: f64, y: f64 },
}

pub struct Game {
    config: GameConfig,
    state: GameState,
    players: Vec<Player>,
    balls: Vec<Ball>,
    physics: ArenaPhysics,
    rng: ChaCha8Rng,
}

impl Game {
    pub fn new(config: GameConfig, rng: ChaCha8Rng) -> Self {
        let physics = ArenaPhysics::new(config.arena_radius);
        Self {
            config,
            state: GameState::Idle,
            players: Vec::new(),
            balls: Vec::new(),
            physics,
            rng,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn ball_count(&self) -> usize {
        self.balls.len()
    }

    /// Append a player at the end of the list with `index = previous count`.
    pub fn add_player(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let paddle = self
            .physics
            .create_paddle(self.config.paddle_half_width, self.config.paddle_half_height);
        let index = self.players.len();
        self.players.push(Player {
            id: id.into(),
            name: name.into(),
            index,
            x: 0.5,
            score: 0,
            paddle,
        });
        self.reposition_paddles();
    }

    /// Remove a player by id and reassign every remaining index to its new
    /// list position. Returns false if the id is unknown.
    pub fn remove_player(&mut self, id: &str) -> bool {
        let Some(at) = self.players.iter().position(|player| player.id == id) else {
            return false;
        };
        let player = self.players.remove(at);
        self.physics.remove_body(player.paddle);
        for (index, player) in self.players.iter_mut().enumerate() {
            player.index = index;
        }
        self.reposition_paddles();
        true
    }

    /// Apply a player's control input: clamp to [0, 1] and move the paddle
    /// to the interpolated sector angle. Position is authoritative and
    /// instantaneous; no smoothing.
    pub fn set_player_x(&mut self, id: &str, value: f64) {
        let count = self.players.len();
        if count == 0 {
            return;
        }
        let Some(player) = self.players.iter_mut().find(|player| player.id == id) else {
            return;
        };
        player.x = value.clamp(0.0, 1.0);
        let (index, x) = (player.index, player.x);
        let (px, py, angle) = paddle_pose(index, count, x, self.config.paddle_offset);
        self.physics.set_paddle_pose(player.paddle, px, py, angle);
    }

    pub fn transition(&mut self, transition: Transition) -> Result<(), GameError> {
        match transition {
            Transition::Start => self.start(),
            Transition::End => self.end(),
            Transition::Back => self.back(),
        }
    }

    /// Idle -> Playing. Resets balls to the configured spawn count.
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.state != GameState::Idle {
            return Err(GameError::InvalidTransition {
                event: "start",
                from: self.state,
            });
        }
        self.reset_balls();
        self.state = GameState::Playing;
        Ok(())
    }

    /// Playing -> Result.
    pub fn end(&mut self) -> Result<(), GameError> {
        if self.state != GameState::Playing {
            return Err(GameError::InvalidTransition {
                event: "end",
                from: self.state,
            });
        }
        self.state = GameState::Result;
        Ok(())
    }

    /// Result -> Idle.
    pub fn back(&mut self) -> Result<(), GameError> {
        if self.state != GameState::Result {
            return Err(GameError::InvalidTransition {
                event: "back",
                from: self.state,
            });
        }
        self.state = GameState::Idle;
        Ok(())
    }

    /// Spawn one ball at the center with a uniformly random outward launch
    /// direction, unless the target count is already met.
    pub fn spawn_ball(&mut self) {
        if self.balls.len() >= self.config.target_balls {
            return;
        }
        let theta = self.rng.gen_range(0.0..TAU);
        let speed = self.config.ball_speed;
        let body = self.physics.create_ball(
            self.config.ball_radius,
            0.0,
            0.0,
            theta.cos() as f32 * speed,
            theta.sin() as f32 * speed,
        );
        self.balls.push(Ball {
            id: Uuid::new_v4().to_string(),
            body,
            last_hit: None,
        });
    }

    fn reset_balls(&mut self) {
        for ball in self.balls.drain(..) {
            self.physics.remove_body(ball.body);
        }
        for _ in 0..self.config.target_balls {
            self.spawn_ball();
        }
    }

    /// Advance the simulation by `dt` seconds and interpret the physics
    /// events into scoring and ball destruction.
    pub fn update(&mut self, dt: f64) -> Vec<GameEvent> {
        let mut out = Vec::new();
        for event in self.physics.step(dt as f32) {
            match event {
                PhysicsEvent::PaddleHit { ball, paddle } => {
                    let Some(owner_id) = self
                        .players
                        .iter()
                        .find(|player| player.paddle.collider() == paddle)
                        .map(|player| player.id.clone())
                    else {
                        continue;
                    };
                    let Some(hit) = self
                        .balls
                        .iter_mut()
                        .find(|candidate| candidate.body.collider() == ball)
                    else {
                        continue;
                    };
                    hit.last_hit = Some(owner_id);
                    if let Some((x, y, _, _)) = self.physics.ball_state(hit.body) {
                        out.push(GameEvent::BallHit {
                            x: x as f64,
                            y: y as f64,
                        });
                    }
                }
                PhysicsEvent::BoundaryExit { ball, x, y } => {
                    let Some(at) = self
                        .balls
                        .iter()
                        .position(|candidate| candidate.body.collider() == ball)
                    else {
                        continue;
                    };
                    let ball = self.balls.remove(at);
                    self.physics.remove_body(ball.body);
                    if self.players.is_empty() {
                        continue;
                    }
                    let sector = exit_sector(x as f64, y as f64, self.players.len());
                    self.award_points(sector, ball.last_hit.as_deref());
                    out.push(GameEvent::BallOut { sector });
                }
            }
        }
        out
    }

    /// Scoring attribution: if the last toucher is still present and defends
    /// a different sector, only they score; otherwise every player defending
    /// a different sector scores.
    fn award_points(&mut self, sector: usize, last_hit: Option<&str>) {
        let attributed = last_hit
            .and_then(|id| self.players.iter().position(|player| player.id == id))
            .filter(|&at| self.players[at].index != sector);
        match attributed {
            Some(at) => self.players[at].score += 1,
            None => {
                for player in self.players.iter_mut().filter(|p| p.index != sector) {
                    player.score += 1;
                }
            }
        }
    }

    /// Produce the immutable snapshot shipped to clients.
    pub fn serialize(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self
                .players
                .iter()
                .map(|player| PlayerWire {
                    id: player.id.clone(),
                    name: player.name.clone(),
                    index: player.index as u32,
                    x: player.x,
                    score: player.score,
                })
                .collect(),
            balls: self
                .balls
                .iter()
                .map(|ball| {
                    let (x, y, vx, vy) = self.physics.ball_state(ball.body).unwrap_or_default();
                    BallWire {
                        id: ball.id.clone(),
                        x: round4(x as f64),
                        y: round4(y as f64),
                        vx: round4(vx as f64),
                        vy: round4(vy as f64),
                        radius: self.config.ball_radius as f64,
                    }
                })
                .collect(),
        }
    }

    fn reposition_paddles(&mut self) {
        let count = self.players.len();
        if count == 0 {
            return;
        }
        for at in 0..count {
            let (index, x, paddle) = {
                let player = &self.players[at];
                (player.index, player.x, player.paddle)
            };
            let (px, py, angle) = paddle_pose(index, count, x, self.config.paddle_offset);
            self.physics.set_paddle_pose(paddle, px, py, angle);
        }
    }
}

/// Pose of the paddle for player `index` of `count`, with its sector
/// interpolated by `x`: the paddle sits on the ring at the sector angle,
/// rotated to face the center.
fn paddle_pose(index: usize, count: usize, x: f64, offset: f32) -> (f32, f32, f32) {
    let sector = TAU / count as f64;
    let theta = sector * index as f64 + sector * x;
    (
        theta.cos() as f32 * offset,
        theta.sin() as f32 * offset,
        theta as f32 + std::f32::consts::FRAC_PI_2,
    )
}

/// Sector index of the point (x, y) when the circle is split into `count`
/// equal slices starting at angle 0.
fn exit_sector(x: f64, y: f64, count: usize) -> usize {
    let mut theta = y.atan2(x);
    if theta < 0.0 {
        theta += TAU;
    }
    let sector = (theta / (TAU / count as f64)) as usize;
    sector.min(count - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use rand::SeedableRng;

    fn test_game() -> Game {
        Game::new(GameConfig::default(), ChaCha8Rng::seed_from_u64(7))
    }

    #[test]
    fn added_player_serializes_with_defaults() {
        let mut game = test_game();
        game.add_player("p1", "alice");

        let player = game.player("p1").unwrap();
        assert_eq!(player.index, 0);
        assert_eq!(player.x(), 0.5);
        assert_eq!(player.score, 0);

        let world = game.serialize();
        assert_eq!(world.players.len(), 1);
        assert_eq!(world.players[0].id, "p1");
        assert_eq!(world.players[0].name, "alice");
        assert!(world.balls.is_empty());
    }

    #[test]
    fn indexes_stay_contiguous_across_joins_and_leaves() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");
        assert!(game.remove_player("p1"));

        let indexes: Vec<usize> = game.players().iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(game.players()[0].id, "p2");
        assert_eq!(game.players()[1].id, "p3");
        assert!(!game.remove_player("p1"));
    }

    #[test]
    fn input_is_clamped() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.set_player_x("p1", 2.5);
        assert_eq!(game.player("p1").unwrap().x(), 1.0);
        game.set_player_x("p1", -0.25);
        assert_eq!(game.player("p1").unwrap().x(), 0.0);
    }

    #[test]
    fn input_with_no_players_is_a_noop() {
        let mut game = test_game();
        game.set_player_x("ghost", 0.3);
        assert!(game.players().is_empty());
    }

    #[test]
    fn transitions_are_guarded() {
        let mut game = test_game();
        assert_eq!(game.state(), GameState::Idle);

        let err = game.end().unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidTransition {
                event: "end",
                from: GameState::Idle
            }
        ));
        assert_eq!(game.state(), GameState::Idle);

        game.start().unwrap();
        assert_eq!(game.state(), GameState::Playing);
        assert!(game.start().is_err());
        game.end().unwrap();
        assert_eq!(game.state(), GameState::Result);
        assert!(game.end().is_err());
        game.back().unwrap();
        assert_eq!(game.state(), GameState::Idle);
    }

    #[test]
    fn start_resets_balls_to_target() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.start().unwrap();
        assert_eq!(game.ball_count(), 1);

        // Restarting after a full cycle replaces the balls.
        let old_id = game.serialize().balls[0].id.clone();
        game.end().unwrap();
        game.back().unwrap();
        game.start().unwrap();
        assert_eq!(game.ball_count(), 1);
        assert_ne!(game.serialize().balls[0].id, old_id);
    }

    #[test]
    fn spawn_ball_respects_target_count() {
        let mut game = test_game();
        game.spawn_ball();
        game.spawn_ball();
        assert_eq!(game.ball_count(), 1);
    }

    #[test]
    fn unattributed_ball_out_scores_all_other_sectors() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");

        game.award_points(1, None);

        let scores: Vec<u32> = game.players().iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![1, 0, 1]);
    }

    #[test]
    fn attributed_ball_out_scores_only_the_last_toucher() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");

        game.award_points(1, Some("p1"));

        let scores: Vec<u32> = game.players().iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![1, 0, 0]);
    }

    #[test]
    fn self_inflicted_ball_out_scores_the_defenders() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");

        // Last toucher defends the scoring sector: point goes to everyone else.
        game.award_points(1, Some("p2"));

        let scores: Vec<u32> = game.players().iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![1, 0, 1]);
    }

    #[test]
    fn departed_last_toucher_falls_back_to_defenders() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");

        game.award_points(1, Some("gone"));

        let scores: Vec<u32> = game.players().iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![1, 0, 1]);
    }

    #[test]
    fn exit_sector_maps_angles_to_slices() {
        assert_eq!(exit_sector(1.0, 0.1, 3), 0);
        assert_eq!(exit_sector(-1.0, 1.0, 3), 1);
        assert_eq!(exit_sector(0.0, -1.0, 3), 2);
        // Single player owns the whole circle.
        assert_eq!(exit_sector(-1.0, -1.0, 1), 0);
    }

    #[test]
    fn ball_out_destroys_the_ball_and_emits_the_sector() {
        let mut game = test_game();
        game.add_player("p1", "a");
        game.add_player("p2", "b");
        game.add_player("p3", "c");
        // Park the paddles at the sector edges so the launch path is clear.
        for id in ["p1", "p2", "p3"] {
            game.set_player_x(id, 0.0);
        }
        game.start().unwrap();
        assert_eq!(game.ball_count(), 1);

        let dt = 1.0 / 60.0;
        let mut events = Vec::new();
        for _ in 0..1200 {
            events.extend(game.update(dt));
            if events
                .iter()
                .any(|event| matches!(event, GameEvent::BallOut { .. }))
            {
                break;
            }
        }

        let sector = events
            .iter()
            .find_map(|event| match event {
                GameEvent::BallOut { sector } => Some(*sector),
                _ => None,
            })
            .expect("ball never left the arena");
        assert!(sector < 3);
        assert_eq!(game.ball_count(), 0);

        // Replacement is a separate, deferred step.
        game.spawn_ball();
        assert_eq!(game.ball_count(), 1);
    }
}
