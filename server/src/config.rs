/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_rate_hz: u32,
    pub rng_seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".to_string(),
            tick_rate_hz: 60,
            rng_seed: 42,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".to_string());
        }
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        Ok(())
    }
}

/// Arena and gameplay tuning. Distances are in pixels on a table centered at
/// the origin; paddles sit on a ring just inside the boundary circle.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Radius of the arena boundary sensor circle
    pub arena_radius: f32,
    /// Radius of the ring paddles travel along
    pub paddle_offset: f32,
    pub paddle_half_width: f32,
    pub paddle_half_height: f32,
    pub ball_radius: f32,
    /// Launch speed of a freshly spawned ball (px/s)
    pub ball_speed: f32,
    /// Ball count the simulation keeps restoring towards
    pub target_balls: usize,
    /// Delay between a ball leaving the arena and its replacement spawning
    pub respawn_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_radius: 320.0,
            paddle_offset: 304.0,
            paddle_half_width: 32.0,
            paddle_half_height: 16.0,
            ball_radius: 8.0,
            ball_speed: 240.0,
            target_balls: 1,
            respawn_delay_ms: 500,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.arena_radius.is_finite() || self.arena_radius <= 0.0 {
            return Err("arena_radius must be finite and > 0".to_string());
        }
        if self.paddle_offset <= 0.0 || self.paddle_offset >= self.arena_radius {
            return Err("paddle_offset must be inside the arena".to_string());
        }
        if self.ball_radius <= 0.0 || self.ball_radius >= self.arena_radius {
            return Err("ball_radius must be > 0 and smaller than the arena".to_string());
        }
        if !self.ball_speed.is_finite() || self.ball_speed <= 0.0 {
            return Err("ball_speed must be finite and > 0".to_string());
        }
        if self.target_balls == 0 {
            return Err("target_balls must be >= 1".to_string());
        }
        Ok(())
    }
}
