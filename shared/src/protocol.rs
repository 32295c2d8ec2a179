use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Full world state. Sent to a fresh subscriber and whenever room
    /// membership changes.
    #[serde(rename = "snapshot")]
    Snapshot { world: WorldSnapshot },
    /// Patch against the previously sent snapshot, produced by
    /// [`crate::delta::delta`]. Framing is an optimization; applying the
    /// patch with [`crate::delta::assign`] reconstructs the exact snapshot.
    #[serde(rename = "snapshotDelta")]
    SnapshotDelta { world: Value },
    #[serde(rename = "playerEnter")]
    PlayerEnter { id: String },
    #[serde(rename = "playerLeave")]
    PlayerLeave { id: String },
    /// Sent to a newly joined connection only: its own player id.
    #[serde(rename = "me:enter")]
    MeEnter { id: String },
    /// A ball left the arena through the given sector.
    #[serde(rename = "ballOut")]
    BallOut { index: u32 },
    /// Cosmetic: a paddle touched a ball at this position.
    #[serde(rename = "ballHit")]
    BallHit { ball: BallPoint },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallPoint {
    pub x: f64,
    pub y: f64,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Set the caller's paddle position along its sector, clamped to [0, 1].
    #[serde(rename = "x")]
    X { value: f64 },
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "end")]
    End,
    #[serde(rename = "back")]
    Back,
}

// === Snapshot shape ===

/// Read-only projection of one room's simulation. Field sets are fixed so
/// consecutive snapshots stay diffable by the delta codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerWire>,
    pub balls: Vec<BallWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerWire {
    pub id: String,
    pub name: String,
    pub index: u32,
    pub x: f64,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallWire {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
}

/// Round to 4 decimal places (sufficient for screen positions, saves ~50% JSON size)
#[inline]
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}
