use crate::game::GameState;
use thiserror::Error;

/// Failures surfaced by the room manager and simulation APIs.
///
/// `RoomNotFound` is a boundary fault returned to the caller;
/// `InvalidTransition` is caught and logged by the tick loop and leaves the
/// state machine unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    #[error("invalid transition `{event}` from state {from:?}")]
    InvalidTransition {
        event: &'static str,
        from: GameState,
    },
}
