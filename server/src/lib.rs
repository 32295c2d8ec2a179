//! Pong arena server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod error;
pub mod game;
pub mod game_loop;
pub mod manager;
pub mod physics;
pub mod ws;
