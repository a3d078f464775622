//! Rusty Rooms - a room-based real-time broadcast server
//!
//! Clients join named rooms over WebSocket connections and exchange chat,
//! media and game events. The engine fans events out per room, keeps a
//! bounded history, and runs a draw-and-guess game, a buzzer quiz and polls
//! on top of the same rooms.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use constants::*;
pub use error::{ChatroomError, Result};
