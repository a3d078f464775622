//! Per-room mini-game and poll state

pub mod draw;
pub mod quiz;
pub mod vote;

pub use draw::{DrawState, DrawStates};
pub use quiz::QuizBook;
pub use vote::VoteBook;
