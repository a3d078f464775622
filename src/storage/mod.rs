//! Score ledger persistence

pub mod leaderboard;
pub mod memory;
pub mod traits;

pub use leaderboard::FileLeaderboardRepository;
pub use memory::MemoryLeaderboardRepository;
pub use traits::{GameScore, LeaderboardRepository};
