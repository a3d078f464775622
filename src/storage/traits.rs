//! Storage interfaces for pluggable backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::LEADERBOARD_SIZE;
use crate::error::Result;

/// Result of one finished game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameScore {
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
    /// Attempts needed
    pub tries: u32,
    /// Elapsed seconds
    pub time: u32,
}

/// Ranked score list. `add` is the only mutation the engine uses; it always
/// re-ranks and truncates before persisting.
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Reload the ranking from the backing store
    async fn load(&self) -> Result<Vec<GameScore>>;

    /// Replace the whole ranking
    async fn save(&self, scores: Vec<GameScore>) -> Result<()>;

    async fn add(&self, score: GameScore) -> Result<()>;

    async fn get_top(&self, n: usize) -> Result<Vec<GameScore>>;

    async fn get_all(&self) -> Vec<GameScore>;

    async fn clear(&self) -> Result<()>;
}

/// Order by fewer tries, then faster time, then keep the best entries.
/// The sort is stable, so equal results keep their arrival order.
pub fn rank(scores: &mut Vec<GameScore>) {
    scores.sort_by(|a, b| a.tries.cmp(&b.tries).then(a.time.cmp(&b.time)));
    scores.truncate(LEADERBOARD_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(nick: &str, tries: u32, time: u32) -> GameScore {
        GameScore { nickname: nick.to_string(), avatar: String::new(), tries, time }
    }

    #[test]
    fn test_rank_orders_by_tries_then_time() {
        let mut scores = vec![score("a", 5, 20), score("b", 3, 50), score("c", 5, 10)];
        rank(&mut scores);
        let order: Vec<&str> = scores.iter().map(|s| s.nickname.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_truncates() {
        let mut scores: Vec<GameScore> = (0..15).map(|i| score("p", i, 0)).collect();
        rank(&mut scores);
        assert_eq!(scores.len(), LEADERBOARD_SIZE);
        assert_eq!(scores[0].tries, 0);
    }
}
