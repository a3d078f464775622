//! In-memory leaderboard for development and testing

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::{rank, GameScore, LeaderboardRepository};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryLeaderboardRepository {
    scores: RwLock<Vec<GameScore>>,
}

impl MemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderboardRepository for MemoryLeaderboardRepository {
    async fn load(&self) -> Result<Vec<GameScore>> {
        Ok(self.scores.read().await.clone())
    }

    async fn save(&self, scores: Vec<GameScore>) -> Result<()> {
        *self.scores.write().await = scores;
        Ok(())
    }

    async fn add(&self, score: GameScore) -> Result<()> {
        let mut scores = self.scores.write().await;
        scores.push(score);
        rank(&mut scores);
        Ok(())
    }

    async fn get_top(&self, n: usize) -> Result<Vec<GameScore>> {
        Ok(self.scores.read().await.iter().take(n).cloned().collect())
    }

    async fn get_all(&self) -> Vec<GameScore> {
        self.scores.read().await.clone()
    }

    async fn clear(&self) -> Result<()> {
        self.scores.write().await.clear();
        Ok(())
    }
}
