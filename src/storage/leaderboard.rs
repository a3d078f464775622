//! JSON file backed leaderboard

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::RwLock;

use super::traits::{rank, GameScore, LeaderboardRepository};
use crate::error::{ChatroomError, Result};

/// Keeps the ranking in memory and rewrites the whole file on every change.
pub struct FileLeaderboardRepository {
    path: PathBuf,
    scores: RwLock<Vec<GameScore>>,
}

impl FileLeaderboardRepository {
    /// Open the leaderboard at `path`. A missing or unreadable file starts
    /// an empty ranking; the problem is logged and the file is rewritten on
    /// the next update.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let repo = Self { path: path.as_ref().to_path_buf(), scores: RwLock::new(Vec::new()) };
        if let Err(e) = repo.load().await {
            warn!("Starting with an empty leaderboard, {} could not be loaded: {}", repo.path.display(), e);
        }
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, scores: &[GameScore]) -> Result<()> {
        let json = serde_json::to_string_pretty(scores)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ChatroomError::StorageError(format!("{}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl LeaderboardRepository for FileLeaderboardRepository {
    async fn load(&self) -> Result<Vec<GameScore>> {
        let mut scores = self.scores.write().await;

        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No leaderboard at {}, starting empty", self.path.display());
                scores.clear();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<GameScore>>(&raw) {
            Ok(mut loaded) => {
                rank(&mut loaded);
                *scores = loaded;
                Ok(scores.clone())
            }
            Err(e) => {
                scores.clear();
                Err(ChatroomError::StorageError(format!(
                    "corrupt leaderboard {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
    }

    async fn save(&self, new_scores: Vec<GameScore>) -> Result<()> {
        let mut scores = self.scores.write().await;
        *scores = new_scores;
        self.write_file(&scores).await
    }

    async fn add(&self, score: GameScore) -> Result<()> {
        // The lock is held through the write so files land in update order
        let mut scores = self.scores.write().await;
        scores.push(score);
        rank(&mut scores);
        self.write_file(&scores).await
    }

    async fn get_top(&self, n: usize) -> Result<Vec<GameScore>> {
        let scores = self.scores.read().await;
        Ok(scores.iter().take(n).cloned().collect())
    }

    async fn get_all(&self) -> Vec<GameScore> {
        self.scores.read().await.clone()
    }

    async fn clear(&self) -> Result<()> {
        self.save(Vec::new()).await
    }
}
