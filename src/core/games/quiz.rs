//! Buzzer quiz: the first exact answer resolves the quiz for good

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::core::event::RoomName;

#[derive(Debug, Clone)]
struct Quiz {
    question: String,
    answer: String,
    active: bool,
}

#[derive(Default)]
pub struct QuizBook {
    quizzes: RwLock<HashMap<RoomName, Quiz>>,
}

impl QuizBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh quiz, replacing whatever the room had
    pub async fn start(&self, room: &RoomName, question: &str, answer: &str) {
        self.quizzes.write().await.insert(
            room.clone(),
            Quiz { question: question.to_string(), answer: answer.to_string(), active: true },
        );
    }

    /// Returns the correct answer when `attempt` resolves the active quiz.
    /// An empty attempt never matches, so a quiz started without an answer
    /// stays open.
    pub async fn answer(&self, room: &RoomName, attempt: &str) -> Option<String> {
        if attempt.is_empty() {
            return None;
        }

        let mut quizzes = self.quizzes.write().await;
        let quiz = quizzes.get_mut(room.as_str())?;

        if quiz.active && quiz.answer == attempt {
            quiz.active = false;
            Some(quiz.answer.clone())
        } else {
            None
        }
    }

    pub async fn is_active(&self, room: &RoomName) -> bool {
        self.quizzes
            .read()
            .await
            .get(room.as_str())
            .map(|q| q.active)
            .unwrap_or(false)
    }

    pub async fn question(&self, room: &RoomName) -> Option<String> {
        self.quizzes.read().await.get(room.as_str()).map(|q| q.question.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_correct_answer_resolves() {
        let quizzes = QuizBook::new();
        let room = RoomName::new("lobby");
        quizzes.start(&room, "1+1?", "2").await;

        assert!(quizzes.answer(&room, "3").await.is_none());
        assert!(quizzes.is_active(&room).await);

        assert_eq!(quizzes.answer(&room, "2").await.as_deref(), Some("2"));
        assert!(!quizzes.is_active(&room).await);
        assert!(quizzes.answer(&room, "2").await.is_none());

        // A new quiz starts over
        quizzes.start(&room, "2+2?", "4").await;
        assert_eq!(quizzes.question(&room).await.as_deref(), Some("2+2?"));
        assert!(quizzes.is_active(&room).await);
    }

    #[tokio::test]
    async fn test_quiz_without_answer_cannot_be_won() {
        let quizzes = QuizBook::new();
        let room = RoomName::new("lobby");
        quizzes.start(&room, "pick a number", "").await;

        assert!(quizzes.answer(&room, "").await.is_none());
        assert!(quizzes.is_active(&room).await);
    }

    #[tokio::test]
    async fn test_answer_without_quiz() {
        let quizzes = QuizBook::new();
        assert!(quizzes.answer(&RoomName::new("lobby"), "2").await.is_none());
    }
}
