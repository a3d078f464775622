//! Draw-and-guess round state
//!
//! A room is idle until a drawer sets a word. The first non-drawer whose
//! guess matches clears the round in the same critical section as the check,
//! so two simultaneous correct guesses cannot both win.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::core::event::RoomName;
use crate::error::{ChatroomError, Result};

/// Placeholder shown to guessers for each character of the word
pub const MASK_GLYPH: char = '*';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawState {
    pub word: String,
    pub drawer: String,
}

impl DrawState {
    pub fn is_active(&self) -> bool {
        !self.word.is_empty()
    }
}

/// Case-folded, whitespace-trimmed form used to compare guesses
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// One glyph per code point of `word`
pub fn mask(word: &str) -> String {
    word.chars().map(|_| MASK_GLYPH).collect()
}

#[derive(Default)]
pub struct DrawStates {
    rounds: RwLock<HashMap<RoomName, DrawState>>,
}

impl DrawStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a round in `room`. Refused while another drawer's round is active;
    /// the current drawer may replace their own word.
    pub async fn set_word(&self, room: &RoomName, drawer: &str, word: &str) -> Result<()> {
        let mut rounds = self.rounds.write().await;
        let state = rounds.entry(room.clone()).or_default();

        if state.is_active() && state.drawer != drawer {
            return Err(ChatroomError::RoundInProgress(state.drawer.clone()));
        }

        state.word = word.to_string();
        state.drawer = drawer.to_string();
        Ok(())
    }

    /// Check a guess. A winning guess resets the room to idle and returns the
    /// revealed word.
    pub async fn try_guess(&self, room: &RoomName, guesser: &str, guess: &str) -> Option<String> {
        let mut rounds = self.rounds.write().await;
        let state = rounds.get_mut(room.as_str())?;

        if !state.is_active() || state.drawer == guesser || normalize(guess) != normalize(&state.word) {
            return None;
        }

        let won = std::mem::take(state);
        Some(won.word)
    }

    pub async fn current(&self, room: &RoomName) -> Option<DrawState> {
        let rounds = self.rounds.read().await;
        rounds.get(room.as_str()).filter(|s| s.is_active()).cloned()
    }

    /// Forget the round of a room that no longer exists
    pub async fn remove(&self, room: &RoomName) {
        self.rounds.write().await.remove(room.as_str());
    }
}
