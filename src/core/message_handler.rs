//! Message router
//!
//! Classifies a processed event by its payload and applies it to room state.
//! Game state is mutated under its own lock and released before any write.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::constants::{DRAW_ROOM, GAME_ROOM, SYSTEM_AVATAR, SYSTEM_NICKNAME};
use crate::core::client::Client;
use crate::core::event::{clock_now, Event, Payload};
use crate::core::games::draw::mask;
use crate::core::room::RoomManager;
use crate::error::ChatroomError;
use crate::storage::{GameScore, LeaderboardRepository};

/// Chat command that starts a draw-and-guess round
pub const SETWORD_COMMAND: &str = "/setword ";
/// Chat command that makes gophers rain on a public room
pub const GOPHER_COMMAND: &str = "/gopher";

pub struct MessageRouter {
    rooms: Arc<RoomManager>,
    leaderboard: Arc<dyn LeaderboardRepository>,
}

impl MessageRouter {
    pub fn new(rooms: Arc<RoomManager>, leaderboard: Arc<dyn LeaderboardRepository>) -> Self {
        Self { rooms, leaderboard }
    }

    /// Apply one event. `from` is the originating client when known.
    pub async fn route(&self, from: Option<&Arc<Client>>, mut event: Event) {
        if event.timestamp.is_none() {
            event.timestamp = Some(clock_now());
        }
        debug!("Routing {} in {} from {}", event.kind(), event.room, event.nickname);

        match &event.payload {
            Payload::Draw(_) => self.handle_draw(from, &event).await,
            Payload::GameScore { tries, time } => {
                let score = GameScore {
                    nickname: event.nickname.clone(),
                    avatar: event.avatar.clone(),
                    tries: *tries,
                    time: *time,
                };
                self.handle_game_score(score).await;
            }
            Payload::Reaction { .. } => {
                self.rooms.broadcast_to_room(&event).await;
            }
            Payload::Vote { question, options } => {
                let ordered = self.rooms.votes.start(&event.room, question, options).await;
                let question = question.clone();
                let mut announced = event.clone();
                announced.payload = Payload::Vote { question, options: ordered };
                self.rooms.announce(announced).await;
            }
            Payload::VoteAnswer { answer } => {
                if let Some(results) = self.rooms.votes.cast(&event.room, &event.nickname, answer).await {
                    let result = Event::new(event.room.clone(), Payload::VoteResult { results }).stamped();
                    self.rooms.broadcast_to_room(&result).await;
                }
            }
            Payload::QuizStart { question, answer } => {
                let answer = answer.as_deref().unwrap_or_default();
                self.rooms.quizzes.start(&event.room, question, answer).await;

                // Guessers must not see the answer
                let mut announced = event.clone();
                announced.payload = Payload::QuizStart { question: question.clone(), answer: None };
                self.rooms.announce(announced).await;
            }
            Payload::QuizAnswer { answer } => {
                if let Some(correct) = self.rooms.quizzes.answer(&event.room, answer).await {
                    let result = Event::new(event.room.clone(), Payload::QuizResult { answer: correct })
                        .with_sender(event.nickname.clone(), event.avatar.clone())
                        .stamped();
                    self.rooms.announce(result).await;
                }
            }
            Payload::GetLeaderboard => self.handle_get_leaderboard(from).await,
            Payload::Chat { content, .. } => {
                let content = content.clone();
                self.handle_chat(from, event, &content).await;
            }
            Payload::Switch { .. } => {
                debug!("Ignoring switch outside a session from {}", event.nickname);
            }
            _ => self.handle_default(event).await,
        }
    }

    /// Members of the event's room split into the sender and everyone else.
    /// The sender is matched by client id when known, by nickname otherwise.
    async fn split_sender(&self, from: Option<&Arc<Client>>, event: &Event) -> (Vec<Arc<Client>>, Vec<Arc<Client>>) {
        self.rooms
            .members(&event.room)
            .await
            .into_iter()
            .partition(|member| match from {
                Some(sender) => member.id == sender.id,
                None => member.nickname == event.nickname,
            })
    }

    async fn send_all(&self, recipients: &[Arc<Client>], event: &Event) {
        for client in recipients {
            self.rooms.send_to(client, event).await;
        }
    }

    async fn handle_draw(&self, from: Option<&Arc<Client>>, event: &Event) {
        let (_, others) = self.split_sender(from, event).await;
        self.send_all(&others, event).await;
    }

    async fn handle_game_score(&self, score: GameScore) {
        let announcement = format!(
            "{} won the number guessing game ({} tries, {} seconds)!",
            score.nickname, score.tries, score.time
        );
        let nickname = score.nickname.clone();

        // A failed write still leaves the in-memory ranking updated
        if let Err(e) = self.leaderboard.add(score).await {
            error!("Failed to persist leaderboard: {}", e);
        }

        if let Some(update) = self.leaderboard_event().await {
            self.rooms.broadcast_to_room(&update).await;
        }

        let announce = Event::chat(self.rooms.default_room().clone(), SYSTEM_NICKNAME, announcement)
            .with_sender(SYSTEM_NICKNAME, SYSTEM_AVATAR)
            .stamped();
        self.rooms.announce(announce).await;
        info!("Leaderboard updated with a score from {}", nickname);
    }

    async fn leaderboard_event(&self) -> Option<Event> {
        let scores = self.leaderboard.get_all().await;
        match serde_json::to_string(&scores) {
            Ok(scores) => Some(Event::new(GAME_ROOM, Payload::LeaderboardUpdate { scores })),
            Err(e) => {
                error!("Failed to encode leaderboard: {}", e);
                None
            }
        }
    }

    async fn handle_get_leaderboard(&self, from: Option<&Arc<Client>>) {
        let Some(update) = self.leaderboard_event().await else {
            return;
        };
        match from {
            Some(client) => {
                self.rooms.send_to(client, &update).await;
            }
            None => {
                self.rooms.broadcast_to_room(&update).await;
            }
        }
    }

    async fn handle_chat(&self, from: Option<&Arc<Client>>, event: Event, content: &str) {
        if event.room == DRAW_ROOM {
            if let Some(word) = content.strip_prefix(SETWORD_COMMAND).map(str::trim).filter(|w| !w.is_empty()) {
                self.start_round(from, &event, word).await;
                return;
            }

            if let Some(word) = self.rooms.draws.try_guess(&event.room, &event.nickname, content).await {
                info!("{} guessed the word in {}", event.nickname, event.room);
                let correct = Event::new(event.room.clone(), Payload::GuessCorrect { word })
                    .with_sender(event.nickname.clone(), "")
                    .stamped();
                self.rooms.broadcast_to_room(&correct).await;
                return;
            }
        }

        if !event.room.is_system() {
            if content == GOPHER_COMMAND {
                let rain = Event::new(
                    event.room.clone(),
                    Payload::GopherRain { content: "Let it rain Gophers!".to_string() },
                )
                .with_sender(event.nickname.clone(), "")
                .stamped();
                self.rooms.broadcast_to_room(&rain).await;
                return;
            }
            self.rooms.add_history(&event).await;
        }
        self.rooms.broadcast_to_room(&event).await;
    }

    async fn start_round(&self, from: Option<&Arc<Client>>, event: &Event, word: &str) {
        let room = &event.room;
        let (drawer, guessers) = self.split_sender(from, event).await;

        if let Err(e) = self.rooms.draws.set_word(room, &event.nickname, word).await {
            if let ChatroomError::RoundInProgress(active) = &e {
                let refusal = Event::new(
                    room.clone(),
                    Payload::Error { content: format!("{} is drawing right now, wait for the round to end", active) },
                );
                match from {
                    Some(client) => {
                        self.rooms.send_to(client, &refusal).await;
                    }
                    None => self.send_all(&drawer, &refusal).await,
                }
            }
            debug!("Rejected /setword from {}: {}", event.nickname, e);
            return;
        }
        info!("New draw round in {} by {}", room, event.nickname);

        let secret = Event::new(room.clone(), Payload::NewRoundDrawer { word: word.to_string() });
        match from {
            Some(client) => {
                self.rooms.send_to(client, &secret).await;
            }
            None if drawer.is_empty() => warn!("Drawer {} is not in {}", event.nickname, room),
            None => self.send_all(&drawer, &secret).await,
        }

        let masked = Event::new(room.clone(), Payload::NewRoundGuesser { mask: mask(word) })
            .with_sender(event.nickname.clone(), "");
        self.send_all(&guessers, &masked).await;
    }

    /// Image, voice, join, leave and any other type are forwarded unchanged
    async fn handle_default(&self, event: Event) {
        if !event.room.is_system() {
            let has_content = event.content().map(|c| !c.is_empty()).unwrap_or(false);
            if matches!(event.kind(), "image" | "voice") || has_content {
                self.rooms.add_history(&event).await;
            }
        }
        self.rooms.broadcast_to_room(&event).await;
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}
