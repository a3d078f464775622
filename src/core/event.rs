//! Events exchanged between clients and the room engine
//!
//! On the wire every event is one flat JSON object: a `type` discriminant,
//! a `room`, and whichever optional fields that type uses. Inside the server
//! an [`Event`] carries a closed [`Payload`] enum instead, so handlers match
//! on the variant rather than probing optional fields. The two shapes are
//! converted through [`WireMessage`] by serde (`from`/`into`).

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::SYSTEM_ROOM_PREFIX;
use crate::error::Result;

/// A room name, classified once as public or system (mini-game) room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomName {
    name: String,
    system: bool,
}

impl RoomName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let system = name.starts_with(SYSTEM_ROOM_PREFIX);
        Self { name, system }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// System rooms are left out of room listings, online counts and history
    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl PartialEq for RoomName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RoomName {}

// Hash on the name only so `Borrow<str>` lookups stay consistent
impl Hash for RoomName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.name
    }
}

impl PartialEq<str> for RoomName {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

impl PartialEq<&str> for RoomName {
    fn eq(&self, other: &&str) -> bool {
        self.name == *other
    }
}

impl From<String> for RoomName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> Self {
        room.name
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Quoted message a chat line replies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyTo {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub content: String,
}

/// Vote counts in the order the proposer listed the options.
/// Serialized as a JSON object whose key order is the option order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally(pub Vec<(String, u32)>);

impl Tally {
    pub fn get(&self, option: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|(name, _)| name == option)
            .map(|(_, count)| *count)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().map(|(_, count)| count).sum()
    }
}

impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (option, count) in &self.0 {
            map.serialize_entry(option, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Tally {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = Tally;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of option to vote count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Tally, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((option, count)) = access.next_entry::<String, u32>()? {
                    entries.push((option, count));
                }
                Ok(Tally(entries))
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

/// Flat wire representation of an event. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub room: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nickname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_info: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawAction {
    Start,
    Move,
    End,
    Clear,
}

impl DrawAction {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Start => "draw_start",
            Self::Move => "draw_move",
            Self::End => "draw_end",
            Self::Clear => "clear_canvas",
        }
    }
}

/// One canvas operation of the draw-and-guess game
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub action: DrawAction,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub color: Option<String>,
    pub line_width: Option<u32>,
}

/// The closed set of event variants, keyed by the wire `type`
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Chat { content: String, reply_to: Option<ReplyTo> },
    Draw(Stroke),
    GameScore { tries: u32, time: u32 },
    Reaction { emoji: String, content: Option<String> },
    Vote { question: String, options: Vec<String> },
    VoteAnswer { answer: String },
    VoteResult { results: Tally },
    /// `answer` is only present on the inbound request, never rebroadcast
    QuizStart { question: String, answer: Option<String> },
    QuizAnswer { answer: String },
    QuizResult { answer: String },
    GetLeaderboard,
    /// `scores` is the JSON-encoded ranked score list
    LeaderboardUpdate { scores: String },
    Switch { password: String },
    SwitchSuccess { previous_room: String },
    WrongPassword,
    PasswordRequired,
    NewRoundDrawer { word: String },
    NewRoundGuesser { mask: String },
    GuessCorrect { word: String },
    GopherRain { content: String },
    RoomList { rooms: BTreeMap<String, bool> },
    OnlineCount { count: usize },
    Error { content: String },
    /// Types the router forwards untouched (image, voice, join, leave, ...)
    Other { kind: String, fields: Box<WireMessage> },
}

impl Payload {
    /// Wire discriminant of this payload
    pub fn kind(&self) -> &str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Draw(stroke) => stroke.action.wire_name(),
            Self::GameScore { .. } => "game_score",
            Self::Reaction { .. } => "reaction",
            Self::Vote { .. } => "vote",
            Self::VoteAnswer { .. } => "vote_answer",
            Self::VoteResult { .. } => "vote_result",
            Self::QuizStart { .. } => "quiz_start",
            Self::QuizAnswer { .. } => "quiz_answer",
            Self::QuizResult { .. } => "quiz_result",
            Self::GetLeaderboard => "get_leaderboard",
            Self::LeaderboardUpdate { .. } => "leaderboard_update",
            Self::Switch { .. } => "switch",
            Self::SwitchSuccess { .. } => "switch_success",
            Self::WrongPassword => "wrong_password",
            Self::PasswordRequired => "password_required",
            Self::NewRoundDrawer { .. } => "new_round_drawer",
            Self::NewRoundGuesser { .. } => "new_round_guesser",
            Self::GuessCorrect { .. } => "guess_correct",
            Self::GopherRain { .. } => "gopher_rain",
            Self::RoomList { .. } => "room_list",
            Self::OnlineCount { .. } => "online_count",
            Self::Error { .. } => "error",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// A single event with its routing header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct Event {
    pub room: RoomName,
    pub nickname: String,
    pub avatar: String,
    pub user_id: Option<String>,
    pub timestamp: Option<String>,
    pub payload: Payload,
}

impl Event {
    pub fn new(room: impl Into<RoomName>, payload: Payload) -> Self {
        Self {
            room: room.into(),
            nickname: String::new(),
            avatar: String::new(),
            user_id: None,
            timestamp: None,
            payload,
        }
    }

    pub fn with_sender(mut self, nickname: impl Into<String>, avatar: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self.avatar = avatar.into();
        self
    }

    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(clock_now());
        self
    }

    /// Chat line from `nickname` in `room`
    pub fn chat(room: impl Into<RoomName>, nickname: &str, content: impl Into<String>) -> Self {
        Self::new(room, Payload::Chat { content: content.into(), reply_to: None })
            .with_sender(nickname, "")
    }

    /// Room notice such as "x joined the room"
    pub fn notice(room: impl Into<RoomName>, kind: &str, content: impl Into<String>) -> Self {
        let fields = WireMessage { content: Some(content.into()), ..WireMessage::default() };
        Self::new(room, Payload::Other { kind: kind.to_string(), fields: Box::new(fields) }).stamped()
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(RoomName::default(), Payload::Error { content: content.into() })
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    /// Text content carried by the event, if its type has any
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            Payload::Chat { content, .. }
            | Payload::GopherRain { content }
            | Payload::Error { content } => Some(content),
            Payload::Reaction { content, .. } => content.as_deref(),
            Payload::Other { fields, .. } => fields.content.as_deref(),
            Payload::NewRoundDrawer { word } | Payload::GuessCorrect { word } => Some(word),
            Payload::NewRoundGuesser { mask } => Some(mask),
            _ => None,
        }
    }

    /// Room password carried by a `switch` or an init frame
    pub fn password(&self) -> &str {
        match &self.payload {
            Payload::Switch { password } => password,
            Payload::Other { fields, .. } => fields.password.as_deref().unwrap_or_default(),
            _ => "",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Local wall-clock time in the `HH:MM:SS` form clients display
pub fn clock_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

impl From<WireMessage> for Event {
    fn from(mut wire: WireMessage) -> Self {
        let take = |field: &mut Option<String>| field.take().unwrap_or_default();

        let kind = std::mem::take(&mut wire.kind);
        let payload = match kind.as_str() {
            "chat" => Payload::Chat { content: take(&mut wire.content), reply_to: wire.reply_to.take() },
            "draw_start" | "draw_move" | "draw_end" | "clear_canvas" => {
                let action = match kind.as_str() {
                    "draw_start" => DrawAction::Start,
                    "draw_move" => DrawAction::Move,
                    "draw_end" => DrawAction::End,
                    _ => DrawAction::Clear,
                };
                Payload::Draw(Stroke {
                    action,
                    x: wire.x,
                    y: wire.y,
                    color: wire.color.take(),
                    line_width: wire.line_width,
                })
            }
            "game_score" | "game_win" => Payload::GameScore {
                tries: wire.tries.unwrap_or_default(),
                time: wire.time.unwrap_or_default(),
            },
            "reaction" => Payload::Reaction { emoji: take(&mut wire.emoji), content: wire.content.take() },
            "vote" => Payload::Vote {
                question: take(&mut wire.question),
                options: wire.options.take().unwrap_or_default(),
            },
            "vote_answer" => Payload::VoteAnswer { answer: take(&mut wire.answer) },
            "vote_result" => Payload::VoteResult { results: wire.results.take().unwrap_or_default() },
            "quiz_start" => Payload::QuizStart { question: take(&mut wire.question), answer: wire.answer.take() },
            "quiz_answer" => Payload::QuizAnswer { answer: take(&mut wire.answer) },
            "quiz_result" => Payload::QuizResult { answer: take(&mut wire.answer) },
            "get_leaderboard" => Payload::GetLeaderboard,
            "leaderboard_update" => Payload::LeaderboardUpdate { scores: take(&mut wire.content) },
            "switch" => Payload::Switch { password: take(&mut wire.password) },
            "switch_success" => Payload::SwitchSuccess { previous_room: take(&mut wire.content) },
            "wrong_password" => Payload::WrongPassword,
            "password_required" => Payload::PasswordRequired,
            "new_round_drawer" => Payload::NewRoundDrawer { word: take(&mut wire.content) },
            "new_round_guesser" => Payload::NewRoundGuesser { mask: take(&mut wire.content) },
            "guess_correct" => Payload::GuessCorrect { word: take(&mut wire.content) },
            "gopher_rain" => Payload::GopherRain { content: take(&mut wire.content) },
            "room_list" => Payload::RoomList { rooms: wire.room_info.take().unwrap_or_default() },
            "online_count" => Payload::OnlineCount {
                count: wire.content.as_deref().and_then(|c| c.parse().ok()).unwrap_or_default(),
            },
            "error" => Payload::Error { content: take(&mut wire.content) },
            _ => Payload::Other { kind: kind.clone(), fields: Box::new(wire.clone()) },
        };

        Event {
            room: RoomName::new(std::mem::take(&mut wire.room)),
            nickname: std::mem::take(&mut wire.nickname),
            avatar: std::mem::take(&mut wire.avatar),
            user_id: wire.user_id.take(),
            timestamp: wire.timestamp.take(),
            payload,
        }
    }
}

impl From<Event> for WireMessage {
    fn from(event: Event) -> Self {
        let kind = event.kind().to_string();
        let mut wire = WireMessage::default();

        match event.payload {
            Payload::Chat { content, reply_to } => {
                wire.content = Some(content);
                wire.reply_to = reply_to;
            }
            Payload::Draw(stroke) => {
                wire.x = stroke.x;
                wire.y = stroke.y;
                wire.color = stroke.color;
                wire.line_width = stroke.line_width;
            }
            Payload::GameScore { tries, time } => {
                wire.tries = Some(tries);
                wire.time = Some(time);
            }
            Payload::Reaction { emoji, content } => {
                wire.emoji = Some(emoji);
                wire.content = content;
            }
            Payload::Vote { question, options } => {
                wire.question = Some(question);
                wire.options = Some(options);
            }
            Payload::VoteAnswer { answer }
            | Payload::QuizAnswer { answer }
            | Payload::QuizResult { answer } => wire.answer = Some(answer),
            Payload::VoteResult { results } => wire.results = Some(results),
            Payload::QuizStart { question, answer } => {
                wire.question = Some(question);
                wire.answer = answer;
            }
            Payload::Switch { password } => {
                wire.password = Some(password).filter(|p| !p.is_empty());
            }
            Payload::LeaderboardUpdate { scores: content }
            | Payload::SwitchSuccess { previous_room: content }
            | Payload::NewRoundDrawer { word: content }
            | Payload::NewRoundGuesser { mask: content }
            | Payload::GuessCorrect { word: content }
            | Payload::GopherRain { content }
            | Payload::Error { content } => wire.content = Some(content),
            Payload::WrongPassword | Payload::PasswordRequired => {
                wire.content = Some("password verification failed".to_string());
            }
            Payload::RoomList { rooms } => wire.room_info = Some(rooms),
            Payload::OnlineCount { count } => wire.content = Some(count.to_string()),
            Payload::GetLeaderboard => {}
            Payload::Other { fields, .. } => wire = *fields,
        }

        wire.kind = kind;
        wire.room = event.room.into();
        wire.nickname = event.nickname;
        wire.avatar = event.avatar;
        wire.user_id = event.user_id;
        wire.timestamp = event.timestamp;
        wire
    }
}
