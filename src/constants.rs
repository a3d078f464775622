use std::time::Duration;

// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const WS_PATH: &str = "ws";

// Worker pool configuration constants
pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const DEFAULT_QUEUE_DEPTH: usize = 100;
pub const DEFAULT_INBOUND_QUEUE_DEPTH: usize = 100;

// Connection limits and keep-alive
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// Admission control
pub const DEFAULT_RATE_LIMIT_MAX_MESSAGES: u32 = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

// Rooms and storage
pub const DEFAULT_HISTORY_MAX_SIZE: usize = 100;
pub const DEFAULT_LEADERBOARD_FILE: &str = "leaderboard.json";
pub const DEFAULT_ROOM: &str = "lobby";
pub const LEADERBOARD_SIZE: usize = 10;

/// Rooms whose name starts with this marker are mini-game rooms
pub const SYSTEM_ROOM_PREFIX: &str = "_";
pub const DRAW_ROOM: &str = "_draw_game_";
pub const GAME_ROOM: &str = "_game_";

pub const SYSTEM_NICKNAME: &str = "🏆 System";
pub const SYSTEM_AVATAR: &str = "🏆";
