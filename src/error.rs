use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum ChatroomError {
    // Lock errors
    SessionLock(String),

    // Connection errors
    ConnectionError(String),
    ConnectionClosed,

    // Message errors
    MessageParseError(String),
    MessageTooLarge(usize),

    // Admission errors
    RateLimited,

    // Room errors
    WrongPassword,
    PasswordRequired,

    // Game errors
    RoundInProgress(String),

    // Storage errors
    StorageError(String),

    // Worker pool errors
    PoolClosed,

    // System errors
    SystemError(String),

    // Configuration errors
    ConfigError(String),
}

impl ChatroomError {
    /// True for the error signatures a routine disconnect produces.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::ConnectionError(msg) => is_disconnect_message(msg),
            _ => false,
        }
    }

    /// Event type reported to a client whose room switch was refused
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::WrongPassword => "wrong_password",
            Self::PasswordRequired => "password_required",
            Self::RateLimited => "rate_limited",
            _ => "error",
        }
    }
}

/// Matches the error texts transports produce when the peer is already gone.
pub fn is_disconnect_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    [
        "closed connection",
        "connection closed",
        "already closed",
        "broken pipe",
        "connection reset",
        "connection was aborted",
        "sending after closing",
    ]
    .iter()
    .any(|signature| msg.contains(signature))
}

impl fmt::Display for ChatroomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionLock(msg) => write!(f, "Lock error: {}", msg),
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::MessageTooLarge(size) => write!(f, "Message too large: {} bytes", size),
            Self::RateLimited => write!(f, "Rate limit exceeded"),
            Self::WrongPassword => write!(f, "Wrong room password"),
            Self::PasswordRequired => write!(f, "Room password required"),
            Self::RoundInProgress(drawer) => write!(f, "A round by {} is already in progress", drawer),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::PoolClosed => write!(f, "Worker pool is closed"),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ChatroomError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for ChatroomError {
    fn from(err: PoisonError<T>) -> Self {
        ChatroomError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

impl From<serde_json::Error> for ChatroomError {
    fn from(err: serde_json::Error) -> Self {
        ChatroomError::MessageParseError(err.to_string())
    }
}

impl From<std::io::Error> for ChatroomError {
    fn from(err: std::io::Error) -> Self {
        ChatroomError::StorageError(err.to_string())
    }
}

// Generic result type for the server
pub type Result<T> = std::result::Result<T, ChatroomError>;
