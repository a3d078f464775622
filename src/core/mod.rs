//! Core room engine

pub mod client;
pub mod connection;
pub mod event;
pub mod games;
pub mod ingest;
pub mod message_handler;
pub mod rate_limiter;
pub mod room;
pub mod server;
pub mod session;
pub mod thread_pool;

// Re-export main components for convenience
pub use client::Client;
pub use connection::{ChannelSink, ChannelStream, EventSink, EventStream};
pub use event::{Event, Payload, RoomName, Tally, WireMessage};
pub use ingest::InboundEvent;
pub use message_handler::MessageRouter;
pub use rate_limiter::RateLimiter;
pub use room::RoomManager;
pub use server::{ServerManager, SharedServerManager};
pub use session::run_session;
pub use thread_pool::{SharedTaskPool, TaskPool};
