//! Duplex connection abstraction
//! The engine writes through an [`EventSink`] and a session reads from an
//! [`EventStream`]; the transport behind them is not visible to the core.

use async_trait::async_trait;
use log::trace;
use tokio::sync::mpsc;

use crate::core::event::Event;
use crate::error::{ChatroomError, Result};

/// Write half of a client connection
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Transports apply their own write deadline.
    async fn send(&mut self, event: &Event) -> Result<()>;

    /// Keep-alive probe; transports without one accept it as a no-op
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;
}

/// Read half of a client connection
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `None` once the peer closed the connection cleanly.
    /// A frame that is not a valid event is reported as `MessageParseError`.
    async fn receive(&mut self) -> Result<Option<Event>>;
}

/// In-process sink that forwards events over an unbounded channel
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink together with the receiver that observes its output
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: &Event) -> Result<()> {
        trace!("Channel sink delivering {}", event.kind());
        self.sender
            .send(event.clone())
            .map_err(|_| ChatroomError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-process stream fed by an unbounded channel; closing the sender ends it
pub struct ChannelStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl ChannelStream {
    pub fn new() -> (mpsc::UnboundedSender<Event>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }
}

#[async_trait]
impl EventStream for ChannelStream {
    async fn receive(&mut self) -> Result<Option<Event>> {
        Ok(self.receiver.recv().await)
    }
}
