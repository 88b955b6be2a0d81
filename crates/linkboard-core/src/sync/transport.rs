//! Transport seam between the sync engine and the network.

use std::collections::VecDeque;
use thiserror::Error;

/// Events surfaced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A text frame from the relay
    Message(String),
    Error(String),
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// A bidirectional text channel to the relay.
///
/// Implementations never block: outgoing frames are queued and incoming ones
/// are collected until the owner polls.
pub trait Transport {
    fn connect(&mut self, url: &str) -> Result<(), TransportError>;

    fn disconnect(&mut self);

    fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    fn is_connected(&self) -> bool;
}

/// In-process transport for tests and offline sessions.
///
/// `connect` succeeds immediately and reports [`TransportEvent::Connected`] on
/// the next poll. Frames pushed with [`MemoryTransport::push_incoming`] are
/// delivered in order; sent frames are collected for inspection.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    connected: bool,
    fail_sends: bool,
    events: VecDeque<TransportEvent>,
    sent: Vec<String>,
    connects: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame as if it came from the relay.
    pub fn push_incoming(&mut self, frame: impl Into<String>) {
        self.events.push_back(TransportEvent::Message(frame.into()));
    }

    /// Take every frame sent so far.
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    /// Simulate the relay dropping the connection.
    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.events.push_back(TransportEvent::Disconnected);
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.connects
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, _url: &str) -> Result<(), TransportError> {
        if self.connected {
            return Err(TransportError::AlreadyConnected);
        }
        self.connected = true;
        self.connects += 1;
        self.events.push_back(TransportEvent::Connected);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.events.push_back(TransportEvent::Disconnected);
        }
    }

    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends {
            return Err(TransportError::Send("simulated failure".to_string()));
        }
        self.sent.push(message.to_string());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.events.drain(..).collect()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
