//! Connection contract
//!
//! A [`Connection`] is one end of a link to a remote peer. Implementations
//! differ in how bytes travel, but all of them share the same lifecycle:
//!
//! ```text
//! Connecting ──► Connected ──► Disconnected
//! ```
//!
//! `Disconnected` is terminal. Once reached, every send is a no-op and
//! [`Connection::send_notify`] returns an empty token.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::endpoint::EndPoint;
use crate::core::notify::NotifyToken;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in progress, nothing is delivered yet
    Connecting = 0,
    /// Sends are delivered
    Connected = 1,
    /// Terminal state
    Disconnected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Zero-argument hook fired once when a connection closes
pub type DisconnectCallback = Box<dyn FnOnce() + Send + 'static>;

/// One end of a link to a remote peer
pub trait Connection: Send + Sync {
    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Identity of the remote end
    fn end_point(&self) -> EndPoint;

    /// Label used in logs
    fn name(&self) -> &str;

    /// Best effort, unordered, no confirmation
    fn send_unreliable(&self, payload: &[u8]);

    /// Delivered in call order while the connection stays open
    fn send_reliable(&self, payload: &[u8]);

    /// Best effort, with a token that reports the outcome
    fn send_notify(&self, payload: &[u8]) -> NotifyToken;

    /// Close the connection. Calling this more than once has no effect.
    fn disconnect(&self);

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Receiving side of a link
///
/// Called synchronously by the transport for every delivered payload. The
/// handler must not block: the transport provides no timeout around it.
pub trait DataHandler: Send + Sync {
    /// Process one message. `connection` is the local end it arrived on and
    /// can be used to reply.
    fn receive_message(&self, connection: &Arc<dyn Connection>, message: &[u8]);
}

impl<F> DataHandler for F
where
    F: Fn(&Arc<dyn Connection>, &[u8]) + Send + Sync,
{
    fn receive_message(&self, connection: &Arc<dyn Connection>, message: &[u8]) {
        self(connection, message)
    }
}

/// Lock-free state cell shared by connection implementations
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[cfg(test)]
    pub(crate) fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `Disconnected`. Returns false when it already was, so exactly
    /// one caller wins the transition.
    pub(crate) fn close(&self) -> bool {
        self.0
            .swap(ConnectionState::Disconnected as u8, Ordering::AcqRel)
            != ConnectionState::Disconnected as u8
    }
}

/// Optional disconnect hook that can be taken at most once
pub(crate) struct DisconnectSlot(Mutex<Option<DisconnectCallback>>);

impl DisconnectSlot {
    pub(crate) fn new(callback: Option<DisconnectCallback>) -> Self {
        Self(Mutex::new(callback))
    }

    /// Run the hook if one was registered. The lock is released before the
    /// hook runs so it may touch the connection again.
    pub(crate) fn fire(&self) {
        let callback = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl fmt::Debug for DisconnectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let armed = self
            .0
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("DisconnectSlot").field("armed", &armed).finish()
    }
}
