//! In-process pipe connections
//!
//! [`PipePeerConnection::create`] builds two connections wired to each other.
//! A send on one end calls the other end's [`DataHandler`] directly, before
//! the send returns, with the receiving connection as the sender identity.
//! Nothing is copied, queued or lost while both ends are connected.
//!
//! Pipes are born connected and only ever move to `Disconnected`. Closing
//! either end closes both.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use tracing::{debug, trace};

use crate::core::connection::{
    AtomicState, Connection, ConnectionState, DataHandler, DisconnectCallback, DisconnectSlot,
};
use crate::core::endpoint::EndPoint;
use crate::core::notify::NotifyToken;
use crate::error::{LinkError, Result};
use crate::utils::metrics::global_metrics;

/// Debug label of the client end
pub const CLIENT_PIPE_NAME: &str = "[Client Pipe Connection]";

/// Debug label of the server end
pub const SERVER_PIPE_NAME: &str = "[Server Pipe Connection]";

/// A [`Connection`] that hands payloads straight to the peer's [`DataHandler`]
pub struct PipePeerConnection {
    name: &'static str,
    state: AtomicState,
    /// Handler of the other end
    other_handler: Arc<dyn DataHandler>,
    /// Other end, passed to `other_handler` as the receiving connection.
    /// Weak so the pair does not keep itself alive.
    other_connection: OnceLock<Weak<PipePeerConnection>>,
    on_disconnect: DisconnectSlot,
}

impl PipePeerConnection {
    fn new(
        name: &'static str,
        other_handler: Arc<dyn DataHandler>,
        on_disconnect: Option<DisconnectCallback>,
    ) -> Self {
        Self {
            name,
            state: AtomicState::new(ConnectionState::Connected),
            other_handler,
            other_connection: OnceLock::new(),
            on_disconnect: DisconnectSlot::new(on_disconnect),
        }
    }

    /// Create a connected pair, returned as `(client, server)`
    ///
    /// Messages sent on the client are passed to `server_handler` and vice
    /// versa. The caller owns both ends.
    pub fn create(
        client_handler: Arc<dyn DataHandler>,
        server_handler: Arc<dyn DataHandler>,
        client_on_disconnect: Option<DisconnectCallback>,
        server_on_disconnect: Option<DisconnectCallback>,
    ) -> (Arc<Self>, Arc<Self>) {
        let client = Arc::new(Self::new(
            CLIENT_PIPE_NAME,
            server_handler,
            client_on_disconnect,
        ));
        let server = Arc::new(Self::new(
            SERVER_PIPE_NAME,
            client_handler,
            server_on_disconnect,
        ));

        // Fresh cells, neither can already be set
        let _ = client.other_connection.set(Arc::downgrade(&server));
        let _ = server.other_connection.set(Arc::downgrade(&client));

        let metrics = global_metrics();
        metrics.connection_opened();
        metrics.connection_opened();
        debug!("Pipe connection pair created");

        (client, server)
    }

    fn peer(&self) -> Option<Arc<PipePeerConnection>> {
        self.other_connection.get().and_then(Weak::upgrade)
    }

    fn receive(&self, payload: &[u8]) {
        debug_assert!(
            self.state.load() == ConnectionState::Connected,
            "pipe delivery attempted while not connected"
        );

        let Some(peer) = self.peer() else {
            debug!(connection = self.name, "Pipe peer dropped, message discarded");
            return;
        };
        let peer: Arc<dyn Connection> = peer;

        let metrics = global_metrics();
        metrics.message_sent(payload.len() as u64);
        metrics.message_received(payload.len() as u64);
        trace!(connection = self.name, bytes = payload.len(), "Pipe delivery");

        self.other_handler.receive_message(&peer, payload);
    }
}

impl Connection for PipePeerConnection {
    fn state(&self) -> ConnectionState {
        self.state.load()
    }

    fn end_point(&self) -> EndPoint {
        EndPoint::Pipe
    }

    fn name(&self) -> &str {
        self.name
    }

    fn send_unreliable(&self, payload: &[u8]) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }
        self.receive(payload);
    }

    fn send_reliable(&self, payload: &[u8]) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }
        self.receive(payload);
    }

    fn send_notify(&self, payload: &[u8]) -> NotifyToken {
        if self.state.load() == ConnectionState::Disconnected {
            return NotifyToken::default();
        }
        self.receive(payload);
        global_metrics().notify_delivered();
        NotifyToken::delivered()
    }

    fn disconnect(&self) {
        if !self.state.close() {
            return;
        }

        global_metrics().connection_closed();
        debug!(connection = self.name, "Pipe connection disconnected");
        self.on_disconnect.fire();

        // tell the other end to close too
        if let Some(peer) = self.peer() {
            peer.disconnect();
        }
    }
}

impl fmt::Display for PipePeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Debug for PipePeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipePeerConnection")
            .field("name", &self.name)
            .field("state", &self.state.load())
            .finish()
    }
}

/// Builder for a pipe pair whose handlers may not be known up front
///
/// [`build`](PipeBuilder::build) rejects a pair with a missing handler.
#[derive(Default)]
pub struct PipeBuilder {
    client_handler: Option<Arc<dyn DataHandler>>,
    server_handler: Option<Arc<dyn DataHandler>>,
    on_client_disconnect: Option<DisconnectCallback>,
    on_server_disconnect: Option<DisconnectCallback>,
}

impl PipeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler receiving what the server end sends
    pub fn client_handler(mut self, handler: Arc<dyn DataHandler>) -> Self {
        self.client_handler = Some(handler);
        self
    }

    /// Handler receiving what the client end sends
    pub fn server_handler(mut self, handler: Arc<dyn DataHandler>) -> Self {
        self.server_handler = Some(handler);
        self
    }

    pub fn on_client_disconnect<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_client_disconnect = Some(Box::new(callback));
        self
    }

    pub fn on_server_disconnect<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_server_disconnect = Some(Box::new(callback));
        self
    }

    /// Create the `(client, server)` pair
    pub fn build(self) -> Result<(Arc<PipePeerConnection>, Arc<PipePeerConnection>)> {
        let client_handler = self
            .client_handler
            .ok_or(LinkError::MissingHandler("client"))?;
        let server_handler = self
            .server_handler
            .ok_or(LinkError::MissingHandler("server"))?;

        Ok(PipePeerConnection::create(
            client_handler,
            server_handler,
            self.on_client_disconnect,
            self.on_server_disconnect,
        ))
    }
}

impl fmt::Debug for PipeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeBuilder")
            .field("client_handler", &self.client_handler.is_some())
            .field("server_handler", &self.server_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl DataHandler for Recorder {
        fn receive_message(&self, connection: &Arc<dyn Connection>, message: &[u8]) {
            self.messages
                .lock()
                .unwrap()
                .push((connection.name().to_string(), message.to_vec()));
        }
    }

    fn counting_callback() -> (Arc<AtomicUsize>, DisconnectCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_pair_starts_connected() {
        let (client, server) = PipePeerConnection::create(
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            None,
            None,
        );
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.state(), ConnectionState::Connected);
        assert_eq!(client.to_string(), CLIENT_PIPE_NAME);
        assert_eq!(server.to_string(), SERVER_PIPE_NAME);
        assert_eq!(client.end_point(), EndPoint::Pipe);
    }

    #[test]
    fn test_send_tags_receiving_connection() {
        let client_handler = Arc::new(Recorder::default());
        let server_handler = Arc::new(Recorder::default());
        let (client, server) =
            PipePeerConnection::create(client_handler.clone(), server_handler.clone(), None, None);

        client.send_unreliable(b"to server");
        server.send_reliable(b"to client");

        let at_server = server_handler.messages.lock().unwrap();
        assert_eq!(
            *at_server,
            vec![(SERVER_PIPE_NAME.to_string(), b"to server".to_vec())]
        );
        let at_client = client_handler.messages.lock().unwrap();
        assert_eq!(
            *at_client,
            vec![(CLIENT_PIPE_NAME.to_string(), b"to client".to_vec())]
        );
    }

    #[test]
    fn test_disconnect_closes_both_once() {
        let (client_count, client_cb) = counting_callback();
        let (server_count, server_cb) = counting_callback();
        let (client, server) = PipePeerConnection::create(
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            Some(client_cb),
            Some(server_cb),
        );

        server.disconnect();
        server.disconnect();
        client.disconnect();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(server.state(), ConnectionState::Disconnected);
        assert_eq!(client_count.load(Ordering::SeqCst), 1);
        assert_eq!(server_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_peer_discards_messages() {
        let server_handler = Arc::new(Recorder::default());
        let (client, server) = PipePeerConnection::create(
            Arc::new(Recorder::default()),
            server_handler.clone(),
            None,
            None,
        );
        drop(server);

        client.send_reliable(b"lost");
        assert!(server_handler.messages.lock().unwrap().is_empty());

        // No peer to propagate to, local side still closes
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_builder_requires_handlers() {
        let missing_server = PipeBuilder::new()
            .client_handler(Arc::new(Recorder::default()))
            .build();
        assert!(matches!(
            missing_server,
            Err(LinkError::MissingHandler("server"))
        ));

        let missing_client = PipeBuilder::new()
            .server_handler(Arc::new(Recorder::default()))
            .build();
        assert!(matches!(
            missing_client,
            Err(LinkError::MissingHandler("client"))
        ));
    }

    #[test]
    fn test_builder_wires_callbacks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let (client, server) = PipeBuilder::new()
            .client_handler(Arc::new(Recorder::default()))
            .server_handler(Arc::new(Recorder::default()))
            .on_server_disconnect(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        client.disconnect();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!server.is_connected());
    }
}
