#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Behaviour of in-process pipe pairs: synchronous delivery, joint
//! disconnect, and silence after close.

use peer_link::transport::pipe::{CLIENT_PIPE_NAME, SERVER_PIPE_NAME};
use peer_link::{
    Connection, ConnectionState, DataHandler, DisconnectCallback, EndPoint, NotifyOutcome,
    PipePeerConnection,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl DataHandler for Recorder {
    fn receive_message(&self, connection: &Arc<dyn Connection>, message: &[u8]) {
        self.messages
            .lock()
            .unwrap()
            .push((connection.name().to_string(), message.to_vec()));
    }
}

fn counter() -> (Arc<AtomicUsize>, DisconnectCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (
        count,
        Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

struct Pair {
    client: Arc<PipePeerConnection>,
    server: Arc<PipePeerConnection>,
    client_handler: Arc<Recorder>,
    server_handler: Arc<Recorder>,
    client_disconnects: Arc<AtomicUsize>,
    server_disconnects: Arc<AtomicUsize>,
}

fn pair() -> Pair {
    let client_handler = Arc::new(Recorder::default());
    let server_handler = Arc::new(Recorder::default());
    let (client_disconnects, client_cb) = counter();
    let (server_disconnects, server_cb) = counter();
    let (client, server) = PipePeerConnection::create(
        client_handler.clone(),
        server_handler.clone(),
        Some(client_cb),
        Some(server_cb),
    );
    Pair {
        client,
        server,
        client_handler,
        server_handler,
        client_disconnects,
        server_disconnects,
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn test_create_yields_connected_pair() {
    let p = pair();
    assert_eq!(p.client.state(), ConnectionState::Connected);
    assert_eq!(p.server.state(), ConnectionState::Connected);
    assert_eq!(p.client.end_point(), EndPoint::Pipe);
    assert_eq!(p.server.end_point(), EndPoint::Pipe);
    assert_eq!(p.client.name(), CLIENT_PIPE_NAME);
    assert_eq!(p.server.name(), SERVER_PIPE_NAME);
}

// ============================================================================
// DELIVERY
// ============================================================================

#[test]
fn test_reliable_send_is_delivered_before_returning() {
    let server_handler = Arc::new(Recorder::default());
    let observed = server_handler.clone();
    let (client, _server) = PipePeerConnection::create(
        Arc::new(Recorder::default()),
        server_handler,
        None,
        None,
    );

    client.send_reliable(b"P");

    // Synchronous: visible immediately, tagged with the server connection
    let messages = observed.messages.lock().unwrap();
    assert_eq!(
        *messages,
        vec![(SERVER_PIPE_NAME.to_string(), b"P".to_vec())]
    );
}

#[test]
fn test_sender_identity_is_peer_connection() {
    let seen: Arc<Mutex<Option<Arc<dyn Connection>>>> = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let server_handler: Arc<dyn DataHandler> =
        Arc::new(move |conn: &Arc<dyn Connection>, _: &[u8]| {
            *slot.lock().unwrap() = Some(conn.clone());
        });
    let (client, server) =
        PipePeerConnection::create(Arc::new(Recorder::default()), server_handler, None, None);

    client.send_unreliable(b"x");

    let conn = seen.lock().unwrap().take().unwrap();
    let server_dyn: Arc<dyn Connection> = server.clone();
    assert!(Arc::ptr_eq(&conn, &server_dyn));
}

#[test]
fn test_all_disciplines_deliver_in_call_order() {
    let p = pair();

    p.client.send_reliable(b"1");
    p.client.send_unreliable(b"2");
    let _ = p.client.send_notify(b"3");
    p.client.send_reliable(b"4");

    let payloads: Vec<Vec<u8>> = p
        .server_handler
        .messages
        .lock()
        .unwrap()
        .iter()
        .map(|(_, m)| m.clone())
        .collect();
    assert_eq!(
        payloads,
        vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec(), b"4".to_vec()]
    );
    assert_eq!(p.client_handler.count(), 0);
}

#[test]
fn test_handler_can_reply_through_connection() {
    let client_handler = Arc::new(Recorder::default());
    let echo: Arc<dyn DataHandler> = Arc::new(|conn: &Arc<dyn Connection>, msg: &[u8]| {
        conn.send_reliable(msg);
    });
    let (client, _server) =
        PipePeerConnection::create(client_handler.clone(), echo, None, None);

    client.send_reliable(b"ping");

    let messages = client_handler.messages.lock().unwrap();
    assert_eq!(
        *messages,
        vec![(CLIENT_PIPE_NAME.to_string(), b"ping".to_vec())]
    );
}

#[test]
fn test_notify_fires_delivered_immediately() {
    let p = pair();
    let token = p.client.send_notify(b"n");

    let delivered = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let d = delivered.clone();
    let l = lost.clone();
    token.on_delivered(move || {
        d.fetch_add(1, Ordering::SeqCst);
    });
    token.on_lost(move || {
        l.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(lost.load(Ordering::SeqCst), 0);
    assert_eq!(token.outcome(), Some(NotifyOutcome::Delivered));
}

// ============================================================================
// DISCONNECT
// ============================================================================

#[test]
fn test_disconnect_either_end_closes_both() {
    for close_client in [true, false] {
        let p = pair();
        if close_client {
            p.client.disconnect();
        } else {
            p.server.disconnect();
        }

        assert_eq!(p.client.state(), ConnectionState::Disconnected);
        assert_eq!(p.server.state(), ConnectionState::Disconnected);
        assert_eq!(p.client_disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(p.server_disconnects.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_double_disconnect_fires_callback_once() {
    let p = pair();
    p.client.disconnect();
    p.client.disconnect();
    p.server.disconnect();

    assert_eq!(p.client_disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(p.server_disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sends_after_disconnect_are_silent() {
    let p = pair();
    p.server.disconnect();

    p.client.send_unreliable(b"a");
    p.client.send_reliable(b"b");
    let client_token = p.client.send_notify(b"c");
    p.server.send_unreliable(b"d");
    p.server.send_reliable(b"e");
    let server_token = p.server.send_notify(b"f");

    assert_eq!(p.client_handler.count(), 0);
    assert_eq!(p.server_handler.count(), 0);

    for token in [client_token, server_token] {
        assert!(token.is_empty());
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        token.on_delivered(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(token.outcome(), None);
    }
}

#[test]
fn test_disconnect_callback_may_reenter() {
    let slot: Arc<Mutex<Option<Arc<PipePeerConnection>>>> = Arc::new(Mutex::new(None));
    let inner = slot.clone();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();

    let (client, server) = PipePeerConnection::create(
        Arc::new(Recorder::default()),
        Arc::new(Recorder::default()),
        Some(Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
            // Calling disconnect again from inside the callback is harmless
            if let Some(conn) = inner.lock().unwrap().as_ref() {
                conn.disconnect();
            }
        })),
        None,
    );
    *slot.lock().unwrap() = Some(client.clone());

    server.disconnect();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!client.is_connected());

    // Break the cycle created for the test
    slot.lock().unwrap().take();
}
