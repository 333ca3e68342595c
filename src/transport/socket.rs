//! Socket-backed connections
//!
//! [`SocketConnection`] runs the three send disciplines over any datagram
//! [`Socket`]:
//! - **unreliable** packets are sent once
//! - **reliable** packets carry a sequence number, are kept until acked and
//!   resent every `resend_interval`; the receiver delivers them strictly in
//!   sequence, holding early arrivals inside `reliable_window`
//! - **notify** packets carry their own sequence; the receiver acks them and
//!   the sender's [`NotifyToken`] resolves delivered on ack or lost after
//!   `notify_timeout`
//!
//! The connection does no I/O of its own. A driver (see
//! [`transport::udp`](crate::transport::udp)) feeds incoming datagrams to
//! [`receive_packet`](SocketConnection::receive_packet) and calls
//! [`update`](SocketConnection::update) periodically. Both must be called
//! from a single task so deliveries keep their order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::config::ReliabilityConfig;
use crate::core::connection::{
    AtomicState, Connection, ConnectionState, DataHandler, DisconnectCallback, DisconnectSlot,
};
use crate::core::endpoint::EndPoint;
use crate::core::notify::{NotifyOutcome, NotifyResolver, NotifyToken};
use crate::core::packet::{PacketHeader, PacketKind, MAX_HEADER_SIZE};
use crate::error::LinkError;
use crate::utils::buffer_pool::{BufferPool, ByteBuffer};
use crate::utils::metrics::global_metrics;

/// Datagram socket a [`SocketConnection`] sends through
pub trait Socket: Send + Sync + 'static {
    /// Send one datagram without blocking. A dropped datagram is not an error
    /// worth surfacing: reliable packets are resent anyway.
    fn send_to(&self, packet: &[u8], target: SocketAddr) -> io::Result<usize>;
}

struct SentReliable {
    sequence: u16,
    buffer: ByteBuffer,
    len: usize,
    sent_at: Instant,
    attempts: u32,
}

struct SentNotify {
    sequence: u16,
    sent_at: Instant,
    resolver: NotifyResolver,
}

/// Reliable payload that arrived ahead of its turn
struct Held {
    buffer: ByteBuffer,
    len: usize,
}

struct Reliability {
    next_reliable: u16,
    next_notify: u16,
    in_flight: VecDeque<SentReliable>,
    notify_pending: VecDeque<SentNotify>,
    next_expected: u16,
    held: HashMap<u16, Held>,
    last_received: Instant,
    last_sent: Instant,
}

impl Reliability {
    /// Sequences from the oldest unacked reliable packet up to the next one
    /// to be sent. Acks arrive out of order, so this can exceed `in_flight`.
    fn reliable_span(&self) -> u16 {
        self.in_flight
            .front()
            .map_or(0, |oldest| self.next_reliable.wrapping_sub(oldest.sequence))
    }
}

enum ReliableArrival {
    /// In order: deliver it, then everything that was waiting behind it
    Deliver(Vec<Held>),
    Held,
    /// Already delivered, only the ack was lost
    Duplicate,
    /// Past the receive window, left unacked so the sender keeps it
    Ahead,
    Rejected,
}

/// [`Connection`] over a datagram socket with its own ack and resend engine
pub struct SocketConnection<S: Socket> {
    name: String,
    remote: SocketAddr,
    socket: Arc<S>,
    pool: BufferPool,
    config: ReliabilityConfig,
    handler: Arc<dyn DataHandler>,
    this: Weak<SocketConnection<S>>,
    state: AtomicState,
    on_disconnect: DisconnectSlot,
    reliability: Mutex<Reliability>,
}

impl<S: Socket> SocketConnection<S> {
    /// Create a connection to `remote`, delivering to `handler`
    pub fn new(
        socket: Arc<S>,
        remote: SocketAddr,
        handler: Arc<dyn DataHandler>,
        pool: BufferPool,
        config: ReliabilityConfig,
        on_disconnect: Option<DisconnectCallback>,
    ) -> Arc<Self> {
        let now = Instant::now();
        global_metrics().connection_opened();
        debug!(%remote, "Socket connection created");

        Arc::new_cyclic(|this| Self {
            name: format!("[Socket Connection {remote}]"),
            remote,
            socket,
            pool,
            config,
            handler,
            this: this.clone(),
            state: AtomicState::new(ConnectionState::Connected),
            on_disconnect: DisconnectSlot::new(on_disconnect),
            reliability: Mutex::new(Reliability {
                next_reliable: 0,
                next_notify: 0,
                in_flight: VecDeque::new(),
                notify_pending: VecDeque::new(),
                next_expected: 0,
                held: HashMap::new(),
                last_received: now,
                last_sent: now,
            }),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Reliable packets sent and not yet acked
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Notify sends whose outcome is still unknown
    pub fn pending_notify(&self) -> usize {
        self.lock().notify_pending.len()
    }

    /// Handle one datagram received from the remote end
    pub fn receive_packet(&self, packet: &[u8], now: Instant) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }

        let (header, payload) = match PacketHeader::parse(packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                global_metrics().invalid_packet();
                warn!(connection = %self.name, error = %e, "Dropping malformed packet");
                return;
            }
        };
        trace!(connection = %self.name, kind = ?header.kind, sequence = header.sequence, "Packet received");

        self.lock().last_received = now;

        match header.kind {
            PacketKind::Unreliable => self.deliver(payload),
            PacketKind::Notify => {
                self.send_control(PacketHeader::with_sequence(
                    PacketKind::NotifyAck,
                    header.sequence,
                ));
                self.deliver(payload);
            }
            PacketKind::Reliable => self.receive_reliable(header.sequence, payload),
            PacketKind::ReliableAck => {
                // Dropping the entry returns its buffer to the pool
                self.lock()
                    .in_flight
                    .retain(|sent| sent.sequence != header.sequence);
            }
            PacketKind::NotifyAck => {
                let acked = {
                    let mut rel = self.lock();
                    let index = rel
                        .notify_pending
                        .iter()
                        .position(|sent| sent.sequence == header.sequence);
                    match index {
                        Some(index) => rel.notify_pending.remove(index),
                        None => None,
                    }
                };
                if let Some(sent) = acked {
                    global_metrics().notify_delivered();
                    sent.resolver.resolve(NotifyOutcome::Delivered);
                }
            }
            PacketKind::Disconnect => {
                debug!(connection = %self.name, "Remote closed the connection");
                self.close(false);
            }
            PacketKind::KeepAlive => {}
        }
    }

    /// Drive resends, notify expiry, keep-alive and the silence timeout
    pub fn update(&self, now: Instant) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }

        let mut expired = Vec::new();
        let mut failure = None;
        {
            let mut guard = self.lock();
            let rel = &mut *guard;

            if now.saturating_duration_since(rel.last_received) >= self.config.disconnect_timeout {
                failure = Some("timed out");
            } else {
                for sent in rel.in_flight.iter_mut() {
                    if now.saturating_duration_since(sent.sent_at) < self.config.resend_interval {
                        continue;
                    }
                    if sent.attempts >= self.config.max_resend_attempts {
                        failure = Some("resend attempts exhausted");
                        break;
                    }
                    sent.attempts += 1;
                    sent.sent_at = now;
                    global_metrics().retransmission();
                    trace!(connection = %self.name, sequence = sent.sequence, attempt = sent.attempts, "Resending");
                    self.transmit(&sent.buffer[..sent.len]);
                    rel.last_sent = now;
                }

                while rel.notify_pending.front().is_some_and(|sent| {
                    now.saturating_duration_since(sent.sent_at) >= self.config.notify_timeout
                }) {
                    if let Some(sent) = rel.notify_pending.pop_front() {
                        expired.push(sent);
                    }
                }

                if failure.is_none()
                    && now.saturating_duration_since(rel.last_sent)
                        >= self.config.keep_alive_interval
                {
                    self.send_control(PacketHeader::new(PacketKind::KeepAlive));
                    rel.last_sent = now;
                }
            }
        }

        for sent in expired {
            global_metrics().notify_lost();
            sent.resolver.resolve(NotifyOutcome::Lost);
        }

        if let Some(reason) = failure {
            warn!(connection = %self.name, reason, "Dropping connection");
            self.disconnect();
        }
    }

    fn receive_reliable(&self, sequence: u16, payload: &[u8]) {
        let arrival = {
            let mut guard = self.lock();
            let rel = &mut *guard;
            let distance = sequence.wrapping_sub(rel.next_expected);

            if distance == 0 {
                rel.next_expected = rel.next_expected.wrapping_add(1);
                let mut ready = Vec::new();
                while let Some(held) = rel.held.remove(&rel.next_expected) {
                    ready.push(held);
                    rel.next_expected = rel.next_expected.wrapping_add(1);
                }
                ReliableArrival::Deliver(ready)
            } else if distance < self.config.reliable_window {
                if rel.held.contains_key(&sequence) {
                    ReliableArrival::Duplicate
                } else {
                    let mut buffer = self.pool.take();
                    match buffer.write_at(0, payload) {
                        Some(len) => {
                            rel.held.insert(sequence, Held { buffer, len });
                            ReliableArrival::Held
                        }
                        None => ReliableArrival::Rejected,
                    }
                }
            } else if distance > u16::MAX / 2 {
                // Behind next_expected
                ReliableArrival::Duplicate
            } else {
                ReliableArrival::Ahead
            }
        };

        match arrival {
            ReliableArrival::Rejected => {
                // Not acked, so the sender keeps trying until it gives up
                warn!(
                    connection = %self.name,
                    sequence,
                    bytes = payload.len(),
                    "Reliable payload larger than pool buffer"
                );
            }
            ReliableArrival::Ahead => {
                debug!(
                    connection = %self.name,
                    sequence,
                    "Reliable packet beyond receive window, dropping"
                );
            }
            ReliableArrival::Held | ReliableArrival::Duplicate => {
                self.send_control(PacketHeader::with_sequence(PacketKind::ReliableAck, sequence));
            }
            ReliableArrival::Deliver(ready) => {
                self.send_control(PacketHeader::with_sequence(PacketKind::ReliableAck, sequence));
                self.deliver(payload);
                for held in ready {
                    self.deliver(&held.buffer[..held.len]);
                }
            }
        }
    }

    fn deliver(&self, payload: &[u8]) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let connection: Arc<dyn Connection> = this;
        global_metrics().message_received(payload.len() as u64);
        self.handler.receive_message(&connection, payload);
    }

    /// Write header and payload into a pooled buffer
    fn encode(&self, header: PacketHeader, payload: &[u8]) -> Option<(ByteBuffer, usize)> {
        let mut buffer = self.pool.take();
        let size = header.encoded_len() + payload.len();
        if size > buffer.len() {
            let error = LinkError::OversizedPacket {
                size,
                max: buffer.len(),
            };
            warn!(connection = %self.name, %error, "Dropping outgoing packet");
            return None;
        }
        let offset = header.write(&mut buffer);
        let len = buffer.write_at(offset, payload)?;
        Some((buffer, len))
    }

    fn send_control(&self, header: PacketHeader) {
        let mut packet = [0u8; MAX_HEADER_SIZE];
        let len = header.write(&mut packet);
        self.transmit(&packet[..len]);
    }

    fn transmit(&self, packet: &[u8]) {
        if let Err(e) = self.socket.send_to(packet, self.remote) {
            warn!(connection = %self.name, error = %e, "Socket send failed");
        }
    }

    fn close(&self, notify_remote: bool) {
        if !self.state.close() {
            return;
        }

        global_metrics().connection_closed();
        if notify_remote {
            self.send_control(PacketHeader::new(PacketKind::Disconnect));
        }

        let pending = {
            let mut rel = self.lock();
            rel.in_flight.clear();
            rel.held.clear();
            std::mem::take(&mut rel.notify_pending)
        };

        debug!(connection = %self.name, "Socket connection disconnected");
        self.on_disconnect.fire();

        for sent in pending {
            global_metrics().notify_lost();
            sent.resolver.resolve(NotifyOutcome::Lost);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Reliability> {
        self.reliability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Socket> Connection for SocketConnection<S> {
    fn state(&self) -> ConnectionState {
        self.state.load()
    }

    fn end_point(&self) -> EndPoint {
        EndPoint::Socket(self.remote)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn send_unreliable(&self, payload: &[u8]) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }
        let Some((buffer, len)) = self.encode(PacketHeader::new(PacketKind::Unreliable), payload)
        else {
            return;
        };

        self.transmit(&buffer[..len]);
        global_metrics().message_sent(payload.len() as u64);
        self.lock().last_sent = Instant::now();
    }

    fn send_reliable(&self, payload: &[u8]) {
        if self.state.load() == ConnectionState::Disconnected {
            return;
        }

        let mut rel = self.lock();
        if rel.reliable_span() >= self.config.reliable_window {
            drop(rel);
            warn!(
                connection = %self.name,
                window = self.config.reliable_window,
                "Reliable window full"
            );
            self.disconnect();
            return;
        }

        let sequence = rel.next_reliable;
        let Some((buffer, len)) =
            self.encode(PacketHeader::with_sequence(PacketKind::Reliable, sequence), payload)
        else {
            return;
        };
        rel.next_reliable = sequence.wrapping_add(1);

        self.transmit(&buffer[..len]);
        global_metrics().message_sent(payload.len() as u64);

        let now = Instant::now();
        rel.last_sent = now;
        rel.in_flight.push_back(SentReliable {
            sequence,
            buffer,
            len,
            sent_at: now,
            attempts: 0,
        });
    }

    fn send_notify(&self, payload: &[u8]) -> NotifyToken {
        if self.state.load() == ConnectionState::Disconnected {
            return NotifyToken::default();
        }

        let mut rel = self.lock();
        let sequence = rel.next_notify;
        let Some((buffer, len)) =
            self.encode(PacketHeader::with_sequence(PacketKind::Notify, sequence), payload)
        else {
            global_metrics().notify_lost();
            return NotifyToken::lost();
        };
        rel.next_notify = sequence.wrapping_add(1);

        self.transmit(&buffer[..len]);
        global_metrics().message_sent(payload.len() as u64);

        let now = Instant::now();
        let (token, resolver) = NotifyToken::pending();
        rel.last_sent = now;
        rel.notify_pending.push_back(SentNotify {
            sequence,
            sent_at: now,
            resolver,
        });
        token
    }

    fn disconnect(&self) {
        self.close(true);
    }
}

impl<S: Socket> fmt::Display for SocketConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<S: Socket> fmt::Debug for SocketConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnection")
            .field("remote", &self.remote)
            .field("state", &self.state.load())
            .finish()
    }
}
