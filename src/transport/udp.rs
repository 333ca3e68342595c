//! UDP driver for [`SocketConnection`]
//!
//! [`UdpSocket`] adapts a tokio socket to the [`Socket`] trait using
//! non-blocking sends. [`pump`] is the background task that feeds received
//! datagrams to the connection and ticks its reliability timers until the
//! connection closes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, trace, warn};

use crate::config::LinkConfig;
use crate::core::connection::{Connection, DataHandler, DisconnectCallback};
use crate::error::Result;
use crate::transport::socket::{Socket, SocketConnection};
use crate::utils::buffer_pool::BufferPool;
use crate::utils::metrics::global_metrics;

/// Smallest interval the pump ticks at
const MIN_TICK: Duration = Duration::from_millis(5);

/// tokio UDP socket usable as a [`Socket`]
#[derive(Debug)]
pub struct UdpSocket {
    inner: tokio::net::UdpSocket,
}

impl UdpSocket {
    /// Bind to a local address
    #[instrument]
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let inner = tokio::net::UdpSocket::bind(addr).await?;
        debug!(local = %inner.local_addr()?, "UDP socket bound");
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Wait for the next datagram
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

impl Socket for UdpSocket {
    fn send_to(&self, packet: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.try_send_to(packet, target)
    }
}

/// Run `connection` over `socket` until it disconnects
///
/// Datagrams from any address other than the connection's remote end are
/// ignored, as are datagrams longer than the pool's buffer size. `tick` is
/// how often resends and timeouts are checked.
#[instrument(skip_all, fields(remote = %connection.remote_addr()))]
pub async fn pump(
    socket: Arc<UdpSocket>,
    connection: Arc<SocketConnection<UdpSocket>>,
    pool: BufferPool,
    tick: Duration,
) -> Result<()> {
    let remote = connection.remote_addr();
    let mut interval = tokio::time::interval(tick.max(MIN_TICK));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // One spare byte so oversized datagrams are detectable
    let max_len = pool.buffer_size();
    let mut buffer = vec![0u8; max_len + 1];

    while connection.is_connected() {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) if from == remote && len > max_len => {
                    global_metrics().invalid_packet();
                    warn!(%from, bytes = len, max = max_len, "Dropping oversized datagram");
                }
                Ok((len, from)) if from == remote => {
                    connection.receive_packet(&buffer[..len], Instant::now());
                }
                Ok((len, from)) => {
                    trace!(%from, bytes = len, "Ignoring datagram from unknown peer");
                }
                Err(e) if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                ) => {
                    // ICMP unreachable from an earlier send, the timeout handles it
                    debug!(error = %e, "Remote unreachable");
                }
                Err(e) => {
                    warn!(error = %e, "UDP receive failed, closing connection");
                    connection.disconnect();
                    return Err(e.into());
                }
            },
            _ = interval.tick() => connection.update(Instant::now()),
        }
    }

    debug!("Pump stopped");
    Ok(())
}

/// Create a [`SocketConnection`] to `remote` and spawn its [`pump`]
///
/// Must be called inside a tokio runtime.
pub fn spawn_connection(
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    handler: Arc<dyn DataHandler>,
    config: &LinkConfig,
    on_disconnect: Option<DisconnectCallback>,
) -> Result<(Arc<SocketConnection<UdpSocket>>, JoinHandle<Result<()>>)> {
    let pool = BufferPool::from_config(&config.pool)?;
    let connection = SocketConnection::new(
        socket.clone(),
        remote,
        handler,
        pool.clone(),
        config.reliability.clone(),
        on_disconnect,
    );

    let tick = config.reliability.resend_interval / 2;
    let task = tokio::spawn(pump(socket, connection.clone(), pool, tick));
    Ok((connection, task))
}
