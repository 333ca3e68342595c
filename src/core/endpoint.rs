//! Peer identity

use std::fmt;
use std::net::SocketAddr;

/// Opaque, comparable identity of the remote end of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndPoint {
    /// In-process pipe peer. Carries no routable information.
    Pipe,
    /// Datagram socket address
    Socket(SocketAddr),
}

impl EndPoint {
    /// Routable address, if any
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            EndPoint::Pipe => None,
            EndPoint::Socket(addr) => Some(*addr),
        }
    }
}

impl From<SocketAddr> for EndPoint {
    fn from(addr: SocketAddr) -> Self {
        EndPoint::Socket(addr)
    }
}

impl fmt::Display for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndPoint::Pipe => f.write_str("pipe"),
            EndPoint::Socket(addr) => write!(f, "{addr}"),
        }
    }
}
