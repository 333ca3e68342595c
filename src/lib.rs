//! # peer-link
//!
//! Transport-agnostic, connection-oriented packet delivery for real-time
//! multiplayer games.
//!
//! Every transport is exposed through the [`Connection`] trait with three send
//! disciplines:
//! - **unreliable**: best effort, no confirmation
//! - **reliable**: delivered in call order while the connection stays open
//! - **notify**: best effort, paired with a [`NotifyToken`] that later reports
//!   delivered or lost
//!
//! Incoming payloads are handed to a [`DataHandler`]. Payload storage comes
//! from a bounded [`BufferPool`] so the send and receive paths do not allocate
//! in steady state.
//!
//! ## Transports
//! - [`PipePeerConnection`]: in-process pair that delivers synchronously,
//!   used when host and client share a process
//! - [`SocketConnection`]: reliability engine over any datagram [`Socket`],
//!   with a tokio UDP adapter in [`transport::udp`]
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use peer_link::{Connection, DataHandler, PipePeerConnection};
//!
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = received.clone();
//! let server_handler: Arc<dyn DataHandler> =
//!     Arc::new(move |_: &Arc<dyn Connection>, msg: &[u8]| sink.lock().unwrap().push(msg.to_vec()));
//! let client_handler: Arc<dyn DataHandler> = Arc::new(|_: &Arc<dyn Connection>, _: &[u8]| {});
//!
//! let (client, _server) = PipePeerConnection::create(client_handler, server_handler, None, None);
//! client.send_reliable(b"hello");
//! assert_eq!(received.lock().unwrap()[0], b"hello");
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::core::connection::{Connection, ConnectionState, DataHandler, DisconnectCallback};
pub use crate::core::endpoint::EndPoint;
pub use crate::core::notify::{NotifyOutcome, NotifyResolver, NotifyToken};
pub use crate::error::{LinkError, Result};
pub use crate::transport::pipe::{PipeBuilder, PipePeerConnection};
pub use crate::transport::socket::{Socket, SocketConnection};
pub use crate::utils::buffer_pool::{BufferPool, ByteBuffer};
