//! # Transports
//!
//! Concrete [`Connection`](crate::core::connection::Connection) implementations.
//!
//! ## Variants
//! - **pipe**: in-process pair, synchronous delivery, for hosted play where
//!   server and local client share a process
//! - **socket**: reliability engine over any datagram [`Socket`](socket::Socket)
//! - **udp**: tokio UDP adapter and receive pump for the socket variant

pub mod pipe;
pub mod socket;
pub mod udp;
