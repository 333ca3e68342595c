//! # Error Types
//!
//! Error handling for the link layer.
//!
//! Only construction and parsing can fail. Send operations never return an
//! error: a send on a closed connection is a silent no-op, and delivery
//! failure is reported through [`NotifyToken`](crate::core::notify::NotifyToken)
//! or the disconnect callback instead.
//!
//! ## Error Categories
//! - **Configuration Errors**: invalid pool sizes, missing data handlers
//! - **Packet Errors**: truncated headers, unknown packet kinds, oversized payloads
//! - **I/O Errors**: socket failures surfaced by the UDP adapter
//!
//! ## Example Usage
//! ```rust
//! use peer_link::error::{LinkError, Result};
//! use peer_link::utils::buffer_pool::BufferPool;
//!
//! fn make_pool() -> Result<BufferPool> {
//!     BufferPool::new(64, 5, 10)
//! }
//!
//! assert!(make_pool().is_ok());
//! assert!(matches!(BufferPool::new(64, 11, 10), Err(LinkError::ConfigError(_))));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants shared by log lines and error values.
pub mod constants {
    /// Pool configuration errors
    pub const ERR_START_EXCEEDS_MAX: &str = "Start pool size must not exceed max pool size";
    pub const ERR_ZERO_BUFFER_SIZE: &str = "Buffer size must be greater than 0";

    /// Packet validation errors
    pub const ERR_EMPTY_PACKET: &str = "Packet is empty";
    pub const ERR_TRUNCATED_HEADER: &str = "Packet header is truncated";
    pub const ERR_TRAILING_BYTES: &str = "Control packet carries a payload";
}

// LinkError is the primary error type for all link operations
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing {0} data handler")]
    MissingHandler(&'static str),

    #[error("Invalid packet: {0}")]
    InvalidPacket(&'static str),

    #[error("Unknown packet kind: {0}")]
    UnknownPacketKind(u8),

    #[error("Packet too large: {size} bytes (max {max})")]
    OversizedPacket { size: usize, max: usize },
}

/// Type alias for Results using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_packet_message() {
        let error = LinkError::OversizedPacket {
            size: 1400,
            max: 1300,
        };
        assert_eq!(error.to_string(), "Packet too large: 1400 bytes (max 1300)");
    }

    #[test]
    fn test_io_error_converts() {
        let error: LinkError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(error, LinkError::Io(_)));
    }
}
