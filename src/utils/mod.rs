//! # Utility Modules
//!
//! Supporting utilities used by every transport.
//!
//! ## Components
//! - **Buffer Pool**: bounded LIFO recycler for fixed-size packet buffers
//! - **Logging**: subscriber setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: thread-safe observability counters

pub mod buffer_pool;
pub mod logging;
pub mod metrics;

pub use buffer_pool::{BufferPool, ByteBuffer};
