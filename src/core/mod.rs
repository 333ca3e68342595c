//! # Core Link Components
//!
//! Contracts shared by every transport.
//!
//! ## Components
//! - **Connection**: lifecycle state and the three send disciplines
//! - **DataHandler**: receiving side callback surface
//! - **EndPoint**: opaque, comparable peer identity
//! - **NotifyToken**: delivered/lost outcome of a notify send
//! - **Packet**: header codec used by socket-backed connections
//!
//! ## Wire Format
//! ```text
//! [Kind(1)] [Sequence(2), reliable/notify/ack only] [Payload(N)]
//! ```

pub mod connection;
pub mod endpoint;
pub mod notify;
pub mod packet;
