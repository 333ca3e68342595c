//! Packet header codec for socket-backed connections
//!
//! Every datagram starts with a one byte kind. Reliable, notify and ack
//! packets follow it with a big-endian `u16` sequence number. Control packets
//! (acks, disconnect, keep-alive) carry no payload.

use bytes::{Buf, BufMut};

use crate::error::constants::{ERR_EMPTY_PACKET, ERR_TRAILING_BYTES, ERR_TRUNCATED_HEADER};
use crate::error::{LinkError, Result};

/// Largest header any packet kind uses
pub const MAX_HEADER_SIZE: usize = 3;

/// Datagram kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Unreliable = 1,
    Reliable = 2,
    Notify = 3,
    ReliableAck = 4,
    NotifyAck = 5,
    Disconnect = 6,
    KeepAlive = 7,
}

impl PacketKind {
    #[inline]
    pub fn has_sequence(self) -> bool {
        matches!(
            self,
            PacketKind::Reliable
                | PacketKind::Notify
                | PacketKind::ReliableAck
                | PacketKind::NotifyAck
        )
    }

    #[inline]
    pub fn carries_payload(self) -> bool {
        matches!(
            self,
            PacketKind::Unreliable | PacketKind::Reliable | PacketKind::Notify
        )
    }

    #[inline]
    pub fn header_len(self) -> usize {
        if self.has_sequence() {
            MAX_HEADER_SIZE
        } else {
            1
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PacketKind::Unreliable),
            2 => Ok(PacketKind::Reliable),
            3 => Ok(PacketKind::Notify),
            4 => Ok(PacketKind::ReliableAck),
            5 => Ok(PacketKind::NotifyAck),
            6 => Ok(PacketKind::Disconnect),
            7 => Ok(PacketKind::KeepAlive),
            other => Err(LinkError::UnknownPacketKind(other)),
        }
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Zero for kinds without a sequence
    pub sequence: u16,
}

impl PacketHeader {
    pub fn new(kind: PacketKind) -> Self {
        Self { kind, sequence: 0 }
    }

    pub fn with_sequence(kind: PacketKind, sequence: u16) -> Self {
        Self { kind, sequence }
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.kind.header_len()
    }

    /// Write the header to the front of `buf` and return its length
    ///
    /// `buf` must hold at least [`encoded_len`](Self::encoded_len) bytes.
    pub fn write(&self, buf: &mut [u8]) -> usize {
        let mut cursor = buf;
        cursor.put_u8(self.kind as u8);
        if self.kind.has_sequence() {
            cursor.put_u16(self.sequence);
        }
        self.encoded_len()
    }

    /// Split a datagram into its header and payload
    pub fn parse(packet: &[u8]) -> Result<(PacketHeader, &[u8])> {
        let mut cursor = packet;
        if !cursor.has_remaining() {
            return Err(LinkError::InvalidPacket(ERR_EMPTY_PACKET));
        }

        let kind = PacketKind::try_from(cursor.get_u8())?;
        let sequence = if kind.has_sequence() {
            if cursor.remaining() < 2 {
                return Err(LinkError::InvalidPacket(ERR_TRUNCATED_HEADER));
            }
            cursor.get_u16()
        } else {
            0
        };

        if !kind.carries_payload() && cursor.has_remaining() {
            return Err(LinkError::InvalidPacket(ERR_TRAILING_BYTES));
        }

        Ok((PacketHeader { kind, sequence }, cursor))
    }
}
