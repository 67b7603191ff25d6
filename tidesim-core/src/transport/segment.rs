//! Packets exchanged between transport endpoints.

use serde::Serialize;

use crate::network::Address;
use crate::time::SimTime;

/// Contiguous byte range of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Stream offset of the first byte
    pub seq: u64,
    /// Payload length in bytes
    pub len: u32,
    /// Time the segment was (last) handed to the link
    pub send_time: SimTime,
}

impl Segment {
    /// Sequence number just past the last byte.
    pub fn end(&self) -> u64 {
        self.seq + u64::from(self.len)
    }
}

/// Packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketKind {
    /// Connection request
    Syn,
    /// Connection accept
    SynAck,
    /// Connection refused
    Rst,
    /// Stream data
    Data(Segment),
    /// Cumulative acknowledgment with the receiver's advertised window
    Ack { ack: u64, window: u64 },
    /// End of stream marker at `seq`
    Fin { seq: u64 },
    /// Acknowledges the end of stream marker
    FinAck,
}

/// Addressed packet carried over a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub src: Address,
    pub dst: Address,
    pub kind: PacketKind,
}

impl Packet {
    /// Bytes of stream payload carried, excluding headers.
    pub fn payload_bytes(&self) -> u64 {
        match self.kind {
            PacketKind::Data(segment) => u64::from(segment.len),
            _ => 0,
        }
    }

    /// Returns true for data packets.
    pub fn is_data(&self) -> bool {
        matches!(self.kind, PacketKind::Data(_))
    }
}
