//! Reliable byte-stream transport over simulated links.
//!
//! An [`Endpoint`] is a socket-like state machine. It never touches the
//! scheduler or links directly: each entry point takes the current simulated
//! time and leaves behind a list of actions (packets to transmit, timer
//! changes, notices for the application) that the owning network carries out.

mod endpoint;
mod rtt;
mod segment;
mod stats;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub use endpoint::{Endpoint, EndpointAction};
pub use rtt::RttEstimator;
pub use segment::{Packet, PacketKind, Segment};
pub use stats::{CwndSample, EndpointStats, LossRecord, MAX_TRACE_SAMPLES};

use crate::network::Address;

/// Errors surfaced by transport endpoints.
///
/// These are expected operating conditions reported to the application,
/// never panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection refused by {peer}")]
    ConnectionRefused { peer: Address },

    #[error("Send rejected: endpoint is closing or closed")]
    SendAfterClose,

    #[error("Segment {seq} unacknowledged after {attempts} retransmissions")]
    RetransmissionExhausted { seq: u64, attempts: u32 },

    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        state: ConnectionState,
        operation: &'static str,
    },
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Closed,
    Listening,
    Connecting,
    Established,
    Closing,
    ClosedFinal,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Listening => write!(f, "listening"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Established => write!(f, "established"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::ClosedFinal => write!(f, "closed-final"),
        }
    }
}

/// Signal delivered to an endpoint's send callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketNotice {
    /// Handshake completed
    Connected,
    /// Acknowledgments freed send buffer space
    BufferAvailable { available: u64 },
    /// Peer finished its stream
    PeerClosed,
    /// Our close completed
    Closed,
    /// Connection failed
    Failed(TransportError),
}

/// Receipt for data accepted by `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendToken {
    /// Stream offset of the first accepted byte
    pub seq: u64,
    /// Bytes accepted
    pub len: u64,
}
