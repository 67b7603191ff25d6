//! Scenario parameter sets.

use std::time::Duration;

use tidesim_core::{CongestionAlgorithm, DataRate, SimTime};

/// Single flow sending a few paced messages over a slow link.
#[derive(Debug, Clone)]
pub struct PacedFlowScenario {
    /// Link rate
    pub data_rate: DataRate,
    /// One-way propagation delay
    pub delay: Duration,
    /// Sender congestion control
    pub algorithm: CongestionAlgorithm,
    /// Bytes per message
    pub message_size: u64,
    /// Messages to send
    pub messages: u64,
    /// Time between messages
    pub interval: Duration,
    /// Sink starts listening
    pub sink_start: SimTime,
    /// Sender opens the connection
    pub connect_at: SimTime,
    /// First message
    pub start_at: SimTime,
    /// End of the run
    pub stop_time: SimTime,
}

impl Default for PacedFlowScenario {
    fn default() -> Self {
        Self {
            data_rate: DataRate::from_mbps(5),
            delay: Duration::from_millis(2),
            algorithm: CongestionAlgorithm::NewReno,
            message_size: 1024,
            messages: 10,
            interval: Duration::from_millis(100),
            sink_start: SimTime::from_secs(1),
            connect_at: SimTime::from_secs(1),
            start_at: SimTime::from_secs(2),
            stop_time: SimTime::from_secs(10),
        }
    }
}

/// Two isolated constant-rate flows, one per congestion control variant.
#[derive(Debug, Clone)]
pub struct ComparisonScenario {
    /// Link rate of both flows
    pub data_rate: DataRate,
    /// One-way propagation delay of both flows
    pub delay: Duration,
    /// Congestion control per flow
    pub algorithms: [CongestionAlgorithm; 2],
    /// Rate each sender offers
    pub offered_rate: DataRate,
    /// Bytes per message
    pub packet_size: u64,
    /// Sinks start listening
    pub sink_start: SimTime,
    /// Senders connect and start offering traffic
    pub start_at: SimTime,
    /// Senders stop offering traffic
    pub stop_at: SimTime,
    /// End of the run
    pub stop_time: SimTime,
}

impl Default for ComparisonScenario {
    fn default() -> Self {
        Self {
            data_rate: DataRate::from_gbps(1),
            delay: Duration::from_millis(2),
            algorithms: [CongestionAlgorithm::NewReno, CongestionAlgorithm::Cubic],
            offered_rate: DataRate::from_mbps(1),
            packet_size: 1024,
            sink_start: SimTime::ZERO,
            start_at: SimTime::from_secs(1),
            stop_at: SimTime::from_secs(10),
            stop_time: SimTime::from_secs(10),
        }
    }
}

/// Window-limited bulk transfer that loses one data segment mid-flow.
#[derive(Debug, Clone)]
pub struct LossRecoveryScenario {
    /// Link rate
    pub data_rate: DataRate,
    /// One-way propagation delay
    pub delay: Duration,
    /// Sender congestion control
    pub algorithm: CongestionAlgorithm,
    /// Receiver advertised window in bytes
    pub receive_window: u64,
    /// Bytes per write
    pub message_size: u64,
    /// Writes to perform
    pub messages: u64,
    /// Sender opens the connection
    pub connect_at: SimTime,
    /// First write
    pub start_at: SimTime,
    /// First data packet at or after this instant is dropped
    pub loss_at: SimTime,
    /// End of the run
    pub stop_time: SimTime,
}

impl Default for LossRecoveryScenario {
    fn default() -> Self {
        Self {
            data_rate: DataRate::from_mbps(10),
            delay: Duration::from_millis(2),
            algorithm: CongestionAlgorithm::NewReno,
            receive_window: 65_536, // 64 KiB keeps the drop-tail queue below capacity
            message_size: 1448,
            messages: 8_000, // Still transferring at the loss instant
            connect_at: SimTime::from_millis(500),
            start_at: SimTime::from_secs(1),
            loss_at: SimTime::from_secs(5),
            stop_time: SimTime::from_secs(10),
        }
    }
}
