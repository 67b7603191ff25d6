//! Point-to-point link model.
//!
//! Each direction is a FIFO server: a packet starts serializing when the
//! channel is free, takes `size / data_rate` to transmit and arrives
//! `propagation_delay` later. Packets never overtake each other.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use super::topology::{LinkId, NodeId};
use crate::config::LinkConfig;
use crate::scheduler::DeterministicRng;
use crate::time::{DataRate, SimTime};

/// Why a link discarded a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// Drop-tail queue was full
    QueueFull,
    /// Scheduled loss injection
    Injected,
    /// Random loss model
    Random,
}

/// Result of offering a packet to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Packet will arrive at the far end at `at`
    Delivered { at: SimTime },
    /// Packet was discarded
    Dropped(DropReason),
}

/// Counters collected by a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    /// Packets accepted for transmission
    pub packets_transmitted: u64,
    /// Wire bytes accepted for transmission
    pub bytes_transmitted: u64,
    /// Packets dropped by the drop-tail queue
    pub queue_drops: u64,
    /// Packets dropped by loss injection
    pub injected_drops: u64,
    /// Packets dropped by the random loss model
    pub random_drops: u64,
    /// Times at which injected drops happened
    pub injected_drop_times: Vec<SimTime>,
}

#[derive(Debug, Clone, Default)]
struct Direction {
    /// Departure times of packets still in the queue or on the wire
    departures: VecDeque<SimTime>,
    busy_until: SimTime,
}

/// Bidirectional point-to-point channel between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    endpoints: [NodeId; 2],
    data_rate: DataRate,
    propagation_delay: Duration,
    queue_capacity: usize,
    random_loss_rate: f64,
    rng: DeterministicRng,
    directions: [Direction; 2],
    pending_injections: Vec<SimTime>,
    stats: LinkStats,
}

impl Link {
    pub(crate) fn new(
        id: LinkId,
        a: NodeId,
        b: NodeId,
        data_rate: DataRate,
        propagation_delay: Duration,
        config: &LinkConfig,
        seed: u64,
    ) -> Self {
        Self {
            id,
            endpoints: [a, b],
            data_rate,
            propagation_delay,
            queue_capacity: config.queue_capacity,
            random_loss_rate: config.random_loss_rate,
            rng: DeterministicRng::from_seed(seed ^ (id.index() as u64).rotate_left(32)),
            directions: Default::default(),
            pending_injections: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// Returns the link id.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Returns the two nodes joined by this link.
    pub fn nodes(&self) -> (NodeId, NodeId) {
        (self.endpoints[0], self.endpoints[1])
    }

    /// Returns the channel data rate.
    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    /// Returns the one-way propagation delay.
    pub fn propagation_delay(&self) -> Duration {
        self.propagation_delay
    }

    /// Returns collected counters.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Returns true if the link joins `a` and `b` in either order.
    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.endpoints[0] == a && self.endpoints[1] == b)
            || (self.endpoints[0] == b && self.endpoints[1] == a)
    }

    /// Drops the first data packet offered at or after `at`.
    pub fn drop_next_data_after(&mut self, at: SimTime) {
        self.pending_injections.push(at);
        self.pending_injections.sort();
    }

    /// Offers `wire_bytes` from node `from` to the link at time `now`.
    ///
    /// Loss injection and random loss only apply to data packets so control
    /// traffic stays reliable.
    pub fn transmit(
        &mut self,
        now: SimTime,
        from: NodeId,
        wire_bytes: u64,
        is_data: bool,
    ) -> LinkOutcome {
        if is_data {
            if self.pending_injections.first().is_some_and(|&at| at <= now) {
                self.pending_injections.remove(0);
                self.stats.injected_drops += 1;
                self.stats.injected_drop_times.push(now);
                tracing::debug!(link = %self.id, %now, "Injected loss dropped data packet");
                return LinkOutcome::Dropped(DropReason::Injected);
            }
            if self.random_loss_rate > 0.0 && self.rng.random_bool(self.random_loss_rate) {
                self.stats.random_drops += 1;
                return LinkOutcome::Dropped(DropReason::Random);
            }
        }

        let index = usize::from(from != self.endpoints[0]);
        let direction = &mut self.directions[index];
        while direction.departures.front().is_some_and(|&done| done <= now) {
            direction.departures.pop_front();
        }

        if direction.departures.len() >= self.queue_capacity {
            self.stats.queue_drops += 1;
            tracing::debug!(link = %self.id, %now, "Drop-tail queue full");
            return LinkOutcome::Dropped(DropReason::QueueFull);
        }

        let start = direction.busy_until.max(now);
        let finish = start + self.data_rate.transmission_time(wire_bytes);
        direction.busy_until = finish;
        direction.departures.push_back(finish);

        self.stats.packets_transmitted += 1;
        self.stats.bytes_transmitted += wire_bytes;

        LinkOutcome::Delivered {
            at: finish + self.propagation_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rate: DataRate, delay_ms: u64, config: LinkConfig) -> Link {
        Link::new(
            LinkId(0),
            NodeId(0),
            NodeId(1),
            rate,
            Duration::from_millis(delay_ms),
            &config,
            1,
        )
    }

    #[test]
    fn test_delivery_time_is_transmission_plus_propagation() {
        let mut link = link(DataRate::from_mbps(5), 2, LinkConfig::default());

        // 1064 wire bytes at 5 Mbps = 1.7024 ms, plus 2 ms propagation
        let outcome = link.transmit(SimTime::from_secs(2), NodeId(0), 1064, true);
        assert_eq!(
            outcome,
            LinkOutcome::Delivered {
                at: SimTime::from_secs(2) + Duration::from_nanos(3_702_400)
            }
        );
    }

    #[test]
    fn test_fifo_serialization_without_reordering() {
        let mut link = link(DataRate::from_mbps(1), 10, LinkConfig::default());
        let now = SimTime::ZERO;

        let LinkOutcome::Delivered { at: first } = link.transmit(now, NodeId(0), 1000, true) else {
            panic!("first packet dropped");
        };
        let LinkOutcome::Delivered { at: second } = link.transmit(now, NodeId(0), 100, true)
        else {
            panic!("second packet dropped");
        };

        // Second packet waits for the first to finish serializing
        assert!(second > first);
        assert_eq!(second - first, DataRate::from_mbps(1).transmission_time(100));
    }

    #[test]
    fn test_directions_are_independent() {
        let mut link = link(DataRate::from_mbps(1), 10, LinkConfig::default());

        let forward = link.transmit(SimTime::ZERO, NodeId(0), 1000, true);
        let reverse = link.transmit(SimTime::ZERO, NodeId(1), 1000, true);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_queue_capacity_drops_excess() {
        let config = LinkConfig {
            queue_capacity: 2,
            ..Default::default()
        };
        let mut link = link(DataRate::from_kbps(10), 1, config);

        assert!(matches!(
            link.transmit(SimTime::ZERO, NodeId(0), 1000, true),
            LinkOutcome::Delivered { .. }
        ));
        assert!(matches!(
            link.transmit(SimTime::ZERO, NodeId(0), 1000, true),
            LinkOutcome::Delivered { .. }
        ));
        assert_eq!(
            link.transmit(SimTime::ZERO, NodeId(0), 1000, true),
            LinkOutcome::Dropped(DropReason::QueueFull)
        );
        assert_eq!(link.stats().queue_drops, 1);
    }

    #[test]
    fn test_injected_loss_hits_first_data_packet_after_time() {
        let mut link = link(DataRate::from_mbps(10), 2, LinkConfig::default());
        link.drop_next_data_after(SimTime::from_secs(5));

        assert!(matches!(
            link.transmit(SimTime::from_secs(4), NodeId(0), 100, true),
            LinkOutcome::Delivered { .. }
        ));
        // Control packets are never injected
        assert!(matches!(
            link.transmit(SimTime::from_secs(5), NodeId(1), 40, false),
            LinkOutcome::Delivered { .. }
        ));
        assert_eq!(
            link.transmit(SimTime::from_secs(5), NodeId(0), 100, true),
            LinkOutcome::Dropped(DropReason::Injected)
        );
        assert!(matches!(
            link.transmit(SimTime::from_secs(5), NodeId(0), 100, true),
            LinkOutcome::Delivered { .. }
        ));
        assert_eq!(link.stats().injected_drop_times, vec![SimTime::from_secs(5)]);
    }

    #[test]
    fn test_random_loss_is_seed_deterministic() {
        let config = LinkConfig {
            random_loss_rate: 0.3,
            ..Default::default()
        };
        let run = || {
            let mut link = link(DataRate::from_gbps(1), 1, config.clone());
            (0..200)
                .map(|i| {
                    link.transmit(SimTime::from_millis(i), NodeId(0), 100, true)
                        == LinkOutcome::Dropped(DropReason::Random)
                })
                .collect::<Vec<bool>>()
        };

        let first = run();
        assert_eq!(first, run());
        assert!(first.iter().any(|dropped| *dropped));
        assert!(first.iter().any(|dropped| !*dropped));
    }
}
