use tidesim_core::network::{Address, EndpointId, NetScheduler, Network};
use tidesim_core::transport::{ConnectionState, SocketNotice};
use tidesim_core::{SimTime, Simulation};

use super::SessionProgress;
use crate::SimError;

/// Callback-driven sender: writes whenever the send buffer has room.
///
/// Every `BufferAvailable` notice tops the buffer up with whole messages
/// until `total_messages` have been handed over, so the transport never
/// runs dry while data remains.
#[derive(Debug, Clone)]
pub struct BulkSend {
    endpoint: EndpointId,
    peer: Address,
    message_size: u64,
    total_messages: u64,
    close_when_done: bool,
}

/// State owned by the send callback.
struct BulkSession {
    endpoint: EndpointId,
    message_size: u64,
    remaining: u64,
    close_when_done: bool,
    closed: bool,
    progress: SessionProgress,
}

impl BulkSend {
    /// Sends `total_messages` messages of `message_size` bytes to `peer`.
    pub fn new(endpoint: EndpointId, peer: Address, message_size: u64, total_messages: u64) -> Self {
        Self {
            endpoint,
            peer,
            message_size,
            total_messages,
            close_when_done: false,
        }
    }

    /// Closes the connection after the last message is handed over.
    pub fn close_when_done(mut self, close: bool) -> Self {
        self.close_when_done = close;
        self
    }

    /// Connects at `connect_at` and starts writing at `start_at`.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidParameters` - If the message size is zero or larger than the
    ///   send buffer, or writing starts before connecting
    /// - `SimError::Core` - If either time is in the past
    pub fn install(
        self,
        sim: &mut Simulation,
        connect_at: SimTime,
        start_at: SimTime,
    ) -> Result<SessionProgress, SimError> {
        if self.message_size == 0 {
            return Err(SimError::InvalidParameters {
                reason: "bulk message size must be greater than zero".to_string(),
            });
        }
        let capacity = sim.network().config().transport.send_buffer_capacity;
        if self.message_size > capacity {
            return Err(SimError::InvalidParameters {
                reason: format!(
                    "bulk message of {} bytes never fits the {capacity}-byte send buffer",
                    self.message_size
                ),
            });
        }
        if start_at < connect_at {
            return Err(SimError::InvalidParameters {
                reason: format!("bulk send starts at {start_at}, before connecting at {connect_at}"),
            });
        }

        let progress = SessionProgress::new();
        let (endpoint, peer) = (self.endpoint, self.peer);
        sim.schedule_at(connect_at, move |net: &mut Network, s| {
            if let Err(error) = net.connect(s, endpoint, peer) {
                tracing::warn!(%endpoint, %peer, %error, "Bulk sender failed to connect");
            }
        })?;

        let mut session = BulkSession {
            endpoint: self.endpoint,
            message_size: self.message_size,
            remaining: self.total_messages,
            close_when_done: self.close_when_done,
            closed: false,
            progress: progress.clone(),
        };
        sim.schedule_at(start_at, move |net: &mut Network, s| {
            tracing::info!(%endpoint, messages = session.remaining, "Bulk send starting");
            session.fill(net, s);
            let registered = net.set_send_callback(endpoint, move |net, s, _, notice| {
                session.on_notice(net, s, notice)
            });
            if let Err(error) = registered {
                tracing::warn!(%endpoint, %error, "Bulk sender has no endpoint");
            }
        })?;

        Ok(progress)
    }
}

impl BulkSession {
    fn on_notice(&mut self, net: &mut Network, scheduler: &mut NetScheduler, notice: &SocketNotice) {
        match notice {
            SocketNotice::Connected | SocketNotice::BufferAvailable { .. } => {
                self.fill(net, scheduler)
            }
            SocketNotice::Failed(error) => {
                tracing::warn!(endpoint = %self.endpoint, %error, "Bulk transfer failed");
                self.progress.mark_failed();
            }
            SocketNotice::PeerClosed | SocketNotice::Closed => {}
        }
    }

    fn fill(&mut self, net: &mut Network, scheduler: &mut NetScheduler) {
        let Ok(endpoint) = net.endpoint(self.endpoint) else {
            return;
        };
        let mut available = endpoint.available();
        let state = endpoint.state();

        while self.remaining > 0 && available >= self.message_size {
            if let Err(error) = net.send(scheduler, self.endpoint, self.message_size) {
                tracing::warn!(endpoint = %self.endpoint, %error, "Bulk send rejected");
                self.progress.mark_failed();
                self.remaining = 0;
                return;
            }
            self.progress.record_send(self.message_size);
            self.remaining -= 1;
            available -= self.message_size;
        }

        if self.remaining == 0 && !self.progress.snapshot().finished {
            self.progress.mark_finished();
            tracing::info!(endpoint = %self.endpoint, "Bulk send handed over all messages");
        }

        // Close needs a completed handshake; retried on the Connected notice
        if self.remaining == 0
            && self.close_when_done
            && !self.closed
            && state == ConnectionState::Established
        {
            self.closed = true;
            if let Err(error) = net.close(scheduler, self.endpoint) {
                tracing::warn!(endpoint = %self.endpoint, %error, "Bulk close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tidesim_core::{CongestionAlgorithm, DataRate, TidesimConfig};

    use super::*;
    use crate::apps::PacketSink;

    fn pair(sim: &mut Simulation) -> (EndpointId, PacketSink) {
        let net = sim.network_mut();
        let a = net.create_node();
        let b = net.create_node();
        net.create_link(a, b, DataRate::from_mbps(10), Duration::from_millis(2))
            .unwrap();
        let client = net.create_endpoint(a, CongestionAlgorithm::NewReno).unwrap();
        let server = net.create_endpoint(b, CongestionAlgorithm::NewReno).unwrap();
        let sink = PacketSink::install(sim, server, 9, SimTime::ZERO).unwrap();
        (client, sink)
    }

    #[test]
    fn test_bulk_send_delivers_every_message() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);

        let progress = BulkSend::new(client, sink.address(), 10_000, 50)
            .install(&mut sim, SimTime::ZERO, SimTime::from_millis(50))
            .unwrap();
        sim.run_until(SimTime::from_secs(5)).unwrap();

        let snapshot = progress.snapshot();
        assert!(snapshot.finished);
        assert_eq!(snapshot.messages_sent, 50);
        assert_eq!(sink.bytes_received(sim.network()), 500_000);
    }

    #[test]
    fn test_message_larger_than_send_buffer_is_rejected() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);
        let capacity = sim.network().config().transport.send_buffer_capacity;

        let result = BulkSend::new(client, sink.address(), capacity + 1, 1).install(
            &mut sim,
            SimTime::ZERO,
            SimTime::ZERO,
        );
        assert!(matches!(result, Err(SimError::InvalidParameters { .. })));

        // A message filling the buffer exactly is still accepted
        let progress = BulkSend::new(client, sink.address(), capacity, 1)
            .install(&mut sim, SimTime::ZERO, SimTime::ZERO)
            .unwrap();
        sim.run_until(SimTime::from_secs(5)).unwrap();
        assert!(progress.snapshot().finished);
        assert_eq!(sink.bytes_received(sim.network()), capacity);
    }
}
