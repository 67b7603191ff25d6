use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tidesim_core::network::{Address, EndpointId, NetScheduler, Network};
use tidesim_core::scheduler::EventHandle;
use tidesim_core::{DataRate, SimTime, Simulation};

use super::SessionProgress;
use crate::SimError;

/// Lifecycle of a periodic sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SendPhase {
    /// Waiting for the first tick
    Idle,
    /// Ticks are being scheduled
    Sending,
    /// No further ticks will run
    Finished,
}

/// Timer-driven sender: one message per tick, independent of the send callback.
///
/// Covers both a fixed number of messages at a fixed interval (`paced`) and a
/// constant bit rate generator running until a stop time (`on_off`). The
/// transport buffers whatever the window cannot carry yet.
#[derive(Debug, Clone)]
pub struct PeriodicSend {
    endpoint: EndpointId,
    peer: Address,
    message_size: u64,
    interval: Duration,
    limit: Option<u64>,
    connect_at: SimTime,
    start_at: SimTime,
    stop_at: Option<SimTime>,
}

/// Observer and controller of an installed periodic sender.
#[derive(Debug, Clone)]
pub struct PeriodicHandle {
    ticker: Rc<Ticker>,
}

#[derive(Debug)]
struct Ticker {
    endpoint: EndpointId,
    message_size: u64,
    interval: Duration,
    limit: Option<u64>,
    stop_at: Option<SimTime>,
    phase: Cell<SendPhase>,
    next_tick: Cell<Option<EventHandle>>,
    progress: SessionProgress,
}

impl PeriodicSend {
    /// Sends `count` messages of `message_size` bytes, one every `interval`.
    pub fn paced(
        endpoint: EndpointId,
        peer: Address,
        message_size: u64,
        count: u64,
        interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            peer,
            message_size,
            interval,
            limit: Some(count),
            connect_at: SimTime::ZERO,
            start_at: SimTime::ZERO,
            stop_at: None,
        }
    }

    /// Offers `rate` worth of `message_size`-byte messages until stopped.
    pub fn on_off(endpoint: EndpointId, peer: Address, rate: DataRate, message_size: u64) -> Self {
        Self {
            endpoint,
            peer,
            message_size,
            interval: rate.transmission_time(message_size),
            limit: None,
            connect_at: SimTime::ZERO,
            start_at: SimTime::ZERO,
            stop_at: None,
        }
    }

    /// Opens the connection at `time`.
    pub fn connect_at(mut self, time: SimTime) -> Self {
        self.connect_at = time;
        self
    }

    /// First message goes out at `time`.
    pub fn start_at(mut self, time: SimTime) -> Self {
        self.start_at = time;
        self
    }

    /// No message goes out at or after `time`.
    pub fn stop_at(mut self, time: SimTime) -> Self {
        self.stop_at = Some(time);
        self
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedules the connection and the first tick.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidParameters` - If the interval or message size is zero
    /// - `SimError::Core` - If a start time is in the past
    pub fn install(self, sim: &mut Simulation) -> Result<PeriodicHandle, SimError> {
        if self.interval.is_zero() || self.message_size == 0 {
            return Err(SimError::InvalidParameters {
                reason: "periodic sender needs a non-zero interval and message size".to_string(),
            });
        }

        let (endpoint, peer) = (self.endpoint, self.peer);
        sim.schedule_at(self.connect_at, move |net: &mut Network, s| {
            if let Err(error) = net.connect(s, endpoint, peer) {
                tracing::warn!(%endpoint, %peer, %error, "Periodic sender failed to connect");
            }
        })?;

        let ticker = Rc::new(Ticker {
            endpoint,
            message_size: self.message_size,
            interval: self.interval,
            limit: self.limit,
            stop_at: self.stop_at,
            phase: Cell::new(SendPhase::Idle),
            next_tick: Cell::new(None),
            progress: SessionProgress::new(),
        });

        let first = Rc::clone(&ticker);
        let handle = sim.schedule_at(self.start_at, move |net: &mut Network, s| first.tick(net, s))?;
        ticker.next_tick.set(Some(handle));

        Ok(PeriodicHandle { ticker })
    }
}

impl PeriodicHandle {
    /// Current lifecycle phase.
    pub fn phase(&self) -> SendPhase {
        self.ticker.phase.get()
    }

    /// Shared progress counters.
    pub fn progress(&self) -> SessionProgress {
        self.ticker.progress.clone()
    }

    /// Cancels the pending tick and finishes the sender.
    pub fn stop(&self, scheduler: &mut NetScheduler) {
        if let Some(next) = self.ticker.next_tick.take() {
            scheduler.cancel(next);
        }
        self.ticker.finish();
    }
}

impl Ticker {
    fn tick(self: Rc<Self>, net: &mut Network, scheduler: &mut NetScheduler) {
        self.next_tick.set(None);
        if self.phase.get() == SendPhase::Finished {
            return;
        }
        let now = scheduler.now();
        if self.stop_at.is_some_and(|stop| now >= stop) || self.limit_reached() {
            self.finish();
            return;
        }
        self.phase.set(SendPhase::Sending);

        if let Err(error) = net.send(scheduler, self.endpoint, self.message_size) {
            tracing::warn!(endpoint = %self.endpoint, %error, "Periodic send rejected");
            self.progress.mark_failed();
            self.finish();
            return;
        }
        self.progress.record_send(self.message_size);
        tracing::debug!(
            endpoint = %self.endpoint,
            %now,
            sent = self.progress.snapshot().messages_sent,
            "Periodic message sent"
        );

        if self.limit_reached() {
            self.finish();
            return;
        }

        let interval = self.interval;
        let next = Rc::clone(&self);
        let handle = scheduler.schedule(interval, move |net: &mut Network, s| next.tick(net, s));
        self.next_tick.set(Some(handle));
    }

    fn limit_reached(&self) -> bool {
        let sent = self.progress.snapshot().messages_sent;
        self.limit.is_some_and(|limit| sent >= limit)
    }

    fn finish(&self) {
        if self.phase.get() != SendPhase::Finished {
            self.phase.set(SendPhase::Finished);
            self.progress.mark_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use tidesim_core::{CongestionAlgorithm, TidesimConfig};

    use super::*;
    use crate::apps::PacketSink;

    fn pair(sim: &mut Simulation) -> (EndpointId, PacketSink) {
        let net = sim.network_mut();
        let a = net.create_node();
        let b = net.create_node();
        net.create_link(a, b, DataRate::from_mbps(5), Duration::from_millis(2))
            .unwrap();
        let client = net.create_endpoint(a, CongestionAlgorithm::NewReno).unwrap();
        let server = net.create_endpoint(b, CongestionAlgorithm::NewReno).unwrap();
        let sink = PacketSink::install(sim, server, 9, SimTime::ZERO).unwrap();
        (client, sink)
    }

    #[test]
    fn test_paced_sender_sends_count_then_finishes() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);

        let handle = PeriodicSend::paced(client, sink.address(), 1024, 4, Duration::from_millis(100))
            .connect_at(SimTime::from_millis(10))
            .start_at(SimTime::from_secs(1))
            .install(&mut sim)
            .unwrap();
        assert_eq!(handle.phase(), SendPhase::Idle);

        sim.run_until(SimTime::from_millis(1150)).unwrap();
        assert_eq!(handle.phase(), SendPhase::Sending);
        assert_eq!(handle.progress().snapshot().messages_sent, 2);

        sim.run_until(SimTime::from_secs(5)).unwrap();
        assert_eq!(handle.phase(), SendPhase::Finished);
        assert_eq!(handle.progress().snapshot().bytes_sent, 4096);
        assert_eq!(sink.bytes_received(sim.network()), 4096);
    }

    #[test]
    fn test_paced_sender_with_zero_count_sends_nothing() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);

        let handle = PeriodicSend::paced(client, sink.address(), 1024, 0, Duration::from_millis(100))
            .start_at(SimTime::from_secs(1))
            .install(&mut sim)
            .unwrap();

        sim.run_until(SimTime::from_secs(3)).unwrap();
        let progress = handle.progress().snapshot();
        assert_eq!(progress.messages_sent, 0);
        assert!(progress.finished);
        assert_eq!(handle.phase(), SendPhase::Finished);
        assert_eq!(sink.bytes_received(sim.network()), 0);
    }

    #[test]
    fn test_stop_cancels_pending_tick() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);

        let handle = PeriodicSend::on_off(client, sink.address(), DataRate::from_mbps(1), 1000)
            .start_at(SimTime::from_millis(100))
            .install(&mut sim)
            .unwrap();
        // 1000 bytes at 1 Mbps
        assert_eq!(handle.ticker.interval, Duration::from_millis(8));

        sim.run_until(SimTime::from_millis(200)).unwrap();
        let (_, scheduler) = sim.parts();
        handle.stop(scheduler);
        let sent = handle.progress().snapshot().messages_sent;

        sim.run_until(SimTime::from_secs(1)).unwrap();
        assert_eq!(handle.phase(), SendPhase::Finished);
        assert_eq!(handle.progress().snapshot().messages_sent, sent);
    }

    #[test]
    fn test_on_off_respects_stop_time() {
        let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
        let (client, sink) = pair(&mut sim);

        let handle = PeriodicSend::on_off(client, sink.address(), DataRate::from_kbps(80), 1000)
            .start_at(SimTime::from_millis(100))
            .stop_at(SimTime::from_millis(500))
            .install(&mut sim)
            .unwrap();

        sim.run_until(SimTime::from_secs(2)).unwrap();
        // Ticks at 100, 200, 300 and 400 ms
        assert_eq!(handle.progress().snapshot().messages_sent, 4);
        assert_eq!(handle.phase(), SendPhase::Finished);
    }
}
