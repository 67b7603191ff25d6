//! Transport endpoint state machine.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use super::rtt::RttEstimator;
use super::segment::{PacketKind, Segment};
use super::stats::{CwndSample, EndpointStats, LossRecord, MAX_TRACE_SAMPLES};
use super::{ConnectionState, SendToken, SocketNotice, TransportError};
use crate::config::TransportConfig;
use crate::congestion::{
    AckSample, CongestionAlgorithm, CongestionControl, CongestionState, LossKind,
};
use crate::network::{Address, EndpointId};
use crate::time::SimTime;

/// Side effect requested by an endpoint, carried out by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAction {
    /// Hand a packet to the link towards `to`
    Transmit { to: Address, kind: PacketKind },
    /// (Re)start the retransmission timer
    ArmTimer(Duration),
    /// Stop the retransmission timer
    CancelTimer,
    /// Deliver a notice to the send callback
    Notify(SocketNotice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinState {
    NotRequested,
    Pending,
    Sent { seq: u64 },
    Acknowledged,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    segment: Segment,
    retransmitted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    bytes_sent: u64,
    bytes_acked: u64,
    bytes_received: u64,
    segments_sent: u64,
    segments_acked: u64,
    retransmissions: u64,
    timeouts: u64,
    fast_retransmits: u64,
    loss_events: u64,
    first_retransmit_at: Option<SimTime>,
}

/// Socket-like transport endpoint bound to a node.
///
/// Owns its send buffer and congestion controller exclusively; all external
/// influence arrives through [`Endpoint::on_packet`] and
/// [`Endpoint::on_timeout`], both driven by scheduled events.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    local: Address,
    peer: Option<Address>,
    state: ConnectionState,
    config: TransportConfig,
    cc: Box<dyn CongestionControl>,
    rtt: RttEstimator,

    // Sender
    unsent: VecDeque<Segment>,
    in_flight: VecDeque<InFlight>,
    snd_una: u64,
    snd_nxt: u64,
    write_seq: u64,
    peer_window: u64,
    dup_acks: u32,
    recover: Option<u64>,
    backoff: u32,
    timer_armed: bool,
    syn_sent_at: Option<SimTime>,
    syn_retransmitted: bool,
    fin: FinState,

    // Receiver
    rcv_next: u64,
    out_of_order: BTreeMap<u64, u32>,
    peer_closed: bool,

    counters: Counters,
    cwnd_trace: Vec<CwndSample>,
    losses: Vec<LossRecord>,
    last_error: Option<TransportError>,
    actions: Vec<EndpointAction>,
}

impl Endpoint {
    /// Creates a closed endpoint using `algorithm` for congestion control.
    pub fn new(
        id: EndpointId,
        local: Address,
        algorithm: CongestionAlgorithm,
        config: &TransportConfig,
    ) -> Self {
        Self {
            id,
            local,
            peer: None,
            state: ConnectionState::Closed,
            config: config.clone(),
            cc: algorithm.build(config),
            rtt: RttEstimator::new(config),
            unsent: VecDeque::new(),
            in_flight: VecDeque::new(),
            snd_una: 0,
            snd_nxt: 0,
            write_seq: 0,
            peer_window: config.receive_window,
            dup_acks: 0,
            recover: None,
            backoff: 0,
            timer_armed: false,
            syn_sent_at: None,
            syn_retransmitted: false,
            fin: FinState::NotRequested,
            rcv_next: 0,
            out_of_order: BTreeMap::new(),
            peer_closed: false,
            counters: Counters::default(),
            cwnd_trace: Vec::new(),
            losses: Vec::new(),
            last_error: None,
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn local_address(&self) -> Address {
        self.local
    }

    pub fn peer(&self) -> Option<Address> {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn algorithm(&self) -> CongestionAlgorithm {
        self.cc.algorithm()
    }

    /// Current congestion window in bytes.
    pub fn cwnd(&self) -> u64 {
        self.cc.cwnd()
    }

    /// Bytes sent but not yet cumulatively acknowledged.
    pub fn bytes_in_flight(&self) -> u64 {
        self.snd_nxt - self.snd_una
    }

    /// Bytes accepted by `send` and not yet acknowledged.
    pub fn buffered_bytes(&self) -> u64 {
        self.write_seq - self.snd_una
    }

    /// Free send buffer space.
    pub fn available(&self) -> u64 {
        self.config
            .send_buffer_capacity
            .saturating_sub(self.buffered_bytes())
    }

    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.rtt.smoothed_rtt()
    }

    /// Current retransmission timeout including backoff.
    pub fn rto(&self) -> Duration {
        self.rtt.backed_off(self.backoff)
    }

    /// In-order bytes delivered from the peer.
    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes_received
    }

    /// Most recent failure, if the connection was refused or gave up.
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Returns true once the peer's end of stream arrived.
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn cwnd_trace(&self) -> &[CwndSample] {
        &self.cwnd_trace
    }

    pub fn losses(&self) -> &[LossRecord] {
        &self.losses
    }

    /// Snapshot of all observation points.
    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            algorithm: self.cc.algorithm(),
            cwnd: self.cc.cwnd(),
            ssthresh: self.cc.ssthresh(),
            congestion_state: self.cc.state(),
            bytes_in_flight: self.bytes_in_flight(),
            buffered_bytes: self.buffered_bytes(),
            smoothed_rtt: self.rtt.smoothed_rtt(),
            rto: self.rto(),
            bytes_sent: self.counters.bytes_sent,
            bytes_acked: self.counters.bytes_acked,
            bytes_received: self.counters.bytes_received,
            segments_sent: self.counters.segments_sent,
            segments_acked: self.counters.segments_acked,
            retransmissions: self.counters.retransmissions,
            timeouts: self.counters.timeouts,
            fast_retransmits: self.counters.fast_retransmits,
            loss_events: self.counters.loss_events,
            first_retransmit_at: self.counters.first_retransmit_at,
        }
    }

    pub(crate) fn rebind(&mut self, local: Address) {
        self.local = local;
    }

    /// Removes and returns pending side effects.
    pub fn take_actions(&mut self) -> Vec<EndpointAction> {
        std::mem::take(&mut self.actions)
    }

    /// Passive open.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidState` - If the endpoint is not closed
    pub fn listen(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Closed {
            return Err(self.invalid_state("listen"));
        }
        self.state = ConnectionState::Listening;
        tracing::debug!(endpoint = %self.id, local = %self.local, "Listening");
        Ok(())
    }

    /// Active open towards `peer`. Completes when the SYN-ACK arrives.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidState` - If the endpoint is not closed
    pub fn connect(&mut self, now: SimTime, peer: Address) -> Result<(), TransportError> {
        if self.state != ConnectionState::Closed {
            return Err(self.invalid_state("connect"));
        }
        self.peer = Some(peer);
        self.state = ConnectionState::Connecting;
        self.last_error = None;
        self.backoff = 0;
        self.syn_sent_at = Some(now);
        self.syn_retransmitted = false;
        self.emit(peer, PacketKind::Syn);
        self.arm_timer();
        tracing::debug!(endpoint = %self.id, %peer, %now, "Connecting");
        Ok(())
    }

    /// Queues `bytes` of application data, split into MSS-sized segments.
    ///
    /// Never blocks and never drops data: the bytes are buffered and
    /// transmitted as the window allows.
    ///
    /// # Errors
    ///
    /// - `TransportError::SendAfterClose` - If `close` was already called or the connection ended
    pub fn send(&mut self, now: SimTime, bytes: u64) -> Result<SendToken, TransportError> {
        if matches!(
            self.state,
            ConnectionState::Closing | ConnectionState::ClosedFinal
        ) {
            return Err(TransportError::SendAfterClose);
        }

        let token = SendToken {
            seq: self.write_seq,
            len: bytes,
        };
        let mss = u64::from(self.config.mss);
        let mut remaining = bytes;
        while remaining > 0 {
            let len = remaining.min(mss);
            self.unsent.push_back(Segment {
                seq: self.write_seq,
                len: len as u32,
                send_time: now,
            });
            self.write_seq += len;
            remaining -= len;
        }

        self.try_transmit(now);
        Ok(token)
    }

    /// Starts an orderly shutdown: remaining data is flushed, then a FIN is sent.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidState` - If the handshake is still in progress
    pub fn close(&mut self, now: SimTime) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Closed | ConnectionState::Listening => {
                self.unsent.clear();
                self.finish(ConnectionState::ClosedFinal);
                self.notify(SocketNotice::Closed);
                Ok(())
            }
            ConnectionState::Connecting => Err(self.invalid_state("close")),
            ConnectionState::Established => {
                self.state = ConnectionState::Closing;
                self.fin = FinState::Pending;
                tracing::debug!(endpoint = %self.id, %now, buffered = self.buffered_bytes(), "Closing");
                self.try_transmit(now);
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::ClosedFinal => Ok(()),
        }
    }

    /// Handles a packet delivered from `from`.
    pub fn on_packet(&mut self, now: SimTime, from: Address, kind: PacketKind) {
        match kind {
            PacketKind::Syn => self.on_syn(from),
            PacketKind::SynAck => self.on_syn_ack(now, from),
            PacketKind::Rst => self.on_rst(from),
            PacketKind::Data(segment) => self.on_data(from, segment),
            PacketKind::Ack { ack, window } => self.on_ack(now, ack, window),
            PacketKind::Fin { seq } => self.on_fin(from, seq),
            PacketKind::FinAck => self.on_fin_ack(now),
        }
    }

    /// Handles expiry of the retransmission timer.
    pub fn on_timeout(&mut self, now: SimTime) {
        self.timer_armed = false;
        match self.state {
            ConnectionState::Connecting => self.retransmit_syn(now),
            ConnectionState::Established | ConnectionState::Closing => {
                if !self.in_flight.is_empty() {
                    self.retransmit_on_timeout(now);
                } else if let FinState::Sent { seq } = self.fin {
                    if self.give_up_if_exhausted(seq) {
                        return;
                    }
                    self.backoff += 1;
                    self.counters.timeouts += 1;
                    self.emit_to_peer(PacketKind::Fin { seq });
                    self.arm_timer();
                }
            }
            _ => {}
        }
    }

    fn on_syn(&mut self, from: Address) {
        match self.state {
            ConnectionState::Listening => {
                self.peer = Some(from);
                self.state = ConnectionState::Established;
                self.emit(from, PacketKind::SynAck);
                self.notify(SocketNotice::Connected);
                tracing::debug!(endpoint = %self.id, peer = %from, "Accepted connection");
            }
            // Our SYN-ACK was lost
            ConnectionState::Established if self.peer == Some(from) => {
                self.emit(from, PacketKind::SynAck);
            }
            _ => self.emit(from, PacketKind::Rst),
        }
    }

    fn on_syn_ack(&mut self, now: SimTime, from: Address) {
        if self.state != ConnectionState::Connecting || self.peer != Some(from) {
            return;
        }
        if let (Some(sent_at), false) = (self.syn_sent_at, self.syn_retransmitted) {
            self.rtt.on_sample(now - sent_at);
        }
        self.state = ConnectionState::Established;
        self.backoff = 0;
        self.cancel_timer();
        self.record_sample(now);
        tracing::debug!(endpoint = %self.id, peer = %from, %now, "Connection established");
        self.notify(SocketNotice::Connected);

        self.try_transmit(now);
        let available = self.available();
        if available > 0 {
            self.notify(SocketNotice::BufferAvailable { available });
        }
    }

    fn on_rst(&mut self, from: Address) {
        if self.state != ConnectionState::Connecting || self.peer != Some(from) {
            return;
        }
        let error = TransportError::ConnectionRefused { peer: from };
        tracing::debug!(endpoint = %self.id, peer = %from, "Connection refused");
        self.state = ConnectionState::Closed;
        self.peer = None;
        self.cancel_timer();
        self.last_error = Some(error.clone());
        self.notify(SocketNotice::Failed(error));
    }

    fn on_data(&mut self, from: Address, segment: Segment) {
        if self.peer != Some(from)
            || !matches!(
                self.state,
                ConnectionState::Established
                    | ConnectionState::Closing
                    | ConnectionState::ClosedFinal
            )
        {
            return;
        }

        if segment.seq == self.rcv_next {
            self.deliver_in_order(segment.len);
            while let Some(len) = self.out_of_order.remove(&self.rcv_next) {
                self.deliver_in_order(len);
            }
        } else if segment.seq > self.rcv_next {
            self.out_of_order.insert(segment.seq, segment.len);
        }

        // Every data segment is acknowledged; a gap repeats the expected sequence
        let buffered: u64 = self.out_of_order.values().map(|&len| u64::from(len)).sum();
        let window = self.config.receive_window.saturating_sub(buffered);
        self.emit(
            from,
            PacketKind::Ack {
                ack: self.rcv_next,
                window,
            },
        );
    }

    fn deliver_in_order(&mut self, len: u32) {
        self.rcv_next += u64::from(len);
        self.counters.bytes_received += u64::from(len);
    }

    fn on_ack(&mut self, now: SimTime, ack: u64, window: u64) {
        if !matches!(
            self.state,
            ConnectionState::Established | ConnectionState::Closing
        ) || ack > self.snd_nxt
        {
            return;
        }
        self.peer_window = window;

        if ack > self.snd_una {
            self.on_new_ack(now, ack);
        } else if ack == self.snd_una && !self.in_flight.is_empty() {
            self.on_duplicate_ack(now);
        }
    }

    fn on_new_ack(&mut self, now: SimTime, ack: u64) {
        let in_flight_before = self.bytes_in_flight();
        let bytes_acked = ack - self.snd_una;

        let mut rtt_sample = None;
        while let Some(front) = self.in_flight.front() {
            if front.segment.end() > ack {
                break;
            }
            // Karn: retransmitted segments give ambiguous samples
            rtt_sample = (!front.retransmitted).then(|| now - front.segment.send_time);
            self.counters.segments_acked += 1;
            self.in_flight.pop_front();
        }
        if let Some(sample) = rtt_sample {
            self.rtt.on_sample(sample);
        }

        self.snd_una = ack;
        self.counters.bytes_acked += bytes_acked;
        self.dup_acks = 0;
        self.backoff = 0;

        let partial = self.recover.is_some_and(|recover| ack < recover);
        let mut exited_recovery = false;
        if !partial && self.recover.take().is_some() && self.cc.state() == CongestionState::Recovery
        {
            self.cc.on_recovery_exit(now);
            exited_recovery = true;
            tracing::debug!(endpoint = %self.id, %now, cwnd = self.cc.cwnd(), "Recovery complete");
        }

        if !exited_recovery && self.cc.state() != CongestionState::Recovery {
            let sample = AckSample {
                bytes_acked,
                now,
                smoothed_rtt: self.rtt.smoothed_rtt(),
                app_limited: !self.was_cwnd_limited(in_flight_before),
            };
            self.cc.on_ack(&sample);
        }

        if partial {
            self.retransmit_front(now);
        }

        if self.in_flight.is_empty() && !matches!(self.fin, FinState::Sent { .. }) {
            self.cancel_timer();
        } else {
            self.arm_timer();
        }

        self.record_sample(now);
        self.try_transmit(now);

        let available = self.available();
        if self.state == ConnectionState::Established && available > 0 {
            self.notify(SocketNotice::BufferAvailable { available });
        }
    }

    fn on_duplicate_ack(&mut self, now: SimTime) {
        self.dup_acks += 1;
        if self.dup_acks != self.config.dup_ack_threshold || self.recover.is_some() {
            return;
        }

        tracing::debug!(
            endpoint = %self.id,
            %now,
            seq = self.snd_una,
            "Duplicate acknowledgments, fast retransmit"
        );
        self.recover = Some(self.snd_nxt);
        self.enter_loss(now, LossKind::DuplicateAcks);
        self.counters.fast_retransmits += 1;
        self.retransmit_front(now);
        self.arm_timer();
        self.record_sample(now);
    }

    fn on_fin(&mut self, from: Address, seq: u64) {
        if self.peer != Some(from) || seq != self.rcv_next {
            return;
        }
        self.emit(from, PacketKind::FinAck);
        if !self.peer_closed {
            self.peer_closed = true;
            tracing::debug!(endpoint = %self.id, peer = %from, "Peer closed");
            self.notify(SocketNotice::PeerClosed);
        }
    }

    fn on_fin_ack(&mut self, now: SimTime) {
        if self.state != ConnectionState::Closing || !matches!(self.fin, FinState::Sent { .. }) {
            return;
        }
        self.fin = FinState::Acknowledged;
        self.snd_una = self.snd_nxt;
        self.in_flight.clear();
        self.finish(ConnectionState::ClosedFinal);
        tracing::debug!(endpoint = %self.id, %now, "Connection closed");
        self.notify(SocketNotice::Closed);
    }

    /// Sends buffered segments while the effective window allows.
    fn try_transmit(&mut self, now: SimTime) {
        if !matches!(
            self.state,
            ConnectionState::Established | ConnectionState::Closing
        ) {
            return;
        }
        let Some(peer) = self.peer else {
            return;
        };

        let mut sent = false;
        while let Some(&next) = self.unsent.front() {
            let in_flight = self.bytes_in_flight();
            let window = self.cc.cwnd().min(self.peer_window);
            if in_flight > 0 && in_flight + u64::from(next.len) > window {
                break;
            }

            self.unsent.pop_front();
            let segment = Segment {
                send_time: now,
                ..next
            };
            self.in_flight.push_back(InFlight {
                segment,
                retransmitted: false,
            });
            self.snd_nxt = segment.end();
            self.counters.bytes_sent += u64::from(segment.len);
            self.counters.segments_sent += 1;
            self.emit(peer, PacketKind::Data(segment));
            sent = true;
        }

        if self.fin == FinState::Pending && self.unsent.is_empty() {
            let seq = self.write_seq;
            self.fin = FinState::Sent { seq };
            self.emit(peer, PacketKind::Fin { seq });
            sent = true;
        }

        if sent {
            if !self.timer_armed {
                self.arm_timer();
            }
            self.record_sample(now);
        }
    }

    fn retransmit_on_timeout(&mut self, now: SimTime) {
        if self.give_up_if_exhausted(self.snd_una) {
            return;
        }

        self.backoff += 1;
        self.counters.timeouts += 1;
        tracing::debug!(
            endpoint = %self.id,
            %now,
            seq = self.snd_una,
            backoff = self.backoff,
            "Retransmission timeout"
        );

        // A timeout during recovery is a new loss event
        self.recover = Some(self.snd_nxt);
        self.dup_acks = 0;
        self.enter_loss(now, LossKind::Timeout);
        self.retransmit_front(now);
        self.arm_timer();
        self.record_sample(now);
    }

    fn retransmit_syn(&mut self, now: SimTime) {
        let Some(peer) = self.peer else {
            return;
        };
        if self.give_up_if_exhausted(0) {
            return;
        }
        self.backoff += 1;
        self.counters.timeouts += 1;
        self.syn_retransmitted = true;
        tracing::debug!(endpoint = %self.id, %peer, %now, backoff = self.backoff, "Retransmitting SYN");
        self.emit(peer, PacketKind::Syn);
        self.arm_timer();
    }

    /// Fails the connection once the retransmission budget is spent.
    fn give_up_if_exhausted(&mut self, seq: u64) -> bool {
        if self.backoff < self.config.max_retransmissions {
            return false;
        }
        let error = TransportError::RetransmissionExhausted {
            seq,
            attempts: self.backoff,
        };
        tracing::warn!(endpoint = %self.id, %error, "Giving up on connection");
        self.finish(ConnectionState::ClosedFinal);
        self.last_error = Some(error.clone());
        self.notify(SocketNotice::Failed(error));
        true
    }

    fn retransmit_front(&mut self, now: SimTime) {
        let Some(peer) = self.peer else {
            return;
        };
        let Some(front) = self.in_flight.front_mut() else {
            return;
        };
        front.segment.send_time = now;
        front.retransmitted = true;
        let segment = front.segment;

        self.counters.retransmissions += 1;
        self.counters.bytes_sent += u64::from(segment.len);
        self.counters.segments_sent += 1;
        self.counters.first_retransmit_at.get_or_insert(now);
        self.emit(peer, PacketKind::Data(segment));
    }

    fn enter_loss(&mut self, now: SimTime, kind: LossKind) {
        let cwnd_before = self.cc.cwnd();
        self.cc.on_loss(kind, now);
        self.counters.loss_events += 1;
        self.losses.push(LossRecord {
            at: now,
            kind,
            cwnd_before,
            cwnd_after: self.cc.cwnd(),
            rto: self.rtt.rto(),
        });
    }

    /// Whether the sender was using its window, so that growth is earned.
    ///
    /// Slow start counts as limited when at least half the window was in
    /// use; congestion avoidance when less than one segment of it was free.
    fn was_cwnd_limited(&self, in_flight: u64) -> bool {
        let cwnd = self.cc.cwnd();
        match self.cc.state() {
            CongestionState::SlowStart => in_flight * 2 > cwnd,
            _ => in_flight + u64::from(self.config.mss) > cwnd,
        }
    }

    fn finish(&mut self, state: ConnectionState) {
        self.state = state;
        self.unsent.clear();
        self.cancel_timer();
    }

    fn record_sample(&mut self, now: SimTime) {
        let sample = CwndSample {
            time: now,
            cwnd: self.cc.cwnd(),
            bytes_in_flight: self.bytes_in_flight(),
        };
        let unchanged = self
            .cwnd_trace
            .last()
            .is_some_and(|last| last.cwnd == sample.cwnd && last.bytes_in_flight == sample.bytes_in_flight);
        if !unchanged && self.cwnd_trace.len() < MAX_TRACE_SAMPLES {
            self.cwnd_trace.push(sample);
        }
    }

    fn arm_timer(&mut self) {
        self.timer_armed = true;
        self.actions.push(EndpointAction::ArmTimer(self.rto()));
    }

    fn cancel_timer(&mut self) {
        if self.timer_armed {
            self.timer_armed = false;
            self.actions.push(EndpointAction::CancelTimer);
        }
    }

    fn emit(&mut self, to: Address, kind: PacketKind) {
        self.actions.push(EndpointAction::Transmit { to, kind });
    }

    fn emit_to_peer(&mut self, kind: PacketKind) {
        if let Some(peer) = self.peer {
            self.emit(peer, kind);
        }
    }

    fn notify(&mut self, notice: SocketNotice) {
        self.actions.push(EndpointAction::Notify(notice));
    }

    fn invalid_state(&self, operation: &'static str) -> TransportError {
        TransportError::InvalidState {
            state: self.state,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NodeId;

    fn addr(node: usize, port: u16) -> Address {
        Address::new(NodeId(node), port)
    }

    fn endpoint(id: usize, local: Address) -> Endpoint {
        Endpoint::new(
            EndpointId(id),
            local,
            CongestionAlgorithm::NewReno,
            &TransportConfig::default(),
        )
    }

    fn transmitted(actions: &[EndpointAction]) -> Vec<PacketKind> {
        actions
            .iter()
            .filter_map(|action| match action {
                EndpointAction::Transmit { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn notices(actions: &[EndpointAction]) -> Vec<SocketNotice> {
        actions
            .iter()
            .filter_map(|action| match action {
                EndpointAction::Notify(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Client at node0:49152 connected to a server at node1:80.
    fn established() -> Endpoint {
        let mut client = endpoint(0, addr(0, 49152));
        client.connect(SimTime::ZERO, addr(1, 80)).unwrap();
        client.on_packet(SimTime::from_millis(10), addr(1, 80), PacketKind::SynAck);
        client.take_actions();
        client
    }

    #[test]
    fn test_handshake_transitions() {
        let mut client = endpoint(0, addr(0, 49152));
        let mut server = endpoint(1, addr(1, 80));
        server.listen().unwrap();

        client.connect(SimTime::ZERO, addr(1, 80)).unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(transmitted(&client.take_actions()), vec![PacketKind::Syn]);

        server.on_packet(SimTime::from_millis(5), addr(0, 49152), PacketKind::Syn);
        assert_eq!(server.state(), ConnectionState::Established);
        let actions = server.take_actions();
        assert_eq!(transmitted(&actions), vec![PacketKind::SynAck]);
        assert_eq!(notices(&actions), vec![SocketNotice::Connected]);

        client.on_packet(SimTime::from_millis(10), addr(1, 80), PacketKind::SynAck);
        assert_eq!(client.state(), ConnectionState::Established);
        assert_eq!(client.smoothed_rtt(), Some(Duration::from_millis(10)));
        assert!(notices(&client.take_actions()).contains(&SocketNotice::Connected));
    }

    #[test]
    fn test_rst_refuses_connection() {
        let mut client = endpoint(0, addr(0, 49152));
        client.connect(SimTime::ZERO, addr(1, 80)).unwrap();
        client.take_actions();

        client.on_packet(SimTime::from_millis(10), addr(1, 80), PacketKind::Rst);
        assert_eq!(client.state(), ConnectionState::Closed);
        let refused = TransportError::ConnectionRefused { peer: addr(1, 80) };
        assert_eq!(client.last_error(), Some(&refused));
        let actions = client.take_actions();
        assert!(actions.contains(&EndpointAction::CancelTimer));
        assert_eq!(notices(&actions), vec![SocketNotice::Failed(refused)]);
    }

    #[test]
    fn test_syn_to_non_listening_endpoint_gets_rst() {
        let mut closed = endpoint(1, addr(1, 80));
        closed.on_packet(SimTime::ZERO, addr(0, 49152), PacketKind::Syn);
        assert_eq!(transmitted(&closed.take_actions()), vec![PacketKind::Rst]);
    }

    #[test]
    fn test_send_segments_by_mss_and_respects_cwnd() {
        let mut client = established();

        let token = client.send(SimTime::from_millis(10), 4000).unwrap();
        assert_eq!(token, SendToken { seq: 0, len: 4000 });

        // Initial window is one segment
        let sent = transmitted(&client.take_actions());
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], PacketKind::Data(Segment { seq: 0, len: 1448, .. })));
        assert_eq!(client.bytes_in_flight(), 1448);
        assert_eq!(client.buffered_bytes(), 4000);
    }

    #[test]
    fn test_send_zero_bytes_queues_nothing() {
        let mut client = established();
        let token = client.send(SimTime::from_millis(10), 0).unwrap();
        assert_eq!(token.len, 0);
        assert!(transmitted(&client.take_actions()).is_empty());
        assert_eq!(client.buffered_bytes(), 0);
    }

    #[test]
    fn test_ack_frees_exactly_acked_bytes() {
        let mut client = established();
        client.send(SimTime::from_millis(10), 1024).unwrap();
        client.take_actions();
        assert_eq!(client.bytes_in_flight(), 1024);

        client.on_packet(
            SimTime::from_millis(20),
            addr(1, 80),
            PacketKind::Ack {
                ack: 1024,
                window: 65_536,
            },
        );
        assert_eq!(client.bytes_in_flight(), 0);
        let stats = client.stats();
        assert_eq!(stats.bytes_acked, 1024);
        assert_eq!(stats.segments_acked, 1);

        // Duplicate of the same ACK frees nothing further
        client.on_packet(
            SimTime::from_millis(21),
            addr(1, 80),
            PacketKind::Ack {
                ack: 1024,
                window: 65_536,
            },
        );
        assert_eq!(client.stats().bytes_acked, 1024);
    }

    #[test]
    fn test_receiver_buffers_out_of_order_and_repeats_ack() {
        let mut server = endpoint(1, addr(1, 80));
        server.listen().unwrap();
        server.on_packet(SimTime::ZERO, addr(0, 1000), PacketKind::Syn);
        server.take_actions();

        let segment = |seq| Segment {
            seq,
            len: 100,
            send_time: SimTime::ZERO,
        };
        server.on_packet(SimTime::ZERO, addr(0, 1000), PacketKind::Data(segment(100)));
        server.on_packet(SimTime::ZERO, addr(0, 1000), PacketKind::Data(segment(200)));
        assert_eq!(server.bytes_received(), 0);

        server.on_packet(SimTime::ZERO, addr(0, 1000), PacketKind::Data(segment(0)));
        assert_eq!(server.bytes_received(), 300);

        let acks: Vec<u64> = transmitted(&server.take_actions())
            .into_iter()
            .filter_map(|kind| match kind {
                PacketKind::Ack { ack, .. } => Some(ack),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec![0, 0, 300]);
    }

    #[test]
    fn test_triple_duplicate_ack_fast_retransmit() {
        let config = TransportConfig {
            initial_cwnd_segments: 10,
            ..Default::default()
        };
        let mut client = Endpoint::new(
            EndpointId(0),
            addr(0, 49152),
            CongestionAlgorithm::NewReno,
            &config,
        );
        client.connect(SimTime::ZERO, addr(1, 80)).unwrap();
        client.on_packet(SimTime::from_millis(10), addr(1, 80), PacketKind::SynAck);
        client.send(SimTime::from_millis(10), 5 * 1448).unwrap();
        client.take_actions();

        let dup = PacketKind::Ack {
            ack: 0,
            window: 65_536,
        };
        for i in 0..3 {
            client.on_packet(SimTime::from_millis(20 + i), addr(1, 80), dup);
        }

        let sent = transmitted(&client.take_actions());
        assert!(matches!(sent.as_slice(), [PacketKind::Data(Segment { seq: 0, .. })]));
        let stats = client.stats();
        assert_eq!(stats.fast_retransmits, 1);
        assert_eq!(stats.loss_events, 1);
        assert_eq!(stats.congestion_state, CongestionState::Recovery);
        assert_eq!(client.losses()[0].cwnd_after, 5 * 1448);

        // Full acknowledgment ends recovery
        client.on_packet(
            SimTime::from_millis(40),
            addr(1, 80),
            PacketKind::Ack {
                ack: 5 * 1448,
                window: 65_536,
            },
        );
        assert_eq!(client.stats().congestion_state, CongestionState::CongestionAvoidance);
        assert_eq!(client.bytes_in_flight(), 0);
    }

    #[test]
    fn test_timeout_retransmits_and_backs_off() {
        let mut client = established();
        client.send(SimTime::from_millis(10), 1000).unwrap();
        client.take_actions();
        let rto = client.rto();

        client.on_timeout(SimTime::from_millis(10) + rto);
        let actions = client.take_actions();
        assert!(matches!(
            transmitted(&actions).as_slice(),
            [PacketKind::Data(Segment { seq: 0, len: 1000, .. })]
        ));
        assert!(actions.contains(&EndpointAction::ArmTimer(rto * 2)));
        let stats = client.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.loss_events, 1);
    }

    #[test]
    fn test_retransmission_exhausted_fails_connection() {
        let mut client = established();
        client.send(SimTime::from_millis(10), 1000).unwrap();
        client.take_actions();

        for round in 0..7 {
            client.on_timeout(SimTime::from_secs(round + 1));
        }

        assert_eq!(client.state(), ConnectionState::ClosedFinal);
        let error = TransportError::RetransmissionExhausted {
            seq: 0,
            attempts: 6,
        };
        assert_eq!(client.last_error(), Some(&error));
        assert!(notices(&client.take_actions()).contains(&SocketNotice::Failed(error)));
        assert_eq!(
            client.send(SimTime::from_secs(9), 10),
            Err(TransportError::SendAfterClose)
        );
    }

    #[test]
    fn test_close_flushes_then_finishes_on_fin_ack() {
        let mut client = established();
        client.send(SimTime::from_millis(10), 500).unwrap();
        client.close(SimTime::from_millis(10)).unwrap();
        assert_eq!(client.state(), ConnectionState::Closing);

        let sent = transmitted(&client.take_actions());
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], PacketKind::Fin { seq: 500 });
        assert_eq!(
            client.send(SimTime::from_millis(11), 1),
            Err(TransportError::SendAfterClose)
        );

        client.on_packet(
            SimTime::from_millis(20),
            addr(1, 80),
            PacketKind::Ack {
                ack: 500,
                window: 65_536,
            },
        );
        client.on_packet(SimTime::from_millis(20), addr(1, 80), PacketKind::FinAck);
        assert_eq!(client.state(), ConnectionState::ClosedFinal);
        assert!(notices(&client.take_actions()).contains(&SocketNotice::Closed));
    }

    #[test]
    fn test_close_while_connecting_is_rejected() {
        let mut client = endpoint(0, addr(0, 49152));
        client.connect(SimTime::ZERO, addr(1, 80)).unwrap();
        assert!(matches!(
            client.close(SimTime::ZERO),
            Err(TransportError::InvalidState {
                state: ConnectionState::Connecting,
                ..
            })
        ));
    }
}
