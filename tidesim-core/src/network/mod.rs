//! Simulated network: the world the scheduler drives.
//!
//! [`Network`] owns nodes, links and transport endpoints. Endpoint entry
//! points record side effects as actions; the network turns them into link
//! transmissions, scheduled deliveries, retransmission timers and callback
//! invocations.

mod link;
mod topology;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub use link::{DropReason, Link, LinkOutcome, LinkStats};
pub use topology::{Address, EndpointId, LinkId, NodeId, TopologyError};

use crate::TidesimError;
use crate::config::TidesimConfig;
use crate::congestion::CongestionAlgorithm;
use crate::scheduler::{EventHandle, Scheduler};
use crate::time::{DataRate, SimTime};
use crate::transport::{
    CwndSample, Endpoint, EndpointAction, EndpointStats, LossRecord, Packet, PacketKind,
    SendToken, SocketNotice,
};

/// Scheduler driving a [`Network`].
pub type NetScheduler = Scheduler<Network>;

/// Application callback invoked with endpoint notices.
///
/// Receives the network and scheduler so it can send more data or schedule
/// follow-up work from inside the notification.
pub type SendCallback = Box<dyn FnMut(&mut Network, &mut NetScheduler, EndpointId, &SocketNotice)>;

/// First port handed out by `create_endpoint`.
pub const EPHEMERAL_PORT_START: u16 = 49152;

#[derive(Debug)]
struct Node {
    next_ephemeral: u16,
}

struct EndpointSlot {
    endpoint: Endpoint,
    timer: Option<EventHandle>,
    callback: Option<SendCallback>,
    callback_generation: u64,
    pending_notices: VecDeque<SocketNotice>,
    dispatching: bool,
}

/// Packets the network could not hand to any endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Packets addressed to an unbound address
    pub unroutable: u64,
    /// Packets dropped by links
    pub link_drops: u64,
    /// Packets delivered to an endpoint
    pub delivered: u64,
}

/// Nodes, links and endpoints of one simulation.
pub struct Network {
    config: TidesimConfig,
    nodes: Vec<Node>,
    links: Vec<Link>,
    endpoints: Vec<EndpointSlot>,
    bindings: HashMap<Address, EndpointId>,
    stats: NetworkStats,
}

impl Network {
    /// Creates an empty network.
    pub fn new(config: TidesimConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            endpoints: Vec::new(),
            bindings: HashMap::new(),
            stats: NetworkStats::default(),
        }
    }

    pub fn config(&self) -> &TidesimConfig {
        &self.config
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Adds a node.
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            next_ephemeral: EPHEMERAL_PORT_START,
        });
        id
    }

    /// Joins two nodes with a point-to-point link.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownNode` - If either node does not exist
    /// - `TopologyError::SelfLink` - If `a == b`
    /// - `TopologyError::DuplicateLink` - If the nodes are already linked
    /// - `TopologyError::ZeroDataRate` - If `data_rate` is zero
    pub fn create_link(
        &mut self,
        a: NodeId,
        b: NodeId,
        data_rate: DataRate,
        propagation_delay: Duration,
    ) -> Result<LinkId, TopologyError> {
        self.check_node(a)?;
        self.check_node(b)?;
        if a == b {
            return Err(TopologyError::SelfLink { node: a });
        }
        if self.link_between(a, b).is_some() {
            return Err(TopologyError::DuplicateLink { a, b });
        }
        if data_rate.is_zero() {
            return Err(TopologyError::ZeroDataRate);
        }

        let id = LinkId(self.links.len());
        self.links.push(Link::new(
            id,
            a,
            b,
            data_rate,
            propagation_delay,
            &self.config.link,
            self.config.simulation.seed,
        ));
        tracing::debug!(link = %id, %a, %b, %data_rate, ?propagation_delay, "Created link");
        Ok(id)
    }

    /// Creates a closed endpoint on `node`, bound to a free ephemeral port.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownNode` - If the node does not exist
    /// - `TopologyError::PortsExhausted` - If no ephemeral port is free
    pub fn create_endpoint(
        &mut self,
        node: NodeId,
        algorithm: CongestionAlgorithm,
    ) -> Result<EndpointId, TopologyError> {
        self.check_node(node)?;
        let port = self.allocate_port(node)?;
        let id = EndpointId(self.endpoints.len());
        let local = Address::new(node, port);

        self.endpoints.push(EndpointSlot {
            endpoint: Endpoint::new(id, local, algorithm, &self.config.transport),
            timer: None,
            callback: None,
            callback_generation: 0,
            pending_notices: VecDeque::new(),
            dispatching: false,
        });
        self.bindings.insert(local, id);
        Ok(id)
    }

    /// Rebinds an endpoint to a specific port on its node.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    /// - `TopologyError::AddressInUse` - If another endpoint holds the port
    pub fn bind(&mut self, endpoint: EndpointId, port: u16) -> Result<Address, TopologyError> {
        let current = self.endpoint(endpoint)?.local_address();
        let address = Address::new(current.node, port);
        match self.bindings.get(&address) {
            Some(&holder) if holder == endpoint => return Ok(address),
            Some(_) => return Err(TopologyError::AddressInUse { address }),
            None => {}
        }

        self.endpoints[endpoint.0].endpoint.rebind(address);
        self.bindings.remove(&current);
        self.bindings.insert(address, endpoint);
        Ok(address)
    }

    /// Returns the address an endpoint is bound to.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn address(&self, endpoint: EndpointId) -> Result<Address, TopologyError> {
        Ok(self.endpoint(endpoint)?.local_address())
    }

    /// Read access to an endpoint.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn endpoint(&self, endpoint: EndpointId) -> Result<&Endpoint, TopologyError> {
        self.endpoints
            .get(endpoint.0)
            .map(|slot| &slot.endpoint)
            .ok_or(TopologyError::UnknownEndpoint { endpoint })
    }

    /// Read access to a link.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownLink` - If the link does not exist
    pub fn link(&self, link: LinkId) -> Result<&Link, TopologyError> {
        self.links
            .get(link.0)
            .ok_or(TopologyError::UnknownLink { link })
    }

    /// Returns the link joining two nodes, if any.
    pub fn link_between(&self, a: NodeId, b: NodeId) -> Option<LinkId> {
        self.links
            .iter()
            .find(|link| link.connects(a, b))
            .map(Link::id)
    }

    /// Drops the first data packet entering `link` at or after `at`.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownLink` - If the link does not exist
    pub fn inject_loss(&mut self, link: LinkId, at: SimTime) -> Result<(), TopologyError> {
        self.links
            .get_mut(link.0)
            .ok_or(TopologyError::UnknownLink { link })?
            .drop_next_data_after(at);
        Ok(())
    }

    /// Snapshot of an endpoint's observation points.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn endpoint_stats(&self, endpoint: EndpointId) -> Result<EndpointStats, TopologyError> {
        Ok(self.endpoint(endpoint)?.stats())
    }

    /// Recorded congestion window trace of an endpoint.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn cwnd_trace(&self, endpoint: EndpointId) -> Result<&[CwndSample], TopologyError> {
        Ok(self.endpoint(endpoint)?.cwnd_trace())
    }

    /// Loss events detected by an endpoint.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn losses(&self, endpoint: EndpointId) -> Result<&[LossRecord], TopologyError> {
        Ok(self.endpoint(endpoint)?.losses())
    }

    /// Puts an endpoint into passive open.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    /// - `TransportError::InvalidState` - If the endpoint is not closed
    pub fn listen(&mut self, endpoint: EndpointId) -> Result<(), TidesimError> {
        self.slot_mut(endpoint)?.endpoint.listen()?;
        Ok(())
    }

    /// Opens a connection from `endpoint` to `peer`.
    ///
    /// The handshake completes asynchronously; a refused connection is
    /// reported through the send callback as `SocketNotice::Failed`.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    /// - `TopologyError::NoRoute` - If no link joins the two nodes
    /// - `TransportError::InvalidState` - If the endpoint is not closed
    pub fn connect(
        &mut self,
        scheduler: &mut NetScheduler,
        endpoint: EndpointId,
        peer: Address,
    ) -> Result<(), TidesimError> {
        let local = self.address(endpoint)?;
        if self.link_between(local.node, peer.node).is_none() {
            return Err(TopologyError::NoRoute {
                from: local.node,
                to: peer.node,
            }
            .into());
        }
        self.slot_mut(endpoint)?
            .endpoint
            .connect(scheduler.now(), peer)?;
        self.flush(scheduler, endpoint);
        Ok(())
    }

    /// Hands `bytes` of application data to an endpoint. Never blocks.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    /// - `TransportError::SendAfterClose` - If the endpoint is closing or closed
    pub fn send(
        &mut self,
        scheduler: &mut NetScheduler,
        endpoint: EndpointId,
        bytes: u64,
    ) -> Result<SendToken, TidesimError> {
        let token = self
            .slot_mut(endpoint)?
            .endpoint
            .send(scheduler.now(), bytes)?;
        self.flush(scheduler, endpoint);
        Ok(token)
    }

    /// Starts an orderly close of an endpoint.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    /// - `TransportError::InvalidState` - If the handshake is in progress
    pub fn close(
        &mut self,
        scheduler: &mut NetScheduler,
        endpoint: EndpointId,
    ) -> Result<(), TidesimError> {
        self.slot_mut(endpoint)?.endpoint.close(scheduler.now())?;
        self.flush(scheduler, endpoint);
        Ok(())
    }

    /// Registers the callback that receives an endpoint's notices.
    ///
    /// Replaces any previous callback, including from inside a running one.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn set_send_callback<F>(&mut self, endpoint: EndpointId, callback: F) -> Result<(), TopologyError>
    where
        F: FnMut(&mut Network, &mut NetScheduler, EndpointId, &SocketNotice) + 'static,
    {
        let slot = self.slot_mut(endpoint)?;
        slot.callback = Some(Box::new(callback));
        slot.callback_generation += 1;
        Ok(())
    }

    /// Removes an endpoint's callback; later notices are discarded.
    ///
    /// # Errors
    ///
    /// - `TopologyError::UnknownEndpoint` - If the endpoint does not exist
    pub fn clear_send_callback(&mut self, endpoint: EndpointId) -> Result<(), TopologyError> {
        let slot = self.slot_mut(endpoint)?;
        slot.callback = None;
        slot.callback_generation += 1;
        Ok(())
    }

    fn check_node(&self, node: NodeId) -> Result<(), TopologyError> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TopologyError::UnknownNode { node })
        }
    }

    fn slot_mut(&mut self, endpoint: EndpointId) -> Result<&mut EndpointSlot, TopologyError> {
        self.endpoints
            .get_mut(endpoint.0)
            .ok_or(TopologyError::UnknownEndpoint { endpoint })
    }

    fn allocate_port(&mut self, node: NodeId) -> Result<u16, TopologyError> {
        let start = self.nodes[node.0].next_ephemeral;
        let port = (start..=u16::MAX)
            .chain(EPHEMERAL_PORT_START..start)
            .find(|&port| !self.bindings.contains_key(&Address::new(node, port)))
            .ok_or(TopologyError::PortsExhausted { node })?;
        self.nodes[node.0].next_ephemeral = port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
        Ok(port)
    }

    /// Carries out an endpoint's pending actions, then delivers its notices.
    fn flush(&mut self, scheduler: &mut NetScheduler, id: EndpointId) {
        let slot = &mut self.endpoints[id.0];
        let local = slot.endpoint.local_address();
        let actions = slot.endpoint.take_actions();

        for action in actions {
            match action {
                EndpointAction::Transmit { to, kind } => {
                    self.transmit(
                        scheduler,
                        Packet {
                            src: local,
                            dst: to,
                            kind,
                        },
                    );
                }
                EndpointAction::ArmTimer(delay) => {
                    let slot = &mut self.endpoints[id.0];
                    if let Some(previous) = slot.timer.take() {
                        scheduler.cancel(previous);
                    }
                    slot.timer = Some(scheduler.schedule(delay, move |net: &mut Network, s| {
                        net.fire_timer(s, id)
                    }));
                }
                EndpointAction::CancelTimer => {
                    if let Some(previous) = self.endpoints[id.0].timer.take() {
                        scheduler.cancel(previous);
                    }
                }
                EndpointAction::Notify(notice) => {
                    self.endpoints[id.0].pending_notices.push_back(notice);
                }
            }
        }

        self.dispatch_notices(scheduler, id);
    }

    /// Invokes the callback for each queued notice.
    ///
    /// Re-entrant calls (a callback sending data that produces new notices)
    /// only enqueue; the outermost dispatch drains the queue in order.
    fn dispatch_notices(&mut self, scheduler: &mut NetScheduler, id: EndpointId) {
        if self.endpoints[id.0].dispatching {
            return;
        }
        self.endpoints[id.0].dispatching = true;

        while let Some(notice) = self.endpoints[id.0].pending_notices.pop_front() {
            let slot = &mut self.endpoints[id.0];
            let Some(mut callback) = slot.callback.take() else {
                tracing::trace!(endpoint = %id, ?notice, "Notice without callback");
                continue;
            };
            let generation = slot.callback_generation;

            callback(self, scheduler, id, &notice);

            let slot = &mut self.endpoints[id.0];
            if slot.callback_generation == generation {
                slot.callback = Some(callback);
            }
        }

        self.endpoints[id.0].dispatching = false;
    }

    fn fire_timer(&mut self, scheduler: &mut NetScheduler, id: EndpointId) {
        let slot = &mut self.endpoints[id.0];
        slot.timer = None;
        slot.endpoint.on_timeout(scheduler.now());
        self.flush(scheduler, id);
    }

    /// Offers a packet to the link towards its destination and schedules delivery.
    fn transmit(&mut self, scheduler: &mut NetScheduler, packet: Packet) {
        let Some(link_id) = self.link_between(packet.src.node, packet.dst.node) else {
            tracing::warn!(src = %packet.src, dst = %packet.dst, "No link towards destination");
            self.stats.unroutable += 1;
            return;
        };

        let now = scheduler.now();
        let wire_bytes = packet.payload_bytes() + u64::from(self.config.link.header_bytes);
        let outcome = self.links[link_id.0].transmit(now, packet.src.node, wire_bytes, packet.is_data());
        match outcome {
            LinkOutcome::Delivered { at } => {
                scheduler.schedule(at - now, move |net: &mut Network, s| net.deliver(s, packet));
            }
            LinkOutcome::Dropped(reason) => {
                self.stats.link_drops += 1;
                tracing::debug!(link = %link_id, ?reason, kind = ?packet.kind, %now, "Packet dropped");
            }
        }
    }

    fn deliver(&mut self, scheduler: &mut NetScheduler, packet: Packet) {
        let Some(&id) = self.bindings.get(&packet.dst) else {
            self.stats.unroutable += 1;
            if packet.kind == PacketKind::Syn {
                // Nobody bound: refuse on behalf of the destination node
                self.transmit(
                    scheduler,
                    Packet {
                        src: packet.dst,
                        dst: packet.src,
                        kind: PacketKind::Rst,
                    },
                );
            }
            return;
        };

        self.stats.delivered += 1;
        self.endpoints[id.0]
            .endpoint
            .on_packet(scheduler.now(), packet.src, packet.kind);
        self.flush(scheduler, id);
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("endpoints", &self.endpoints.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::transport::{ConnectionState, TransportError};

    struct Fixture {
        net: Network,
        scheduler: NetScheduler,
        client: EndpointId,
        server: EndpointId,
        server_addr: Address,
    }

    fn fixture() -> Fixture {
        let mut net = Network::new(TidesimConfig::default());
        let a = net.create_node();
        let b = net.create_node();
        net.create_link(a, b, DataRate::from_mbps(10), Duration::from_millis(2))
            .unwrap();
        let client = net.create_endpoint(a, CongestionAlgorithm::NewReno).unwrap();
        let server = net.create_endpoint(b, CongestionAlgorithm::NewReno).unwrap();
        let server_addr = net.bind(server, 80).unwrap();
        Fixture {
            net,
            scheduler: NetScheduler::new(),
            client,
            server,
            server_addr,
        }
    }

    fn record_notices(net: &mut Network, endpoint: EndpointId) -> Rc<RefCell<Vec<SocketNotice>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        net.set_send_callback(endpoint, move |_, _, _, notice| {
            sink.borrow_mut().push(notice.clone())
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_topology_errors() {
        let mut net = Network::new(TidesimConfig::default());
        let a = net.create_node();
        let b = net.create_node();
        let rate = DataRate::from_mbps(1);
        let delay = Duration::from_millis(1);

        assert_eq!(
            net.create_link(a, a, rate, delay),
            Err(TopologyError::SelfLink { node: a })
        );
        assert_eq!(
            net.create_link(a, NodeId(9), rate, delay),
            Err(TopologyError::UnknownNode { node: NodeId(9) })
        );
        assert_eq!(
            net.create_link(a, b, DataRate::from_bps(0), delay),
            Err(TopologyError::ZeroDataRate)
        );
        net.create_link(a, b, rate, delay).unwrap();
        assert_eq!(
            net.create_link(b, a, rate, delay),
            Err(TopologyError::DuplicateLink { a: b, b: a })
        );
    }

    #[test]
    fn test_ephemeral_ports_and_bind() {
        let mut net = Network::new(TidesimConfig::default());
        let node = net.create_node();
        let first = net.create_endpoint(node, CongestionAlgorithm::NewReno).unwrap();
        let second = net.create_endpoint(node, CongestionAlgorithm::Cubic).unwrap();

        assert_eq!(net.address(first).unwrap().port, EPHEMERAL_PORT_START);
        assert_eq!(net.address(second).unwrap().port, EPHEMERAL_PORT_START + 1);

        net.bind(first, 8080).unwrap();
        assert_eq!(
            net.bind(second, 8080),
            Err(TopologyError::AddressInUse {
                address: Address::new(node, 8080)
            })
        );
    }

    #[test]
    fn test_handshake_takes_two_deliveries() {
        let mut f = fixture();
        f.net.listen(f.server).unwrap();
        let client_notices = record_notices(&mut f.net, f.client);

        f.net
            .connect(&mut f.scheduler, f.client, f.server_addr)
            .unwrap();
        assert_eq!(
            f.net.endpoint(f.client).unwrap().state(),
            ConnectionState::Connecting
        );

        f.scheduler
            .run_until(&mut f.net, SimTime::from_secs(1))
            .unwrap();
        assert_eq!(
            f.net.endpoint(f.client).unwrap().state(),
            ConnectionState::Established
        );
        assert_eq!(
            f.net.endpoint(f.server).unwrap().state(),
            ConnectionState::Established
        );
        assert_eq!(f.net.stats().delivered, 2);
        assert_eq!(client_notices.borrow()[0], SocketNotice::Connected);
    }

    #[test]
    fn test_connect_to_unbound_port_is_refused() {
        let mut f = fixture();
        let notices = record_notices(&mut f.net, f.client);
        let nowhere = Address::new(f.server_addr.node, 9);

        f.net.connect(&mut f.scheduler, f.client, nowhere).unwrap();
        f.scheduler.run(&mut f.net).unwrap();

        let client = f.net.endpoint(f.client).unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        let refused = TransportError::ConnectionRefused { peer: nowhere };
        assert_eq!(*notices.borrow(), vec![SocketNotice::Failed(refused)]);
    }

    #[test]
    fn test_connect_without_link_has_no_route() {
        let mut f = fixture();
        let isolated = f.net.create_node();
        let result = f
            .net
            .connect(&mut f.scheduler, f.client, Address::new(isolated, 80));
        assert!(matches!(
            result,
            Err(TidesimError::Topology(TopologyError::NoRoute { .. }))
        ));
    }

    #[test]
    fn test_transfer_and_close() {
        let mut f = fixture();
        f.net.listen(f.server).unwrap();
        let client_notices = record_notices(&mut f.net, f.client);
        let server_notices = record_notices(&mut f.net, f.server);

        f.net
            .connect(&mut f.scheduler, f.client, f.server_addr)
            .unwrap();
        f.net.send(&mut f.scheduler, f.client, 20_000).unwrap();
        f.scheduler
            .run_until(&mut f.net, SimTime::from_secs(2))
            .unwrap();

        assert_eq!(f.net.endpoint(f.server).unwrap().bytes_received(), 20_000);
        assert_eq!(f.net.endpoint_stats(f.client).unwrap().bytes_acked, 20_000);

        f.net.close(&mut f.scheduler, f.client).unwrap();
        f.scheduler.run(&mut f.net).unwrap();

        assert_eq!(
            f.net.endpoint(f.client).unwrap().state(),
            ConnectionState::ClosedFinal
        );
        assert!(client_notices.borrow().contains(&SocketNotice::Closed));
        assert!(server_notices.borrow().contains(&SocketNotice::PeerClosed));
        assert_eq!(f.scheduler.pending_events(), 0);
    }

    #[test]
    fn test_callback_can_send_reentrantly() {
        let mut f = fixture();
        f.net.listen(f.server).unwrap();

        let mut remaining = 5u32;
        f.net
            .set_send_callback(f.client, move |net, scheduler, id, notice| {
                if matches!(notice, SocketNotice::Connected) {
                    while remaining > 0 {
                        net.send(scheduler, id, 1000).unwrap();
                        remaining -= 1;
                    }
                }
            })
            .unwrap();

        f.net
            .connect(&mut f.scheduler, f.client, f.server_addr)
            .unwrap();
        f.scheduler.run(&mut f.net).unwrap();

        assert_eq!(f.net.endpoint(f.server).unwrap().bytes_received(), 5000);
    }

    #[test]
    fn test_callback_replaced_from_inside_keeps_replacement() {
        let mut f = fixture();
        f.net.listen(f.server).unwrap();
        let hits = Rc::new(RefCell::new(Vec::new()));

        let first_hits = Rc::clone(&hits);
        f.net
            .set_send_callback(f.client, move |net, _, id, _| {
                first_hits.borrow_mut().push("first");
                let second_hits = Rc::clone(&first_hits);
                net.set_send_callback(id, move |_, _, _, _| second_hits.borrow_mut().push("second"))
                    .unwrap();
            })
            .unwrap();

        f.net
            .connect(&mut f.scheduler, f.client, f.server_addr)
            .unwrap();
        f.scheduler.run(&mut f.net).unwrap();

        // Connected goes to the first callback, BufferAvailable to its replacement
        assert_eq!(*hits.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_injected_loss_is_recovered() {
        let mut f = fixture();
        f.net.listen(f.server).unwrap();
        let link = f.net.link_between(NodeId(0), NodeId(1)).unwrap();
        f.net.inject_loss(link, SimTime::ZERO).unwrap();

        f.net
            .connect(&mut f.scheduler, f.client, f.server_addr)
            .unwrap();
        f.net.send(&mut f.scheduler, f.client, 1000).unwrap();
        f.scheduler
            .run_until(&mut f.net, SimTime::from_secs(5))
            .unwrap();

        let stats = f.net.endpoint_stats(f.client).unwrap();
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(f.net.endpoint(f.server).unwrap().bytes_received(), 1000);
        assert_eq!(f.net.link(link).unwrap().stats().injected_drops, 1);
    }
}
