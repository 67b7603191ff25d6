//! End-to-end transport behavior over simulated links.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tidesim_core::network::{Address, EndpointId};
use tidesim_core::transport::ConnectionState;
use tidesim_core::{
    CongestionAlgorithm, DataRate, SimTime, Simulation, SocketNotice, TidesimConfig, TidesimError,
    TopologyError, TransportError,
};

struct Pair {
    sim: Simulation,
    client: EndpointId,
    server: EndpointId,
    server_address: Address,
}

fn pair(config: TidesimConfig, listen: bool) -> Pair {
    let mut sim = Simulation::new(config).unwrap();
    let net = sim.network_mut();
    let a = net.create_node();
    let b = net.create_node();
    net.create_link(a, b, DataRate::from_mbps(10), Duration::from_millis(5))
        .unwrap();
    let client = net.create_endpoint(a, CongestionAlgorithm::NewReno).unwrap();
    let server = net.create_endpoint(b, CongestionAlgorithm::NewReno).unwrap();
    let server_address = net.bind(server, 80).unwrap();
    if listen {
        net.listen(server).unwrap();
    }
    Pair {
        sim,
        client,
        server,
        server_address,
    }
}

fn record_notices(pair: &mut Pair) -> Rc<RefCell<Vec<SocketNotice>>> {
    let notices = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&notices);
    pair.sim
        .network_mut()
        .set_send_callback(pair.client, move |_, _, _, notice| {
            sink.borrow_mut().push(notice.clone())
        })
        .unwrap();
    notices
}

fn connect_at(pair: &mut Pair, time: SimTime) {
    let (client, peer) = (pair.client, pair.server_address);
    pair.sim
        .schedule_at(time, move |net, s| net.connect(s, client, peer).unwrap())
        .unwrap();
}

#[test]
fn test_bulk_data_arrives_in_order_and_is_acknowledged() {
    let mut pair = pair(TidesimConfig::default(), true);
    connect_at(&mut pair, SimTime::ZERO);
    let client = pair.client;
    pair.sim
        .schedule_at(SimTime::from_millis(100), move |net, s| {
            let token = net.send(s, client, 100_000).unwrap();
            assert_eq!(token.len, 100_000);
        })
        .unwrap();

    pair.sim.run_until(SimTime::from_secs(5)).unwrap();

    let net = pair.sim.network();
    let sender = net.endpoint_stats(pair.client).unwrap();
    assert_eq!(net.endpoint(pair.server).unwrap().bytes_received(), 100_000);
    assert_eq!(sender.bytes_acked, 100_000);
    assert_eq!(sender.segments_sent, 100_000u64.div_ceil(1448));
    assert_eq!(sender.segments_acked, sender.segments_sent);
    assert_eq!(sender.retransmissions, 0);
    assert_eq!(sender.bytes_in_flight, 0);
    assert!(sender.smoothed_rtt.is_some());
    assert!(net.endpoint(pair.server).unwrap().state() == ConnectionState::Established);
}

#[test]
fn test_send_before_handshake_is_buffered() {
    let mut pair = pair(TidesimConfig::default(), true);
    let client = pair.client;
    let peer = pair.server_address;
    pair.sim
        .schedule_at(SimTime::ZERO, move |net, s| {
            net.connect(s, client, peer).unwrap();
            net.send(s, client, 5_000).unwrap();
            assert_eq!(net.endpoint(client).unwrap().buffered_bytes(), 5_000);
        })
        .unwrap();

    pair.sim.run_until(SimTime::from_secs(1)).unwrap();
    assert_eq!(
        pair.sim.network().endpoint(pair.server).unwrap().bytes_received(),
        5_000
    );
}

#[test]
fn test_callback_sees_connected_then_buffer_space() {
    let mut pair = pair(TidesimConfig::default(), true);
    let notices = record_notices(&mut pair);
    connect_at(&mut pair, SimTime::ZERO);
    let client = pair.client;
    pair.sim
        .schedule_at(SimTime::from_millis(50), move |net, s| {
            net.send(s, client, 20_000).unwrap();
        })
        .unwrap();

    pair.sim.run_until(SimTime::from_secs(2)).unwrap();

    let notices = notices.borrow();
    assert_eq!(notices.first(), Some(&SocketNotice::Connected));
    assert!(
        notices
            .iter()
            .any(|notice| matches!(notice, SocketNotice::BufferAvailable { .. }))
    );
    assert!(
        !notices
            .iter()
            .any(|notice| matches!(notice, SocketNotice::Failed(_)))
    );
}

#[test]
fn test_connect_to_closed_port_is_refused() {
    let mut pair = pair(TidesimConfig::default(), false);
    let notices = record_notices(&mut pair);
    connect_at(&mut pair, SimTime::ZERO);

    pair.sim.run_until(SimTime::from_secs(1)).unwrap();

    let expected = TransportError::ConnectionRefused {
        peer: pair.server_address,
    };
    assert_eq!(
        notices.borrow().as_slice(),
        &[SocketNotice::Failed(expected.clone())]
    );
    let endpoint = pair.sim.network().endpoint(pair.client).unwrap();
    assert_eq!(endpoint.last_error(), Some(&expected));
    assert_eq!(endpoint.state(), ConnectionState::Closed);
}

#[test]
fn test_connect_without_link_has_no_route() {
    let mut sim = Simulation::new(TidesimConfig::default()).unwrap();
    let (client, stranger) = {
        let net = sim.network_mut();
        let a = net.create_node();
        let b = net.create_node();
        let client = net.create_endpoint(a, CongestionAlgorithm::Cubic).unwrap();
        let stranger = net.create_endpoint(b, CongestionAlgorithm::Cubic).unwrap();
        (client, net.address(stranger).unwrap())
    };

    let (net, scheduler) = sim.parts();
    let result = net.connect(scheduler, client, stranger);
    assert!(matches!(
        result,
        Err(TidesimError::Topology(TopologyError::NoRoute { .. }))
    ));
}

#[test]
fn test_send_after_close_is_rejected() {
    let mut pair = pair(TidesimConfig::default(), true);
    connect_at(&mut pair, SimTime::ZERO);
    pair.sim.run_until(SimTime::from_millis(100)).unwrap();

    let client = pair.client;
    let (net, scheduler) = pair.sim.parts();
    net.send(scheduler, client, 4_000).unwrap();
    net.close(scheduler, client).unwrap();
    let result = net.send(scheduler, client, 1);
    assert!(matches!(
        result,
        Err(TidesimError::Transport(TransportError::SendAfterClose))
    ));
}

#[test]
fn test_close_flushes_buffered_data_before_fin() {
    let mut pair = pair(TidesimConfig::default(), true);
    let notices = record_notices(&mut pair);
    connect_at(&mut pair, SimTime::ZERO);
    pair.sim.run_until(SimTime::from_millis(100)).unwrap();

    let client = pair.client;
    {
        let (net, scheduler) = pair.sim.parts();
        net.send(scheduler, client, 30_000).unwrap();
        net.close(scheduler, client).unwrap();
        assert_eq!(
            net.endpoint(client).unwrap().state(),
            ConnectionState::Closing
        );
    }

    pair.sim.run_until(SimTime::from_secs(3)).unwrap();

    let net = pair.sim.network();
    let server = net.endpoint(pair.server).unwrap();
    assert_eq!(server.bytes_received(), 30_000);
    assert!(server.peer_closed());
    assert_eq!(
        net.endpoint(client).unwrap().state(),
        ConnectionState::ClosedFinal
    );
    assert_eq!(notices.borrow().last(), Some(&SocketNotice::Closed));
}

#[test]
fn test_total_loss_exhausts_retransmissions() {
    let mut config = TidesimConfig::default();
    config.link.random_loss_rate = 1.0;
    let max_retransmissions = config.transport.max_retransmissions;
    let mut pair = pair(config, true);
    let notices = record_notices(&mut pair);
    connect_at(&mut pair, SimTime::ZERO);
    let client = pair.client;
    pair.sim
        .schedule_at(SimTime::from_millis(100), move |net, s| {
            net.send(s, client, 1_000).unwrap();
        })
        .unwrap();

    pair.sim.run_until(SimTime::from_secs(200)).unwrap();

    let endpoint = pair.sim.network().endpoint(pair.client).unwrap();
    assert_eq!(endpoint.state(), ConnectionState::ClosedFinal);
    assert!(matches!(
        endpoint.last_error(),
        Some(TransportError::RetransmissionExhausted { seq: 0, attempts })
            if *attempts == max_retransmissions
    ));
    assert!(matches!(
        notices.borrow().last(),
        Some(SocketNotice::Failed(TransportError::RetransmissionExhausted { .. }))
    ));
    assert_eq!(endpoint.stats().timeouts, u64::from(max_retransmissions));

    // Backed-off timers never exceed the configured ceiling
    assert!(endpoint.rto() <= pair.sim.network().config().transport.max_rto);
}

#[test]
fn test_timeout_recovers_from_lost_tail_segment() {
    let mut pair = pair(TidesimConfig::default(), true);
    connect_at(&mut pair, SimTime::ZERO);
    let client = pair.client;
    let link = pair
        .sim
        .network()
        .link_between(
            pair.sim.network().address(pair.client).unwrap().node,
            pair.server_address.node,
        )
        .unwrap();
    pair.sim.network_mut().inject_loss(link, SimTime::from_millis(100)).unwrap();
    pair.sim
        .schedule_at(SimTime::from_millis(100), move |net, s| {
            net.send(s, client, 1_000).unwrap();
        })
        .unwrap();

    pair.sim.run_until(SimTime::from_secs(5)).unwrap();

    let net = pair.sim.network();
    let stats = net.endpoint_stats(client).unwrap();
    assert_eq!(net.endpoint(pair.server).unwrap().bytes_received(), 1_000);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.fast_retransmits, 0);
    let losses = net.losses(client).unwrap();
    assert_eq!(losses.len(), 1);
    assert_eq!(losses[0].kind, tidesim_core::congestion::LossKind::Timeout);
}
