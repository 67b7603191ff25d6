//! Scenario assembly: isolated two-node topologies, one per flow.

use std::time::Duration;

use tidesim_core::network::{EndpointId, LinkId};
use tidesim_core::{CongestionAlgorithm, DataRate, SimTime, Simulation, TidesimConfig};

use super::report::{FlowReport, ScenarioReport};
use crate::SimError;
use crate::apps::{BulkSend, PacketSink, PeriodicSend, SessionProgress};

/// Port the sinks listen on unless a flow overrides it.
pub const DEFAULT_SINK_PORT: u16 = 9;

/// Traffic pattern offered by a flow's sender.
#[derive(Debug, Clone)]
pub enum Traffic {
    /// `count` messages, one every `interval`
    Paced {
        /// Bytes per message
        message_size: u64,
        /// Messages to send
        count: u64,
        /// Time between messages
        interval: Duration,
        /// First message
        start_at: SimTime,
    },
    /// Constant bit rate until `stop_at`
    OnOff {
        /// Offered rate
        rate: DataRate,
        /// Bytes per message
        packet_size: u64,
        /// First message
        start_at: SimTime,
        /// No message at or after this instant
        stop_at: SimTime,
    },
    /// Keep the send buffer full
    Bulk {
        /// Bytes per write
        message_size: u64,
        /// Writes to perform
        messages: u64,
        /// First write
        start_at: SimTime,
        /// Close once everything is handed over
        close_when_done: bool,
    },
}

/// One sender, one sink and the link between them.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    label: String,
    algorithm: CongestionAlgorithm,
    data_rate: DataRate,
    delay: Duration,
    sink_port: u16,
    sink_start: SimTime,
    connect_at: SimTime,
    loss_at: Vec<SimTime>,
    traffic: Traffic,
}

impl FlowSpec {
    /// NewReno flow over a 10 Mbps, 2 ms link with the sink listening from the start.
    pub fn new(label: impl Into<String>, traffic: Traffic) -> Self {
        Self {
            label: label.into(),
            algorithm: CongestionAlgorithm::default(),
            data_rate: DataRate::from_mbps(10),
            delay: Duration::from_millis(2),
            sink_port: DEFAULT_SINK_PORT,
            sink_start: SimTime::ZERO,
            connect_at: SimTime::ZERO,
            loss_at: Vec::new(),
            traffic,
        }
    }

    /// Sender congestion control.
    pub fn algorithm(mut self, algorithm: CongestionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Link rate and one-way propagation delay.
    pub fn link(mut self, data_rate: DataRate, delay: Duration) -> Self {
        self.data_rate = data_rate;
        self.delay = delay;
        self
    }

    /// Sink port and the instant it starts listening.
    pub fn sink(mut self, port: u16, start: SimTime) -> Self {
        self.sink_port = port;
        self.sink_start = start;
        self
    }

    /// Instant the sender opens its connection.
    pub fn connect_at(mut self, time: SimTime) -> Self {
        self.connect_at = time;
        self
    }

    /// Drops the first data packet entering the link at or after `time`.
    pub fn inject_loss_at(mut self, time: SimTime) -> Self {
        self.loss_at.push(time);
        self
    }

    /// Flow label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Collects flows and simulation settings for one run.
///
/// Each flow gets its own pair of nodes and its own link, so flows never
/// compete for a queue.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    config: TidesimConfig,
    stop_time: SimTime,
    flows: Vec<FlowSpec>,
}

/// Assembled scenario ready to run.
#[derive(Debug)]
pub struct ScenarioRun {
    name: String,
    stop_time: SimTime,
    sim: Simulation,
    flows: Vec<InstalledFlow>,
}

#[derive(Debug)]
struct InstalledFlow {
    label: String,
    algorithm: CongestionAlgorithm,
    sender: EndpointId,
    sink: PacketSink,
    link: LinkId,
    progress: SessionProgress,
}

impl ScenarioBuilder {
    /// Empty scenario running for ten simulated seconds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: TidesimConfig::default(),
            stop_time: SimTime::from_secs(10),
            flows: Vec::new(),
        }
    }

    /// Replaces the engine configuration.
    pub fn config(mut self, config: TidesimConfig) -> Self {
        self.config = config;
        self
    }

    /// Instant the run ends.
    pub fn stop_time(mut self, stop_time: SimTime) -> Self {
        self.stop_time = stop_time;
        self
    }

    /// Adds a flow.
    pub fn flow(mut self, flow: FlowSpec) -> Self {
        self.flows.push(flow);
        self
    }

    /// Creates the topology and installs every application.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidParameters` - If there are no flows, labels repeat or the stop time is zero
    /// - `SimError::Core` - If the configuration is invalid or an application start time is in the past
    /// - `SimError::Topology` - If a link cannot be created
    pub fn build(self) -> Result<ScenarioRun, SimError> {
        if self.flows.is_empty() {
            return Err(SimError::InvalidParameters {
                reason: format!("scenario {} has no flows", self.name),
            });
        }
        if self.stop_time == SimTime::ZERO {
            return Err(SimError::InvalidParameters {
                reason: "stop time must be after simulation start".to_string(),
            });
        }
        for (i, flow) in self.flows.iter().enumerate() {
            if self.flows[..i].iter().any(|other| other.label == flow.label) {
                return Err(SimError::InvalidParameters {
                    reason: format!("flow label {} is used twice", flow.label),
                });
            }
        }

        let mut sim = Simulation::new(self.config)?;
        let mut installed = Vec::with_capacity(self.flows.len());
        for flow in self.flows {
            installed.push(install_flow(&mut sim, flow)?);
        }

        tracing::info!(
            scenario = %self.name,
            flows = installed.len(),
            stop_time = %self.stop_time,
            "Scenario assembled"
        );

        Ok(ScenarioRun {
            name: self.name,
            stop_time: self.stop_time,
            sim,
            flows: installed,
        })
    }

    /// Builds and runs to the stop time.
    ///
    /// # Errors
    ///
    /// - `SimError` - If building or running fails
    pub fn run(self) -> Result<ScenarioReport, SimError> {
        self.build()?.run()
    }
}

fn install_flow(sim: &mut Simulation, flow: FlowSpec) -> Result<InstalledFlow, SimError> {
    let net = sim.network_mut();
    let client_node = net.create_node();
    let server_node = net.create_node();
    let link = net.create_link(client_node, server_node, flow.data_rate, flow.delay)?;
    let sender = net.create_endpoint(client_node, flow.algorithm)?;
    let receiver = net.create_endpoint(server_node, flow.algorithm)?;
    for &at in &flow.loss_at {
        net.inject_loss(link, at)?;
    }

    let sink = PacketSink::install(sim, receiver, flow.sink_port, flow.sink_start)?;
    let peer = sink.address();

    let progress = match flow.traffic {
        Traffic::Paced {
            message_size,
            count,
            interval,
            start_at,
        } => PeriodicSend::paced(sender, peer, message_size, count, interval)
            .connect_at(flow.connect_at)
            .start_at(start_at)
            .install(sim)?
            .progress(),
        Traffic::OnOff {
            rate,
            packet_size,
            start_at,
            stop_at,
        } => PeriodicSend::on_off(sender, peer, rate, packet_size)
            .connect_at(flow.connect_at)
            .start_at(start_at)
            .stop_at(stop_at)
            .install(sim)?
            .progress(),
        Traffic::Bulk {
            message_size,
            messages,
            start_at,
            close_when_done,
        } => BulkSend::new(sender, peer, message_size, messages)
            .close_when_done(close_when_done)
            .install(sim, flow.connect_at, start_at)?,
    };

    tracing::debug!(flow = %flow.label, %sender, %link, algorithm = %flow.algorithm, "Flow installed");

    Ok(InstalledFlow {
        label: flow.label,
        algorithm: flow.algorithm,
        sender,
        sink,
        link,
        progress,
    })
}

impl ScenarioRun {
    /// Underlying simulation, for extra scheduling before the run.
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Sender endpoint of the flow called `label`.
    pub fn sender(&self, label: &str) -> Option<EndpointId> {
        self.flows
            .iter()
            .find(|flow| flow.label == label)
            .map(|flow| flow.sender)
    }

    /// Runs to the stop time and collects the report.
    ///
    /// # Errors
    ///
    /// - `SimError::Core` - If the scheduler aborts the run
    pub fn run(mut self) -> Result<ScenarioReport, SimError> {
        let summary = self.sim.run_until(self.stop_time)?;
        tracing::info!(
            scenario = %self.name,
            events = summary.events_executed,
            final_time = %summary.final_time,
            "Scenario finished"
        );
        self.report()
    }

    /// Report of the state reached so far.
    ///
    /// # Errors
    ///
    /// - `SimError::Topology` - If an installed endpoint or link vanished
    pub fn report(&self) -> Result<ScenarioReport, SimError> {
        let net = self.sim.network();
        let mut flows = Vec::with_capacity(self.flows.len());
        for flow in &self.flows {
            let endpoint = net.endpoint(flow.sender)?;
            flows.push(FlowReport {
                label: flow.label.clone(),
                algorithm: flow.algorithm,
                final_state: endpoint.state(),
                sender: endpoint.stats(),
                bytes_delivered: flow.sink.bytes_received(net),
                progress: flow.progress.snapshot(),
                link: net.link(flow.link)?.stats().clone(),
                cwnd_trace: endpoint.cwnd_trace().to_vec(),
                losses: endpoint.losses().to_vec(),
            });
        }

        Ok(ScenarioReport {
            name: self.name.clone(),
            mss: net.config().transport.mss,
            final_time: self.sim.now(),
            events_executed: self.sim.scheduler().events_executed(),
            flows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paced(count: u64) -> Traffic {
        Traffic::Paced {
            message_size: 512,
            count,
            interval: Duration::from_millis(50),
            start_at: SimTime::from_millis(100),
        }
    }

    #[test]
    fn test_build_rejects_empty_and_duplicate_flows() {
        assert!(matches!(
            ScenarioBuilder::new("empty").build(),
            Err(SimError::InvalidParameters { .. })
        ));

        let duplicate = ScenarioBuilder::new("dup")
            .flow(FlowSpec::new("x", paced(1)))
            .flow(FlowSpec::new("x", paced(1)))
            .build();
        assert!(matches!(duplicate, Err(SimError::InvalidParameters { .. })));
    }

    #[test]
    fn test_flows_are_isolated() {
        let report = ScenarioBuilder::new("two")
            .stop_time(SimTime::from_secs(2))
            .flow(FlowSpec::new("reno", paced(3)))
            .flow(FlowSpec::new("cubic", paced(5)).algorithm(CongestionAlgorithm::Cubic))
            .run()
            .unwrap();

        let reno = report.flow("reno").unwrap();
        let cubic = report.flow("cubic").unwrap();
        assert_eq!(reno.bytes_delivered, 3 * 512);
        assert_eq!(cubic.bytes_delivered, 5 * 512);
        assert_eq!(cubic.algorithm, CongestionAlgorithm::Cubic);
        assert_eq!(report.final_time, SimTime::from_secs(2));
        assert!(report.flows.iter().all(FlowReport::window_respected));
    }

    #[test]
    fn test_loss_injection_is_reported() {
        let report = ScenarioBuilder::new("lossy")
            .stop_time(SimTime::from_secs(5))
            .flow(
                FlowSpec::new(
                    "bulk",
                    Traffic::Bulk {
                        message_size: 1448,
                        messages: 200,
                        start_at: SimTime::from_millis(100),
                        close_when_done: false,
                    },
                )
                .inject_loss_at(SimTime::from_millis(150)),
            )
            .run()
            .unwrap();

        let flow = report.flow("bulk").unwrap();
        assert_eq!(flow.link.injected_drops, 1);
        assert_eq!(flow.bytes_delivered, 200 * 1448);
        assert!(flow.sender.retransmissions >= 1);
    }
}
