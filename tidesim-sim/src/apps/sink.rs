use tidesim_core::network::{Address, EndpointId, Network};
use tidesim_core::{SimTime, Simulation};

use crate::SimError;

/// Passive receiver that accepts one connection and absorbs its data.
#[derive(Debug, Clone, Copy)]
pub struct PacketSink {
    endpoint: EndpointId,
    address: Address,
}

impl PacketSink {
    /// Binds `endpoint` to `port` and starts listening at `start`.
    ///
    /// # Errors
    ///
    /// - `SimError::Topology` - If the port is taken
    /// - `SimError::Core` - If `start` is in the past
    pub fn install(
        sim: &mut Simulation,
        endpoint: EndpointId,
        port: u16,
        start: SimTime,
    ) -> Result<Self, SimError> {
        let address = sim.network_mut().bind(endpoint, port)?;
        sim.schedule_at(start, move |net: &mut Network, _| {
            if let Err(error) = net.listen(endpoint) {
                tracing::warn!(%endpoint, %error, "Sink failed to listen");
            }
        })?;
        Ok(Self { endpoint, address })
    }

    /// Endpoint receiving the data.
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Address senders should connect to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// In-order bytes delivered so far.
    pub fn bytes_received(&self, network: &Network) -> u64 {
        network
            .endpoint(self.endpoint)
            .map(|endpoint| endpoint.bytes_received())
            .unwrap_or(0)
    }
}
