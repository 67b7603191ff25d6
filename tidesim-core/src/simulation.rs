//! Network plus scheduler bundled as one run.

use std::time::Duration;

use crate::config::TidesimConfig;
use crate::network::{NetScheduler, Network};
use crate::scheduler::{EventHandle, RunSummary};
use crate::time::SimTime;
use crate::{Result, TidesimError};

/// A simulated network together with the scheduler that drives it.
#[derive(Debug)]
pub struct Simulation {
    network: Network,
    scheduler: NetScheduler,
}

impl Simulation {
    /// Creates an empty simulation from validated configuration.
    ///
    /// # Errors
    ///
    /// - `TidesimError::Configuration` - If the transport configuration is inconsistent
    pub fn new(config: TidesimConfig) -> Result<Self> {
        config.transport.validate()?;
        if !(0.0..=1.0).contains(&config.link.random_loss_rate) {
            return Err(TidesimError::Configuration {
                reason: format!(
                    "random loss rate {} is outside 0.0..=1.0",
                    config.link.random_loss_rate
                ),
            });
        }
        let scheduler = NetScheduler::with_config(&config.simulation);
        Ok(Self {
            network: Network::new(config),
            scheduler,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn scheduler(&self) -> &NetScheduler {
        &self.scheduler
    }

    /// Splits into the network and scheduler, as event actions receive them.
    pub fn parts(&mut self) -> (&mut Network, &mut NetScheduler) {
        (&mut self.network, &mut self.scheduler)
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Schedules an action `delay` from now.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> EventHandle
    where
        F: FnOnce(&mut Network, &mut NetScheduler) + 'static,
    {
        self.scheduler.schedule(delay, action)
    }

    /// Schedules an action at an absolute time.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidDelay` - If `time` is in the past
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> Result<EventHandle>
    where
        F: FnOnce(&mut Network, &mut NetScheduler) + 'static,
    {
        Ok(self.scheduler.schedule_at(time, action)?)
    }

    /// Runs until the queue drains, the configured stop time passes or an action stops the run.
    ///
    /// # Errors
    ///
    /// - `SchedulerError` - If a timing invariant broke during the run
    pub fn run(&mut self) -> Result<RunSummary> {
        Ok(self.scheduler.run(&mut self.network)?)
    }

    /// Runs events due at or before `until`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError` - If `until` is in the past or a timing invariant broke
    pub fn run_until(&mut self, until: SimTime) -> Result<RunSummary> {
        Ok(self.scheduler.run_until(&mut self.network, until)?)
    }
}
