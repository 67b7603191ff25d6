//! Single-threaded discrete-event scheduler.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::clock::SimClock;
use super::events::{EventHandle, EventQueue};
use crate::config::SimulationConfig;
use crate::time::SimTime;

/// Errors raised by the scheduler.
///
/// These indicate a broken timing invariant and abort the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// Event requested before the current simulated time
    #[error("Invalid delay: {reason}")]
    InvalidDelay {
        /// Why the delay was rejected
        reason: String,
    },

    /// Clock asked to move backwards
    #[error("Clock cannot move backwards from {now} to {target}")]
    TimeWentBackwards {
        /// Current simulated time
        now: SimTime,
        /// Requested time
        target: SimTime,
    },

    /// Too many live events
    #[error("Event queue overflow: {count} events scheduled")]
    QueueOverflow {
        /// Number of pending events when the limit was hit
        count: usize,
    },
}

/// Outcome of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Events executed during this run
    pub events_executed: u64,
    /// Cancelled events discarded during this run
    pub events_cancelled: u64,
    /// Simulated time when the run returned
    pub final_time: SimTime,
    /// Whether the run ended through `stop()` rather than an empty queue or stop time
    pub stopped: bool,
}

/// Discrete-event scheduler driving a world of type `W`.
///
/// Events run to completion one at a time in (time, insertion) order, so the
/// same schedule always produces the same execution trace. Each action gets
/// `&mut W` and `&mut Scheduler<W>`; all state mutation flows through this
/// single loop.
pub struct Scheduler<W> {
    clock: SimClock,
    queue: EventQueue<W>,
    stop_time: Option<SimTime>,
    stop_requested: bool,
    max_pending_events: usize,
    fault: Option<SchedulerError>,
    executed: u64,
}

impl<W: 'static> Default for Scheduler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static> Scheduler<W> {
    /// Creates a scheduler at time zero with default limits.
    pub fn new() -> Self {
        Self::with_config(&SimulationConfig::default())
    }

    /// Creates a scheduler using stop time and queue limits from `config`.
    pub fn with_config(config: &SimulationConfig) -> Self {
        Self {
            clock: SimClock::new(),
            queue: EventQueue::new(),
            stop_time: config.stop_time,
            stop_requested: false,
            max_pending_events: config.max_pending_events,
            fault: None,
            executed: 0,
        }
    }

    /// Returns current simulated time.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Schedules `action` to run `delay` after the current time.
    ///
    /// A full queue is a fatal condition: the event is discarded and the
    /// current `run` returns `SchedulerError::QueueOverflow` once the
    /// executing event finishes.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> EventHandle
    where
        F: FnOnce(&mut W, &mut Scheduler<W>) + 'static,
    {
        let time = self.clock.now() + delay;
        if self.queue.len() >= self.max_pending_events && self.fault.is_none() {
            tracing::error!(
                pending = self.queue.len(),
                "Event queue overflow, aborting run"
            );
            self.fault = Some(SchedulerError::QueueOverflow {
                count: self.queue.len(),
            });
        }
        let handle = self.queue.push(time, Box::new(action));
        if self.fault.is_some() {
            self.queue.cancel(handle);
        }
        tracing::trace!(%handle, %time, "Scheduled event");
        handle
    }

    /// Schedules `action` at the current time, after already-queued events for this instant.
    pub fn schedule_now<F>(&mut self, action: F) -> EventHandle
    where
        F: FnOnce(&mut W, &mut Scheduler<W>) + 'static,
    {
        self.schedule(Duration::ZERO, action)
    }

    /// Schedules `action` at an absolute time.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidDelay` - If `time` is earlier than now
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce(&mut W, &mut Scheduler<W>) + 'static,
    {
        let now = self.clock.now();
        if time < now {
            return Err(SchedulerError::InvalidDelay {
                reason: format!("absolute time {time} is before current time {now}"),
            });
        }
        Ok(self.schedule(time - now, action))
    }

    /// Schedules `action` after a delay given in fractional seconds.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidDelay` - If `delay_secs` is negative or not finite
    pub fn schedule_secs<F>(&mut self, delay_secs: f64, action: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce(&mut W, &mut Scheduler<W>) + 'static,
    {
        let delay =
            Duration::try_from_secs_f64(delay_secs).map_err(|_| SchedulerError::InvalidDelay {
                reason: format!("delay of {delay_secs} seconds"),
            })?;
        Ok(self.schedule(delay, action))
    }

    /// Cancels a pending event. Returns false if it already ran or was cancelled.
    ///
    /// Safe to call from inside another event's action.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let cancelled = self.queue.cancel(handle);
        if cancelled {
            tracing::trace!(%handle, "Cancelled event");
        }
        cancelled
    }

    /// Returns true if the event has neither run nor been cancelled.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.is_pending(handle)
    }

    /// Number of live events waiting to run.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Total events executed by this scheduler.
    pub fn events_executed(&self) -> u64 {
        self.executed
    }

    /// Requests the current run to return after the executing event.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Schedules a terminal event that stops the run at `time`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidDelay` - If `time` is earlier than now
    pub fn stop_at(&mut self, time: SimTime) -> Result<EventHandle, SchedulerError> {
        self.schedule_at(time, |_, scheduler| scheduler.stop())
    }

    /// Sets the time after which `run` stops executing events.
    pub fn set_stop_time(&mut self, stop_time: Option<SimTime>) {
        self.stop_time = stop_time;
    }

    /// Executes events until the queue is empty, the stop time passes or `stop()` is called.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::QueueOverflow` - An action overflowed the event queue
    /// - `SchedulerError::TimeWentBackwards` - Internal ordering invariant broken
    pub fn run(&mut self, world: &mut W) -> Result<RunSummary, SchedulerError> {
        self.execute(world, self.stop_time)
    }

    /// Executes events due at or before `until`, then leaves the clock at `until`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidDelay` - If `until` is earlier than now
    /// - `SchedulerError::QueueOverflow` - An action overflowed the event queue
    pub fn run_until(&mut self, world: &mut W, until: SimTime) -> Result<RunSummary, SchedulerError> {
        if until < self.clock.now() {
            return Err(SchedulerError::InvalidDelay {
                reason: format!("run target {until} is before current time {}", self.now()),
            });
        }
        let mut summary = self.execute(world, Some(until))?;
        if !summary.stopped {
            self.clock.advance_to(until)?;
            summary.final_time = until;
        }
        Ok(summary)
    }

    fn execute(
        &mut self,
        world: &mut W,
        limit: Option<SimTime>,
    ) -> Result<RunSummary, SchedulerError> {
        self.stop_requested = false;
        let executed_before = self.executed;
        let cancelled_before = self.queue.cancelled_skipped();

        while !self.stop_requested {
            let Some(event) = self.queue.pop_due(limit) else {
                break;
            };

            self.clock.advance_to(event.key.time)?;
            tracing::trace!(handle = %event.handle(), time = %event.key.time, "Executing event");
            (event.action)(world, self);
            self.executed += 1;

            if let Some(fault) = self.fault.take() {
                return Err(fault);
            }
        }

        Ok(RunSummary {
            events_executed: self.executed - executed_before,
            events_cancelled: self.queue.cancelled_skipped() - cancelled_before,
            final_time: self.clock.now(),
            stopped: self.stop_requested,
        })
    }
}

impl<W> fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.clock.now())
            .field("queue", &self.queue)
            .field("stop_time", &self.stop_time)
            .field("executed", &self.executed)
            .finish()
    }
}
