//! Discrete-event scheduler.
//!
//! Holds pending timed events in a min-heap keyed by (time, insertion
//! sequence), advances the simulation clock and executes due events.
//! Identical schedules always yield identical execution traces.

mod clock;
mod events;
mod executor;

pub use clock::{DeterministicRng, SimClock};
pub use events::{Action, Event, EventHandle, EventKey, EventQueue};
pub use executor::{RunSummary, Scheduler, SchedulerError};
