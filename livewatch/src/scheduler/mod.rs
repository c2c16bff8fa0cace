//! Health scheduler: due-time queue, bounded probe workers and counters.

mod queue;
mod service;
mod stats;

pub use queue::DueQueue;
pub use service::{HealthScheduler, SchedulerConfig};
pub use stats::{SchedulerStats, SchedulerStatsSnapshot};
