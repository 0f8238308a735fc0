pub mod job;
pub mod market_hours;
pub mod table;

pub use job::{spawn, FnJob, Gate, ScheduledJob};
