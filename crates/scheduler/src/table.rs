use std::time::Duration;

use crate::job::Gate;

/// One row of the declarative job table (§4.J). The composition root pairs
/// each with a concrete `ScheduledJob` implementation.
pub struct JobRow {
    pub name: &'static str,
    pub cadence: Duration,
    pub gate: Gate,
}

pub fn market_data_pull() -> JobRow {
    JobRow { name: "market_data_pull", cadence: Duration::from_secs(15 * 60), gate: Gate::RegularSession }
}

pub fn vix_only_pull() -> JobRow {
    JobRow { name: "vix_only_pull", cadence: Duration::from_secs(15 * 60), gate: Gate::ExtendedSession }
}

pub fn cape_pull() -> JobRow {
    JobRow { name: "cape_pull", cadence: Duration::from_secs(4 * 60 * 60), gate: Gate::Always }
}

pub fn signal_outcome_scoring() -> JobRow {
    JobRow {
        name: "signal_outcome_scoring",
        cadence: Duration::from_secs(60),
        gate: Gate::DailyAt { hour: 21, minute: 0, weekdays_only: true },
    }
}

pub fn composite_safety_recompute() -> JobRow {
    JobRow { name: "composite_safety_recompute", cadence: Duration::from_secs(15 * 60), gate: Gate::Always }
}

pub fn heartbeat_emit() -> JobRow {
    JobRow { name: "heartbeat_emit", cadence: Duration::from_secs(5 * 60), gate: Gate::Always }
}
