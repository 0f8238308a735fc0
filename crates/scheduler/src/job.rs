use std::future::Future;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bias_core::EngineResult;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::market_hours;

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> EngineResult<()>;
}

/// Wraps a plain async closure as a `ScheduledJob`, so callers can wire a
/// job without a dedicated type for every cadence.
pub struct FnJob<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<()>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> ScheduledJob for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> EngineResult<()> {
        (self.f)().await
    }
}

/// When a job is allowed to fire.
#[derive(Clone)]
pub enum Gate {
    Always,
    RegularSession,
    ExtendedSession,
    /// Fires once per calendar day, at or after `hour:minute` ET.
    DailyAt { hour: u32, minute: u32, weekdays_only: bool },
}

fn weekday_ok(et: DateTime<chrono_tz::Tz>, weekdays_only: bool) -> bool {
    !weekdays_only || !matches!(et.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Ticks `job` on `cadence`, gated by `gate`. Each tick awaits the job to
/// completion before the next — the loop itself is the single-instance
/// lock, there's no separate run to race against.
pub fn spawn(job: std::sync::Arc<dyn ScheduledJob>, cadence: StdDuration, gate: Gate) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cadence);
        let mut last_daily_run: Option<NaiveDate> = None;

        loop {
            interval.tick().await;
            let now = Utc::now();

            let should_run = match &gate {
                Gate::Always => true,
                Gate::RegularSession => market_hours::is_regular_session(now),
                Gate::ExtendedSession => market_hours::is_extended_session(now),
                Gate::DailyAt { hour, minute, weekdays_only } => {
                    let et = now.with_timezone(&chrono_tz::US::Eastern);
                    let today = et.date_naive();
                    let time_hit = (et.hour(), et.minute()) >= (*hour, *minute);
                    let already_ran = last_daily_run == Some(today);
                    if time_hit && weekday_ok(et, *weekdays_only) && !already_ran {
                        last_daily_run = Some(today);
                        true
                    } else {
                        false
                    }
                }
            };

            if !should_run {
                continue;
            }

            if let Err(e) = job.run().await {
                warn!(job = job.name(), error = %e, "scheduled job failed, will retry next tick");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn always_gate_runs_job_on_tick() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let job = Arc::new(FnJob::new("test", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        let handle = spawn(job, StdDuration::from_millis(10), Gate::Always);
        tokio::time::sleep(StdDuration::from_millis(35)).await;
        handle.abort();

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
