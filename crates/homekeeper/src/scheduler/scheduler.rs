use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::plan::next_daily_at;
use super::plan::next_rollover;
use super::plan::plan_day;
use super::sun::Location;
use crate::config::SchedulerConfig;
use crate::engine::DailyEvent;
use crate::engine::Engine;
use crate::engine::ScheduledTrigger;
use crate::shutdown::requested;

/// Drives every time-based firing of the engine.
///
/// Each source runs as its own task and waits for its next firing or for
/// shutdown, whichever comes first. A firing spawns the engine work and goes
/// straight back to waiting, so slow handlers never delay other sources.
pub struct Scheduler {
    engine: Arc<Engine>,
    location: Location,
    ping_interval: Duration,
    stats_interval: Duration,
    stats_initial_delay: Duration,
}

/// Sleep until a wall-clock instant. Returns false if shutdown came first
/// or arrived together with the deadline.
async fn sleep_until_wall(at: DateTime<Utc>, shutdown: &mut watch::Receiver<bool>) -> bool {
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::select! {
        biased;
        _ = requested(shutdown) => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, location: Location, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            location,
            ping_interval: config.ping_interval(),
            stats_interval: config.stats_interval(),
            stats_initial_delay: config.stats_initial_delay(),
        }
    }

    /// Register all jobs and run them until `shutdown` becomes true.
    ///
    /// Firings that would happen after shutdown are dropped; work already
    /// handed to the engine is left to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let triggers = self.load_triggers().await;
        let mut jobs = JoinSet::new();

        jobs.spawn(Self::sun_job(
            self.engine.clone(),
            self.location,
            shutdown.clone(),
        ));

        for trigger in triggers {
            jobs.spawn(Self::daily_job(self.engine.clone(), trigger, shutdown.clone()));
        }

        jobs.spawn(Self::ping_job(
            self.engine.clone(),
            self.ping_interval,
            shutdown.clone(),
        ));
        jobs.spawn(Self::stats_job(
            self.engine.clone(),
            self.stats_initial_delay,
            self.stats_interval,
            shutdown.clone(),
        ));

        info!("scheduler started with {} jobs", jobs.len());

        while let Some(res) = jobs.join_next().await {
            if let Err(e) = res {
                error!("scheduler job failed: {}", e);
            }
        }

        info!("scheduler stopped");
    }

    /// Stored schedules that describe a valid daily trigger.
    async fn load_triggers(&self) -> Vec<ScheduledTrigger> {
        let records = match self.engine.store().get_scheduled_triggers().await {
            Ok(records) => records,
            Err(e) => {
                error!("failed to load stored schedules: {}", e);
                return Vec::new();
            }
        };

        records
            .iter()
            .filter_map(|record| match ScheduledTrigger::try_from(record) {
                Ok(trigger) => Some(trigger),
                Err(e) => {
                    warn!("skipping stored schedule: {}", e);
                    None
                }
            })
            .collect()
    }

    fn fire_time_event(engine: &Arc<Engine>, event: DailyEvent) {
        info!(%event, "time event firing");
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.handle_time_event(event).await {
                error!(%event, "time event failed: {}", e);
            }
        });
    }

    /// Today's remaining sun events followed by the rollover, forever.
    async fn sun_job(
        engine: Arc<Engine>,
        location: Location,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let now = Local::now();
            let plan = plan_day(&location, &now);
            let rollover = next_rollover(&now);
            debug!(?plan, %rollover, "planned sun events");

            for (at, event) in plan {
                if !sleep_until_wall(at.with_timezone(&Utc), &mut shutdown).await {
                    return;
                }
                Self::fire_time_event(&engine, event);
            }

            if !sleep_until_wall(rollover.with_timezone(&Utc), &mut shutdown).await {
                return;
            }
            debug!("sun schedule rollover");
        }
    }

    async fn daily_job(
        engine: Arc<Engine>,
        trigger: ScheduledTrigger,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let at = next_daily_at(&Local::now(), trigger.hour, trigger.minute);
            if !sleep_until_wall(at.with_timezone(&Utc), &mut shutdown).await {
                return;
            }
            Self::fire_time_event(&engine, trigger.event);
        }
    }

    async fn ping_job(engine: Arc<Engine>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = requested(&mut shutdown) => return,
                _ = ticker.tick() => {}
            }

            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.ping_mobile_devices().await {
                    error!("mobile device ping failed: {}", e);
                }
            });
        }
    }

    async fn stats_job(
        engine: Arc<Engine>,
        initial_delay: Duration,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = requested(&mut shutdown) => return,
                _ = ticker.tick() => {}
            }

            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.request_device_stats().await {
                    error!("device stats request failed: {}", e);
                }
            });
        }
    }
}
