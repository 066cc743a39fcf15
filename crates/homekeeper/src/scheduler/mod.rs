//! Time-based triggers: sun events, stored daily schedules, presence pings
//! and telemetry polling.

mod plan;
mod scheduler;
mod sun;

pub use plan::next_daily_at;
pub use plan::next_rollover;
pub use plan::plan_day;
pub use scheduler::Scheduler;
pub use sun::Location;
pub use sun::SunTimes;
