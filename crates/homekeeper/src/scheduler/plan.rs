//! Wall-clock planning for daily firings.
//!
//! Everything here is pure over a given `now`, so the rules for which sun
//! events still fire today can be tested without waiting for them.

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::TimeDelta;
use chrono::TimeZone;

use super::sun::Location;
use crate::engine::DailyEvent;

/// Local time of the daily rollover that plans the next day's sun events.
pub const ROLLOVER_HOUR: u32 = 0;
pub const ROLLOVER_MINUTE: u32 = 1;

/// Sun events that are still ahead of `now` on its local day, in order.
///
/// Before sunrise both events are planned, between sunrise and sunset only
/// the sunset, after sunset nothing.
pub fn plan_day<Tz: TimeZone>(
    location: &Location,
    now: &DateTime<Tz>,
) -> Vec<(DateTime<Tz>, DailyEvent)> {
    let times = location.sun_times(now.date_naive(), &now.timezone());

    [
        (times.sunrise, DailyEvent::Sunrise),
        (times.sunset, DailyEvent::Sunset),
    ]
    .into_iter()
    .filter_map(|(at, event)| at.map(|at| (at, event)))
    .filter(|(at, _)| at > now)
    .collect()
}

/// Tomorrow at 00:01 local time.
pub fn next_rollover<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tomorrow = now.date_naive() + TimeDelta::days(1);
    at_local(&now.timezone(), tomorrow, ROLLOVER_HOUR, ROLLOVER_MINUTE)
}

/// Next occurrence of `hour:minute` local time strictly after `now`.
pub fn next_daily_at<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = at_local(&tz, now.date_naive(), hour, minute);
    if today > *now {
        today
    } else {
        at_local(&tz, now.date_naive() + TimeDelta::days(1), hour, minute)
    }
}

/// Resolve a local wall-clock time to an instant.
///
/// Ambiguous times take the earlier instant; times skipped by a DST jump
/// move forward by an hour.
fn at_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let naive = NaiveDateTime::new(date, time);

    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
