//! Sunrise and sunset times.
//!
//! Implements the sunrise equation from the Almanac for Computers as
//! published by NOAA, with the official zenith of 90°50'. Accuracy is about a
//! minute, which is plenty for switching lights.

use chrono::DateTime;
use chrono::Datelike;
use chrono::NaiveDate;
use chrono::TimeDelta;
use chrono::TimeZone;

/// Official zenith for sunrise and sunset, including refraction.
const ZENITH: f64 = 90.833;

/// A point on the earth in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sun events of one local day. `None` when the sun does not rise or set.
#[derive(Debug, Clone, PartialEq)]
pub struct SunTimes<Tz: TimeZone> {
    pub sunrise: Option<DateTime<Tz>>,
    pub sunset: Option<DateTime<Tz>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SunEvent {
    Rise,
    Set,
}

impl Location {
    /// Sunrise and sunset on the local calendar day `date` in `tz`.
    pub fn sun_times<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> SunTimes<Tz> {
        SunTimes {
            sunrise: self.event_on(date, tz, SunEvent::Rise),
            sunset: self.event_on(date, tz, SunEvent::Set),
        }
    }

    fn event_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
        event: SunEvent,
    ) -> Option<DateTime<Tz>> {
        let ut_hours = self.utc_hours(date, event)?;
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        let utc = midnight + TimeDelta::seconds((ut_hours * 3600.0).round() as i64);

        // The equation yields a time of day modulo 24h in UTC. Far from
        // Greenwich that can land on the neighbouring local day.
        let local = utc.with_timezone(tz);
        let shifted = match local.date_naive().cmp(&date) {
            std::cmp::Ordering::Less => utc + TimeDelta::days(1),
            std::cmp::Ordering::Greater => utc - TimeDelta::days(1),
            std::cmp::Ordering::Equal => utc,
        };
        Some(shifted.with_timezone(tz))
    }

    /// Event time in decimal hours UTC, in `[0, 24)`.
    fn utc_hours(&self, date: NaiveDate, event: SunEvent) -> Option<f64> {
        let day_of_year = f64::from(date.ordinal());
        let lng_hour = self.longitude / 15.0;

        let approx = match event {
            SunEvent::Rise => day_of_year + (6.0 - lng_hour) / 24.0,
            SunEvent::Set => day_of_year + (18.0 - lng_hour) / 24.0,
        };

        let mean_anomaly = 0.9856 * approx - 3.289;
        let true_longitude = (mean_anomaly
            + 1.916 * mean_anomaly.to_radians().sin()
            + 0.020 * (2.0 * mean_anomaly).to_radians().sin()
            + 282.634)
            .rem_euclid(360.0);

        let mut right_ascension = (0.91764 * true_longitude.to_radians().tan())
            .atan()
            .to_degrees()
            .rem_euclid(360.0);
        // Same quadrant as the true longitude.
        right_ascension +=
            (true_longitude / 90.0).floor() * 90.0 - (right_ascension / 90.0).floor() * 90.0;
        let right_ascension = right_ascension / 15.0;

        let sin_dec = 0.39782 * true_longitude.to_radians().sin();
        let cos_dec = sin_dec.asin().cos();

        let latitude = self.latitude.to_radians();
        let cos_hour_angle =
            (ZENITH.to_radians().cos() - sin_dec * latitude.sin()) / (cos_dec * latitude.cos());
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            return None;
        }

        let hour_angle = match event {
            SunEvent::Rise => 360.0 - cos_hour_angle.acos().to_degrees(),
            SunEvent::Set => cos_hour_angle.acos().to_degrees(),
        } / 15.0;

        let local_mean_time = hour_angle + right_ascension - 0.06571 * approx - 6.622;
        Some((local_mean_time - lng_hour).rem_euclid(24.0))
    }
}
