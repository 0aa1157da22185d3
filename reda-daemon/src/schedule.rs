//! Weekly calendar trigger.
//!
//! The schedule is a weekday plus a wall-clock time in a fixed UTC offset. The
//! daemon asks for the next fire time after "now", sleeps until then, and runs.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Utc, Weekday};
use std::time::Duration;

use reda_core::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl WeeklySchedule {
    pub fn from_config(config: &Config) -> Self {
        let time = NaiveTime::from_hms_opt(config.schedule.hour, config.schedule.minute, 0)
            .unwrap_or_default();
        Self {
            weekday: config.schedule.weekday,
            time,
            offset: config.report_offset(),
        }
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - today.weekday().num_days_from_monday())
            % 7;

        let date = today + ChronoDuration::days(i64::from(days_ahead));
        let mut candidate = self.at_local(date.and_time(self.time));
        if candidate <= local {
            candidate += ChronoDuration::weeks(1);
        }
        candidate
    }

    /// How long to sleep from `now` until the next fire time.
    pub fn wait_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now).with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or_default()
    }

    fn at_local(&self, local: chrono::NaiveDateTime) -> DateTime<FixedOffset> {
        let utc = local - ChronoDuration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }
}
