//! Calendar windows anchored at an injected instant.
//!
//! Month and year boundaries are local midnights in one configured
//! timezone, converted back to UTC for comparison against stored
//! timestamps.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The instant a computation is evaluated at, plus the zone its calendar
/// boundaries are drawn in.
#[derive(Debug, Clone, Copy)]
pub struct AsOf {
    pub now: DateTime<Utc>,
    pub tz: Tz,
}

/// Half-open window `[start, end)` covering one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    pub first_day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MonthWindow {
    fn starting(tz: &Tz, first_day: NaiveDate) -> Option<Self> {
        let next = first_day.checked_add_months(Months::new(1))?;
        Some(Self {
            first_day,
            start: local_midnight(tz, first_day),
            end: local_midnight(tz, next),
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Short English month name, e.g. "Jan".
    pub fn label(&self) -> String {
        self.first_day.format("%b").to_string()
    }
}

impl AsOf {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self { now, tz }
    }

    /// Calendar date of `now` in the configured zone.
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }

    pub fn start_of_month(&self) -> DateTime<Utc> {
        local_midnight(&self.tz, self.first_of_month())
    }

    pub fn start_of_year(&self) -> DateTime<Utc> {
        local_midnight(&self.tz, self.first_of_year())
    }

    pub fn first_of_year(&self) -> NaiveDate {
        let today = self.today();
        today.with_ordinal(1).unwrap_or(today)
    }

    fn first_of_month(&self) -> NaiveDate {
        let today = self.today();
        today.with_day(1).unwrap_or(today)
    }

    /// `now - days`, inclusive lower bound of a trailing window.
    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now - Duration::days(days)
    }

    /// The last `count` calendar months ordered oldest to newest, ending with
    /// the month that contains `now`.
    pub fn trailing_months(&self, count: u32) -> Vec<MonthWindow> {
        let current = self.first_of_month();
        (0..count)
            .rev()
            .filter_map(|back| current.checked_sub_months(Months::new(back)))
            .filter_map(|first_day| MonthWindow::starting(&self.tz, first_day))
            .collect()
    }
}

/// First instant of `date` in `tz`.
///
/// A midnight skipped by a DST transition resolves to the first valid local
/// time of that day.
pub fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + Duration::hours(hours)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
