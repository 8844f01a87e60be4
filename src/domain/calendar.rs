//! Business-day calendar
//!
//! A calendar combines a work week (which weekdays are worked) with a set of
//! regional holidays. A date is a working day iff its weekday is worked AND
//! it is not a holiday.
//!
//! Holiday data is loaded once per session through a [`HolidayProvider`] and
//! shared read-only afterwards. When the provider fails, the calendar falls
//! back to the work week alone and logs a warning.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Bound, RangeInclusive};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CalendarError {
    #[error("Holiday calendar unavailable: {0}")]
    Unavailable(String),

    #[error("Work week must contain at least one working day")]
    NoWorkingDays,

    #[error("Unknown weekday: {0}")]
    InvalidWeekday(String),
}

/// Weekdays that count as working days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWeek {
    /// Indexed by `Weekday::num_days_from_monday`
    days: [bool; 7],
}

impl Default for WorkWeek {
    /// Monday to Friday
    fn default() -> Self {
        Self {
            days: [true, true, true, true, true, false, false],
        }
    }
}

impl WorkWeek {
    /// Builds a work week from a set of working weekdays
    pub fn new(days: impl IntoIterator<Item = Weekday>) -> Result<Self, CalendarError> {
        let mut week = [false; 7];
        for day in days {
            week[day.num_days_from_monday() as usize] = true;
        }
        if !week.iter().any(|d| *d) {
            return Err(CalendarError::NoWorkingDays);
        }
        Ok(Self { days: week })
    }

    /// Parses weekday names such as `monday` or `mon`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CalendarError> {
        let days = names
            .iter()
            .map(|name| {
                name.as_ref()
                    .trim()
                    .parse::<Weekday>()
                    .map_err(|_| CalendarError::InvalidWeekday(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(days)
    }

    /// Returns true if the weekday is worked
    pub fn is_working(&self, day: Weekday) -> bool {
        self.days[day.num_days_from_monday() as usize]
    }

    /// Returns true if the weekday is a day off
    pub fn is_weekend(&self, day: Weekday) -> bool {
        !self.is_working(day)
    }

    /// Number of worked weekdays; never zero
    pub fn days_per_week(&self) -> u64 {
        self.days.iter().filter(|d| **d).count() as u64
    }
}

/// Region code used to select public holidays (e.g. `QLD`, `NZ`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Region(String);

impl Region {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    /// Maps an IANA timezone to the region whose holidays apply
    ///
    /// Unknown timezones map to QLD.
    pub fn from_timezone(timezone: &str) -> Self {
        let code = match timezone {
            "Australia/Brisbane" => "QLD",
            "Australia/Sydney" | "Australia/Melbourne" => "NSW",
            "Australia/Adelaide" => "SA",
            "Australia/Perth" => "WA",
            "Australia/Hobart" => "TAS",
            "Australia/Darwin" => "NT",
            "Pacific/Auckland" => "NZ",
            _ => "QLD",
        };
        Self::new(code)
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of public holiday dates
pub trait HolidayProvider {
    /// Returns the holidays of `region` falling in the given years
    fn holidays(
        &self,
        region: &Region,
        years: RangeInclusive<i32>,
    ) -> Result<BTreeSet<NaiveDate>, CalendarError>;
}

/// A fixed list of holidays, applied to every region
impl HolidayProvider for BTreeSet<NaiveDate> {
    fn holidays(
        &self,
        _region: &Region,
        years: RangeInclusive<i32>,
    ) -> Result<BTreeSet<NaiveDate>, CalendarError> {
        Ok(self
            .iter()
            .filter(|d| years.contains(&d.year()))
            .copied()
            .collect())
    }
}

/// Business-day calendar for one scheduling session
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    week: WorkWeek,
    holidays: Arc<BTreeSet<NaiveDate>>,
}

impl Calendar {
    /// Monday to Friday, no holidays
    pub fn weekends_only() -> Self {
        Self::default()
    }

    /// Creates a calendar from a work week and holiday set
    pub fn new(week: WorkWeek, holidays: BTreeSet<NaiveDate>) -> Self {
        Self {
            week,
            holidays: Arc::new(holidays),
        }
    }

    /// Loads holidays from a provider, degrading to the work week alone
    /// when the provider is unavailable
    pub fn load(
        week: WorkWeek,
        provider: &dyn HolidayProvider,
        region: &Region,
        years: RangeInclusive<i32>,
    ) -> Self {
        match provider.holidays(region, years.clone()) {
            Ok(holidays) => {
                debug!(
                    "Loaded {} holidays for {} ({}-{})",
                    holidays.len(),
                    region,
                    years.start(),
                    years.end()
                );
                Self::new(week, holidays)
            }
            Err(e) => {
                warn!("{}; scheduling with weekends only", e);
                Self::new(week, BTreeSet::new())
            }
        }
    }

    pub fn work_week(&self) -> &WorkWeek {
        &self.week
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    /// Returns true if the date falls on a day off in the work week
    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        self.week.is_weekend(date.weekday())
    }

    /// Returns true if the date is a public holiday
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Returns true unless the date is a weekend or a holiday
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !self.is_weekend(date) && !self.is_holiday(date)
    }

    /// Shifts a date by `n` working days
    ///
    /// Counts only working days in the direction of `n`. `n = 0` returns the
    /// date unchanged, even when it is not itself a working day. Shifts past
    /// the representable range stop at `NaiveDate::MAX` or `NaiveDate::MIN`.
    pub fn add_business_days(&self, date: NaiveDate, n: i64) -> NaiveDate {
        let forward = n > 0;
        let edge = if forward { NaiveDate::MAX } else { NaiveDate::MIN };
        let per_week = self.week.days_per_week();
        let mut current = date;
        let mut remaining = n.unsigned_abs();

        // Whole weeks at once; only holidays inside the jump are recounted
        while remaining > per_week {
            let weeks = (remaining - 1) / per_week;
            let jump = Days::new(weeks.saturating_mul(7));
            let target = if forward {
                current.checked_add_days(jump)
            } else {
                current.checked_sub_days(jump)
            };
            let Some(target) = target else {
                return edge;
            };
            remaining -= weeks * per_week - self.holidays_on_workdays(current, target);
            current = target;
        }

        while remaining > 0 && current != edge {
            current = if forward {
                step_forward(current)
            } else {
                step_backward(current)
            };
            if self.is_working_day(current) {
                remaining -= 1;
            }
        }

        current
    }

    /// Signed count of working days from `from` to `to`
    ///
    /// Counts working days in `(from, to]` going forward and in `[to, from)`
    /// going backward, so `add_business_days(from, n)` lands on `to` when
    /// both are working days.
    pub fn business_days_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        if to >= from {
            self.working_days_after(from, to)
        } else {
            let day = |d: NaiveDate| i64::from(self.is_working_day(d));
            -(self.working_days_after(to, from) + day(to) - day(from))
        }
    }

    /// Working days in `(from, to]`, for `from <= to`
    fn working_days_after(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let weeks = to.signed_duration_since(from).num_days() / 7;
        let tail_start = from
            .checked_add_days(Days::new(weeks.unsigned_abs() * 7))
            .unwrap_or(to);
        let tail = tail_start
            .iter_days()
            .skip(1)
            .take_while(|d| *d <= to)
            .filter(|d| !self.is_weekend(*d))
            .count() as u64;

        let worked = weeks.unsigned_abs() * self.week.days_per_week() + tail;
        (worked - self.holidays_on_workdays(from, to)) as i64
    }

    /// Holidays on worked weekdays strictly after `from`, up to and including `to`
    ///
    /// Either argument may be the later one.
    fn holidays_on_workdays(&self, from: NaiveDate, to: NaiveDate) -> u64 {
        if from == to {
            return 0;
        }
        let range = if from < to {
            (Bound::Excluded(from), Bound::Included(to))
        } else {
            (Bound::Included(to), Bound::Excluded(from))
        };
        self.holidays
            .range(range)
            .filter(|d| !self.is_weekend(**d))
            .count() as u64
    }

    /// Returns the date itself if it is a working day, otherwise the next
    /// working day after it
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_working_day(current) && current != NaiveDate::MAX {
            current = step_forward(current);
        }
        current
    }

    /// Lists the non-working days in a date range with the reason
    pub fn days_off(&self, range: RangeInclusive<NaiveDate>) -> Vec<(NaiveDate, DayOff)> {
        let (start, end) = range.into_inner();
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter_map(|d| {
                if self.is_holiday(d) {
                    Some((d, DayOff::Holiday))
                } else if self.is_weekend(d) {
                    Some((d, DayOff::Weekend))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Why a date is not worked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOff {
    Weekend,
    Holiday,
}

fn step_forward(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

fn step_backward(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN)
}
