//! Time dimension of temporal WMS layers: an interval stepped by an ISO-8601 period.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the time dimension.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    /// The interval string is not `start/end` or its bounds are not ISO-8601 dates.
    #[error("Invalid time interval `{0}`")]
    InvalidInterval(String),

    /// The period string is not an ISO-8601 duration, or is zero.
    #[error("Invalid time period `{0}`")]
    InvalidPeriod(String),

    /// The requested instant lies before the start or after the end of the interval.
    #[error("Time {requested} is out of range [{start}, {end}]")]
    OutOfRange {
        /// The rejected instant.
        requested: DateTime<Utc>,
        /// Interval start.
        start: DateTime<Utc>,
        /// Interval end.
        end: DateTime<Utc>,
    },

    /// The requested instant lies inside the interval but not on a step.
    #[error("Time {0} is not one of the available time steps")]
    OffStep(DateTime<Utc>),

    /// The interval holds more steps than a slider can offer.
    #[error("Time interval `{interval}` has more than {limit} steps")]
    TooManySteps {
        /// The rejected interval.
        interval: String,
        /// Largest accepted number of steps.
        limit: usize,
    },

    /// The layer has no time dimension.
    #[error("Layer `{0}` has no time dimension")]
    NotTemporal(String),
}

/// An ISO-8601 duration limited to what time sliders use: years, months, weeks, days and a
/// time part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Period {
    /// Calendar months (years are folded in).
    pub months: u32,
    /// Whole days (weeks are folded in).
    pub days: u32,
    /// Seconds of the time part.
    pub seconds: u32,
}

impl Period {
    fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.seconds == 0
    }

    /// Adds one period to `t`. `None` on overflow.
    pub fn add_to(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        t.checked_add_months(Months::new(self.months))?
            .checked_add_signed(Duration::days(self.days as i64))?
            .checked_add_signed(Duration::seconds(self.seconds as i64))
    }
}

impl FromStr for Period {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError::InvalidPeriod(s.to_string());
        let body = s.strip_prefix('P').ok_or_else(invalid)?;

        let mut period = Period::default();
        let mut in_time = false;
        let mut number = String::new();
        for c in body.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            if c == 'T' {
                if in_time || !number.is_empty() {
                    return Err(invalid());
                }
                in_time = true;
                continue;
            }
            let n: u32 = number.parse().map_err(|_| invalid())?;
            number.clear();
            let (field, scale) = match (in_time, c) {
                (false, 'Y') => (&mut period.months, 12),
                (false, 'M') => (&mut period.months, 1),
                (false, 'W') => (&mut period.days, 7),
                (false, 'D') => (&mut period.days, 1),
                (true, 'H') => (&mut period.seconds, 3600),
                (true, 'M') => (&mut period.seconds, 60),
                (true, 'S') => (&mut period.seconds, 1),
                _ => return Err(invalid()),
            };
            let sum = n
                .checked_mul(scale)
                .and_then(|v| v.checked_add(*field))
                .ok_or_else(invalid)?;
            *field = sum;
        }
        if !number.is_empty() || period.is_zero() {
            return Err(invalid());
        }
        Ok(period)
    }
}

/// Parses `2009-10-01` or a full RFC 3339 timestamp.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Largest number of available instants in one dimension.
pub const MAX_TIME_STEPS: usize = 10_000;

/// The time dimension state shared by the time slider and the temporal layers it drives.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeDimension {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: Period,
    times: Vec<DateTime<Utc>>,
    current: usize,
}

impl TimeDimension {
    /// Builds a dimension from an ISO-8601 interval (`start/end`) and period (`P1M`).
    /// The current instant starts at the interval start.
    pub fn new(interval: &str, period: &str) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidInterval(interval.to_string());
        let (start, end) = interval.split_once('/').ok_or_else(invalid)?;
        let start = parse_instant(start).ok_or_else(invalid)?;
        let end = parse_instant(end).ok_or_else(invalid)?;
        if end < start {
            return Err(invalid());
        }
        let period: Period = period.parse()?;

        let mut times = vec![start];
        let mut t = start;
        while let Some(next) = period.add_to(t) {
            if next > end {
                break;
            }
            if times.len() == MAX_TIME_STEPS {
                return Err(TimeError::TooManySteps {
                    interval: interval.to_string(),
                    limit: MAX_TIME_STEPS,
                });
            }
            times.push(next);
            t = next;
        }

        Ok(Self {
            start,
            end,
            period,
            times,
            current: 0,
        })
    }

    /// Interval start.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Interval end.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Step between available instants.
    pub fn period(&self) -> Period {
        self.period
    }

    /// All instants reachable from the start by whole steps, up to the end.
    pub fn available_times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// The currently selected instant.
    pub fn current(&self) -> DateTime<Utc> {
        self.times[self.current]
    }

    /// Index of the current instant in [`Self::available_times`].
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Checks that `t` is an available instant and returns its index.
    pub fn check(&self, t: DateTime<Utc>) -> Result<usize, TimeError> {
        if t < self.start || t > self.end {
            return Err(TimeError::OutOfRange {
                requested: t,
                start: self.start,
                end: self.end,
            });
        }
        self.times
            .binary_search(&t)
            .map_err(|_| TimeError::OffStep(t))
    }

    /// Selects `t`. The state is unchanged if `t` is rejected.
    pub fn set_current(&mut self, t: DateTime<Utc>) -> Result<(), TimeError> {
        self.current = self.check(t)?;
        Ok(())
    }

    /// The instant one step after the current one, if any.
    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.times.get(self.current + 1).copied()
    }

    /// The instant one step before the current one, if any.
    pub fn previous(&self) -> Option<DateTime<Utc>> {
        self.current
            .checked_sub(1)
            .and_then(|i| self.times.get(i).copied())
    }
}

impl fmt::Display for TimeDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.current().format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn snow() -> TimeDimension {
        TimeDimension::new("2009-10-01/2009-12-01", "P1M").unwrap()
    }

    #[test]
    fn monthly_steps() {
        let dim = snow();
        assert_eq!(
            dim.available_times(),
            &[date(2009, 10, 1), date(2009, 11, 1), date(2009, 12, 1)]
        );
        assert_eq!(dim.current(), date(2009, 10, 1));
        assert_eq!(dim.to_string(), "2009-10-01");
    }

    #[test]
    fn set_current_inside_interval() {
        let mut dim = snow();
        dim.set_current(date(2009, 11, 1)).unwrap();
        assert_eq!(dim.current(), date(2009, 11, 1));
        assert_eq!(dim.current_index(), 1);
        assert_eq!(dim.next(), Some(date(2009, 12, 1)));
        assert_eq!(dim.previous(), Some(date(2009, 10, 1)));
    }

    #[test]
    fn rejects_instants_outside_interval() {
        let mut dim = snow();
        dim.set_current(date(2009, 11, 1)).unwrap();

        let before = dim.set_current(date(2009, 9, 30));
        assert!(matches!(before, Err(TimeError::OutOfRange { .. })));
        let after = dim.set_current(date(2009, 12, 2));
        assert!(matches!(after, Err(TimeError::OutOfRange { .. })));

        // Rejections leave the selection untouched.
        assert_eq!(dim.current(), date(2009, 11, 1));
    }

    #[test]
    fn rejects_instants_between_steps() {
        let mut dim = snow();
        assert_eq!(
            dim.set_current(date(2009, 11, 15)),
            Err(TimeError::OffStep(date(2009, 11, 15)))
        );
    }

    #[test]
    fn end_not_on_step_is_excluded() {
        let dim = TimeDimension::new("2020-01-01/2020-01-20", "P1W").unwrap();
        assert_eq!(dim.available_times().len(), 3);
        assert_eq!(dim.available_times()[2], date(2020, 1, 15));
    }

    #[test]
    fn parses_periods() {
        assert_eq!("P1M".parse(), Ok(Period { months: 1, days: 0, seconds: 0 }));
        assert_eq!("P1Y2D".parse(), Ok(Period { months: 12, days: 2, seconds: 0 }));
        assert_eq!("PT1H30M".parse(), Ok(Period { months: 0, days: 0, seconds: 5400 }));
        assert_eq!("P1DT6H".parse(), Ok(Period { months: 0, days: 1, seconds: 21600 }));
        assert!("1M".parse::<Period>().is_err());
        assert!("P".parse::<Period>().is_err());
        assert!("P0D".parse::<Period>().is_err());
        assert!("P1X".parse::<Period>().is_err());
        assert!("P1".parse::<Period>().is_err());
    }

    #[test]
    fn rejects_bad_intervals() {
        assert!(matches!(
            TimeDimension::new("2009-10-01", "P1M"),
            Err(TimeError::InvalidInterval(_))
        ));
        assert!(matches!(
            TimeDimension::new("2009-12-01/2009-10-01", "P1M"),
            Err(TimeError::InvalidInterval(_))
        ));
        assert!(matches!(
            TimeDimension::new("2009-10-01/2009-12-01", "monthly"),
            Err(TimeError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn oversized_period_is_invalid() {
        assert!(matches!(
            TimeDimension::new("2009-10-01/2009-12-01", "P400000000Y"),
            Err(TimeError::InvalidPeriod(_))
        ));
        assert!(matches!(
            "PT1H4294967295S".parse::<Period>(),
            Err(TimeError::InvalidPeriod(_))
        ));
        assert_eq!(
            "P1Y2M".parse::<Period>(),
            Ok(Period {
                months: 14,
                days: 0,
                seconds: 0
            })
        );
    }

    #[test]
    fn step_count_is_capped() {
        assert!(matches!(
            TimeDimension::new("1970-01-01/2100-01-01", "PT1S"),
            Err(TimeError::TooManySteps { limit: MAX_TIME_STEPS, .. })
        ));
        let daily = TimeDimension::new("2000-01-01/2020-12-31", "P1D").unwrap();
        assert_eq!(daily.available_times().len(), 7671);
    }

    #[test]
    fn parses_instants() {
        assert_eq!(parse_instant("2009-10-01"), Some(date(2009, 10, 1)));
        assert_eq!(
            parse_instant("2009-10-01T00:00:00.000Z"),
            Some(date(2009, 10, 1))
        );
        assert_eq!(parse_instant("October"), None);
    }
}
