//! Period, interval and fiscal-period resolution.
//!
//! Everything here is pure: callers pass `today`/`now` explicitly, so the
//! results are deterministic and testable without a network or a clock.
//!
//! - [`Period`] - lookback vocabulary (`"1mo"`, `"ytd"`, ...)
//! - [`Interval`] - bar granularity (`"1m"` ... `"1mo"`)
//! - [`FiscalPeriod`] - `(year, month)` reporting period
//! - [`quarterly_periods`] / [`annual_periods`] - statement period generation

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::DataError;

/// Lookback used when a period string is not recognised.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Lookback period for historical queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// One day.
    OneDay,
    /// Five days.
    FiveDays,
    /// One month (30 days).
    #[default]
    OneMonth,
    /// Three months.
    ThreeMonths,
    /// Six months.
    SixMonths,
    /// One year.
    OneYear,
    /// Two years.
    TwoYears,
    /// Five years.
    FiveYears,
    /// Ten years.
    TenYears,
    /// Since January 1 of the current year.
    YearToDate,
    /// Everything the upstream serves, capped at ten years.
    Max,
}

impl Period {
    /// All periods, in the order they are usually presented.
    pub const ALL: [Self; 11] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::TwoYears,
        Self::FiveYears,
        Self::TenYears,
        Self::YearToDate,
        Self::Max,
    ];

    /// Returns the canonical string form (`"1mo"`, `"ytd"`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Number of days to look back from `today`.
    #[must_use]
    pub fn lookback_days(&self, today: NaiveDate) -> i64 {
        match self {
            Self::OneDay => 1,
            Self::FiveDays => 5,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
            Self::TwoYears => 730,
            Self::FiveYears => 1825,
            Self::TenYears | Self::Max => 3650,
            Self::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1)
                .map_or(0, |jan1| (today - jan1).num_days()),
        }
    }

    /// Parses a period, falling back to [`Period::OneMonth`] for unknown input.
    ///
    /// Unknown strings are accepted on purpose: upstream callers pass free-form
    /// periods and a 30-day window is the documented default.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!(period = s, "Unknown period, falling back to {} days", DEFAULT_LOOKBACK_DAYS);
            Self::OneMonth
        })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| DataError::InvalidParameter(format!("Invalid period: {s}")))
    }
}

/// Number of lookback days for a raw period string. Unknown periods yield
/// [`DEFAULT_LOOKBACK_DAYS`].
#[must_use]
pub fn period_days(period: &str, today: NaiveDate) -> i64 {
    Period::parse_lenient(period).lookback_days(today)
}

/// Bar granularity for historical queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// One-minute bars.
    OneMinute,
    /// Three-minute bars.
    ThreeMinutes,
    /// Five-minute bars.
    FiveMinutes,
    /// Fifteen-minute bars.
    FifteenMinutes,
    /// Thirty-minute bars.
    ThirtyMinutes,
    /// Forty-five-minute bars.
    FortyFiveMinutes,
    /// Hourly bars.
    OneHour,
    /// Daily bars.
    #[default]
    OneDay,
    /// Weekly bars.
    OneWeek,
    /// Monthly bars.
    OneMonth,
}

impl Interval {
    /// All intervals, finest first.
    pub const ALL: [Self; 10] = [
        Self::OneMinute,
        Self::ThreeMinutes,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::FortyFiveMinutes,
        Self::OneHour,
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
    ];

    /// Returns the canonical string form (`"1m"`, `"1wk"`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::FortyFiveMinutes => "45m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::OneWeek => "1wk",
            Self::OneMonth => "1mo",
        }
    }

    /// Granularity in minutes.
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        match self {
            Self::OneMinute => 1,
            Self::ThreeMinutes => 3,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::FortyFiveMinutes => 45,
            Self::OneHour => 60,
            Self::OneDay => 1440,
            Self::OneWeek => 10080,
            Self::OneMonth => 43200,
        }
    }

    /// Returns true for intervals shorter than a day.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        self.minutes() < 1440
    }

    /// Parses an interval, falling back to daily bars for unknown input.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!(interval = s, "Unknown interval, falling back to daily bars");
            Self::OneDay
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == needle)
            .ok_or_else(|| DataError::InvalidParameter(format!("Invalid interval: {s}")))
    }
}

/// Resolves a request window. Explicit bounds win over the period.
///
/// `end` defaults to `now`; `start` defaults to `end` minus the period lookback,
/// with the lookback measured against `end`'s calendar date.
#[must_use]
pub fn resolve_window(
    period: Period,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = end.unwrap_or(now);
    let start =
        start.unwrap_or_else(|| end - TimeDelta::days(period.lookback_days(end.date_naive())));
    (start, end)
}

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Annual,
    /// Quarterly reporting period.
    Quarterly,
}

impl PeriodType {
    /// Short label used in cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

/// A reporting period: fiscal year plus the closing month of the period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiscalPeriod {
    /// Fiscal year.
    pub year: i32,
    /// Closing month: 3, 6, 9 or 12.
    pub month: u32,
}

impl FiscalPeriod {
    /// Creates a period, rejecting months that do not close a quarter.
    pub fn new(year: i32, month: u32) -> crate::Result<Self> {
        if matches!(month, 3 | 6 | 9 | 12) {
            Ok(Self { year, month })
        } else {
            Err(DataError::InvalidParameter(format!(
                "Fiscal period month must be 3, 6, 9 or 12, got {month}"
            )))
        }
    }

    /// Quarter number (1-4).
    #[must_use]
    pub const fn quarter(&self) -> u32 {
        self.month / 3
    }

    /// The period three months earlier.
    #[must_use]
    pub const fn previous_quarter(&self) -> Self {
        if self.month <= 3 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 3,
            }
        }
    }

    /// Column label: `"2024"` for annual data, `"2024Q3"` for quarterly data.
    #[must_use]
    pub fn label(&self, period_type: PeriodType) -> String {
        match period_type {
            PeriodType::Annual => self.year.to_string(),
            PeriodType::Quarterly => format!("{}Q{}", self.year, self.quarter()),
        }
    }
}

/// Latest quarter whose statements are published as of `today`.
///
/// Statements appear 45-75 days after quarter end, so the anchor lags the
/// calendar: Jan-Feb see Q3 of last year, Mar-May Q4 of last year, Jun-Aug Q1,
/// Sep-Nov Q2 and December Q3 of the current year.
#[must_use]
pub fn latest_available_quarter(today: NaiveDate) -> FiscalPeriod {
    latest_available_quarter_for(today.year(), today.month())
}

const fn latest_available_quarter_for(year: i32, month: u32) -> FiscalPeriod {
    match month {
        1 | 2 => FiscalPeriod {
            year: year - 1,
            month: 9,
        },
        3..=5 => FiscalPeriod {
            year: year - 1,
            month: 12,
        },
        6..=8 => FiscalPeriod { year, month: 3 },
        9..=11 => FiscalPeriod { year, month: 6 },
        _ => FiscalPeriod { year, month: 9 },
    }
}

/// The `count` most recent published quarters, newest first. The walk stops
/// at the earliest year a [`NaiveDate`] can hold.
#[must_use]
pub fn quarterly_periods(today: NaiveDate, count: usize) -> Vec<FiscalPeriod> {
    let earliest = NaiveDate::MIN.year();
    std::iter::successors(Some(latest_available_quarter(today)), |p| {
        Some(p.previous_quarter())
    })
    .take_while(|p| p.year >= earliest)
    .take(count)
    .collect()
}

/// The `count` most recent completed years, newest first. The current year is
/// never included because its annual figures are not final yet.
#[must_use]
pub fn annual_periods(today: NaiveDate, count: usize) -> Vec<FiscalPeriod> {
    let earliest = NaiveDate::MIN.year();
    std::iter::successors(today.year().checked_sub(1), |year| year.checked_sub(1))
        .take_while(|&year| year >= earliest)
        .take(count)
        .map(|year| FiscalPeriod { year, month: 12 })
        .collect()
}

/// Dispatches to [`quarterly_periods`] or [`annual_periods`].
#[must_use]
pub fn fiscal_periods(
    today: NaiveDate,
    period_type: PeriodType,
    count: usize,
) -> Vec<FiscalPeriod> {
    match period_type {
        PeriodType::Annual => annual_periods(today, count),
        PeriodType::Quarterly => quarterly_periods(today, count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_table() {
        let today = date(2025, 6, 15);
        let expected = [
            ("1d", 1),
            ("5d", 5),
            ("1mo", 30),
            ("3mo", 90),
            ("6mo", 180),
            ("1y", 365),
            ("2y", 730),
            ("5y", 1825),
            ("10y", 3650),
            ("max", 3650),
        ];
        for (raw, days) in expected {
            assert_eq!(period_days(raw, today), days, "period {raw}");
        }
    }

    #[test]
    fn test_ytd_counts_days_since_january_first() {
        assert_eq!(period_days("ytd", date(2025, 1, 1)), 0);
        assert_eq!(period_days("ytd", date(2025, 2, 1)), 31);
        assert_eq!(period_days("ytd", date(2024, 12, 31)), 365);
    }

    #[test]
    fn test_unknown_period_falls_back_to_thirty_days() {
        assert_eq!(period_days("3w", date(2025, 6, 15)), DEFAULT_LOOKBACK_DAYS);
        assert!("3w".parse::<Period>().is_err());
        assert_eq!("1MO".parse::<Period>().unwrap(), Period::OneMonth);
    }

    #[test]
    fn test_interval_table() {
        let expected = [
            ("1m", 1),
            ("3m", 3),
            ("5m", 5),
            ("15m", 15),
            ("30m", 30),
            ("45m", 45),
            ("1h", 60),
            ("1d", 1440),
            ("1wk", 10080),
            ("1mo", 43200),
        ];
        for (raw, minutes) in expected {
            assert_eq!(Interval::parse_lenient(raw).minutes(), minutes, "interval {raw}");
        }
        assert_eq!(Interval::parse_lenient("2d"), Interval::OneDay);
        assert!(Interval::OneHour.is_intraday());
        assert!(!Interval::OneWeek.is_intraday());
    }

    #[test]
    fn test_one_month_window_ends_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 14, 30, 0).unwrap();
        let (start, end) = resolve_window(Period::OneMonth, None, None, now);
        assert_eq!(end, now);
        assert_eq!(end - start, TimeDelta::days(30));
    }

    #[test]
    fn test_explicit_bounds_override_period() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(
            resolve_window(Period::FiveYears, Some(start), Some(end), now),
            (start, end)
        );

        let (s, e) = resolve_window(Period::FiveDays, None, Some(end), now);
        assert_eq!(e, end);
        assert_eq!(s, end - TimeDelta::days(5));
    }

    #[test]
    fn test_latest_available_quarter_follows_lag_calendar() {
        let expected = [
            (1, 2024, 9),
            (2, 2024, 9),
            (3, 2024, 12),
            (4, 2024, 12),
            (5, 2024, 12),
            (6, 2025, 3),
            (7, 2025, 3),
            (8, 2025, 3),
            (9, 2025, 6),
            (10, 2025, 6),
            (11, 2025, 6),
            (12, 2025, 9),
        ];
        for (month, year, period) in expected {
            let anchor = latest_available_quarter(date(2025, month, 1));
            assert_eq!(anchor, FiscalPeriod { year, month: period }, "month {month}");
            assert!(matches!(anchor.month, 3 | 6 | 9 | 12));
        }
    }

    #[test]
    fn test_quarterly_periods_in_february() {
        let periods = quarterly_periods(date(2025, 2, 14), 5);
        let pairs: Vec<(i32, u32)> = periods.iter().map(|p| (p.year, p.month)).collect();
        assert_eq!(
            pairs,
            vec![(2024, 9), (2024, 6), (2024, 3), (2023, 12), (2023, 9)]
        );
    }

    #[test]
    fn test_backward_walk_decrements_year_once_per_four_steps() {
        for month in 1..=12 {
            let today = date(2025, month, 10);
            let periods = quarterly_periods(today, 40);
            assert_eq!(periods.len(), 40);
            for pair in periods.windows(2) {
                assert!(matches!(pair[1].month, 3 | 6 | 9 | 12));
                assert_eq!(pair[1], pair[0].previous_quarter());
            }
            for chunk in periods.windows(5) {
                assert_eq!(chunk[0].year - chunk[4].year, 1);
            }
        }
    }

    #[test]
    fn test_annual_periods_exclude_current_year() {
        let periods = annual_periods(date(2025, 10, 1), 3);
        assert_eq!(
            periods,
            vec![
                FiscalPeriod { year: 2024, month: 12 },
                FiscalPeriod { year: 2023, month: 12 },
                FiscalPeriod { year: 2022, month: 12 },
            ]
        );
    }

    #[test]
    fn test_huge_counts_stop_at_earliest_year() {
        let today = date(2025, 10, 1);
        let earliest = NaiveDate::MIN.year();

        let annual = annual_periods(today, usize::MAX);
        assert_eq!(annual.len(), usize::try_from(2024 - earliest + 1).unwrap());
        assert_eq!(annual.first(), Some(&FiscalPeriod { year: 2024, month: 12 }));
        assert_eq!(annual.last(), Some(&FiscalPeriod { year: earliest, month: 12 }));

        let quarterly = quarterly_periods(today, usize::MAX);
        assert_eq!(quarterly.last(), Some(&FiscalPeriod { year: earliest, month: 3 }));
        assert_eq!(fiscal_periods(today, PeriodType::Annual, usize::MAX), annual);
    }

    #[test]
    fn test_fiscal_period_labels() {
        let p = FiscalPeriod::new(2024, 9).unwrap();
        assert_eq!(p.label(PeriodType::Quarterly), "2024Q3");
        assert_eq!(p.label(PeriodType::Annual), "2024");
        assert!(FiscalPeriod::new(2024, 7).is_err());
    }
}
