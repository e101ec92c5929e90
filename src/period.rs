//! Time-window resolution and aggregation bucket widths.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DateTime, Days, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::format_duration;
use crate::error::{AnalyticsError, AnalyticsResult};

/// First year covered by the `All` period.
pub const START_YEAR: i32 = 2022;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredefinedPeriod {
    LastHour,
    LastDay,
    LastMonth,
    LastThreeMonths,
    YearToDate,
    All,
}

impl FromStr for PredefinedPeriod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "last-hour" | "1h" => Ok(Self::LastHour),
            "last-day" | "1d" => Ok(Self::LastDay),
            "last-month" | "1m" => Ok(Self::LastMonth),
            "last-three-months" | "3m" => Ok(Self::LastThreeMonths),
            "year-to-date" | "ytd" => Ok(Self::YearToDate),
            "all" => Ok(Self::All),
            other => Err(AnalyticsError::invalid(format!("unknown period {other:?}"))),
        }
    }
}

/// Explicit window given as RFC3339 strings. An empty end means "now".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPeriod {
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// Either a named period or a custom one. Exactly one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub predefined_period: Option<PredefinedPeriod>,
    #[serde(default)]
    pub custom_period: Option<CustomPeriod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

impl TimeRange {
    pub fn predefined(period: PredefinedPeriod) -> Self {
        Self {
            predefined_period: Some(period),
            custom_period: None,
        }
    }

    pub fn custom(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            predefined_period: None,
            custom_period: Some(CustomPeriod {
                start_date: start_date.into(),
                end_date: end_date.into(),
            }),
        }
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        match (&self.predefined_period, &self.custom_period) {
            (None, None) => Err(AnalyticsError::invalid(
                "time range requires either a predefined or a custom period",
            )),
            (Some(_), Some(_)) => Err(AnalyticsError::invalid(
                "time range must not set both a predefined and a custom period",
            )),
            (None, Some(custom)) => {
                parse_rfc3339("start_date", &custom.start_date)?;
                if !custom.end_date.is_empty() {
                    parse_rfc3339("end_date", &custom.end_date)?;
                }
                Ok(())
            }
            (Some(_), None) => Ok(()),
        }
    }

    /// Resolves the range into concrete instants relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> AnalyticsResult<Window> {
        self.validate()?;

        if let Some(custom) = &self.custom_period {
            let start = parse_rfc3339("start_date", &custom.start_date)?;
            let end = if custom.end_date.is_empty() {
                now
            } else {
                parse_rfc3339("end_date", &custom.end_date)?
            };
            return Ok(Window { start, end });
        }

        let period = self
            .predefined_period
            .ok_or_else(|| AnalyticsError::invalid("missing predefined period"))?;
        let start = match period {
            PredefinedPeriod::LastHour => Some(now - Duration::minutes(60)),
            PredefinedPeriod::LastDay => now.checked_sub_days(Days::new(1)),
            PredefinedPeriod::LastMonth => now.checked_sub_months(Months::new(1)),
            PredefinedPeriod::LastThreeMonths => now.checked_sub_months(Months::new(3)),
            PredefinedPeriod::YearToDate => start_of_year(now.year()),
            PredefinedPeriod::All => start_of_year(START_YEAR),
        }
        .ok_or_else(|| AnalyticsError::invalid(format!("{period:?} is out of range")))?;

        Ok(Window { start, end: now })
    }
}

fn start_of_year(year: i32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()
}

fn parse_rfc3339(field: &str, value: &str) -> AnalyticsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AnalyticsError::invalid(format!("{field} {value:?} is not RFC3339: {e}")))
}

/// Width of the buckets raw samples are averaged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketWidth {
    seconds: i64,
}

impl BucketWidth {
    pub const fn from_secs(seconds: i64) -> Self {
        Self { seconds }
    }

    pub const fn minutes(n: i64) -> Self {
        Self::from_secs(n * 60)
    }

    pub const fn hours(n: i64) -> Self {
        Self::from_secs(n * 3600)
    }

    pub const fn days(n: i64) -> Self {
        Self::from_secs(n * 86_400)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(self.seconds)
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Picks a width that keeps the sample count bounded for a window length.
    pub fn for_window(length: Duration) -> Self {
        if length <= Duration::hours(3) {
            Self::minutes(1)
        } else if length <= Duration::hours(24) {
            Self::hours(1)
        } else if length <= Duration::days(7) {
            Self::hours(6)
        } else if length <= Duration::days(30) {
            Self::hours(12)
        } else if length <= Duration::days(365) {
            Self::days(1)
        } else {
            Self::days(15)
        }
    }

    /// Floors a timestamp to the start of its bucket, aligned to the Unix epoch.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.seconds.max(1);
        let secs = ts.timestamp().div_euclid(width) * width;
        DateTime::from_timestamp(secs, 0).unwrap_or(ts)
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = u64::try_from(self.seconds).unwrap_or(0);
        f.write_str(&format_duration(std::time::Duration::from_secs(secs)))
    }
}

/// Caller-selectable bucket width. `Auto` derives it from the window length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    #[default]
    Auto,
    Hour,
    FourHours,
    Day,
    Week,
    Month,
}

impl TimeFrame {
    pub fn bucket_width(&self, window: &Window) -> BucketWidth {
        match self {
            Self::Auto => BucketWidth::for_window(window.length()),
            Self::Hour => BucketWidth::hours(1),
            Self::FourHours => BucketWidth::hours(4),
            Self::Day => BucketWidth::days(1),
            Self::Week => BucketWidth::days(7),
            Self::Month => BucketWidth::days(30),
        }
    }
}

impl FromStr for TimeFrame {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "hour" | "1h" => Ok(Self::Hour),
            "four-hours" | "4h" => Ok(Self::FourHours),
            "day" | "1d" => Ok(Self::Day),
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            other => Err(AnalyticsError::invalid(format!("unknown time frame {other:?}"))),
        }
    }
}
