//! Period resolution: turns a period request into an inclusive date range.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::{PeriodParts, PeriodType};

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if end < start {
            return Err(AppError::validation(
                "end_date",
                format!("end date {} precedes start date {}", end, start),
            ));
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Half-open UTC window `[start 00:00, end+1 00:00)` in the reporting zone.
    pub fn utc_window(&self, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        let lower = local_midnight(self.start, offset);
        let upper = self
            .end
            .checked_add_days(Days::new(1))
            .map(|d| local_midnight(d, offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (lower, upper)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    // Fixed offsets have no gaps or folds.
    match offset.from_local_datetime(&naive).single() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Resolve a period request into an inclusive date range.
pub fn resolve_period(period_type: PeriodType, parts: &PeriodParts) -> Result<DateRange, AppError> {
    let year = parts
        .year
        .ok_or_else(|| AppError::validation("year", "year is required"))?;

    match period_type {
        PeriodType::Day => {
            let month = require_month(parts)?;
            let day = parts
                .day
                .ok_or_else(|| AppError::validation("day", "day is required for a day period"))?;
            let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                AppError::validation(
                    "day",
                    format!("{:04}-{:02}-{:02} is not a calendar date", year, month, day),
                )
            })?;
            Ok(DateRange {
                start: date,
                end: date,
            })
        }
        PeriodType::Week => {
            let week = parts.week.ok_or_else(|| {
                AppError::validation("week", "ISO week number is required for a week period")
            })?;
            let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
                AppError::validation(
                    "week",
                    format!("week {} does not exist in ISO year {}", week, year),
                )
            })?;
            let sunday = monday
                .checked_add_days(Days::new(6))
                .ok_or_else(|| AppError::validation("week", "week is out of range"))?;
            Ok(DateRange {
                start: monday,
                end: sunday,
            })
        }
        PeriodType::Month => {
            let month = require_month(parts)?;
            month_range(year, month)
        }
        PeriodType::Year => {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or_else(|| AppError::validation("year", format!("year {} is out of range", year)))?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31)
                .ok_or_else(|| AppError::validation("year", format!("year {} is out of range", year)))?;
            Ok(DateRange { start, end })
        }
    }
}

/// First through last day of a calendar month.
pub fn month_range(year: i32, month: u32) -> Result<DateRange, AppError> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AppError::validation("month", format!("month {} is not between 1 and 12", month))
    })?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let end = next_month
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| AppError::validation("year", format!("year {} is out of range", year)))?;
    Ok(DateRange { start, end })
}

/// The calendar month before the one containing `date`.
pub fn previous_month(date: NaiveDate) -> (i32, u32) {
    if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    }
}

fn require_month(parts: &PeriodParts) -> Result<u32, AppError> {
    let month = parts
        .month
        .ok_or_else(|| AppError::validation("month", "month is required"))?;
    if !(1..=12).contains(&month) {
        return Err(AppError::validation(
            "month",
            format!("month {} is not between 1 and 12", month),
        ));
    }
    Ok(month)
}
