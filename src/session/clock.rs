use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::request::{ClockTime, StartDate};

const MS_PER_DAY: u64 = 86_400_000;

/// How sample timestamps advance the date past midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRollover {
    /// Every month is treated as 30 days long. Matches logs produced by the
    /// deployed firmware.
    #[default]
    FixedThirtyDay,
    /// Proleptic Gregorian calendar.
    Calendar,
}

impl DateRollover {
    pub fn advance(self, date: StartDate, days: u64) -> StartDate {
        if days == 0 {
            return date;
        }
        match self {
            DateRollover::FixedThirtyDay => advance_fixed(date, days),
            DateRollover::Calendar => advance_calendar(date, days)
                .unwrap_or_else(|| advance_fixed(date, days)),
        }
    }
}

fn advance_fixed(date: StartDate, days: u64) -> StartDate {
    let day0 = u64::from(date.day.saturating_sub(1)).saturating_add(days);
    let month0 = u64::from(date.month.saturating_sub(1)) + day0 / 30;
    let years = i32::try_from(month0 / 12).unwrap_or(i32::MAX);
    StartDate {
        year: date.year.saturating_add(years),
        month: (month0 % 12) as u32 + 1,
        day: (day0 % 30) as u32 + 1,
    }
}

fn advance_calendar(date: StartDate, days: u64) -> Option<StartDate> {
    use chrono::Datelike;

    let next = NaiveDate::from_ymd_opt(date.year, date.month, date.day)?
        .checked_add_days(Days::new(days))?;
    Some(StartDate {
        year: next.year(),
        month: next.month(),
        day: next.day(),
    })
}

/// Synthetic timestamp of a sample taken `offset_secs` after the session's
/// nominal start, formatted `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn sample_timestamp(
    date: StartDate,
    clock: ClockTime,
    offset_secs: f64,
    rollover: DateRollover,
) -> String {
    let total_ms = (u64::from(clock.secs_of_day()) * 1000)
        .saturating_add((offset_secs * 1000.0).round() as u64);
    let day_offset = total_ms / MS_PER_DAY;
    let ms_in_day = total_ms % MS_PER_DAY;

    let hours = ms_in_day / 3_600_000;
    let minutes = (ms_in_day % 3_600_000) / 60_000;
    let seconds = (ms_in_day % 60_000) / 1000;
    let millis = ms_in_day % 1000;

    format!(
        "{} {:02}:{:02}:{:02}.{:03}",
        rollover.advance(date, day_offset),
        hours,
        minutes,
        seconds,
        millis
    )
}
