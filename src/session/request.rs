use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_DURATION_SECS: u64 = 60;
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 0.1;
pub const DEFAULT_CLOCK_TIME: ClockTime = ClockTime::from_hm(12, 0);
pub const DEFAULT_START_DATE: StartDate = StartDate {
    year: 2024,
    month: 1,
    day: 1,
};
pub const MAX_LABEL_CHARS: usize = 20;

const SECS_PER_DAY: u32 = 86_400;

/// Wall-clock time of day the first sample is stamped with, second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    secs_of_day: u32,
}

impl ClockTime {
    pub const fn from_hm(hours: u32, minutes: u32) -> Self {
        Self {
            secs_of_day: (hours * 3600 + minutes * 60) % SECS_PER_DAY,
        }
    }

    /// Accepts `HH:MM` and `HH:MM:SS`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split(':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minutes: u32 = parts.next()?.parse().ok()?;
        let seconds: u32 = match parts.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() || hours > 23 || minutes > 59 || seconds > 59 {
            return None;
        }
        Some(Self {
            secs_of_day: hours * 3600 + minutes * 60 + seconds,
        })
    }

    pub fn secs_of_day(&self) -> u32 {
        self.secs_of_day
    }

    /// Shift forward, wrapping at midnight.
    pub fn offset_by(&self, secs: u64) -> Self {
        let day = u64::from(SECS_PER_DAY);
        let wrapped = (u64::from(self.secs_of_day) + secs % day) % day;
        Self {
            secs_of_day: wrapped as u32,
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.secs_of_day;
        write!(f, "{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl StartDate {
    /// `YYYY-MM-DD`; month and day are range checked, not calendar checked.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let year: i32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Self { year, month, day })
    }
}

impl fmt::Display for StartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Parameters of one logging session, built per HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingRequest {
    pub duration_s: u64,
    pub sample_rate_hz: f64,
    pub label: String,
    pub clock_time: ClockTime,
    pub start_date: StartDate,
}

impl LoggingRequest {
    /// Missing or unusable fields fall back to defaults instead of failing.
    pub fn from_form(form: &HashMap<String, String>, default_label: &str) -> Self {
        let duration_s = form
            .get("duration")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_DURATION_SECS);
        let sample_rate_hz = form
            .get("sample_rate")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(DEFAULT_SAMPLE_RATE_HZ);
        let clock_time = form
            .get("clock_time")
            .and_then(|v| ClockTime::parse(v))
            .unwrap_or(DEFAULT_CLOCK_TIME);
        let start_date = form
            .get("date")
            .and_then(|v| StartDate::parse(v))
            .unwrap_or(DEFAULT_START_DATE);
        let label = form
            .get("label")
            .map(|v| sanitize_label(v))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| default_label.to_string());

        Self {
            duration_s,
            sample_rate_hz,
            label,
            clock_time,
            start_date,
        }
    }

    pub fn total_samples(&self) -> u64 {
        (self.duration_s as f64 * self.sample_rate_hz).floor() as u64
    }

    pub fn interval_secs(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }
}

/// Truncate to the label limit and keep the artifact inside the log directory.
fn sanitize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .take(MAX_LABEL_CHARS)
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
