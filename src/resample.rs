//! Daily to weekly aggregation and trailing high-water marks
//!
//! Weeks start Monday 00:00 on the configured calendar. Sunday belongs to the week that
//! started six days earlier. Bucket times are that local Monday midnight in UTC seconds.

use chrono::{offset::LocalResult, DateTime, Datelike, Days, TimeZone, Utc};

use crate::{OverlayError, PricePoint, OHLCV};

pub const DAY: i64 = 86_400;
pub const WEEK: i64 = 7 * DAY;

// ============================================================
// CALENDAR
// ============================================================

/// Calendar that defines "local" day and week boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum CalendarZone {
    #[default]
    Utc,
    /// Fixed offset east of UTC, in seconds
    Offset(i32),
    Tz(chrono_tz::Tz),
}

fn week_start_day(day: i64) -> Option<i64> {
    day.checked_sub((day + 3).rem_euclid(7))
}

fn utc_week_start(time: i64) -> Option<i64> {
    week_start_day(time.div_euclid(DAY))?.checked_mul(DAY)
}

fn offset_week_start(time: i64, offset: i64) -> Option<i64> {
    let shifted_day = time.checked_add(offset)?.div_euclid(DAY);
    week_start_day(shifted_day)?.checked_mul(DAY)?.checked_sub(offset)
}

fn tz_week_start(time: i64, tz: chrono_tz::Tz) -> Option<i64> {
    let utc = DateTime::<Utc>::from_timestamp(time, 0)?;
    let local = utc.with_timezone(&tz);
    let from_monday = u64::from(local.weekday().num_days_from_monday());
    let midnight = local
        .date_naive()
        .checked_sub_days(Days::new(from_monday))?
        .and_hms_opt(0, 0, 0)?;
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        // Midnight skipped by a DST jump; every day of the week lands here alike
        LocalResult::None => utc_week_start(time),
    }
}

impl CalendarZone {
    /// Start of the week containing `time`, in UTC seconds.
    ///
    /// `None` when that instant is outside the representable range of the calendar.
    pub fn week_start(&self, time: i64) -> Option<i64> {
        match *self {
            CalendarZone::Utc => utc_week_start(time),
            CalendarZone::Offset(seconds) => offset_week_start(time, i64::from(seconds)),
            CalendarZone::Tz(tz) => tz_week_start(time, tz),
        }
    }
}

// ============================================================
// WEEKLY AGGREGATION
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResampleAggregator {
    pub zone: CalendarZone,
}

impl ResampleAggregator {
    pub fn new(zone: CalendarZone) -> Self {
        Self { zone }
    }

    /// Aggregate ascending daily bars into weekly bars.
    ///
    /// A bucket is flushed whenever the week start changes, so input order is honored
    /// as given. Volume is the sum of the days that report one, or `None` if none do.
    /// Bars whose week start cannot be represented are dropped.
    pub fn weekly<T: OHLCV>(&self, daily: &[T]) -> Vec<PricePoint> {
        let mut out: Vec<PricePoint> = Vec::new();
        let mut current: Option<PricePoint> = None;
        let mut dropped = 0usize;

        for day in daily {
            let Some(start) = self.zone.week_start(day.time()) else {
                dropped += 1;
                continue;
            };
            if let Some(week) = current.as_mut().filter(|w| w.time == start) {
                week.high = week.high.max(day.high());
                week.low = week.low.min(day.low());
                week.close = day.close();
                week.volume = match (week.volume, day.volume()) {
                    (Some(a), Some(b)) => Some(a.saturating_add(b)),
                    (a, b) => a.or(b),
                };
                continue;
            }
            out.extend(current.take());
            current = Some(PricePoint {
                time: start,
                open: day.open(),
                high: day.high(),
                low: day.low(),
                close: day.close(),
                volume: day.volume(),
            });
        }
        out.extend(current);

        if dropped > 0 {
            tracing::warn!(dropped, zone = ?self.zone, "dropped bars outside the calendar range");
        }
        tracing::trace!(days = daily.len(), weeks = out.len(), zone = ?self.zone, "weekly resample");
        out
    }
}

/// Aggregate daily bars into weekly bars on the given calendar.
pub fn resample_weekly<T: OHLCV>(daily: &[T], zone: &CalendarZone) -> Vec<PricePoint> {
    ResampleAggregator::new(*zone).weekly(daily)
}

// ============================================================
// TIMEFRAME
// ============================================================

/// Chart interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1D")]
    Daily,
    #[serde(rename = "1W")]
    Weekly,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Daily => "1D",
            Timeframe::Weekly => "1W",
        }
    }

    /// Turn daily history into this interval.
    pub fn apply(&self, daily: &[PricePoint], zone: &CalendarZone) -> Vec<PricePoint> {
        match self {
            Timeframe::Daily => daily.to_vec(),
            Timeframe::Weekly => resample_weekly(daily, zone),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "d" | "daily" => Ok(Timeframe::Daily),
            "1w" | "w" | "weekly" => Ok(Timeframe::Weekly),
            _ => Err(OverlayError::InvalidValue("unknown timeframe")),
        }
    }
}

// ============================================================
// HIGH-WATER MARKS
// ============================================================

/// Highest `high` over bars within `window_secs` of the latest bar.
pub fn trailing_high<T: OHLCV>(bars: &[T], window_secs: i64) -> Option<f64> {
    let last = bars.iter().map(|b| b.time()).max()?;
    let from = last.saturating_sub(window_secs);
    bars.iter()
        .filter(|b| b.time() >= from)
        .map(|b| b.high())
        .filter(|h| h.is_finite())
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
}

/// Trailing 52-week high
pub fn week52_high<T: OHLCV>(bars: &[T]) -> Option<f64> {
    trailing_high(bars, 52 * WEEK)
}
