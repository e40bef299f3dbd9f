//! Poll source: fixed-interval fetching of recent heart-rate samples.
//!
//! The remote service is reached through [`HeartRateFetcher`]. Each poll asks
//! for a time range ending now and reaching back a fixed lookback; results
//! overlap from one poll to the next and are deduplicated downstream.

use crate::hr::{IntradaySample, PollBatch};
use crate::{FetchError, HeartRateAggregator, HeartRateReading, PollConfig};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::path::PathBuf;

/// Date and time-of-day window for one fetch (UTC)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRange {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Remote time-ranged reading fetch
pub trait HeartRateFetcher {
    fn fetch(&mut self, range: &FetchRange) -> std::result::Result<Vec<IntradaySample>, FetchError>;
}

/// When the next poll is due
#[derive(Clone, Debug)]
pub struct PollSchedule {
    interval_ms: i64,
    lookback: Duration,
    next_due_ms: Option<i64>,
}

impl PollSchedule {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            interval_ms: (config.interval_secs.max(1) * 1000) as i64,
            lookback: Duration::minutes(config.lookback_minutes.max(1)),
            next_due_ms: None,
        }
    }

    /// Due immediately after creation or [`reset`](Self::reset), then every interval
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_due_ms.map_or(true, |due| now_ms >= due)
    }

    pub fn mark_polled(&mut self, now_ms: i64) {
        self.next_due_ms = Some(now_ms + self.interval_ms);
    }

    pub fn reset(&mut self) {
        self.next_due_ms = None;
    }

    /// Range covering the lookback window ending at `now_ms`.
    ///
    /// The remote series is per calendar day, so a window that would cross
    /// midnight starts at 00:00:00 instead.
    pub fn range_at(&self, now_ms: i64) -> FetchRange {
        let now = DateTime::from_timestamp_millis(now_ms)
            .unwrap_or_default()
            .naive_utc();
        let start = now - self.lookback;
        let start_time = if start.date() == now.date() {
            start.time()
        } else {
            NaiveTime::MIN
        };

        FetchRange {
            date: now.date(),
            start: truncate_secs(start_time),
            end: truncate_secs(now.time()),
        }
    }
}

fn truncate_secs(t: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    t.with_nanosecond(0).unwrap_or(t)
}

/// A fetcher paired with its schedule
pub struct PollSource {
    fetcher: Box<dyn HeartRateFetcher>,
    schedule: PollSchedule,
}

impl PollSource {
    pub fn new(fetcher: Box<dyn HeartRateFetcher>, schedule: PollSchedule) -> Self {
        Self { fetcher, schedule }
    }

    pub fn schedule_mut(&mut self) -> &mut PollSchedule {
        &mut self.schedule
    }

    /// Poll if due, folding the result into `hr`.
    ///
    /// Returns the readings that entered the live signal.
    pub fn poll_if_due(&mut self, hr: &mut HeartRateAggregator, now_ms: i64) -> Vec<HeartRateReading> {
        if !self.schedule.is_due(now_ms) {
            return Vec::new();
        }
        self.schedule.mark_polled(now_ms);

        let range = self.schedule.range_at(now_ms);
        tracing::debug!(
            "Polling heart rate for {} {}..{}",
            range.date,
            range.start,
            range.end
        );

        hr.poll_started();
        let result = self.fetcher.fetch(&range).map(|samples| PollBatch {
            date: range.date,
            samples,
        });
        hr.apply_poll(result)
    }
}

#[derive(Debug, Deserialize)]
struct CsvSampleRow {
    time: String,
    bpm: u32,
}

/// Fetcher backed by a CSV export of an intraday series.
///
/// Rows are `time,bpm` with `time` as `HH:MM:SS`. Every fetch re-reads the
/// file, so a file that is being appended to behaves like a live service.
pub struct CsvFetcher {
    path: PathBuf,
}

impl CsvFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HeartRateFetcher for CsvFetcher {
    fn fetch(&mut self, range: &FetchRange) -> std::result::Result<Vec<IntradaySample>, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| FetchError::Io(e.to_string()))?;

        let mut samples = Vec::new();
        for result in reader.deserialize::<CsvSampleRow>() {
            let row = result.map_err(|e| FetchError::Parse(e.to_string()))?;
            let time = NaiveTime::parse_from_str(&row.time, "%H:%M:%S")
                .map_err(|e| FetchError::Parse(format!("bad time {:?}: {}", row.time, e)))?;
            if time >= range.start && time <= range.end {
                samples.push(IntradaySample { time, bpm: row.bpm });
            }
        }

        Ok(samples)
    }
}
