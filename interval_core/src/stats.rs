//! Workout statistics.
//!
//! Pure reduction of a finished workout's readings into a [`WorkoutRecord`].
//! Nothing here reads the clock; the same inputs always give the same record.

use crate::{
    get_zone, HeartRateReading, HrZone, HrZoneConfig, IntervalStats, PhaseSequence,
    WorkoutRecord,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Longest gap between two readings that still counts toward time in zone
pub const MAX_ZONE_GAP_MS: i64 = 10_000;

/// Everything needed to build a workout record
#[derive(Clone, Debug)]
pub struct WorkoutSummaryInput<'a> {
    pub id: Uuid,
    pub started_at: i64,
    pub finished_at: i64,
    pub readings: &'a [HeartRateReading],
    /// Readings observed while each interval was the active phase
    pub interval_readings: &'a BTreeMap<u32, Vec<HeartRateReading>>,
    pub phases: &'a PhaseSequence,
    pub completed: bool,
    pub zones: &'a HrZoneConfig,
}

/// Arithmetic mean BPM, `None` for no readings
pub fn average_bpm(readings: &[HeartRateReading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let sum: u64 = readings.iter().map(|r| u64::from(r.bpm)).sum();
    Some(sum as f64 / readings.len() as f64)
}

/// Highest BPM, `None` for no readings
pub fn max_bpm(readings: &[HeartRateReading]) -> Option<u32> {
    readings.iter().map(|r| r.bpm).max()
}

/// Seconds spent in the target zone.
///
/// Each reading in the target zone is credited the time until the next
/// reading, capped at [`MAX_ZONE_GAP_MS`]. The last reading gets nothing.
pub fn time_in_zone(readings: &[HeartRateReading], zones: &HrZoneConfig) -> f64 {
    let ms: i64 = readings
        .windows(2)
        .filter(|pair| get_zone(pair[0].bpm, zones) == HrZone::Target)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).clamp(0, MAX_ZONE_GAP_MS))
        .sum();
    ms as f64 / 1000.0
}

/// Per-interval statistics, ordered by interval number
pub fn interval_stats(
    interval_readings: &BTreeMap<u32, Vec<HeartRateReading>>,
    zones: &HrZoneConfig,
) -> Vec<IntervalStats> {
    interval_readings
        .iter()
        .map(|(&interval_number, readings)| IntervalStats {
            interval_number,
            avg_hr: average_bpm(readings),
            max_hr: max_bpm(readings),
            time_in_zone_sec: time_in_zone(readings, zones),
            readings: readings.clone(),
        })
        .collect()
}

/// Build the terminal record for a workout
pub fn build_workout_record(input: &WorkoutSummaryInput<'_>) -> WorkoutRecord {
    let duration_ms = (input.finished_at - input.started_at).max(0);

    WorkoutRecord {
        id: input.id,
        started_at: input.started_at,
        finished_at: input.finished_at,
        duration_sec: duration_ms as f64 / 1000.0,
        phases: input.phases.to_vec(),
        completed: input.completed,
        intervals: interval_stats(input.interval_readings, input.zones),
        avg_hr: average_bpm(input.readings),
        max_hr: max_bpm(input.readings),
        all_readings: input.readings.to_vec(),
        synced: false,
    }
}
