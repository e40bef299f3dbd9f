//! CSV export of workout history.
//!
//! One summary row per workout; per-interval averages are flattened into a
//! single `interval_avg_hr` column separated by `;` with empty slots for
//! intervals without readings.

use crate::{Result, WorkoutRecord};
use chrono::{DateTime, SecondsFormat};
use std::fs::File;
use std::path::Path;

#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    started_at: String,
    finished_at: String,
    duration_sec: f64,
    completed: bool,
    intervals: usize,
    avg_hr: Option<f64>,
    max_hr: Option<u32>,
    readings: usize,
    interval_avg_hr: String,
}

fn rfc3339(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

impl From<&WorkoutRecord> for CsvRow {
    fn from(record: &WorkoutRecord) -> Self {
        let interval_avg_hr = record
            .intervals
            .iter()
            .map(|i| i.avg_hr.map(|hr| format!("{:.0}", hr)).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(";");

        CsvRow {
            id: record.id.to_string(),
            started_at: rfc3339(record.started_at),
            finished_at: rfc3339(record.finished_at),
            duration_sec: record.duration_sec,
            completed: record.completed,
            intervals: record.intervals.len(),
            avg_hr: record.avg_hr.map(|hr| (hr * 10.0).round() / 10.0),
            max_hr: record.max_hr,
            readings: record.all_readings.len(),
            interval_avg_hr,
        }
    }
}

/// Write `records` to a new CSV file at `path`, replacing any existing file.
///
/// Returns the number of rows written.
pub fn export_csv(records: &[WorkoutRecord], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(file);
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} workouts to {:?}", records.len(), path);
    Ok(records.len())
}
