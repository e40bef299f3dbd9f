//! Core domain types for the interval workout system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Phases and the settings they are built from
//! - Timer status and state snapshots
//! - Heart-rate readings, zones and zone configuration
//! - Per-interval statistics and the finished workout record

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Phase Types
// ============================================================================

/// Kind of workout phase
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Warmup,
    Interval,
    Recovery,
    Cooldown,
}

/// A named, timed segment of a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    #[serde(rename = "type")]
    pub phase_type: PhaseType,
    pub duration_sec: u32,
    pub label: String,
    /// 1-based interval number, only set on interval and recovery phases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_number: Option<u32>,
}

/// Immutable, shared, ordered list of phases.
///
/// Cloning is cheap; every clone refers to the same sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSequence(Arc<[Phase]>);

impl PhaseSequence {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self(phases.into())
    }

    /// Sum of all phase durations in seconds
    pub fn total_duration(&self) -> u32 {
        self.0.iter().map(|p| p.duration_sec).sum()
    }

    /// Whether two handles point at the very same sequence
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_vec(&self) -> Vec<Phase> {
        self.0.to_vec()
    }

    /// Phase being timed `elapsed_sec` into the workout; `None` before the
    /// start or once the sequence is over. Zero-length phases are never
    /// returned.
    pub fn phase_at(&self, elapsed_sec: f64) -> Option<&Phase> {
        if elapsed_sec < 0.0 {
            return None;
        }
        let mut end = 0.0;
        for phase in self.0.iter() {
            end += f64::from(phase.duration_sec);
            if elapsed_sec < end {
                return Some(phase);
            }
        }
        None
    }
}

impl Deref for PhaseSequence {
    type Target = [Phase];

    fn deref(&self) -> &[Phase] {
        &self.0
    }
}

/// Settings a phase sequence is expanded from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerSettings {
    pub warmup_sec: u32,
    pub interval_sec: u32,
    pub recovery_sec: u32,
    pub cooldown_sec: u32,
    pub interval_count: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            warmup_sec: 600,
            interval_sec: 240,
            recovery_sec: 180,
            cooldown_sec: 300,
            interval_count: 4,
        }
    }
}

// ============================================================================
// Timer State
// ============================================================================

/// Lifecycle status of the phase timer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

/// Snapshot of the phase timer.
///
/// Elapsed values are seconds. Every derived value (remaining time,
/// progress) is computed from these fields and the phase sequence alone.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerState {
    pub status: TimerStatus,
    pub current_phase_index: usize,
    pub elapsed_in_phase: f64,
    pub total_elapsed: f64,
    pub phases: PhaseSequence,
}

impl TimerState {
    pub fn idle(phases: PhaseSequence) -> Self {
        Self {
            status: TimerStatus::Idle,
            current_phase_index: 0,
            elapsed_in_phase: 0.0,
            total_elapsed: 0.0,
            phases,
        }
    }

    /// Phase being timed, `None` while idle
    pub fn current_phase(&self) -> Option<&Phase> {
        match self.status {
            TimerStatus::Idle => None,
            TimerStatus::Running | TimerStatus::Paused | TimerStatus::Finished => {
                self.phases.get(self.current_phase_index)
            }
        }
    }

    /// Seconds left in the current phase.
    ///
    /// While idle this is the duration of the first phase, which is what a
    /// countdown display shows before the workout starts.
    pub fn remaining_in_phase(&self) -> f64 {
        match self.current_phase() {
            Some(phase) => (f64::from(phase.duration_sec) - self.elapsed_in_phase).max(0.0),
            None => self
                .phases
                .first()
                .map(|p| f64::from(p.duration_sec))
                .unwrap_or(0.0),
        }
    }

    /// Fraction of the current phase completed, capped at 1
    pub fn phase_progress(&self) -> f64 {
        match self.current_phase() {
            Some(phase) if phase.duration_sec > 0 => {
                (self.elapsed_in_phase / f64::from(phase.duration_sec)).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    pub fn total_duration(&self) -> f64 {
        f64::from(self.phases.total_duration())
    }

    /// Seconds left in the whole workout, floored at zero
    pub fn total_remaining(&self) -> f64 {
        (self.total_duration() - self.total_elapsed).max(0.0)
    }

    /// Fraction of the whole workout completed, capped at 1
    pub fn total_progress(&self) -> f64 {
        let total = self.total_duration();
        if total > 0.0 {
            (self.total_elapsed / total).min(1.0)
        } else {
            0.0
        }
    }

    /// Interval number of the current phase if it is an interval phase
    pub fn active_interval(&self) -> Option<u32> {
        let phase = self.current_phase()?;
        match phase.phase_type {
            PhaseType::Interval => phase.interval_number,
            PhaseType::Warmup | PhaseType::Recovery | PhaseType::Cooldown => None,
        }
    }
}

// ============================================================================
// Heart Rate Types
// ============================================================================

/// A single heart-rate sample
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartRateReading {
    pub bpm: u32,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Classification of a reading against the target range
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HrZone {
    Below,
    Target,
    Above,
}

/// Target heart-rate range expressed as fractions of max HR
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HrZoneConfig {
    pub max_hr: u32,
    pub target_low: f64,
    pub target_high: f64,
}

impl Default for HrZoneConfig {
    fn default() -> Self {
        Self {
            max_hr: 190,
            target_low: 0.85,
            target_high: 0.95,
        }
    }
}

/// Which input currently drives the live heart-rate signal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HrSource {
    Push,
    Poll,
}

// ============================================================================
// Workout Records
// ============================================================================

/// Heart-rate statistics for one interval
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntervalStats {
    pub interval_number: u32,
    pub avg_hr: Option<f64>,
    pub max_hr: Option<u32>,
    pub time_in_zone_sec: f64,
    pub readings: Vec<HeartRateReading>,
}

/// A finished (or abandoned) workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutRecord {
    pub id: Uuid,
    /// Epoch milliseconds
    pub started_at: i64,
    /// Epoch milliseconds
    pub finished_at: i64,
    pub duration_sec: f64,
    pub phases: Vec<Phase>,
    pub completed: bool,
    pub intervals: Vec<IntervalStats>,
    pub avg_hr: Option<f64>,
    pub max_hr: Option<u32>,
    pub all_readings: Vec<HeartRateReading>,
    /// Owned by the external sync collaborator
    #[serde(default)]
    pub synced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_phases() -> PhaseSequence {
        PhaseSequence::new(vec![
            Phase {
                phase_type: PhaseType::Warmup,
                duration_sec: 60,
                label: "Warm Up".into(),
                interval_number: None,
            },
            Phase {
                phase_type: PhaseType::Interval,
                duration_sec: 30,
                label: "Interval 1".into(),
                interval_number: Some(1),
            },
        ])
    }

    #[test]
    fn test_phase_at_elapsed() {
        let phases = two_phases();
        assert_eq!(phases.phase_at(-0.5), None);
        assert_eq!(phases.phase_at(0.0).unwrap().label, "Warm Up");
        assert_eq!(phases.phase_at(59.9).unwrap().label, "Warm Up");
        // A boundary belongs to the phase it starts
        assert_eq!(phases.phase_at(60.0).unwrap().label, "Interval 1");
        assert_eq!(phases.phase_at(90.0), None);

        let mut with_empty = phases.to_vec();
        with_empty[0].duration_sec = 0;
        let with_empty = PhaseSequence::new(with_empty);
        assert_eq!(with_empty.phase_at(0.0).unwrap().label, "Interval 1");
    }

    #[test]
    fn test_idle_derived_values() {
        let state = TimerState::idle(two_phases());
        assert!(state.current_phase().is_none());
        assert_eq!(state.remaining_in_phase(), 60.0);
        assert_eq!(state.phase_progress(), 0.0);
        assert_eq!(state.total_remaining(), 90.0);
        assert_eq!(state.total_progress(), 0.0);
    }

    #[test]
    fn test_derived_values_are_capped() {
        let mut state = TimerState::idle(two_phases());
        state.status = TimerStatus::Running;
        state.current_phase_index = 1;
        state.elapsed_in_phase = 31.0;
        state.total_elapsed = 95.0;

        assert_eq!(state.remaining_in_phase(), 0.0);
        assert_eq!(state.phase_progress(), 1.0);
        assert_eq!(state.total_remaining(), 0.0);
        assert_eq!(state.total_progress(), 1.0);
        assert_eq!(state.active_interval(), Some(1));
    }

    #[test]
    fn test_phase_serializes_type_tag() {
        let json = serde_json::to_string(&two_phases()[0]).unwrap();
        assert!(json.contains(r#""type":"warmup""#));
        assert!(!json.contains("interval_number"));
    }
}
