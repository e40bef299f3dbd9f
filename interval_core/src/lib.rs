#![forbid(unsafe_code)]

//! Core domain model and engines for the fourby interval timer.
//!
//! This crate provides:
//! - Domain types (phases, timer state, heart-rate readings, workout records)
//! - Phase sequence building and the wall-clock phase timer
//! - Heart-rate aggregation over push (sensor) and poll (remote) sources
//! - Zone classification and workout statistics
//! - Cue dispatch and the workout session that ties it together
//! - Persistence (JSONL store, CSV export) and configuration

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod zones;
pub mod phases;
pub mod timer;
pub mod hr;
pub mod sensor;
pub mod poll;
pub mod stats;
pub mod cues;
pub mod session;
pub mod store;
pub mod export;
pub mod format;
pub mod clock;

// Re-export commonly used types
pub use error::{ConnectionError, Error, FetchError, Result};
pub use types::*;
pub use config::{Config, CueConfig, DataConfig, PollConfig};
pub use zones::{get_zone, max_hr_from_age, target_bounds, zone_label};
pub use phases::build_phases;
pub use timer::{PhaseTimer, TickToken, TimerEvent, TimerListener};
pub use hr::{HeartRateAggregator, HrSnapshot, PushSessionId};
pub use stats::build_workout_record;
pub use cues::CueDispatcher;
pub use session::WorkoutSession;
pub use store::{JsonlWorkoutStore, WorkoutStore};
pub use export::export_csv;
pub use format::{format_time, format_time_tenths};
pub use clock::{Clock, ScaledClock, SystemClock};
