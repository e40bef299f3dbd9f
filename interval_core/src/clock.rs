//! Wall-clock sources.
//!
//! Engines never read the clock themselves; the host samples a [`Clock`] and
//! passes epoch milliseconds in.

use chrono::Utc;
use std::time::Instant;

pub trait Clock {
    /// Current time in epoch milliseconds
    fn now_ms(&self) -> i64;

    /// Clock milliseconds that pass per real millisecond
    fn scale(&self) -> f64 {
        1.0
    }
}

/// The real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that runs `scale` times faster than real time from its creation.
///
/// Used to replay a whole workout in seconds.
#[derive(Clone, Copy, Debug)]
pub struct ScaledClock {
    origin_ms: i64,
    origin: Instant,
    scale: f64,
}

impl ScaledClock {
    pub fn new(scale: f64) -> Self {
        Self::starting_at(Utc::now().timestamp_millis(), scale)
    }

    pub fn starting_at(origin_ms: i64, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Self {
            origin_ms,
            origin: Instant::now(),
            scale,
        }
    }

}

impl Clock for ScaledClock {
    fn now_ms(&self) -> i64 {
        let real_ms = self.origin.elapsed().as_secs_f64() * 1000.0;
        self.origin_ms + (real_ms * self.scale) as i64
    }

    fn scale(&self) -> f64 {
        self.scale
    }
}
