//! Workout session: the timer screen's flow in one owner.
//!
//! Ties together the phase timer, the heart-rate aggregator, cue dispatch and
//! per-interval reading buckets. The host calls [`WorkoutSession::pump`] from
//! its loop with the current wall-clock time; everything else is a direct
//! response to a user command.
//!
//! ## Flow
//!
//! 1. `start` requests display wake, clears readings and buckets, and starts
//!    the timer.
//! 2. `pump` drains sensor events, runs a due poll and ticks the timer.
//!    Each accepted reading goes to the bucket of the interval that was being
//!    timed at the reading's own timestamp, so a late pump never files a
//!    reading under the phase that was current when it was drained.
//! 3. A natural finish, or `finish_early`, produces a [`WorkoutRecord`].

use crate::cues::CueDispatcher;
use crate::hr::HrSnapshot;
use crate::poll::PollSource;
use crate::sensor::{HeartRateSensor, SensorConnection, SensorEvent};
use crate::stats::{build_workout_record, WorkoutSummaryInput};
use crate::timer::{PhaseTimer, TickToken, TimerListener};
use crate::{
    HeartRateAggregator, HeartRateReading, HrZoneConfig, Phase, PhaseSequence, PhaseType,
    TimerState, TimerStatus, WorkoutRecord,
};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use uuid::Uuid;

type Buckets = BTreeMap<u32, Vec<HeartRateReading>>;

/// Wall-clock stretch during which the timer was running
#[derive(Clone, Copy, Debug)]
struct RunSpan {
    from_ms: i64,
    until_ms: Option<i64>,
    /// Workout time at `from_ms`, in seconds
    elapsed_at_start: f64,
}

impl RunSpan {
    fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from_ms && self.until_ms.map_or(true, |end| timestamp < end)
    }

    fn elapsed_at(&self, timestamp: i64) -> f64 {
        self.elapsed_at_start + (timestamp - self.from_ms) as f64 / 1000.0
    }
}

/// Timer listener that forwards to the cues and opens interval buckets
struct SessionHooks<'a> {
    cues: &'a mut CueDispatcher,
    buckets: &'a mut Buckets,
}

impl TimerListener for SessionHooks<'_> {
    fn on_phase_change(&mut self, phase: &Phase, previous: Option<&Phase>) {
        if phase.phase_type == PhaseType::Interval {
            if let Some(n) = phase.interval_number {
                self.buckets.entry(n).or_default();
            }
        }
        tracing::info!("Phase: {}", phase.label);
        self.cues.on_phase_change(phase, previous);
    }

    fn on_finish(&mut self, state: &TimerState) {
        self.cues.on_finish(state);
    }
}

/// One workout screen
pub struct WorkoutSession {
    timer: PhaseTimer,
    hr: HeartRateAggregator,
    cues: CueDispatcher,
    buckets: Buckets,
    spans: Vec<RunSpan>,
    token: Option<TickToken>,
    started_at: Option<i64>,
    sensor_events: Option<Receiver<SensorEvent>>,
    sensor_connection: Option<Box<dyn SensorConnection>>,
    poll: Option<PollSource>,
}

impl WorkoutSession {
    pub fn new(phases: PhaseSequence, zones: HrZoneConfig, cues: CueDispatcher) -> Self {
        Self {
            timer: PhaseTimer::new(phases),
            hr: HeartRateAggregator::new(zones),
            cues,
            buckets: BTreeMap::new(),
            spans: Vec::new(),
            token: None,
            started_at: None,
            sensor_events: None,
            sensor_connection: None,
            poll: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn timer_state(&self) -> &TimerState {
        self.timer.state()
    }

    pub fn status(&self) -> TimerStatus {
        self.timer.status()
    }

    pub fn heart_rate(&self) -> &HeartRateAggregator {
        &self.hr
    }

    pub fn hr_snapshot(&self) -> HrSnapshot {
        self.hr.snapshot()
    }

    /// Readings collected per interval so far
    pub fn interval_readings(&self) -> &BTreeMap<u32, Vec<HeartRateReading>> {
        &self.buckets
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    pub fn cues_mut(&mut self) -> &mut CueDispatcher {
        &mut self.cues
    }

    // ── Heart-rate sources ───────────────────────────────────────────

    /// Connect a push sensor, replacing any current one.
    ///
    /// Returns whether the connection is live. Failures are reported through
    /// the heart-rate snapshot's `error`.
    pub fn connect_sensor(&mut self, sensor: &mut dyn HeartRateSensor) -> bool {
        self.disconnect_sensor();

        let id = self.hr.begin_connect();
        let (tx, rx) = mpsc::channel();
        match sensor.connect(id, tx) {
            Ok(connection) => {
                self.hr.push_connected_as(id);
                self.sensor_events = Some(rx);
                self.sensor_connection = Some(connection);
                true
            }
            Err(e) => {
                self.hr.push_connect_failed(id, &e);
                false
            }
        }
    }

    /// Unregister the sensor, then tell it to stop.
    ///
    /// Events already queued are discarded with the receiver.
    pub fn disconnect_sensor(&mut self) {
        self.hr.disconnect_push();
        self.sensor_events = None;
        if let Some(mut connection) = self.sensor_connection.take() {
            connection.disconnect();
        }
    }

    /// Install or remove the poll source
    pub fn set_poll_source(&mut self, source: Option<PollSource>) {
        self.hr.set_poll_available(source.is_some());
        self.poll = source;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a new workout. Ignored while one is running or paused.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if matches!(self.timer.status(), TimerStatus::Running | TimerStatus::Paused) {
            tracing::debug!("start ignored while {:?}", self.timer.status());
            return false;
        }

        self.cues.prepare();
        self.hr.clear_readings();
        self.buckets.clear();
        self.spans.clear();
        self.started_at = Some(now_ms);
        if let Some(poll) = self.poll.as_mut() {
            poll.schedule_mut().reset();
        }

        let mut hooks = SessionHooks {
            cues: &mut self.cues,
            buckets: &mut self.buckets,
        };
        self.token = self.timer.start(now_ms, &mut hooks);
        if self.token.is_some() {
            self.spans.push(RunSpan {
                from_ms: now_ms,
                until_ms: None,
                elapsed_at_start: 0.0,
            });
        }
        true
    }

    pub fn pause(&mut self, now_ms: i64) {
        if self.timer.status() != TimerStatus::Running {
            return;
        }
        self.timer.pause(now_ms);
        self.token = None;
        if let Some(span) = self.spans.last_mut() {
            span.until_ms = Some(now_ms);
        }
    }

    pub fn resume(&mut self, now_ms: i64) {
        if let Some(token) = self.timer.resume(now_ms) {
            self.token = Some(token);
            self.spans.push(RunSpan {
                from_ms: now_ms,
                until_ms: None,
                elapsed_at_start: self.timer.state().total_elapsed,
            });
        }
    }

    /// Abandon the workout without a record
    pub fn reset(&mut self) {
        self.timer.reset();
        self.token = None;
        self.started_at = None;
        self.buckets.clear();
        self.spans.clear();
        self.cues.release_wake();
    }

    /// Advance everything to `now_ms`.
    ///
    /// Returns the workout record when the last phase completes.
    pub fn pump(&mut self, now_ms: i64) -> Option<WorkoutRecord> {
        let mut accepted = self.drain_sensor();
        if let Some(poll) = self.poll.as_mut() {
            accepted.extend(poll.poll_if_due(&mut self.hr, now_ms));
        }

        if let Some(token) = self.token {
            let mut hooks = SessionHooks {
                cues: &mut self.cues,
                buckets: &mut self.buckets,
            };
            if !self.timer.tick(token, now_ms, &mut hooks) {
                self.token = None;
            }
        }
        self.bucket(&accepted);

        if self.timer.status() == TimerStatus::Finished && self.started_at.is_some() {
            return self.finalize(now_ms, true);
        }
        None
    }

    /// Stop the workout now and keep what was recorded
    pub fn finish_early(&mut self, now_ms: i64) -> Option<WorkoutRecord> {
        if self.timer.status() == TimerStatus::Idle {
            return None;
        }
        self.cues.release_wake();
        let record = self.finalize(now_ms, false);
        self.timer.reset();
        self.token = None;
        self.spans.clear();
        record
    }

    /// Release the sensor, audio and display
    pub fn shutdown(&mut self) {
        self.disconnect_sensor();
        self.cues.teardown();
    }

    fn drain_sensor(&mut self) -> Vec<HeartRateReading> {
        let Some(rx) = self.sensor_events.as_ref() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let mut channel_closed = false;
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    channel_closed = true;
                    break;
                }
            }
        }

        let mut accepted = Vec::new();
        for event in events {
            match event {
                SensorEvent::Reading { session, bpm, at_ms } => {
                    accepted.extend(self.hr.on_push_reading(session, bpm, at_ms));
                }
                SensorEvent::Disconnected { session } => self.hr.on_push_disconnected(session),
            }
        }

        if channel_closed || !self.hr.push_connected() {
            tracing::debug!("Sensor stream ended");
            self.disconnect_sensor();
        }
        accepted
    }

    /// Interval being timed at wall-clock `timestamp`, if any.
    ///
    /// Paused stretches belong to no interval.
    fn interval_at(&self, timestamp: i64) -> Option<u32> {
        let span = self.spans.iter().rev().find(|s| s.contains(timestamp))?;
        let phase = self.timer.phases().phase_at(span.elapsed_at(timestamp))?;
        match phase.phase_type {
            PhaseType::Interval => phase.interval_number,
            PhaseType::Warmup | PhaseType::Recovery | PhaseType::Cooldown => None,
        }
    }

    fn bucket(&mut self, readings: &[HeartRateReading]) {
        for reading in readings {
            let Some(n) = self.interval_at(reading.timestamp) else {
                continue;
            };
            let bucket = self.buckets.entry(n).or_default();
            let at = bucket.partition_point(|r| r.timestamp <= reading.timestamp);
            bucket.insert(at, *reading);
        }
    }

    fn finalize(&mut self, finished_at: i64, completed: bool) -> Option<WorkoutRecord> {
        let started_at = self.started_at.take()?;
        let in_workout = |r: &HeartRateReading| r.timestamp >= started_at && r.timestamp <= finished_at;

        let readings: Vec<HeartRateReading> =
            self.hr.history().iter().copied().filter(in_workout).collect();
        let buckets: Buckets = self
            .buckets
            .iter()
            .map(|(&n, rs)| (n, rs.iter().copied().filter(in_workout).collect()))
            .collect();

        let record = build_workout_record(&WorkoutSummaryInput {
            id: Uuid::new_v4(),
            started_at,
            finished_at,
            readings: &readings,
            interval_readings: &buckets,
            phases: self.timer.phases(),
            completed,
            zones: self.hr.zone_config(),
        });
        tracing::info!(
            "Workout {} {} after {:.0}s with {} readings",
            record.id,
            if completed { "completed" } else { "ended early" },
            record.duration_sec,
            record.all_readings.len()
        );
        Some(record)
    }
}
