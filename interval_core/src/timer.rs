//! Phase timer engine.
//!
//! The timer is a wall-clock-based state machine with no thread of its own.
//! The caller drives it by calling [`PhaseTimer::tick`] from whatever
//! recurring callback it has (a frame loop, a sleep loop) and passes the
//! current wall-clock time in epoch milliseconds.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!           |
//!           v
//!        Finished
//! (any) -> Idle on reset
//! ```
//!
//! Elapsed time is always recomputed from timestamp differences, never from
//! how many ticks ran, so a host that defers callbacks (a backgrounded app)
//! is corrected by the very next tick.

use crate::{Phase, PhaseSequence, TimerState, TimerStatus};

/// Receives phase transitions from the timer.
///
/// `on_phase_change` is called before the new state is published;
/// `on_finish` after the terminal state is published.
pub trait TimerListener {
    fn on_phase_change(&mut self, phase: &Phase, previous: Option<&Phase>);
    fn on_finish(&mut self, state: &TimerState);
}

/// Recorded timer notification, mainly for logging and tests
#[derive(Clone, Debug, PartialEq)]
pub enum TimerEvent {
    PhaseChanged {
        phase: Phase,
        previous: Option<Phase>,
    },
    Finished,
}

impl TimerListener for Vec<TimerEvent> {
    fn on_phase_change(&mut self, phase: &Phase, previous: Option<&Phase>) {
        self.push(TimerEvent::PhaseChanged {
            phase: phase.clone(),
            previous: previous.cloned(),
        });
    }

    fn on_finish(&mut self, _state: &TimerState) {
        self.push(TimerEvent::Finished);
    }
}

/// Listener that ignores everything
pub struct NoopListener;

impl TimerListener for NoopListener {
    fn on_phase_change(&mut self, _phase: &Phase, _previous: Option<&Phase>) {}
    fn on_finish(&mut self, _state: &TimerState) {}
}

/// Permission for one scheduling loop to advance the timer.
///
/// Issued by `start` and `resume`. Pausing, resetting or finishing
/// invalidates every outstanding token, so a callback scheduled before the
/// loop was cancelled cannot mutate state afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickToken(u64);

/// Authoritative owner of the timer state
#[derive(Debug)]
pub struct PhaseTimer {
    state: TimerState,
    /// Wall-clock ms when the current phase's running window began
    phase_anchor_ms: i64,
    /// Phase seconds accumulated before `phase_anchor_ms`
    phase_baseline: f64,
    /// Wall-clock ms when the current total running window began
    total_anchor_ms: i64,
    /// Total seconds accumulated before `total_anchor_ms`
    total_baseline: f64,
    generation: u64,
}

impl PhaseTimer {
    /// Create an idle timer over a fixed phase sequence
    pub fn new(phases: PhaseSequence) -> Self {
        Self {
            state: TimerState::idle(phases),
            phase_anchor_ms: 0,
            phase_baseline: 0.0,
            total_anchor_ms: 0,
            total_baseline: 0.0,
            generation: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current published snapshot
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status
    }

    pub fn phases(&self) -> &PhaseSequence {
        &self.state.phases
    }

    /// Whether `token` still authorizes ticking
    pub fn is_active(&self, token: TickToken) -> bool {
        token.0 == self.generation && self.state.status == TimerStatus::Running
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a fresh run from phase 0.
    ///
    /// Honoured from `Idle` and `Finished`; a no-op returning `None` while
    /// running or paused.
    pub fn start(&mut self, now_ms: i64, listener: &mut dyn TimerListener) -> Option<TickToken> {
        match self.state.status {
            TimerStatus::Idle | TimerStatus::Finished => {}
            TimerStatus::Running | TimerStatus::Paused => {
                tracing::debug!("start ignored while {:?}", self.state.status);
                return None;
            }
        }

        if self.state.phases.is_empty() {
            tracing::warn!("start ignored: empty phase sequence");
            return None;
        }

        self.phase_anchor_ms = now_ms;
        self.total_anchor_ms = now_ms;
        self.phase_baseline = 0.0;
        self.total_baseline = 0.0;

        let token = self.next_token();
        let phases = self.state.phases.clone();

        listener.on_phase_change(&phases[0], None);
        self.state = TimerState {
            status: TimerStatus::Running,
            current_phase_index: 0,
            elapsed_in_phase: 0.0,
            total_elapsed: 0.0,
            phases,
        };
        tracing::info!(
            "Timer started: {} phases, {}s total",
            self.state.phases.len(),
            self.state.phases.total_duration()
        );

        // Zero-length leading phases are skipped right away.
        self.tick(token, now_ms, listener);
        self.is_active(token).then_some(token)
    }

    /// Freeze the timer, folding the running window into the baselines
    pub fn pause(&mut self, now_ms: i64) {
        if self.state.status != TimerStatus::Running {
            return;
        }

        self.generation += 1;
        self.phase_baseline += window_secs(self.phase_anchor_ms, now_ms);
        self.total_baseline += window_secs(self.total_anchor_ms, now_ms);

        self.state = TimerState {
            status: TimerStatus::Paused,
            elapsed_in_phase: self.phase_baseline,
            total_elapsed: self.total_baseline,
            ..self.state.clone()
        };
        tracing::info!(
            "Timer paused at {:.1}s into phase {}",
            self.phase_baseline,
            self.state.current_phase_index
        );
    }

    /// Continue from the frozen baselines
    pub fn resume(&mut self, now_ms: i64) -> Option<TickToken> {
        if self.state.status != TimerStatus::Paused {
            return None;
        }

        self.phase_anchor_ms = now_ms;
        self.total_anchor_ms = now_ms;
        let token = self.next_token();
        self.state = TimerState {
            status: TimerStatus::Running,
            ..self.state.clone()
        };
        tracing::info!("Timer resumed");
        Some(token)
    }

    /// Stop scheduling and return to idle, keeping the same phases
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase_anchor_ms = 0;
        self.total_anchor_ms = 0;
        self.phase_baseline = 0.0;
        self.total_baseline = 0.0;
        self.state = TimerState::idle(self.state.phases.clone());
        tracing::info!("Timer reset");
    }

    /// Advance from a wall-clock sample.
    ///
    /// Returns whether the loop holding `token` should keep scheduling.
    /// Crosses as many phase boundaries as the elapsed time covers,
    /// carrying overflow forward so no time is lost between phases.
    pub fn tick(&mut self, token: TickToken, now_ms: i64, listener: &mut dyn TimerListener) -> bool {
        if !self.is_active(token) {
            return false;
        }

        let phases = self.state.phases.clone();
        let mut index = self.state.current_phase_index;
        let mut phase_elapsed = self.phase_baseline + window_secs(self.phase_anchor_ms, now_ms);
        let total_elapsed = self.total_baseline + window_secs(self.total_anchor_ms, now_ms);

        loop {
            let current = &phases[index];
            let duration = f64::from(current.duration_sec);
            if phase_elapsed < duration {
                break;
            }

            if index + 1 >= phases.len() {
                self.finish(index, duration, listener);
                return false;
            }

            let overflow = phase_elapsed - duration;
            index += 1;
            self.phase_anchor_ms = now_ms;
            self.phase_baseline = overflow;
            phase_elapsed = overflow;

            tracing::debug!(
                "Phase {} -> {} ({:.3}s overflow)",
                current.label,
                phases[index].label,
                overflow
            );
            listener.on_phase_change(&phases[index], Some(current));
        }

        self.state = TimerState {
            status: TimerStatus::Running,
            current_phase_index: index,
            elapsed_in_phase: phase_elapsed,
            total_elapsed,
            phases,
        };
        true
    }

    fn finish(&mut self, index: usize, duration: f64, listener: &mut dyn TimerListener) {
        self.generation += 1;
        let total = self.state.total_duration();
        self.phase_baseline = duration;
        self.total_baseline = total;

        self.state = TimerState {
            status: TimerStatus::Finished,
            current_phase_index: index,
            elapsed_in_phase: duration,
            total_elapsed: total,
            phases: self.state.phases.clone(),
        };
        tracing::info!("Workout finished after {}s", total);
        listener.on_finish(&self.state);
    }

    fn next_token(&mut self) -> TickToken {
        self.generation += 1;
        TickToken(self.generation)
    }
}

/// Seconds between two wall-clock samples; a clock stepping backwards
/// counts as no time passing.
fn window_secs(anchor_ms: i64, now_ms: i64) -> f64 {
    (now_ms - anchor_ms).max(0) as f64 / 1000.0
}
