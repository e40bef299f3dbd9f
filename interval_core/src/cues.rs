//! Phase cues: sounds, vibration and display wake.
//!
//! [`CueDispatcher`] listens to the timer and fires side effects on phase
//! changes. It holds no workout state of its own beyond the two gates in
//! [`CueConfig`], and the collaborators it drives are best-effort: a missing
//! audio device or an unsupported vibration motor is silently tolerated.

use crate::timer::TimerListener;
use crate::{CueConfig, Phase, PhaseType, TimerState};

/// One beep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
    /// Delay after the cue starts
    pub delay_ms: u32,
}

const fn tone(frequency_hz: u32, duration_ms: u32, delay_ms: u32) -> Tone {
    Tone {
        frequency_hz,
        duration_ms,
        delay_ms,
    }
}

const INTERVAL_START_TONES: &[Tone] = &[tone(880, 300, 0)];
const INTERVAL_END_TONES: &[Tone] = &[tone(440, 200, 0)];
const COMPLETE_TONES: &[Tone] = &[tone(660, 150, 0), tone(880, 150, 200), tone(1100, 300, 400)];

/// Vibration pattern: alternating on/off durations in milliseconds
pub const LONG_BUZZ: &[u32] = &[200, 100, 200];
pub const SHORT_BUZZ: &[u32] = &[200];

/// The three audible cues
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sound {
    IntervalStart,
    IntervalEnd,
    WorkoutComplete,
}

impl Sound {
    pub fn tones(self) -> &'static [Tone] {
        match self {
            Sound::IntervalStart => INTERVAL_START_TONES,
            Sound::IntervalEnd => INTERVAL_END_TONES,
            Sound::WorkoutComplete => COMPLETE_TONES,
        }
    }

    pub fn vibration(self) -> &'static [u32] {
        match self {
            Sound::IntervalStart | Sound::WorkoutComplete => LONG_BUZZ,
            Sound::IntervalEnd => SHORT_BUZZ,
        }
    }

    /// Cue for entering `phase`, if it has one
    pub fn for_phase(phase: &Phase) -> Option<Sound> {
        match phase.phase_type {
            PhaseType::Interval => Some(Sound::IntervalStart),
            PhaseType::Recovery | PhaseType::Cooldown => Some(Sound::IntervalEnd),
            PhaseType::Warmup => None,
        }
    }
}

/// A device that can play tones
pub trait AudioDevice {
    fn play(&mut self, tone: Tone);

    /// Release the device. Called once at teardown.
    fn close(&mut self) {}
}

/// Vibration motor
pub trait Haptics {
    fn vibrate(&mut self, pattern: &[u32]);
}

/// Keeps the display on while a workout runs
pub trait DisplayWake {
    fn request(&mut self);
    fn release(&mut self);
}

/// Creates the audio device on first use
pub type AudioFactory = Box<dyn FnMut() -> Option<Box<dyn AudioDevice>>>;

/// Owned audio resource with an explicit lifecycle.
///
/// The device is created by [`unlock`](Self::unlock) or the first cue,
/// whichever comes first, and released by [`close`](Self::close).
pub struct AudioOutput {
    factory: AudioFactory,
    device: Option<Box<dyn AudioDevice>>,
}

impl AudioOutput {
    pub fn new(factory: AudioFactory) -> Self {
        Self {
            factory,
            device: None,
        }
    }

    /// Output with no device at all
    pub fn silent() -> Self {
        Self::new(Box::new(|| None))
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Create the device now if it does not exist yet
    pub fn unlock(&mut self) {
        if self.device.is_none() {
            self.device = (self.factory)();
            if self.device.is_none() {
                tracing::debug!("No audio device available");
            }
        }
    }

    pub fn play(&mut self, sound: Sound) {
        self.unlock();
        if let Some(device) = self.device.as_mut() {
            for tone in sound.tones() {
                device.play(*tone);
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            tracing::debug!("Audio device closed");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Haptics for hosts without a vibration motor
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn vibrate(&mut self, _pattern: &[u32]) {}
}

/// Display wake for hosts without a screen lock
pub struct NoDisplayWake;

impl DisplayWake for NoDisplayWake {
    fn request(&mut self) {}
    fn release(&mut self) {}
}

/// Fires cues on timer notifications
pub struct CueDispatcher {
    gates: CueConfig,
    audio: AudioOutput,
    haptics: Box<dyn Haptics>,
    wake: Box<dyn DisplayWake>,
}

impl CueDispatcher {
    pub fn new(
        gates: CueConfig,
        audio: AudioOutput,
        haptics: Box<dyn Haptics>,
        wake: Box<dyn DisplayWake>,
    ) -> Self {
        Self {
            gates,
            audio,
            haptics,
            wake,
        }
    }

    /// Dispatcher that does nothing audible
    pub fn silent() -> Self {
        Self::new(
            CueConfig {
                audio_enabled: false,
                vibration_enabled: false,
            },
            AudioOutput::silent(),
            Box::new(NoHaptics),
            Box::new(NoDisplayWake),
        )
    }

    pub fn gates(&self) -> &CueConfig {
        &self.gates
    }

    pub fn set_gates(&mut self, gates: CueConfig) {
        self.gates = gates;
    }

    /// Called from the user's start gesture: open audio and hold the display
    pub fn prepare(&mut self) {
        if self.gates.audio_enabled {
            self.audio.unlock();
        }
        self.wake.request();
    }

    pub fn release_wake(&mut self) {
        self.wake.release();
    }

    /// Release the audio device and the display
    pub fn teardown(&mut self) {
        self.wake.release();
        self.audio.close();
    }

    fn fire(&mut self, sound: Sound) {
        tracing::debug!("Cue {:?}", sound);
        if self.gates.audio_enabled {
            self.audio.play(sound);
        }
        if self.gates.vibration_enabled {
            self.haptics.vibrate(sound.vibration());
        }
    }
}

impl TimerListener for CueDispatcher {
    fn on_phase_change(&mut self, phase: &Phase, _previous: Option<&Phase>) {
        if let Some(sound) = Sound::for_phase(phase) {
            self.fire(sound);
        }
    }

    fn on_finish(&mut self, _state: &TimerState) {
        self.fire(Sound::WorkoutComplete);
        self.wake.release();
    }
}
