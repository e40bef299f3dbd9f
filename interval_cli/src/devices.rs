//! Terminal stand-ins for the phone's hardware.
//!
//! - [`SimulatedSensor`] streams synthetic heart rate from a background thread
//! - [`TerminalAudio`] rings the terminal bell
//! - [`LoggedHaptics`] logs vibration patterns

use interval_core::cues::{AudioDevice, Haptics, Tone};
use interval_core::hr::PushSessionId;
use interval_core::sensor::{
    encode_heart_rate_measurement, parse_heart_rate_measurement, HeartRateSensor,
    SensorConnection, SensorEvent,
};
use interval_core::{Clock, ConnectionError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sensor that produces a heart rate drifting between ~120 and ~180 bpm.
///
/// Readings are stamped with `clock`, which must be the clock the session is
/// pumped with.
pub struct SimulatedSensor<C> {
    period: Duration,
    clock: C,
}

impl<C: Clock + Clone + Send + 'static> SimulatedSensor<C> {
    /// One reading per `period` of real time
    pub fn new(period: Duration, clock: C) -> Self {
        Self { period, clock }
    }
}

/// Synthetic BPM for the `n`th reading
fn synthetic_bpm(n: u64) -> u32 {
    let phase = n as f64 / 30.0;
    (150.0 + 28.0 * phase.sin() + 4.0 * (phase * 7.0).cos()).round() as u32
}

struct SimulatedConnection {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorConnection for SimulatedConnection {
    fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<C: Clock + Clone + Send + 'static> HeartRateSensor for SimulatedSensor<C> {
    fn connect(
        &mut self,
        session: PushSessionId,
        events: Sender<SensorEvent>,
    ) -> Result<Box<dyn SensorConnection>, ConnectionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let period = self.period;
        let clock = self.clock.clone();

        let handle = std::thread::Builder::new()
            .name("simulated-hr".into())
            .spawn(move || {
                let mut n = 0u64;
                while !thread_stop.load(Ordering::SeqCst) {
                    // Round-trip through the wire format a real strap uses
                    let packet = encode_heart_rate_measurement(synthetic_bpm(n));
                    if let Some(bpm) = parse_heart_rate_measurement(&packet) {
                        let reading = SensorEvent::Reading {
                            session,
                            bpm,
                            at_ms: clock.now_ms(),
                        };
                        if events.send(reading).is_err() {
                            break;
                        }
                    }
                    n += 1;
                    std::thread::sleep(period);
                }
            })
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;

        tracing::info!("Simulated sensor streaming every {:?}", period);
        Ok(Box::new(SimulatedConnection {
            stop,
            handle: Some(handle),
        }))
    }
}

/// Audio through the terminal bell
pub struct TerminalAudio;

impl AudioDevice for TerminalAudio {
    fn play(&mut self, tone: Tone) {
        tracing::debug!(
            "Tone {} Hz for {} ms (+{} ms)",
            tone.frequency_hz,
            tone.duration_ms,
            tone.delay_ms
        );
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Haptics that only log
pub struct LoggedHaptics;

impl Haptics for LoggedHaptics {
    fn vibrate(&mut self, pattern: &[u32]) {
        tracing::debug!("Vibrate {:?}", pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interval_core::{HeartRateAggregator, HrZoneConfig, ScaledClock};
    use std::sync::mpsc;

    #[test]
    fn test_synthetic_bpm_stays_plausible() {
        for n in 0..1000 {
            let bpm = synthetic_bpm(n);
            assert!((115..=185).contains(&bpm), "bpm {} at {}", bpm, n);
        }
    }

    #[test]
    fn test_simulated_sensor_streams_until_disconnected() {
        let mut hr = HeartRateAggregator::new(HrZoneConfig::default());
        let session = hr.begin_connect();
        let (tx, rx) = mpsc::channel();

        let clock = ScaledClock::starting_at(1_000_000, 1.0);
        let mut sensor = SimulatedSensor::new(Duration::from_millis(1), clock);
        let mut connection = sensor.connect(session, tx).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            first,
            SensorEvent::Reading { session: s, at_ms, .. } if s == session && at_ms >= 1_000_000
        ));

        connection.disconnect();
        // The sender is dropped with the thread, so the channel drains and closes
        while rx.recv_timeout(Duration::from_secs(5)).is_ok() {}
        assert!(rx.try_recv().is_err());
    }
}
