//! Heart-rate stream aggregation.
//!
//! Merges a push source (a streaming sensor) and a poll source (batches of
//! recent readings fetched from a remote service) into one live signal.
//!
//! - The push source drives the live view whenever it is connected.
//! - Poll batches are deduplicated by reading timestamp; overlapping
//!   fetches never add a reading twice.
//! - A poll reading only enters the combined window if it is newer than
//!   everything already there, so the window stays chronological and a
//!   late batch never overrides time already covered by the sensor.
//! - Fetch failures leave the previous state untouched.

use crate::{get_zone, ConnectionError, FetchError, HeartRateReading, HrSource, HrZone, HrZoneConfig};
use chrono::NaiveDate;
use std::collections::{HashSet, VecDeque};

/// Number of readings kept in the combined display window
pub const WINDOW_CAPACITY: usize = 300;

/// BPM at which the live display is flagged as dangerous
pub const DEFAULT_DANGER_BPM: u32 = 175;

/// Identifies one push-source connection attempt.
///
/// Events tagged with an id that is no longer the live connection are
/// dropped, which is how a disconnect unregisters pending sensor events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushSessionId(u64);

/// A single `(time, bpm)` pair from the remote intraday series
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntradaySample {
    pub time: chrono::NaiveTime,
    pub bpm: u32,
}

/// One fetch result: samples for a single (UTC) calendar date
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollBatch {
    pub date: NaiveDate,
    pub samples: Vec<IntradaySample>,
}

impl PollBatch {
    /// Epoch-ms timestamps paired with BPM, in ascending time order
    fn readings(&self) -> Vec<HeartRateReading> {
        let mut readings: Vec<_> = self
            .samples
            .iter()
            .map(|s| HeartRateReading {
                bpm: s.bpm,
                timestamp: self.date.and_time(s.time).and_utc().timestamp_millis(),
            })
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        readings
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LiveValue {
    bpm: u32,
    zone: HrZone,
    timestamp: i64,
}

/// Read-only view of the aggregated heart-rate signal
#[derive(Clone, Debug, PartialEq)]
pub struct HrSnapshot {
    pub current_bpm: Option<u32>,
    pub zone: Option<HrZone>,
    /// Most recent readings, oldest first, at most [`WINDOW_CAPACITY`]
    pub readings: Vec<HeartRateReading>,
    pub source: Option<HrSource>,
    pub push_connected: bool,
    pub connecting: bool,
    pub polling: bool,
    /// Timestamp of the newest poll sample, if the poll source has reported
    pub last_poll_update: Option<i64>,
    pub error: Option<String>,
}

impl HrSnapshot {
    pub fn is_danger(&self, threshold: u32) -> bool {
        self.current_bpm.map_or(false, |bpm| bpm >= threshold)
    }
}

/// Owner of all heart-rate state for a workout screen
#[derive(Debug)]
pub struct HeartRateAggregator {
    zones: HrZoneConfig,

    next_session: u64,
    pending_session: Option<PushSessionId>,
    push_session: Option<PushSessionId>,
    push_current: Option<LiveValue>,
    push_readings: Vec<HeartRateReading>,

    poll_available: bool,
    polling: bool,
    seen_poll_timestamps: HashSet<i64>,
    poll_current: Option<LiveValue>,
    poll_readings: Vec<HeartRateReading>,

    window: VecDeque<HeartRateReading>,
    history: Vec<HeartRateReading>,
    error: Option<String>,
}

impl HeartRateAggregator {
    pub fn new(zones: HrZoneConfig) -> Self {
        Self {
            zones,
            next_session: 0,
            pending_session: None,
            push_session: None,
            push_current: None,
            push_readings: Vec::new(),
            poll_available: false,
            polling: false,
            seen_poll_timestamps: HashSet::new(),
            poll_current: None,
            poll_readings: Vec::new(),
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
            history: Vec::new(),
            error: None,
        }
    }

    pub fn zone_config(&self) -> &HrZoneConfig {
        &self.zones
    }

    /// Replace the zone configuration.
    ///
    /// Only readings accepted afterwards use the new ranges.
    pub fn set_zone_config(&mut self, zones: HrZoneConfig) {
        self.zones = zones;
    }

    /// Whether the push source currently drives the live signal
    pub fn push_connected(&self) -> bool {
        self.push_session.is_some()
    }

    /// Source the live view is taken from
    pub fn source(&self) -> Option<HrSource> {
        if self.push_connected() {
            Some(HrSource::Push)
        } else if self.poll_available {
            Some(HrSource::Poll)
        } else {
            None
        }
    }

    fn live(&self) -> Option<LiveValue> {
        match self.source()? {
            HrSource::Push => self.push_current,
            HrSource::Poll => self.poll_current,
        }
    }

    pub fn current_bpm(&self) -> Option<u32> {
        self.live().map(|v| v.bpm)
    }

    pub fn current_zone(&self) -> Option<HrZone> {
        self.live().map(|v| v.zone)
    }

    /// Every reading accepted into the live signal since the last clear
    pub fn history(&self) -> &[HeartRateReading] {
        &self.history
    }

    pub fn push_readings(&self) -> &[HeartRateReading] {
        &self.push_readings
    }

    pub fn poll_readings(&self) -> &[HeartRateReading] {
        &self.poll_readings
    }

    pub fn snapshot(&self) -> HrSnapshot {
        let live = self.live();
        HrSnapshot {
            current_bpm: live.map(|v| v.bpm),
            zone: live.map(|v| v.zone),
            readings: self.window.iter().copied().collect(),
            source: self.source(),
            push_connected: self.push_connected(),
            connecting: self.pending_session.is_some(),
            polling: self.polling,
            last_poll_update: self.poll_current.map(|v| v.timestamp),
            error: self.error.clone(),
        }
    }

    // ── Push source ──────────────────────────────────────────────────

    /// Reserve an id for a new connection attempt and clear any old error
    pub fn begin_connect(&mut self) -> PushSessionId {
        self.next_session += 1;
        let id = PushSessionId(self.next_session);
        self.pending_session = Some(id);
        self.error = None;
        id
    }

    /// The attempt `id` succeeded; its events now drive the live signal
    pub fn push_connected_as(&mut self, id: PushSessionId) {
        if self.pending_session != Some(id) {
            tracing::debug!("Ignoring confirmation for superseded connection {:?}", id);
            return;
        }
        self.pending_session = None;
        self.push_session = Some(id);
        tracing::info!("Heart-rate sensor connected");
    }

    /// The attempt `id` failed. Cancellation by the user is not an error.
    pub fn push_connect_failed(&mut self, id: PushSessionId, err: &ConnectionError) {
        if self.pending_session == Some(id) {
            self.pending_session = None;
        }
        if err.is_cancellation() {
            tracing::info!("Sensor connection cancelled");
            self.error = None;
        } else {
            tracing::warn!("Sensor connection failed: {}", err);
            self.error = Some(err.to_string());
        }
    }

    /// Accept a sensor reading stamped at `now_ms`.
    ///
    /// Returns the reading if it was accepted into the live signal.
    pub fn on_push_reading(
        &mut self,
        id: PushSessionId,
        bpm: u32,
        now_ms: i64,
    ) -> Option<HeartRateReading> {
        if self.push_session != Some(id) || bpm == 0 {
            return None;
        }

        // Keep the combined window non-decreasing even if the host clock steps back.
        let timestamp = self
            .window
            .back()
            .map_or(now_ms, |last| now_ms.max(last.timestamp));
        let reading = HeartRateReading { bpm, timestamp };

        self.push_current = Some(LiveValue {
            bpm,
            zone: get_zone(bpm, &self.zones),
            timestamp,
        });
        self.push_readings.push(reading);
        self.accept(reading);
        tracing::debug!("Push reading {} bpm", bpm);
        Some(reading)
    }

    /// The sensor reported that connection `id` dropped
    pub fn on_push_disconnected(&mut self, id: PushSessionId) {
        if self.push_session == Some(id) {
            self.push_session = None;
            tracing::info!("Heart-rate sensor disconnected; falling back to polling");
        }
    }

    /// Unregister the live push connection.
    ///
    /// Call before telling the sensor to disconnect so no event already in
    /// flight is accepted. Returns whether a connection was live.
    pub fn disconnect_push(&mut self) -> bool {
        self.pending_session = None;
        match self.push_session.take() {
            Some(_) => {
                tracing::info!("Heart-rate sensor unregistered");
                true
            }
            None => false,
        }
    }

    // ── Poll source ──────────────────────────────────────────────────

    /// Whether the remote service is configured; enables poll fallback
    pub fn set_poll_available(&mut self, available: bool) {
        self.poll_available = available;
    }

    pub fn poll_started(&mut self) {
        self.polling = true;
    }

    /// Fold one poll result into the state.
    ///
    /// Returns the readings that entered the live signal, in order.
    pub fn apply_poll(
        &mut self,
        result: std::result::Result<PollBatch, FetchError>,
    ) -> Vec<HeartRateReading> {
        self.polling = false;

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Heart-rate poll failed, keeping previous state: {}", e);
                return Vec::new();
            }
        };

        let readings = batch.readings();
        let Some(latest) = readings.last().copied() else {
            tracing::debug!("Heart-rate poll returned no samples");
            return Vec::new();
        };

        let fresh: Vec<HeartRateReading> = readings
            .into_iter()
            .filter(|r| self.seen_poll_timestamps.insert(r.timestamp))
            .collect();
        for reading in &fresh {
            let at = self
                .poll_readings
                .partition_point(|r| r.timestamp < reading.timestamp);
            self.poll_readings.insert(at, *reading);
        }

        // The newest sample of the batch is the poll source's current value,
        // unless an earlier batch already reported something newer.
        if self.poll_current.map_or(true, |v| latest.timestamp >= v.timestamp) {
            self.poll_current = Some(LiveValue {
                bpm: latest.bpm,
                zone: get_zone(latest.bpm, &self.zones),
                timestamp: latest.timestamp,
            });
        }

        if self.push_connected() {
            tracing::debug!(
                "Poll batch of {} new readings superseded by sensor",
                fresh.len()
            );
            return Vec::new();
        }

        let newest_accepted = self.window.back().map(|r| r.timestamp);
        let accepted: Vec<HeartRateReading> = fresh
            .into_iter()
            .filter(|r| newest_accepted.map_or(true, |t| r.timestamp > t))
            .collect();
        for reading in &accepted {
            self.accept(*reading);
        }

        tracing::debug!("Poll accepted {} readings", accepted.len());
        accepted
    }

    // ── Reset ────────────────────────────────────────────────────────

    /// Forget all readings, the live values and dedup state.
    ///
    /// Connection status and errors are left alone.
    pub fn clear_readings(&mut self) {
        self.window.clear();
        self.history.clear();
        self.push_readings.clear();
        self.poll_readings.clear();
        self.push_current = None;
        self.poll_current = None;
        self.seen_poll_timestamps.clear();
        tracing::debug!("Heart-rate readings cleared");
    }

    fn accept(&mut self, reading: HeartRateReading) {
        if self.window.len() == WINDOW_CAPACITY {
            self.window.pop_front();
        }
        self.window.push_back(reading);
        self.history.push(reading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> i64 {
        date()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn batch(samples: &[(u32, u32, u32, u32)]) -> PollBatch {
        PollBatch {
            date: date(),
            samples: samples
                .iter()
                .map(|&(h, m, s, bpm)| IntradaySample {
                    time: NaiveTime::from_hms_opt(h, m, s).unwrap(),
                    bpm,
                })
                .collect(),
        }
    }

    fn polling_aggregator() -> HeartRateAggregator {
        let mut hr = HeartRateAggregator::new(HrZoneConfig::default());
        hr.set_poll_available(true);
        hr
    }

    fn connected_aggregator() -> (HeartRateAggregator, PushSessionId) {
        let mut hr = polling_aggregator();
        let id = hr.begin_connect();
        hr.push_connected_as(id);
        (hr, id)
    }

    #[test]
    fn test_overlapping_batches_are_deduplicated() {
        let mut hr = polling_aggregator();

        let a = hr.apply_poll(Ok(batch(&[
            (10, 0, 0, 120),
            (10, 0, 5, 125),
            (10, 0, 10, 130),
            (10, 0, 15, 135),
        ])));
        assert_eq!(a.len(), 4);

        // B repeats the last two readings of A
        let b = hr.apply_poll(Ok(batch(&[
            (10, 0, 10, 130),
            (10, 0, 15, 135),
            (10, 0, 20, 140),
        ])));
        assert_eq!(b.len(), 1);

        let snap = hr.snapshot();
        let timestamps: Vec<i64> = snap.readings.iter().map(|r| r.timestamp).collect();
        let unique: HashSet<i64> = timestamps.iter().copied().collect();
        assert_eq!(timestamps.len(), 5);
        assert_eq!(unique.len(), 5);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(hr.history().len(), 5);
        assert_eq!(snap.current_bpm, Some(140));
        assert_eq!(snap.source, Some(HrSource::Poll));
        assert_eq!(snap.last_poll_update, Some(at(10, 0, 20)));
    }

    #[test]
    fn test_unsorted_batch_is_appended_chronologically() {
        let mut hr = polling_aggregator();
        hr.apply_poll(Ok(batch(&[(9, 0, 10, 100), (9, 0, 0, 90), (9, 0, 5, 95)])));

        let bpms: Vec<u32> = hr.snapshot().readings.iter().map(|r| r.bpm).collect();
        assert_eq!(bpms, vec![90, 95, 100]);
        assert_eq!(hr.current_bpm(), Some(100));
    }

    #[test]
    fn test_fetch_failure_keeps_previous_state() {
        let mut hr = polling_aggregator();
        hr.apply_poll(Ok(batch(&[(10, 0, 0, 150)])));
        let before = hr.snapshot();

        hr.poll_started();
        assert!(hr.snapshot().polling);
        let accepted = hr.apply_poll(Err(FetchError::Http("503".into())));

        assert!(accepted.is_empty());
        assert_eq!(hr.snapshot(), before);
        assert_eq!(hr.current_zone(), Some(HrZone::Below));
    }

    #[test]
    fn test_empty_batch_changes_nothing() {
        let mut hr = polling_aggregator();
        hr.apply_poll(Ok(batch(&[(10, 0, 0, 170)])));
        let before = hr.snapshot();
        assert!(hr.apply_poll(Ok(batch(&[]))).is_empty());
        assert_eq!(hr.snapshot(), before);
    }

    #[test]
    fn test_push_preferred_when_connected() {
        let (mut hr, id) = connected_aggregator();

        let reading = hr.on_push_reading(id, 172, at(10, 0, 30)).unwrap();
        assert_eq!(reading.bpm, 172);
        assert_eq!(hr.current_zone(), Some(HrZone::Target));

        // A later-arriving poll batch must not override the sensor
        let accepted = hr.apply_poll(Ok(batch(&[(10, 0, 20, 140), (10, 0, 40, 141)])));
        assert!(accepted.is_empty());

        let snap = hr.snapshot();
        assert_eq!(snap.source, Some(HrSource::Push));
        assert_eq!(snap.current_bpm, Some(172));
        assert_eq!(snap.readings.len(), 1);
        assert_eq!(hr.push_readings().len(), 1);
        assert_eq!(hr.poll_readings().len(), 2);
    }

    #[test]
    fn test_disconnect_falls_back_to_poll() {
        let (mut hr, id) = connected_aggregator();
        hr.apply_poll(Ok(batch(&[(10, 0, 0, 120)])));
        hr.on_push_reading(id, 175, at(10, 0, 30));
        assert_eq!(hr.current_bpm(), Some(175));

        hr.on_push_disconnected(id);

        assert!(!hr.push_connected());
        assert_eq!(hr.source(), Some(HrSource::Poll));
        assert_eq!(hr.current_bpm(), Some(120));

        // Poll readings older than what the sensor already covered stay out
        let accepted = hr.apply_poll(Ok(batch(&[(10, 0, 25, 150), (10, 0, 35, 155)])));
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].bpm, 155);
        assert_eq!(hr.current_bpm(), Some(155));
    }

    #[test]
    fn test_events_after_disconnect_are_dropped() {
        let (mut hr, id) = connected_aggregator();
        assert!(hr.disconnect_push());
        assert!(!hr.disconnect_push());

        assert!(hr.on_push_reading(id, 160, at(10, 0, 0)).is_none());
        assert!(hr.snapshot().readings.is_empty());

        // A reconnect gets a new id; stale events stay dropped
        let next = hr.begin_connect();
        hr.push_connected_as(next);
        assert!(hr.on_push_reading(id, 160, at(10, 0, 1)).is_none());
        assert!(hr.on_push_reading(next, 161, at(10, 0, 2)).is_some());
    }

    #[test]
    fn test_connection_errors() {
        let mut hr = HeartRateAggregator::new(HrZoneConfig::default());

        let id = hr.begin_connect();
        assert!(hr.snapshot().connecting);
        hr.push_connect_failed(id, &ConnectionError::Failed("Bluetooth adapter off".into()));
        let snap = hr.snapshot();
        assert!(!snap.connecting);
        assert_eq!(snap.error.as_deref(), Some("Bluetooth adapter off"));

        let id = hr.begin_connect();
        assert!(hr.snapshot().error.is_none());
        hr.push_connect_failed(id, &ConnectionError::Cancelled);
        assert!(hr.snapshot().error.is_none());
        assert!(!hr.push_connected());
    }

    #[test]
    fn test_window_is_bounded() {
        let (mut hr, id) = connected_aggregator();
        let t0 = at(10, 0, 0);
        for i in 0..(WINDOW_CAPACITY as i64 + 50) {
            hr.on_push_reading(id, 140, t0 + i * 1000);
        }

        let snap = hr.snapshot();
        assert_eq!(snap.readings.len(), WINDOW_CAPACITY);
        assert_eq!(snap.readings[0].timestamp, t0 + 50_000);
        assert_eq!(hr.history().len(), WINDOW_CAPACITY + 50);
    }

    #[test]
    fn test_clear_readings_resets_dedup() {
        let mut hr = polling_aggregator();
        hr.apply_poll(Ok(batch(&[(10, 0, 0, 120), (10, 0, 5, 121)])));

        hr.clear_readings();
        let snap = hr.snapshot();
        assert!(snap.readings.is_empty());
        assert!(snap.current_bpm.is_none());
        assert!(snap.zone.is_none());
        assert!(hr.history().is_empty());

        // Same samples are accepted again after a clear
        let accepted = hr.apply_poll(Ok(batch(&[(10, 0, 0, 120), (10, 0, 5, 121)])));
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn test_zone_change_is_not_retroactive() {
        let (mut hr, id) = connected_aggregator();
        hr.on_push_reading(id, 170, at(10, 0, 0));
        assert_eq!(hr.current_zone(), Some(HrZone::Target));

        hr.set_zone_config(HrZoneConfig {
            max_hr: 220,
            target_low: 0.85,
            target_high: 0.95,
        });
        assert_eq!(hr.current_zone(), Some(HrZone::Target));

        hr.on_push_reading(id, 170, at(10, 0, 1));
        assert_eq!(hr.current_zone(), Some(HrZone::Below));
    }

    #[test]
    fn test_no_source_means_no_live_value() {
        let mut hr = HeartRateAggregator::new(HrZoneConfig::default());
        hr.apply_poll(Ok(batch(&[(10, 0, 0, 120)])));
        assert_eq!(hr.source(), None);
        assert_eq!(hr.current_bpm(), None);
    }

    #[test]
    fn test_danger_threshold() {
        let (mut hr, id) = connected_aggregator();
        hr.on_push_reading(id, 176, at(10, 0, 0));
        assert!(hr.snapshot().is_danger(DEFAULT_DANGER_BPM));
        hr.on_push_reading(id, 174, at(10, 0, 1));
        assert!(!hr.snapshot().is_danger(DEFAULT_DANGER_BPM));
    }
}
