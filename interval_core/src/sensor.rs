//! Push source: a streaming heart-rate sensor.
//!
//! Sensors deliver events over an `mpsc` channel tagged with the
//! [`PushSessionId`] they were connected under. The owner of the receiving
//! end drains it from its own loop, so readings are processed on the same
//! thread as the timer.

use crate::hr::PushSessionId;
use crate::ConnectionError;
use std::sync::mpsc::Sender;

/// Something a connected sensor reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorEvent {
    /// `at_ms` is when the reading arrived, in epoch milliseconds from the
    /// same clock the host pumps the session with
    Reading {
        session: PushSessionId,
        bpm: u32,
        at_ms: i64,
    },
    Disconnected { session: PushSessionId },
}

/// Sensor connection primitive
pub trait HeartRateSensor {
    /// Open a connection that sends its events to `events`
    fn connect(
        &mut self,
        session: PushSessionId,
        events: Sender<SensorEvent>,
    ) -> std::result::Result<Box<dyn SensorConnection>, ConnectionError>;
}

/// A live sensor connection
pub trait SensorConnection {
    /// Stop the stream. Implementations must not send further readings.
    fn disconnect(&mut self);
}

/// Decode a Heart Rate Measurement characteristic value.
///
/// Bit 0 of the flags byte selects a 16-bit little-endian value over an
/// 8-bit one. Returns `None` for a truncated packet.
pub fn parse_heart_rate_measurement(packet: &[u8]) -> Option<u32> {
    let flags = *packet.first()?;
    if flags & 0x01 != 0 {
        let bytes = packet.get(1..3)?;
        Some(u32::from(u16::from_le_bytes([bytes[0], bytes[1]])))
    } else {
        packet.get(1).map(|b| u32::from(*b))
    }
}

/// Encode a BPM value the way a sensor would send it
pub fn encode_heart_rate_measurement(bpm: u32) -> Vec<u8> {
    if bpm > u32::from(u8::MAX) {
        let value = bpm.min(u32::from(u16::MAX)) as u16;
        let [lo, hi] = value.to_le_bytes();
        vec![0x01, lo, hi]
    } else {
        vec![0x00, bpm as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_8bit() {
        assert_eq!(parse_heart_rate_measurement(&[0x00, 72]), Some(72));
        // Extra fields (energy expended, RR intervals) are ignored
        assert_eq!(parse_heart_rate_measurement(&[0x16, 150, 0x10, 0x02]), Some(150));
    }

    #[test]
    fn test_parse_16bit() {
        assert_eq!(parse_heart_rate_measurement(&[0x01, 0x2C, 0x01]), Some(300));
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(parse_heart_rate_measurement(&[]), None);
        assert_eq!(parse_heart_rate_measurement(&[0x00]), None);
        assert_eq!(parse_heart_rate_measurement(&[0x01, 0x2C]), None);
    }

    #[test]
    fn test_encode_matches_parse() {
        assert_eq!(encode_heart_rate_measurement(164), vec![0x00, 164]);
        assert_eq!(encode_heart_rate_measurement(300), vec![0x01, 0x2C, 0x01]);
        assert_eq!(
            parse_heart_rate_measurement(&encode_heart_rate_measurement(255)),
            Some(255)
        );
    }
}
