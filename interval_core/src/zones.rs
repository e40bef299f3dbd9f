//! Heart-rate zone classification.

use crate::{HrZone, HrZoneConfig};

/// Target range in BPM as `(low, high)`, both inclusive
pub fn target_bounds(config: &HrZoneConfig) -> (f64, f64) {
    let max = f64::from(config.max_hr);
    (max * config.target_low, max * config.target_high)
}

/// Classify a reading against the configured target range.
///
/// Readings exactly on either bound count as in the target zone.
pub fn get_zone(bpm: u32, config: &HrZoneConfig) -> HrZone {
    let (low, high) = target_bounds(config);
    let bpm = f64::from(bpm);
    if bpm < low {
        HrZone::Below
    } else if bpm > high {
        HrZone::Above
    } else {
        HrZone::Target
    }
}

pub fn zone_label(zone: HrZone) -> &'static str {
    match zone {
        HrZone::Below => "Below Zone",
        HrZone::Target => "In Zone",
        HrZone::Above => "Above Zone",
    }
}

/// Age-predicted maximum heart rate (220 - age)
pub fn max_hr_from_age(age: u32) -> u32 {
    220u32.saturating_sub(age)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HrZoneConfig {
        HrZoneConfig {
            max_hr: 190,
            target_low: 0.85,
            target_high: 0.95,
        }
    }

    #[test]
    fn test_target_bounds() {
        let (low, high) = target_bounds(&config());
        assert!((low - 161.5).abs() < 1e-9);
        assert!((high - 180.5).abs() < 1e-9);
    }

    #[test]
    fn test_zone_examples() {
        assert_eq!(get_zone(150, &config()), HrZone::Below);
        assert_eq!(get_zone(170, &config()), HrZone::Target);
        assert_eq!(get_zone(185, &config()), HrZone::Above);
    }

    #[test]
    fn test_zone_edges() {
        assert_eq!(get_zone(161, &config()), HrZone::Below);
        assert_eq!(get_zone(162, &config()), HrZone::Target);
        assert_eq!(get_zone(180, &config()), HrZone::Target);
        assert_eq!(get_zone(181, &config()), HrZone::Above);

        let exact = HrZoneConfig {
            max_hr: 200,
            target_low: 0.8,
            target_high: 0.9,
        };
        assert_eq!(get_zone(160, &exact), HrZone::Target);
        assert_eq!(get_zone(180, &exact), HrZone::Target);
    }

    #[test]
    fn test_zone_is_monotonic() {
        let cfg = config();
        let rank = |z: HrZone| match z {
            HrZone::Below => 0,
            HrZone::Target => 1,
            HrZone::Above => 2,
        };
        let mut last = 0;
        for bpm in 40..=230 {
            let r = rank(get_zone(bpm, &cfg));
            assert!(r >= last, "zone went backwards at {} bpm", bpm);
            last = r;
        }
    }

    #[test]
    fn test_labels_and_age() {
        assert_eq!(zone_label(HrZone::Target), "In Zone");
        assert_eq!(zone_label(HrZone::Below), "Below Zone");
        assert_eq!(max_hr_from_age(40), 180);
        assert_eq!(max_hr_from_age(300), 0);
    }
}
