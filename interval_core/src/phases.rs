//! Expansion of timer settings into an ordered phase sequence.

use crate::{Phase, PhaseSequence, PhaseType, TimerSettings};

/// Build the phase sequence for a workout.
///
/// One warmup, then each interval followed by a recovery (none after the
/// last interval), then one cooldown. The input is trusted as-is; clamp it
/// with [`TimerSettings::clamped`] first if it came from outside.
pub fn build_phases(settings: &TimerSettings) -> PhaseSequence {
    let count = settings.interval_count as usize;
    let mut phases = Vec::with_capacity(2 * count + 1);

    phases.push(Phase {
        phase_type: PhaseType::Warmup,
        duration_sec: settings.warmup_sec,
        label: "Warm Up".into(),
        interval_number: None,
    });

    for n in 1..=settings.interval_count {
        phases.push(Phase {
            phase_type: PhaseType::Interval,
            duration_sec: settings.interval_sec,
            label: format!("Interval {}", n),
            interval_number: Some(n),
        });

        if n < settings.interval_count {
            phases.push(Phase {
                phase_type: PhaseType::Recovery,
                duration_sec: settings.recovery_sec,
                label: format!("Recovery {}", n),
                interval_number: Some(n),
            });
        }
    }

    phases.push(Phase {
        phase_type: PhaseType::Cooldown,
        duration_sec: settings.cooldown_sec,
        label: "Cool Down".into(),
        interval_number: None,
    });

    PhaseSequence::new(phases)
}

/// Total workout length implied by the settings, in seconds
pub fn expected_total(settings: &TimerSettings) -> u32 {
    let n = settings.interval_count;
    settings.warmup_sec
        + n * settings.interval_sec
        + n.saturating_sub(1) * settings.recovery_sec
        + settings.cooldown_sec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_build_nine_phases() {
        let phases = build_phases(&TimerSettings::default());
        // warmup + 4 intervals + 3 recoveries + cooldown
        assert_eq!(phases.len(), 9);
        assert_eq!(phases[0].phase_type, PhaseType::Warmup);
        assert_eq!(phases[1].label, "Interval 1");
        assert_eq!(phases[2].label, "Recovery 1");
        assert_eq!(phases[7].label, "Interval 4");
        assert_eq!(phases[8].phase_type, PhaseType::Cooldown);
        assert_eq!(phases.total_duration(), 2400);
    }

    #[test]
    fn test_interval_numbers_pair_up() {
        let phases = build_phases(&TimerSettings {
            interval_count: 5,
            ..TimerSettings::default()
        });

        let intervals: Vec<_> = phases
            .iter()
            .filter(|p| p.phase_type == PhaseType::Interval)
            .collect();
        for (k, phase) in intervals.iter().enumerate() {
            assert_eq!(phase.interval_number, Some(k as u32 + 1));
        }

        for pair in phases.windows(2) {
            if pair[1].phase_type == PhaseType::Recovery {
                assert_eq!(pair[0].phase_type, PhaseType::Interval);
                assert_eq!(pair[0].interval_number, pair[1].interval_number);
            }
        }

        assert!(phases
            .iter()
            .filter(|p| matches!(p.phase_type, PhaseType::Warmup | PhaseType::Cooldown))
            .all(|p| p.interval_number.is_none()));
    }

    #[test]
    fn test_total_matches_formula() {
        for count in 1..=10 {
            for (w, i, r, c) in [(0, 30, 0, 0), (600, 240, 180, 300), (45, 20, 10, 5)] {
                let settings = TimerSettings {
                    warmup_sec: w,
                    interval_sec: i,
                    recovery_sec: r,
                    cooldown_sec: c,
                    interval_count: count,
                };
                let phases = build_phases(&settings);
                assert_eq!(phases.total_duration(), expected_total(&settings));
                assert_eq!(phases.len() as u32, 2 * count + 1);
            }
        }
    }

    #[test]
    fn test_single_interval_has_no_recovery() {
        let phases = build_phases(&TimerSettings {
            interval_count: 1,
            ..TimerSettings::default()
        });
        let kinds: Vec<_> = phases.iter().map(|p| p.phase_type).collect();
        assert_eq!(
            kinds,
            vec![PhaseType::Warmup, PhaseType::Interval, PhaseType::Cooldown]
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let settings = TimerSettings::default();
        assert_eq!(*build_phases(&settings), *build_phases(&settings));
    }
}
