//! Clock-face formatting for durations.

/// `m:ss`, truncating fractional seconds; negative input shows `0:00`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

/// `m:ss.t` with tenths of a second
pub fn format_time_tenths(seconds: f64) -> String {
    let tenths = if seconds.is_finite() {
        (seconds.max(0.0) * 10.0).floor() as u64
    } else {
        0
    };
    let whole = tenths / 10;
    format!("{}:{:02}.{}", whole / 60, whole % 60, tenths % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(59.99), "0:59");
        assert_eq!(format_time(240.0), "4:00");
        assert_eq!(format_time(2400.0), "40:00");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_format_time_tenths() {
        assert_eq!(format_time_tenths(0.0), "0:00.0");
        assert_eq!(format_time_tenths(61.25), "1:01.2");
        assert_eq!(format_time_tenths(599.95), "9:59.9");
    }
}
