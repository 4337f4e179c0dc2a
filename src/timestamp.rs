use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug)]
pub enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

impl std::error::Error for TimestampError {}

pub fn format_rfc3339(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

/// Epoch seconds as a decimal string, the representation used on the wire and in the stats file.
pub fn epoch_seconds_string(timestamp: SystemTime) -> String {
    let secs = signed_seconds_between(UNIX_EPOCH, timestamp);
    format!("{secs}")
}

/// Seconds from `earlier` to `later`, negative when the clock went backwards.
pub fn signed_seconds_between(earlier: SystemTime, later: SystemTime) -> f64 {
    match later.duration_since(earlier) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(err) => -err.duration().as_secs_f64(),
    }
}

/// Shift `timestamp` by a signed number of seconds, saturating at the representable range.
pub fn offset_by_seconds(timestamp: SystemTime, seconds: f64) -> SystemTime {
    if !seconds.is_finite() {
        return timestamp;
    }
    let magnitude = Duration::from_secs_f64(seconds.abs());
    if seconds >= 0.0 {
        timestamp.checked_add(magnitude).unwrap_or(timestamp)
    } else {
        timestamp.checked_sub(magnitude).unwrap_or(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_string_drops_trailing_fraction_for_whole_seconds() {
        let timestamp = UNIX_EPOCH + Duration::from_secs(1_700_000_120);
        assert_eq!(epoch_seconds_string(timestamp), "1700000120");
    }

    #[test]
    fn epoch_string_keeps_fractional_seconds() {
        let timestamp = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(epoch_seconds_string(timestamp), "1.5");
    }

    #[test]
    fn signed_seconds_handles_backwards_clock() {
        let base = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(signed_seconds_between(base, base + Duration::from_secs(30)), 30.0);
        assert_eq!(signed_seconds_between(base + Duration::from_secs(30), base), -30.0);
    }

    #[test]
    fn offset_moves_in_both_directions() {
        let base = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(offset_by_seconds(base, 20.0), base + Duration::from_secs(20));
        assert_eq!(offset_by_seconds(base, -20.0), base - Duration::from_secs(20));
        assert_eq!(offset_by_seconds(base, f64::NAN), base);
    }

    #[test]
    fn rfc3339_formats_utc() -> Result<(), TimestampError> {
        let formatted = format_rfc3339(UNIX_EPOCH + Duration::from_secs(1))?;
        assert_eq!(formatted, "1970-01-01T00:00:01Z");
        Ok(())
    }
}
