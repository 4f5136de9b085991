//! Small time helpers shared by MediaLib services.
//!
//! The ingest wire contract expresses timestamps as floating-point seconds
//! since the Unix epoch, matching what stat reports.

use std::time::{SystemTime, UNIX_EPOCH};

/// Convert a `SystemTime` to seconds since epoch.
///
/// Times before the epoch clamp to 0.0.
pub fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Current wall-clock time as seconds since epoch.
pub fn now_epoch() -> f64 {
    epoch_secs(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn epoch_secs_round_trip() {
        let t = UNIX_EPOCH + Duration::from_millis(1_500);
        let secs = epoch_secs(t);
        assert!((secs - 1.5).abs() < 1e-9);
    }

    #[test]
    fn pre_epoch_clamps_to_zero() {
        let t = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(epoch_secs(t), 0.0);
    }

    #[test]
    fn now_is_positive() {
        assert!(now_epoch() > 0.0);
    }
}
