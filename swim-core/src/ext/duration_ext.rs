use std::time::Duration;

pub trait DurationExt {
    fn millis(self) -> Duration;

    fn seconds(self) -> Duration;
}

impl DurationExt for u64 {
    fn millis(self) -> Duration {
        Duration::from_millis(self)
    }

    fn seconds(self) -> Duration {
        Duration::from_secs(self)
    }
}

/// Scaling helpers for the protocol timers, which are derived from a base
/// interval and a cluster-size dependent factor. Saturates at `Duration::MAX`.
pub trait ScaleExt {
    fn scale(self, factor: f64) -> Duration;
}

impl ScaleExt for Duration {
    fn scale(self, factor: f64) -> Duration {
        if factor.is_finite() && factor > 0.0 {
            Duration::try_from_secs_f64(self.as_secs_f64() * factor).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}
