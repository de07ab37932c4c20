use std::time::Duration;

use rand::Rng;

use crate::model::{MAX_SLEEP_SECS, SleepRange};

/// A uniform draw from `[min, max]` seconds.
pub(crate) fn jitter(range: &SleepRange) -> Duration {
    if range.is_zero() {
        return Duration::ZERO;
    }
    let (min, max) = (range.min.clamp(0.0, MAX_SLEEP_SECS), range.max.clamp(0.0, MAX_SLEEP_SECS));
    let secs = if max > min {
        rand::rng().random_range(min..=max)
    } else {
        min
    };
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_bounds() {
        let range = SleepRange::new(0.2, 0.5);
        for _ in 0..200 {
            let d = jitter(&range);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(500), "{:?}", d);
        }
    }

    #[test]
    fn test_jitter_fixed_and_zero() {
        assert_eq!(jitter(&SleepRange::new(1.0, 1.0)), Duration::from_secs(1));
        assert_eq!(jitter(&SleepRange::default()), Duration::ZERO);
    }

    #[test]
    fn test_jitter_never_panics_on_unchecked_ranges() {
        assert_eq!(jitter(&SleepRange::new(1e300, 1e300)), Duration::from_secs_f64(MAX_SLEEP_SECS));
        assert_eq!(jitter(&SleepRange::new(f64::INFINITY, f64::INFINITY)), Duration::from_secs_f64(MAX_SLEEP_SECS));
        assert_eq!(jitter(&SleepRange::new(f64::NAN, 1.0)), Duration::ZERO);
        assert!(jitter(&SleepRange::new(0.5, f64::INFINITY)) >= Duration::from_millis(500));
    }
}
