//! Uniform sampling over closed ranges, used for jitter.

use std::ops::RangeInclusive;

use rand::Rng;

/// Returns a value uniformly distributed in `range`, bounds included.
///
/// A range whose bounds are equal (or inverted) yields its lower bound.
pub fn within(range: RangeInclusive<f64>) -> f64 {
    within_with(&mut rand::thread_rng(), range)
}

/// Same as [`within`], drawing from the given generator.
pub fn within_with<R: Rng + ?Sized>(rng: &mut R, range: RangeInclusive<f64>) -> f64 {
    let (lo, hi) = range.into_inner();
    if lo >= hi {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

/// Returns an integer uniformly distributed in `range`, bounds included.
pub fn within_int(range: RangeInclusive<i64>) -> i64 {
    within_int_with(&mut rand::thread_rng(), range)
}

/// Same as [`within_int`], drawing from the given generator.
pub fn within_int_with<R: Rng + ?Sized>(rng: &mut R, range: RangeInclusive<i64>) -> i64 {
    let (lo, hi) = range.into_inner();
    if lo >= hi {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn within_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let v = within_with(&mut rng, 0.5..=1.5);
            assert!((0.5..=1.5).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn degenerate_range_returns_lower_bound() {
        assert_eq!(within(1.0..=1.0), 1.0);
        assert_eq!(within(2.0..=1.0), 2.0);
        assert_eq!(within_int(5..=5), 5);
    }

    #[test]
    fn within_int_covers_negative_ranges() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen_negative = false;
        let mut seen_positive = false;
        for _ in 0..1_000 {
            let v = within_int_with(&mut rng, -3..=3);
            assert!((-3..=3).contains(&v));
            seen_negative |= v < 0;
            seen_positive |= v > 0;
        }
        assert!(seen_negative && seen_positive);
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(within_with(&mut a, 0.0..=1.0), within_with(&mut b, 0.0..=1.0));
        }
    }
}
