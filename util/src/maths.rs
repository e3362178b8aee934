//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Convert an angle in radians into degrees.
///
/// A value in [-pi, pi] maps onto [-180, 180].
pub fn rad_to_deg<T>(value: T) -> T
where
    T: Float,
{
    lin_map(
        (T::zero(), T::from(std::f64::consts::PI).unwrap()),
        (T::zero(), T::from(180.0).unwrap()),
        value,
    )
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// Taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap an angle in radians into the range [-pi, pi].
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float,
{
    let pi_t = T::from(std::f64::consts::PI).unwrap();
    let tau_t = T::from(std::f64::consts::TAU).unwrap();

    let wrapped = rem_euclid(value + pi_t, tau_t) - pi_t;

    // Keep +pi as +pi rather than folding it over to -pi
    if wrapped == -pi_t && value > T::zero() {
        pi_t
    } else {
        wrapped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    #[test]
    fn test_rad_to_deg() {
        assert!((rad_to_deg(FRAC_PI_2) - 90.0).abs() < 1e-9);
        assert!((rad_to_deg(-PI) + 180.0).abs() < 1e-9);
        assert!((rad_to_deg(PI) - 180.0).abs() < 1e-9);
        assert_eq!(rad_to_deg(0f64), 0.0);
    }

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(TAU + 1.0) - 1.0).abs() < 1e-9);
        assert!((wrap_pi(-TAU - 1.0) + 1.0).abs() < 1e-9);
        assert!((wrap_pi(1.5 * PI) + 0.5 * PI).abs() < 1e-9);
        assert!((wrap_pi(-1.5 * PI) - 0.5 * PI).abs() < 1e-9);
        assert_eq!(wrap_pi(PI), PI);
        assert_eq!(wrap_pi(-PI), -PI);
        assert!((wrap_pi(0.25f64) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 1.0), (0.0, 10.0), 0.5), 5.0);
        assert_eq!(lin_map((-1.0, 1.0), (0.0, 4.0), 0.0), 2.0);
    }
}
