//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value into `[min, max]`.
///
/// NaN is passed through unchanged so that callers can still detect it.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Returns true if every value in the slice is finite (not NaN or infinite).
pub fn all_finite<T>(values: &[T]) -> bool
where
    T: Float
{
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        let max = 25f64.to_radians();
        assert_eq!(lin_map((-max, max), (-1.0, 1.0), max), 1.0);
        assert_eq!(lin_map((-max, max), (-1.0, 1.0), -max), -1.0);
        assert_eq!(lin_map((-max, max), (-1.0, 1.0), 0.0), 0.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.5, -1.0, 1.0), 0.5);
        assert!(clamp(std::f64::NAN, -1.0, 1.0).is_nan());
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[0.0, 1.0, -3.5]));
        assert!(!all_finite(&[0.0, std::f64::NAN]));
        assert!(!all_finite(&[std::f64::INFINITY]));
        assert!(all_finite::<f64>(&[]));
    }
}
