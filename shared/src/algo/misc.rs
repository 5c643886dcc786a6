//! Miscellaneous numerical helpers.
//!
//! Linear interpolation on 1D samples, used to resample spectral axes and to
//! look up fractional channel positions.

use thiserror::Error;

/// Errors that can occur during interpolation
#[derive(Error, Debug)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be monotonic")]
    UnsortedData,
}

/// Linear interpolation of `ys(xs)` at `x`, with `xs` sorted ascending.
///
/// Binary search finds the bracketing interval, so a lookup is O(log n).
///
/// ```rust
/// use shared::algo::misc::interp;
///
/// let channels = [1.0e9, 2.0e9];
/// assert_eq!(interp(1.5e9, &channels, &[2.0, 4.0]).unwrap(), 3.0);
/// ```
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }
    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }
    if xs.windows(2).any(|w| w[1] < w[0]) {
        return Err(InterpError::UnsortedData);
    }

    let last = xs.len() - 1;
    if x < xs[0] || x > xs[last] {
        return Err(InterpError::OutOfBounds(x, xs[0], xs[last]));
    }

    // Index of the first element > x
    let idx = xs.partition_point(|&val| val <= x);
    if idx == 0 {
        return Ok(ys[0]);
    }
    if idx == xs.len() {
        return Ok(ys[last]);
    }

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);
    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Fractional index of `x` along a monotonic axis, ascending or descending.
///
/// Returns a value in `[0, len - 1]` such that integer results land exactly
/// on an axis sample.
pub fn fractional_index(x: f64, axis: &[f64]) -> Result<f64, InterpError> {
    if axis.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    let descending = axis[0] > axis[axis.len() - 1];
    let (xs, positions): (Vec<f64>, Vec<f64>) = if descending {
        axis.iter()
            .enumerate()
            .rev()
            .map(|(i, v)| (*v, i as f64))
            .unzip()
    } else {
        axis.iter()
            .enumerate()
            .map(|(i, v)| (*v, i as f64))
            .unzip()
    };
    interp(x, &xs, &positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_between_channels() {
        let freqs = [1.0e9, 1.1e9, 1.2e9];
        let values = [4.0, 8.0, -2.0];
        assert_eq!(interp(1.1e9, &freqs, &values).unwrap(), 8.0);
        assert!((interp(1.15e9, &freqs, &values).unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(interp(1.2e9, &freqs, &values).unwrap(), -2.0);
    }

    #[test]
    fn test_rejects_values_outside_axis() {
        let freqs = [1.0e9, 1.1e9];
        assert!(matches!(
            interp(0.9e9, &freqs, &[0.0, 1.0]),
            Err(InterpError::OutOfBounds(..))
        ));
    }

    #[test]
    fn test_bad_inputs() {
        assert!(matches!(
            interp(1.5, &[1.0, 2.0, 3.0], &[10.0, 20.0]),
            Err(InterpError::MismatchedLengths)
        ));
        assert!(matches!(
            interp(1.0, &[1.0], &[10.0]),
            Err(InterpError::InsufficientData)
        ));
        assert!(matches!(
            interp(1.5, &[2.0, 1.0, 3.0], &[20.0, 10.0, 30.0]),
            Err(InterpError::UnsortedData)
        ));
    }

    #[test]
    fn test_fractional_index_both_directions() {
        let ascending = [100.0, 110.0, 120.0];
        assert_eq!(fractional_index(110.0, &ascending).unwrap(), 1.0);
        assert_eq!(fractional_index(115.0, &ascending).unwrap(), 1.5);

        let descending = [120.0, 110.0, 100.0];
        assert_eq!(fractional_index(120.0, &descending).unwrap(), 0.0);
        assert_eq!(fractional_index(105.0, &descending).unwrap(), 1.5);
        assert!(matches!(
            fractional_index(130.0, &descending),
            Err(InterpError::OutOfBounds(..))
        ));
    }
}
