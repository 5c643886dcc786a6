//! NaN-aware summary statistics and iterative sigma clipping

/// Arithmetic mean of the finite-or-infinite values, ignoring NaN.
///
/// Returns NaN when no values remain.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation (ddof = 0), ignoring NaN
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sum_sq, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (sum_sq / count as f64).sqrt()
}

/// Median ignoring NaN; the mean of the two middle values for even counts.
///
/// Returns NaN when no values remain.
pub fn nan_median(values: &[f64]) -> f64 {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();
    median_of_valid(&mut valid)
}

fn median_of_valid(valid: &mut [f64]) -> f64 {
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(f64::total_cmp);
    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    }
}

/// Summary of the values that survive sigma clipping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

/// Iteratively reject values more than `sigma` standard deviations from the
/// median, then summarise the survivors.
///
/// Each pass measures the median and standard deviation of the current
/// survivors and drops values with `|x - median| > sigma * std`. Iteration stops
/// after `max_iters` passes or when a pass rejects nothing. NaN is ignored
/// throughout.
pub fn sigma_clipped_stats(values: &[f64], sigma: f64, max_iters: usize) -> ClippedStats {
    let mut kept: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();

    for _ in 0..max_iters {
        if kept.is_empty() {
            break;
        }
        let center = median_of_valid(&mut kept);
        let spread = nan_std(&kept);
        let threshold = sigma * spread;

        let before = kept.len();
        kept.retain(|v| (v - center).abs() <= threshold);
        if kept.len() == before {
            break;
        }
    }

    ClippedStats {
        mean: nan_mean(&kept),
        median: median_of_valid(&mut kept),
        std: nan_std(&kept),
    }
}
