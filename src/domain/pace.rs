//! Outlier-trimmed averaging of lap times
//!
//! Used for both driver baselines and stint pace so the two are directly
//! comparable.

/// Minimum sample size for a pace estimate
pub const MIN_PACE_SAMPLES: usize = 3;

/// Fraction of the sorted sample dropped from each end
const TRIM_FRACTION: f64 = 0.2;

/// Number of laps dropped from each end of a sorted sample of `count` laps
#[inline]
pub fn trim_count(count: usize) -> usize {
    ((count as f64 * TRIM_FRACTION).floor() as usize).max(1)
}

/// Mean of `laps` after dropping `trim_count` laps from each end of the
/// sorted sample. Returns None for fewer than three laps.
pub fn trimmed_mean(laps: &[f64]) -> Option<f64> {
    if laps.len() < MIN_PACE_SAMPLES {
        return None;
    }

    let mut sorted = laps.to_vec();
    sorted.sort_by(f64::total_cmp);

    let trim = trim_count(sorted.len());
    let kept = &sorted[trim..sorted.len() - trim];
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}
