//! Per-driver rolling pace baseline
//!
//! Keeps the last N valid laps for every driver seen this session. The
//! window is bounded so recent karts dominate the estimate and memory stays
//! flat over a long race.

use crate::domain::pace;
use crate::domain::DriverId;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Rolling lap history for one driver
#[derive(Debug, Clone, Default)]
pub struct DriverBaseline {
    recent_laps: VecDeque<f64>,
}

impl DriverBaseline {
    pub fn recent_laps(&self) -> impl Iterator<Item = f64> + '_ {
        self.recent_laps.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.recent_laps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent_laps.is_empty()
    }

    pub fn trimmed_mean(&self) -> Option<f64> {
        let (front, back) = self.recent_laps.as_slices();
        if back.is_empty() {
            return pace::trimmed_mean(front);
        }
        let laps: Vec<f64> = self.recent_laps.iter().copied().collect();
        pace::trimmed_mean(&laps)
    }
}

/// Tracks a bounded lap window per driver
pub struct BaselineTracker {
    drivers: FxHashMap<DriverId, DriverBaseline>,
    window: usize,
    min_lap_seconds: f64,
}

impl BaselineTracker {
    pub fn new(window: usize, min_lap_seconds: f64) -> Self {
        Self { drivers: FxHashMap::default(), window, min_lap_seconds }
    }

    /// Record a lap for a driver
    /// Returns false when the lap is below the validity cutoff and was ignored
    pub fn record_lap(&mut self, driver: &DriverId, lap_seconds: f64) -> bool {
        if !lap_seconds.is_finite() || lap_seconds < self.min_lap_seconds {
            debug!(
                driver = %driver,
                lap_seconds = %lap_seconds,
                min_lap_seconds = %self.min_lap_seconds,
                "baseline_lap_rejected"
            );
            return false;
        }

        let baseline = self.drivers.entry(driver.clone()).or_default();
        baseline.recent_laps.push_back(lap_seconds);
        while baseline.recent_laps.len() > self.window {
            baseline.recent_laps.pop_front();
        }
        true
    }

    /// Driver's outlier-trimmed pace, None until three valid laps exist
    pub fn trimmed_mean(&self, driver: &DriverId) -> Option<f64> {
        self.drivers.get(driver).and_then(DriverBaseline::trimmed_mean)
    }

    pub fn get(&self, driver: &DriverId) -> Option<&DriverBaseline> {
        self.drivers.get(driver)
    }

    /// Number of drivers with at least one valid lap
    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn min_lap_seconds(&self) -> f64 {
        self.min_lap_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> DriverId {
        DriverId::new("Ana")
    }

    #[test]
    fn test_no_baseline_before_three_laps() {
        let mut tracker = BaselineTracker::new(10, 20.0);
        assert_eq!(tracker.trimmed_mean(&ana()), None);

        tracker.record_lap(&ana(), 22.0);
        tracker.record_lap(&ana(), 22.1);
        assert_eq!(tracker.trimmed_mean(&ana()), None);

        tracker.record_lap(&ana(), 21.9);
        assert!((tracker.trimmed_mean(&ana()).unwrap() - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_glitch_laps() {
        let mut tracker = BaselineTracker::new(10, 20.0);
        assert!(!tracker.record_lap(&ana(), 4.2));
        assert!(!tracker.record_lap(&ana(), 19.99));
        assert!(!tracker.record_lap(&ana(), f64::NAN));
        assert!(tracker.get(&ana()).is_none());
        assert_eq!(tracker.driver_count(), 0);

        assert!(tracker.record_lap(&ana(), 20.0));
        assert_eq!(tracker.get(&ana()).unwrap().len(), 1);
    }

    #[test]
    fn test_cutoff_is_configurable() {
        let mut tracker = BaselineTracker::new(10, 25.0);
        assert!(!tracker.record_lap(&ana(), 22.0));
        assert!(tracker.record_lap(&ana(), 26.0));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut tracker = BaselineTracker::new(3, 20.0);
        for lap in [30.0, 31.0, 32.0, 40.0, 41.0] {
            tracker.record_lap(&ana(), lap);
        }
        let laps: Vec<f64> = tracker.get(&ana()).unwrap().recent_laps().collect();
        assert_eq!(laps, vec![32.0, 40.0, 41.0]);
        assert_eq!(tracker.trimmed_mean(&ana()), Some(40.0));
    }

    #[test]
    fn test_drivers_are_independent() {
        let mut tracker = BaselineTracker::new(10, 20.0);
        let ben = DriverId::new("Ben");
        for lap in [22.0, 21.8, 22.3] {
            tracker.record_lap(&ana(), lap);
        }
        tracker.record_lap(&ben, 25.0);

        assert!(tracker.trimmed_mean(&ana()).is_some());
        assert_eq!(tracker.trimmed_mean(&ben), None);
        assert_eq!(tracker.driver_count(), 2);
    }

    #[test]
    fn test_name_variants_share_baseline() {
        let mut tracker = BaselineTracker::new(10, 20.0);
        tracker.record_lap(&DriverId::new("ana"), 22.0);
        tracker.record_lap(&DriverId::new(" ANA "), 22.0);
        tracker.record_lap(&DriverId::new("Ana"), 22.0);
        assert_eq!(tracker.trimmed_mean(&ana()), Some(22.0));
    }
}
