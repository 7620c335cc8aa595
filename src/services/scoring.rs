//! Relative kart scoring at pit entry
//!
//! Compares a closed stint's trimmed pace against the driver's own
//! baseline. Negative scores mean the kart ran faster than the driver
//! normally does.

use crate::domain::pace::{self, MIN_PACE_SAMPLES};
use crate::domain::{Classification, KartId, PitQueueEntry};
use crate::services::baseline::BaselineTracker;
use crate::services::stint::ActiveStint;

/// Result of trying to score a kart that just entered the pits
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored { entry: PitQueueEntry, stint_pace: f64, baseline: f64 },
    /// Kart had no open stint (already in the pit when first seen)
    NoStint,
    /// Stint shorter than the minimum sample
    TooFewLaps { laps: usize },
    /// Driver has no baseline yet
    NoBaseline,
}

impl ScoreOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreOutcome::Scored { .. } => "scored",
            ScoreOutcome::NoStint => "no_stint",
            ScoreOutcome::TooFewLaps { .. } => "too_few_laps",
            ScoreOutcome::NoBaseline => "no_baseline",
        }
    }
}

/// Classification bands for relative scores
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    rocket_threshold: f64,
    lemon_threshold: f64,
}

impl ScoringEngine {
    pub fn new(rocket_threshold: f64, lemon_threshold: f64) -> Self {
        Self { rocket_threshold, lemon_threshold }
    }

    pub fn classify(&self, score: f64) -> Classification {
        if score < self.rocket_threshold {
            Classification::Rocket
        } else if score > self.lemon_threshold {
            Classification::Lemon
        } else {
            Classification::Neutral
        }
    }

    /// Score a stint that was just closed for `kart`
    pub fn score_stint(
        &self,
        kart: &KartId,
        stint: Option<ActiveStint>,
        baselines: &BaselineTracker,
        queued_at: u64,
    ) -> ScoreOutcome {
        let Some(stint) = stint else {
            return ScoreOutcome::NoStint;
        };
        if stint.laps.len() < MIN_PACE_SAMPLES {
            return ScoreOutcome::TooFewLaps { laps: stint.laps.len() };
        }
        let Some(stint_pace) = pace::trimmed_mean(&stint.laps) else {
            return ScoreOutcome::TooFewLaps { laps: stint.laps.len() };
        };
        let Some(baseline) = baselines.trimmed_mean(&stint.driver_id) else {
            return ScoreOutcome::NoBaseline;
        };

        let score = stint_pace - baseline;
        ScoreOutcome::Scored {
            entry: PitQueueEntry {
                kart_id: kart.clone(),
                driver_id: stint.driver_id,
                score,
                classification: self.classify(score),
                queued_at,
                stint_laps: stint.laps.len(),
            },
            stint_pace,
            baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DriverId;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(-0.2, 0.15)
    }

    fn stint(driver: &str, laps: &[f64]) -> Option<ActiveStint> {
        Some(ActiveStint { driver_id: DriverId::new(driver), laps: laps.to_vec() })
    }

    fn baselines_for(driver: &str, laps: &[f64]) -> BaselineTracker {
        let mut tracker = BaselineTracker::new(10, 20.0);
        for lap in laps {
            tracker.record_lap(&DriverId::new(driver), *lap);
        }
        tracker
    }

    #[test]
    fn test_classify_bands() {
        let engine = engine();
        assert_eq!(engine.classify(-1.0), Classification::Rocket);
        assert_eq!(engine.classify(-0.21), Classification::Rocket);
        assert_eq!(engine.classify(-0.2), Classification::Neutral);
        assert_eq!(engine.classify(0.0), Classification::Neutral);
        assert_eq!(engine.classify(0.15), Classification::Neutral);
        assert_eq!(engine.classify(0.16), Classification::Lemon);
    }

    #[test]
    fn test_classify_uses_configured_thresholds() {
        let engine = ScoringEngine::new(-0.5, 0.5);
        assert_eq!(engine.classify(-0.3), Classification::Neutral);
        assert_eq!(engine.classify(0.3), Classification::Neutral);
        assert_eq!(engine.classify(-0.6), Classification::Rocket);
    }

    #[test]
    fn test_rocket_kart() {
        let baselines = baselines_for("Ana", &[22.0, 21.8, 22.3, 21.9, 22.1]);
        let kart = KartId::new("K7");

        let outcome =
            engine().score_stint(&kart, stint("Ana", &[21.0, 20.9, 21.2]), &baselines, 1000);

        let ScoreOutcome::Scored { entry, stint_pace, baseline } = outcome else {
            panic!("expected scored outcome, got {outcome:?}");
        };
        assert!((stint_pace - 21.0).abs() < 1e-9);
        assert!((baseline - 22.0).abs() < 1e-9);
        assert!((entry.score + 1.0).abs() < 1e-9);
        assert_eq!(entry.classification, Classification::Rocket);
        assert_eq!(entry.kart_id, kart);
        assert_eq!(entry.driver_id, DriverId::new("Ana"));
        assert_eq!(entry.queued_at, 1000);
        assert_eq!(entry.stint_laps, 3);
    }

    #[test]
    fn test_lemon_kart() {
        let baselines = baselines_for("Ana", &[22.0, 21.8, 22.3, 21.9, 22.1]);
        let outcome = engine().score_stint(
            &KartId::new("3"),
            stint("Ana", &[22.6, 22.5, 22.4, 22.5]),
            &baselines,
            0,
        );
        let ScoreOutcome::Scored { entry, .. } = outcome else {
            panic!("expected scored outcome");
        };
        assert!((entry.score - 0.5).abs() < 1e-9);
        assert_eq!(entry.classification, Classification::Lemon);
    }

    #[test]
    fn test_missing_stint() {
        let baselines = baselines_for("Ana", &[22.0, 21.8, 22.3]);
        assert_eq!(
            engine().score_stint(&KartId::new("7"), None, &baselines, 0),
            ScoreOutcome::NoStint
        );
    }

    #[test]
    fn test_short_stint() {
        let baselines = baselines_for("Ana", &[22.0, 21.8, 22.3]);
        assert_eq!(
            engine().score_stint(&KartId::new("7"), stint("Ana", &[21.0, 21.1]), &baselines, 0),
            ScoreOutcome::TooFewLaps { laps: 2 }
        );
    }

    #[test]
    fn test_driver_without_baseline() {
        let baselines = baselines_for("Ana", &[22.0, 21.8, 22.3]);
        assert_eq!(
            engine().score_stint(
                &KartId::new("7"),
                stint("Ben", &[21.0, 21.1, 21.2]),
                &baselines,
                0
            ),
            ScoreOutcome::NoBaseline
        );
    }
}
