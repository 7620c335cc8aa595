//! Event handlers for the StrategyEngine
//!
//! On-track observations feed the baseline and stint trackers; pit
//! observations close stints and queue the scored kart.

use super::{EventOutcome, LapSkip, StrategyEngine};
use crate::domain::{epoch_ms, LapEvent};
use crate::services::pit_queue::EnqueueOutcome;
use crate::services::scoring::ScoreOutcome;
use tracing::{debug, info};

impl StrategyEngine {
    /// Handle a kart observed on track
    ///
    /// A queued kart is released once it completes a new lap. A status
    /// flicker with no new lap keeps its queue entry.
    pub(crate) fn handle_on_track(&mut self, event: &LapEvent) -> EventOutcome {
        let kart = &event.kart_id;

        if self.pit_state.insert(kart.clone(), false) == Some(true) {
            debug!(kart = %kart, driver = %event.driver_id, "kart_left_pit");
        }

        if !event.has_new_lap() {
            return EventOutcome::Idle;
        }

        if let Some(lap_number) = event.lap_number {
            if self.last_lap_number.insert(kart.clone(), lap_number) == Some(lap_number) {
                self.metrics.record_lap_repeated();
                return EventOutcome::LapSkipped(LapSkip::Repeated);
            }
        }

        self.release_redeployed(event);

        let accepted = self.baselines.record_lap(&event.driver_id, event.lap_seconds);
        self.metrics.record_lap(accepted);
        if !accepted {
            return EventOutcome::LapSkipped(LapSkip::BelowCutoff);
        }

        self.stints.observe_on_track_lap(kart, &event.driver_id, event.lap_seconds);
        debug!(
            kart = %kart,
            driver = %event.driver_id,
            lap_seconds = %event.lap_seconds,
            lap_number = ?event.lap_number,
            "lap_recorded"
        );
        EventOutcome::LapRecorded
    }

    fn release_redeployed(&mut self, event: &LapEvent) {
        let Some(released) = self.queue.remove(&event.kart_id) else {
            return;
        };
        info!(
            kart = %event.kart_id,
            vacated_by = %released.driver_id,
            driver = %event.driver_id,
            score = format!("{:.3}", released.score),
            "kart_redeployed"
        );
        self.metrics.record_kart_released();
    }

    /// Handle a kart observed in the pit lane
    ///
    /// Only the transition into the pit lane scores the stint; staying in
    /// the pit lane across cycles is a no-op.
    pub(crate) fn handle_pit_observation(&mut self, event: &LapEvent) -> EventOutcome {
        let kart = &event.kart_id;

        if self.pit_state.insert(kart.clone(), true) == Some(true) {
            return EventOutcome::StillInPit;
        }

        let stint = self.stints.close_stint(kart);
        let outcome = self.scoring.score_stint(kart, stint, &self.baselines, epoch_ms());

        match &outcome {
            ScoreOutcome::Scored { entry, stint_pace, baseline } => {
                info!(
                    kart = %kart,
                    driver = %entry.driver_id,
                    laps = %entry.stint_laps,
                    stint_pace = format!("{:.3}", stint_pace),
                    baseline = format!("{:.3}", baseline),
                    score = format!("{:.3}", entry.score),
                    class = %entry.classification.as_str(),
                    "stint_scored"
                );
                match self.queue.enqueue(entry.clone()) {
                    EnqueueOutcome::Queued => self.metrics.record_queued(false),
                    EnqueueOutcome::QueuedWithEviction(_) => self.metrics.record_queued(true),
                    EnqueueOutcome::Duplicate => self.metrics.record_queue_duplicate(),
                }
                self.metrics.record_pit_entry(true);
            }
            skipped => {
                info!(
                    kart = %kart,
                    driver = %event.driver_id,
                    reason = %skipped.as_str(),
                    "pit_entry_not_scored"
                );
                self.metrics.record_pit_entry(false);
            }
        }

        EventOutcome::PitEntry(outcome)
    }
}
