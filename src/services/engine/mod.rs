//! Strategy engine - per-session pipeline orchestration
//!
//! The engine is the single owner of all session state and drives one batch
//! at a time through the pipeline:
//! - Lap normalization (raw feed rows to `LapEvent`s)
//! - Baseline and stint accumulation for on-track laps
//! - Scoring on pit-entry transitions, then the pit queue
//! - The box / stay-out verdict for the cycle report

mod handlers;

use crate::domain::{epoch_ms, CycleReport, CycleStats, KartId, LapEvent, PitQueueEntry, Verdict};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::feed::{self, RawRow};
use crate::services::advisor;
use crate::services::baseline::BaselineTracker;
use crate::services::pit_queue::PitQueue;
use crate::services::scoring::{ScoreOutcome, ScoringEngine};
use crate::services::stint::StintTracker;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Why an on-track observation did not produce a recorded lap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapSkip {
    /// Lap counter has not moved since the previous cycle
    Repeated,
    /// Below the minimum valid lap time
    BelowCutoff,
}

/// What a single event did to the engine state
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    LapRecorded,
    LapSkipped(LapSkip),
    /// On track with no new lap this cycle
    Idle,
    /// Kart transitioned into the pit lane
    PitEntry(ScoreOutcome),
    /// Kart was already in the pit lane last cycle
    StillInPit,
}

/// Owns all state for one timing session
pub struct StrategyEngine {
    /// Rolling per-driver pace windows
    pub(crate) baselines: BaselineTracker,
    /// Open stints by kart
    pub(crate) stints: StintTracker,
    pub(crate) scoring: ScoringEngine,
    pub(crate) queue: PitQueue,
    /// Pit flag seen for each kart on its last observation
    pub(crate) pit_state: FxHashMap<KartId, bool>,
    /// Last lap counter seen for each kart
    pub(crate) last_lap_number: FxHashMap<KartId, u32>,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    cycle: u64,
    last_verdict: Verdict,
}

impl StrategyEngine {
    pub fn new(config: Config, metrics: Arc<Metrics>) -> Self {
        Self {
            baselines: BaselineTracker::new(config.baseline_window(), config.min_lap_seconds()),
            stints: StintTracker::new(config.driver_swap()),
            scoring: ScoringEngine::new(config.rocket_threshold(), config.lemon_threshold()),
            queue: PitQueue::new(config.queue_capacity()),
            pit_state: FxHashMap::default(),
            last_lap_number: FxHashMap::default(),
            config,
            metrics,
            cycle: 0,
            last_verdict: Verdict::NoKartsAvailable,
        }
    }

    /// Normalize and process one batch of raw feed rows
    ///
    /// Rows that cannot be normalized are skipped; an empty batch leaves all
    /// state untouched and still yields a report.
    pub fn process_batch(&mut self, rows: &[RawRow]) -> CycleReport {
        let started = Instant::now();
        let mut stats = CycleStats { rows: rows.len(), ..Default::default() };

        for raw in rows {
            match feed::normalize_raw(raw, self.config.pit_tokens()) {
                Ok(event) => {
                    let outcome = self.process_event(&event);
                    stats.tally(&outcome);
                }
                Err(e) => {
                    stats.malformed_rows += 1;
                    self.metrics.record_row_malformed();
                    debug!(error = %e, "feed_row_skipped");
                }
            }
        }

        self.finish_cycle(stats, started)
    }

    /// Process one batch of already-normalized events
    pub fn process_events(&mut self, events: &[LapEvent]) -> CycleReport {
        let started = Instant::now();
        let mut stats = CycleStats { rows: events.len(), ..Default::default() };

        for event in events {
            let outcome = self.process_event(event);
            stats.tally(&outcome);
        }

        self.finish_cycle(stats, started)
    }

    /// Process a single event, dispatching on pit state
    pub fn process_event(&mut self, event: &LapEvent) -> EventOutcome {
        if event.in_pit {
            self.handle_pit_observation(event)
        } else {
            self.handle_on_track(event)
        }
    }

    fn finish_cycle(&mut self, stats: CycleStats, started: Instant) -> CycleReport {
        self.cycle += 1;
        let verdict = self.verdict();

        if verdict != self.last_verdict {
            info!(
                cycle = %self.cycle,
                verdict = %verdict.as_str(),
                previous = %self.last_verdict.as_str(),
                head = ?self.queue.head().map(|e| e.kart_id.as_str()),
                "verdict_changed"
            );
            if matches!(verdict, Verdict::BoxNow { .. }) {
                self.metrics.record_box_now();
            }
            self.last_verdict = verdict.clone();
        }

        self.metrics.set_queue_depth(self.queue.len());
        self.metrics.record_batch(stats.rows, started);

        debug!(
            cycle = %self.cycle,
            rows = %stats.rows,
            malformed = %stats.malformed_rows,
            laps = %stats.laps_recorded,
            scored = %stats.stints_scored,
            queue = %self.queue.len(),
            "cycle_processed"
        );

        CycleReport {
            session: self.config.session_id().to_string(),
            cycle: self.cycle,
            ts: epoch_ms(),
            queue: self.queue.snapshot(),
            verdict,
            stats,
        }
    }

    /// Current recommendation from the queue head
    pub fn verdict(&self) -> Verdict {
        advisor::advise(&self.queue, self.config.box_threshold())
    }

    /// Queue contents in pit lane order
    pub fn snapshot(&self) -> Vec<PitQueueEntry> {
        self.queue.snapshot()
    }

    /// Take the head kart off the queue (the strategist sent a driver out on it)
    pub fn dequeue_head(&mut self) -> Option<PitQueueEntry> {
        let entry = self.queue.dequeue_head()?;
        info!(kart = %entry.kart_id, driver = %entry.driver_id, "kart_dequeued");
        self.metrics.record_kart_released();
        self.metrics.set_queue_depth(self.queue.len());
        Some(entry)
    }

    pub fn baselines(&self) -> &BaselineTracker {
        &self.baselines
    }

    pub fn stints(&self) -> &StintTracker {
        &self.stints
    }

    pub fn queue(&self) -> &PitQueue {
        &self.queue
    }

    /// Number of completed cycles
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

impl CycleStats {
    fn tally(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::LapRecorded => self.laps_recorded += 1,
            EventOutcome::PitEntry(ScoreOutcome::Scored { .. }) => self.stints_scored += 1,
            _ => {}
        }
    }
}
