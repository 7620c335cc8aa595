//! Shared types for the pit strategy engine

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for kart plates to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KartId(String);

impl KartId {
    /// Build a kart id from a raw plate, trimming surrounding whitespace
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for driver identity
///
/// Feeds report driver names with inconsistent spacing and casing between
/// cycles, so the identity is always the upper-cased name with whitespace
/// runs collapsed to a single space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(raw: &str) -> Self {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(collapsed.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One normalized observation of a kart for a single polling cycle
#[derive(Debug, Clone, PartialEq)]
pub struct LapEvent {
    pub driver_id: DriverId,
    pub kart_id: KartId,
    /// Last completed lap in seconds, 0.0 when no new lap this cycle
    pub lap_seconds: f64,
    pub in_pit: bool,
    /// Lap counter reported by the feed, used to drop repeated lap reports
    pub lap_number: Option<u32>,
}

impl LapEvent {
    pub fn on_track(kart: &str, driver: &str, lap_seconds: f64) -> Self {
        Self {
            driver_id: DriverId::new(driver),
            kart_id: KartId::new(kart),
            lap_seconds,
            in_pit: false,
            lap_number: None,
        }
    }

    pub fn in_pit(kart: &str, driver: &str) -> Self {
        Self {
            driver_id: DriverId::new(driver),
            kart_id: KartId::new(kart),
            lap_seconds: 0.0,
            in_pit: true,
            lap_number: None,
        }
    }

    pub fn with_lap_number(mut self, lap_number: u32) -> Self {
        self.lap_number = Some(lap_number);
        self
    }

    /// True when this event carries a lap that may feed baselines and stints
    #[inline]
    pub fn has_new_lap(&self) -> bool {
        !self.in_pit && self.lap_seconds > 0.0
    }
}

/// Qualitative verdict on a kart's relative score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Rocket,
    Neutral,
    Lemon,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Rocket => "rocket",
            Classification::Neutral => "neutral",
            Classification::Lemon => "lemon",
        }
    }
}

/// A scored kart waiting in the pit lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitQueueEntry {
    pub kart_id: KartId,
    /// Driver who brought the kart in
    pub driver_id: DriverId,
    /// Stint pace minus driver baseline, negative means faster than usual
    pub score: f64,
    pub classification: Classification,
    /// Epoch milliseconds at which the kart joined the queue
    pub queued_at: u64,
    pub stint_laps: usize,
}

/// Recommendation for the driver currently on track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    NoKartsAvailable,
    BoxNow { kart_id: KartId, driver_id: DriverId, score: f64 },
    StayOut,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::NoKartsAvailable => "no_karts_available",
            Verdict::BoxNow { .. } => "box_now",
            Verdict::StayOut => "stay_out",
        }
    }
}

/// Per-cycle counters reported alongside the queue snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub rows: usize,
    pub malformed_rows: usize,
    pub laps_recorded: usize,
    pub stints_scored: usize,
}

/// Everything the presentation side receives for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub session: String,
    pub cycle: u64,
    pub ts: u64,
    pub queue: Vec<PitQueueEntry>,
    pub verdict: Verdict,
    pub stats: CycleStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_id_normalizes_case_and_whitespace() {
        assert_eq!(DriverId::new("  ana   lopez "), DriverId::new("ANA LOPEZ"));
        assert_eq!(DriverId::new("Ana\tLopez").as_str(), "ANA LOPEZ");
    }

    #[test]
    fn test_kart_id_trims() {
        assert_eq!(KartId::new(" 07 ").as_str(), "07");
    }

    #[test]
    fn test_pit_event_has_no_lap() {
        let event = LapEvent { lap_seconds: 41.2, ..LapEvent::in_pit("7", "Ana") };
        assert!(!event.has_new_lap());
        assert!(!LapEvent::on_track("7", "Ana", 0.0).has_new_lap());
        assert!(LapEvent::on_track("7", "Ana", 41.2).has_new_lap());
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let verdict = Verdict::BoxNow {
            kart_id: KartId::new("K7"),
            driver_id: DriverId::new("Ana"),
            score: -1.0,
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["verdict"], "box_now");
        assert_eq!(json["kart_id"], "K7");
        assert_eq!(json["driver_id"], "ANA");

        let json = serde_json::to_value(Verdict::StayOut).unwrap();
        assert_eq!(json["verdict"], "stay_out");
    }
}
