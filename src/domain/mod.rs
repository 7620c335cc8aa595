//! Domain models - core race timing types
//!
//! This module contains the canonical data types used throughout the system:
//! - `LapEvent` - one normalized kart observation per polling cycle
//! - `KartId` / `DriverId` - identity newtypes
//! - `PitQueueEntry` - a scored kart waiting in the pit lane
//! - `Verdict` / `CycleReport` - what the presentation side receives
//! - `pace` - trimmed-mean pace estimation

pub mod pace;
pub mod types;

pub use types::{
    epoch_ms, Classification, CycleReport, CycleStats, DriverId, KartId, LapEvent, PitQueueEntry,
    Verdict,
};
