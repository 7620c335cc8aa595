//! Services - strategy logic and session state
//!
//! This module contains the core strategy services:
//! - `engine` - Per-batch pipeline orchestrator, owns all session state
//! - `baseline` - Rolling per-driver pace windows
//! - `stint` - Per-kart stint accumulation
//! - `scoring` - Relative kart scoring and classification
//! - `pit_queue` - Bounded FIFO of scored karts in the pit lane
//! - `advisor` - Box / stay-out recommendation

pub mod advisor;
pub mod baseline;
pub mod engine;
pub mod pit_queue;
pub mod scoring;
pub mod stint;

// Re-export commonly used types
pub use engine::{EventOutcome, LapSkip, StrategyEngine};
pub use pit_queue::PitQueue;
