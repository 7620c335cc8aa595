//! Per-kart stint accumulation
//!
//! A stint starts with the first on-track lap of a kart that is not already
//! tracked and ends when the kart enters the pit lane.

use crate::domain::{DriverId, KartId};
use crate::infra::config::DriverSwapPolicy;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Laps driven on one kart since it last left the pits
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStint {
    pub driver_id: DriverId,
    pub laps: Vec<f64>,
}

impl ActiveStint {
    fn new(driver_id: DriverId) -> Self {
        Self { driver_id, laps: Vec::new() }
    }
}

/// Owns at most one active stint per kart
pub struct StintTracker {
    stints: FxHashMap<KartId, ActiveStint>,
    swap_policy: DriverSwapPolicy,
}

impl StintTracker {
    pub fn new(swap_policy: DriverSwapPolicy) -> Self {
        Self { stints: FxHashMap::default(), swap_policy }
    }

    /// Append an on-track lap to the kart's stint, opening one if needed
    pub fn observe_on_track_lap(&mut self, kart: &KartId, driver: &DriverId, lap_seconds: f64) {
        let swap_policy = self.swap_policy;
        let stint = self.stints.entry(kart.clone()).or_insert_with(|| {
            debug!(kart = %kart, driver = %driver, "stint_opened");
            ActiveStint::new(driver.clone())
        });

        if stint.driver_id != *driver {
            info!(
                kart = %kart,
                previous_driver = %stint.driver_id,
                driver = %driver,
                laps = %stint.laps.len(),
                policy = ?swap_policy,
                "stint_driver_swap"
            );
            match swap_policy {
                DriverSwapPolicy::Rebind => stint.driver_id = driver.clone(),
                DriverSwapPolicy::Restart => *stint = ActiveStint::new(driver.clone()),
            }
        }

        stint.laps.push(lap_seconds);
    }

    /// Remove and return the kart's stint; None if the kart was not on track
    pub fn close_stint(&mut self, kart: &KartId) -> Option<ActiveStint> {
        self.stints.remove(kart)
    }

    pub fn get(&self, kart: &KartId) -> Option<&ActiveStint> {
        self.stints.get(kart)
    }

    pub fn is_active(&self, kart: &KartId) -> bool {
        self.stints.contains_key(kart)
    }

    /// Number of karts currently on a stint
    pub fn active_count(&self) -> usize {
        self.stints.len()
    }
}
