//! Box / stay-out recommendation from the pit queue head

use crate::domain::Verdict;
use crate::services::pit_queue::PitQueue;

/// Decide whether the driver on track should box for the next kart out.
/// Reads the queue only.
pub fn advise(queue: &PitQueue, box_threshold: f64) -> Verdict {
    match queue.head() {
        None => Verdict::NoKartsAvailable,
        Some(head) if head.score < box_threshold => Verdict::BoxNow {
            kart_id: head.kart_id.clone(),
            driver_id: head.driver_id.clone(),
            score: head.score,
        },
        Some(_) => Verdict::StayOut,
    }
}
