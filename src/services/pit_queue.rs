//! Pit lane queue of scored karts
//!
//! Order follows physical arrival in the pit lane. Scores are attached
//! metadata and never reorder the queue. The queue is bounded: when full,
//! the oldest kart is evicted to make room for the newest arrival.

use crate::domain::{KartId, PitQueueEntry};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Result of an enqueue attempt
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue was full; the oldest entry was dropped to make room
    QueuedWithEviction(PitQueueEntry),
    /// Kart already queued; nothing inserted
    Duplicate,
}

/// Bounded FIFO of pit-ready karts, at most one entry per kart
pub struct PitQueue {
    entries: VecDeque<PitQueueEntry>,
    capacity: usize,
}

impl PitQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn enqueue(&mut self, entry: PitQueueEntry) -> EnqueueOutcome {
        if self.contains(&entry.kart_id) {
            debug!(kart = %entry.kart_id, "pit_queue_duplicate_rejected");
            return EnqueueOutcome::Duplicate;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };

        info!(
            kart = %entry.kart_id,
            driver = %entry.driver_id,
            score = format!("{:.3}", entry.score),
            class = %entry.classification.as_str(),
            position = %(self.entries.len() + 1),
            "kart_queued"
        );
        self.entries.push_back(entry);

        match evicted {
            Some(oldest) => {
                warn!(
                    kart = %oldest.kart_id,
                    capacity = %self.capacity,
                    "pit_queue_full_oldest_evicted"
                );
                EnqueueOutcome::QueuedWithEviction(oldest)
            }
            None => EnqueueOutcome::Queued,
        }
    }

    /// Remove and return the kart that arrived first
    pub fn dequeue_head(&mut self) -> Option<PitQueueEntry> {
        self.entries.pop_front()
    }

    /// Remove a specific kart, e.g. one that has been sent back out
    pub fn remove(&mut self, kart: &KartId) -> Option<PitQueueEntry> {
        let idx = self.entries.iter().position(|e| &e.kart_id == kart)?;
        self.entries.remove(idx)
    }

    pub fn head(&self) -> Option<&PitQueueEntry> {
        self.entries.front()
    }

    pub fn contains(&self, kart: &KartId) -> bool {
        self.entries.iter().any(|e| &e.kart_id == kart)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PitQueueEntry> {
        self.entries.iter()
    }

    /// Copy of the queue in current order
    pub fn snapshot(&self) -> Vec<PitQueueEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
