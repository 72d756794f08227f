//! Shared aggregation state
//!
//! One arena entry per configured feed slot, holding that feed's last
//! successfully parsed price. Every access goes through a single
//! reader/writer lock and no guard ever escapes this module, so callers
//! cannot hold the lock across an await point or a decision.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ticker_core::FeedSlot;

/// Last known price per feed slot
#[derive(Debug)]
pub struct AggregationState {
    /// Indexed by `FeedSlot::index`; `None` means no valid price since the last clear
    slots: RwLock<Vec<Option<Decimal>>>,

    /// Stats
    update_count: AtomicU64,
    clear_count: AtomicU64,
    last_update: RwLock<Option<Instant>>,
}

impl AggregationState {
    pub fn with_slots(slot_count: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; slot_count]),
            update_count: AtomicU64::new(0),
            clear_count: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Record the latest price for a slot
    ///
    /// Returns `false` if the slot was never configured.
    pub fn set(&self, slot: FeedSlot, price: Decimal) -> bool {
        {
            let mut slots = self.slots.write();
            match slots.get_mut(slot.index()) {
                Some(entry) => *entry = Some(price),
                None => return false,
            }
        }

        self.update_count.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some(Instant::now());
        true
    }

    /// Forget the price of a slot
    ///
    /// Returns the value that was held, if any. Only clears that removed a
    /// price are counted.
    pub fn clear(&self, slot: FeedSlot) -> Option<Decimal> {
        let previous = self
            .slots
            .write()
            .get_mut(slot.index())
            .and_then(Option::take);

        if previous.is_some() {
            self.clear_count.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    /// Get the price held for a slot
    pub fn get(&self, slot: FeedSlot) -> Option<Decimal> {
        self.slots.read().get(slot.index()).copied().flatten()
    }

    /// Copy out every known price
    ///
    /// The read lock is held only for the copy.
    pub fn snapshot(&self) -> Vec<Decimal> {
        self.slots.read().iter().flatten().copied().collect()
    }

    /// Number of slots currently holding a price
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stats
    pub fn stats(&self) -> AggregationStats {
        AggregationStats {
            live_slots: self.len(),
            slot_count: self.slot_count(),
            update_count: self.update_count.load(Ordering::Relaxed),
            clear_count: self.clear_count.load(Ordering::Relaxed),
            last_update_age: self.last_update.read().map(|at| at.elapsed()),
        }
    }
}

/// Statistics about aggregation state
#[derive(Debug, Clone)]
pub struct AggregationStats {
    pub live_slots: usize,
    pub slot_count: usize,
    pub update_count: u64,
    pub clear_count: u64,
    pub last_update_age: Option<Duration>,
}
