use std::sync::{
    OnceLock,
    atomic::{AtomicUsize, Ordering},
};

use crate::{ErrorKind, RawResult, Result};

/// A reserved position in a [`ResultSink`].
///
/// Slots are handed out once each and cannot be copied, so no two workers
/// can ever write the same position.
#[derive(Debug, PartialEq, Eq)]
pub struct Slot(usize);

impl Slot {
    /// Position of this slot in the final results.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// Fixed-size collection receiving exactly one result per dispatched target.
///
/// Workers claim a [`Slot`] with an atomic increment as soon as they dequeue
/// a target, before the fetch starts. Claimed indices are disjoint, so
/// writes need no lock, and a failed fetch still lands in the position
/// reserved for it. Slot order therefore reflects dequeue order, not
/// completion order.
#[derive(Debug)]
pub struct ResultSink {
    slots: Box<[OnceLock<RawResult>]>,
    next: AtomicUsize,
}

impl ResultSink {
    /// Creates a sink with room for exactly `capacity` results.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots claimed so far.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Reserves the next unused slot.
    ///
    /// Returns `None` if every slot has been claimed already.
    pub fn claim(&self) -> Option<Slot> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        (index < self.slots.len()).then_some(Slot(index))
    }

    /// Stores `result` in `slot`.
    pub fn write(&self, slot: Slot, result: RawResult) {
        // `Slot` is only created by `claim`, which never returns an index
        // twice, so the cell is always empty here.
        if self.slots[slot.0].set(result).is_err() {
            log::error!("Result slot {} was written twice", slot.0);
        }
    }

    /// Consumes the sink and returns the results in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnfilledSlot`] if any slot was never written.
    pub fn into_results(self) -> Result<Vec<RawResult>> {
        self.slots
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.into_inner().ok_or(ErrorKind::UnfilledSlot(index)))
            .collect()
    }
}
