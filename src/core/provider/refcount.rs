/*!
Reference counting with threshold crossing detection.

A provider is held by the store's slot and by everyone actively using it.
Two thresholds matter: falling from 2 to 1 means nobody but the store
holds the provider any more, and falling from 1 to 0 means the provider is
gone. Every decrement is a single atomic update that reports which
threshold, if any, it crossed, so exactly one thread observes each
crossing.
*/

use std::sync::atomic::{AtomicUsize, Ordering};

/// Threshold crossed by a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// The count stayed above a threshold, or was already zero
    None,
    /// The count fell from 2 to 1: the provider fell out of active use
    FellOutOfUse,
    /// The count fell from 1 to 0: the provider must be destroyed
    ReachedZero,
}

/// Atomic reference counter for provider objects
#[derive(Debug)]
pub struct RefCount(AtomicUsize);

impl RefCount {
    pub fn new(initial: usize) -> Self {
        Self(AtomicUsize::new(initial))
    }

    /// Current count
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Add a reference and return the new count
    pub fn upref(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Add a reference unless the count already reached zero
    ///
    /// A zero count is terminal, so a dying object is never revived.
    pub fn try_upref(&self) -> Option<usize> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 { None } else { Some(count + 1) }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Drop a reference, returning the new count and the threshold crossed
    pub fn release(&self) -> (usize, Crossing) {
        match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
        {
            Ok(2) => (1, Crossing::FellOutOfUse),
            Ok(1) => (0, Crossing::ReachedZero),
            Ok(previous) => (previous - 1, Crossing::None),
            Err(_) => (0, Crossing::None),
        }
    }
}
