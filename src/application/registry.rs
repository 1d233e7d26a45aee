//! Registry of signatures reported during this process lifetime.
//!
//! The throttle consults it before logging anything: a signature that has
//! already been reported is dropped, so a hot loop producing the same fault
//! cannot flood the log or the mailbox.

use crate::application::ports::{Clock, Storage};
use crate::domain::signature::ErrorSignature;
use std::sync::Arc;
use std::time::SystemTime;

/// State tracked for each reported signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureState {
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    /// Times the signature reached the throttle, including the first
    pub occurrences: u64,
}

impl SignatureState {
    fn new(now: SystemTime) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            occurrences: 0,
        }
    }
}

/// Result of observing a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First time this signature is seen
    New,
    /// Already reported; carries the updated occurrence count
    Duplicate(u64),
}

impl Observation {
    pub fn is_new(&self) -> bool {
        matches!(self, Observation::New)
    }
}

/// Bounded per-signature registry.
///
/// Generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`. When more than `max_entries` signatures are tracked
/// the least recently seen one is forgotten, which means a long-evicted fault
/// may be reported a second time.
#[derive(Clone)]
pub struct SignatureRegistry<S>
where
    S: Storage<ErrorSignature, SignatureState> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl<S> SignatureRegistry<S>
where
    S: Storage<ErrorSignature, SignatureState> + Clone,
{
    pub fn new(storage: S, clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            storage,
            clock,
            max_entries: max_entries.max(1),
        }
    }

    /// Record an occurrence of `signature`.
    ///
    /// Returns how many signatures were evicted to make room, alongside the
    /// observation.
    pub fn observe(&self, signature: ErrorSignature) -> (Observation, usize) {
        let now = self.clock.now();
        let occurrences = self.storage.with_entry_mut(
            signature,
            || SignatureState::new(now),
            |state| {
                state.occurrences += 1;
                state.last_seen = now;
                state.occurrences
            },
        );

        if occurrences > 1 {
            return (Observation::Duplicate(occurrences), 0);
        }

        (Observation::New, self.evict_over_capacity(signature))
    }

    /// Whether `signature` has been reported.
    pub fn contains(&self, signature: &ErrorSignature) -> bool {
        self.storage.contains(signature)
    }

    /// Snapshot of the state for a signature.
    pub fn get(&self, signature: &ErrorSignature) -> Option<SignatureState> {
        self.storage.with_entry(signature, |state| *state)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Forget every signature.
    pub fn clear(&self) {
        self.storage.clear();
    }

    fn evict_over_capacity(&self, keep: ErrorSignature) -> usize {
        let mut evicted = 0;
        while self.storage.len() > self.max_entries {
            let mut oldest: Option<(ErrorSignature, SystemTime)> = None;
            self.storage.for_each(|key, state| {
                if *key == keep {
                    return;
                }
                match oldest {
                    Some((_, seen)) if seen <= state.last_seen => {}
                    _ => oldest = Some((*key, state.last_seen)),
                }
            });

            match oldest {
                Some((key, _)) => {
                    self.storage.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}
