//! # Single-Flight Registry
//!
//! In-memory map from fingerprint to the waiters of an in-flight fetch.
//! The first caller to [`Registry::join`] becomes the leader and must drive
//! the fetch; everyone else just waits. [`Registry::complete`] tears the
//! list down and delivers one result to every waiter in join order.
//!
//! Invariants the registry owns:
//!
//! - at most one fetch is in flight per fingerprint at any moment;
//! - every waiter is resumed exactly once;
//! - a waiter that went away (dropped its receiver) is skipped without
//!   affecting the fetch or the other waiters.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::FetchOutcome;
use crate::cache::Fingerprint;

/// One waiter's end of the fan-out.
pub type WaiterSlot = oneshot::Receiver<FetchOutcome>;

/// Waiter registry. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct Registry {
    waiters: Mutex<HashMap<Fingerprint, Vec<oneshot::Sender<FetchOutcome>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `fp`. Returns the receiver plus `true` when
    /// this call created the list, which obliges the caller to spawn the
    /// fetch and eventually call [`Registry::complete`].
    pub fn join(&self, fp: &Fingerprint) -> (WaiterSlot, bool) {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.lock();
        let leader = match waiters.entry(fp.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(tx);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![tx]);
                true
            }
        };
        (rx, leader)
    }

    /// Remove the waiter list for `fp` and deliver `outcome` to each slot
    /// in join order. No-op when no list exists.
    pub fn complete(&self, fp: &Fingerprint, outcome: FetchOutcome) {
        let Some(list) = self.lock().remove(fp) else {
            return;
        };
        for tx in list {
            // A send error means the waiter hung up; its slot is dropped
            let _ = tx.send(outcome.clone());
        }
    }

    /// Number of fingerprints currently in flight.
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, Vec<oneshot::Sender<FetchOutcome>>>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}
