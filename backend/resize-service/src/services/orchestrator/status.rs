//! Per-image processing state with one-shot, multi-waiter completion.
//!
//! The table only holds in-flight work: an entry is inserted as `Processing` when
//! an image key is claimed and removed in the same critical section that moves it
//! to a terminal state and fires its signal. Waiters keep their own handle to the
//! entry, so they still observe the terminal state after removal.

use crate::models::{ImageKey, ResizeStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Result of waiting on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed(ResizeStatus),
    TimedOut,
}

/// State of one image key plus its completion signal
#[derive(Debug)]
pub struct StatusEntry {
    state: watch::Sender<ResizeStatus>,
}

impl StatusEntry {
    fn new() -> Self {
        let (state, _) = watch::channel(ResizeStatus::Processing);
        Self { state }
    }

    pub fn state(&self) -> ResizeStatus {
        *self.state.borrow()
    }

    /// Terminal transition; returns false if the entry was already terminal
    fn finish(&self, outcome: ResizeStatus) -> bool {
        debug_assert!(outcome.is_terminal());
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = outcome;
            true
        })
    }

    /// Block until the entry leaves `Processing` or `deadline` elapses
    pub async fn wait(&self, deadline: Duration) -> WaitOutcome {
        let mut rx = self.state.subscribe();
        let completed = tokio::time::timeout(deadline, rx.wait_for(|s| s.is_terminal())).await;

        match completed {
            Ok(Ok(state)) => WaitOutcome::Completed(*state),
            // the sender lives as long as `self`, so a closed channel is unreachable
            Ok(Err(_)) => WaitOutcome::Completed(self.state()),
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}

/// Table of in-flight image keys
#[derive(Debug, Default)]
pub struct StatusTracker {
    entries: RwLock<HashMap<ImageKey, Arc<StatusEntry>>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry if none exists. `on_claim` runs under the table's write
    /// lock only when the entry was created, so its effect is visible no later
    /// than the entry itself.
    pub fn claim_with<F: FnOnce()>(&self, key: &ImageKey, on_claim: F) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.clone(), Arc::new(StatusEntry::new()));
        on_claim();
        true
    }

    /// Claim a key for the caller, who must complete it through the guard
    pub fn claim(&self, key: &ImageKey) -> Option<Completion<'_>> {
        self.claim_with(key, || {})
            .then(|| Completion::new(self, key.clone()))
    }

    pub fn state(&self, key: &ImageKey) -> Option<ResizeStatus> {
        self.entries.read().get(key).map(|entry| entry.state())
    }

    pub fn entry(&self, key: &ImageKey) -> Option<Arc<StatusEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Move a claimed key to a terminal state and wake every waiter
    pub fn complete(&self, key: &ImageKey, outcome: ResizeStatus) -> bool {
        let mut entries = self.entries.write();
        match entries.remove(key) {
            Some(entry) => entry.finish(outcome),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Obligation to complete a claimed key. Dropping it without calling
/// [`Completion::finish`] marks the key as failed so waiters never hang on a
/// unit that panicked or was cancelled.
pub struct Completion<'a> {
    tracker: &'a StatusTracker,
    key: ImageKey,
    done: bool,
}

impl<'a> Completion<'a> {
    pub fn new(tracker: &'a StatusTracker, key: ImageKey) -> Self {
        Self {
            tracker,
            key,
            done: false,
        }
    }

    pub fn finish(mut self, outcome: ResizeStatus) {
        self.done = true;
        self.tracker.complete(&self.key, outcome);
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.tracker.complete(&self.key, ResizeStatus::Failure);
        }
    }
}
