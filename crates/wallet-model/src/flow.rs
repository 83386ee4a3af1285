//! Generation-guarded flow state.
//!
//! Every restart or cancel of a flow bumps its generation. Work started for
//! an older generation may still complete, but its result is dropped: the
//! generation check and the state write happen under one lock.

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use wallet_telemetry::STALE_RESPONSES_DROPPED;

pub(crate) struct Flow<S> {
    name: &'static str,
    generation: Mutex<u64>,
    status: watch::Sender<S>,
}

impl<S: Clone> Flow<S> {
    pub(crate) fn new(name: &'static str, initial: S) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            name,
            generation: Mutex::new(0),
            status,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.status.subscribe()
    }

    pub(crate) fn current(&self) -> S {
        self.status.borrow().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Start a new generation in `status`, invalidating all earlier work.
    pub(crate) fn restart(&self, status: S) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.status.send_replace(status);
        *generation
    }

    /// Start a new generation only if `transition` accepts the current
    /// status. Returns the new generation, or `None` if it was refused.
    pub(crate) fn restart_from(&self, transition: impl FnOnce(&S) -> Option<S>) -> Option<u64> {
        let mut generation = self.generation.lock();
        let next = {
            let status = self.status.borrow();
            transition(&*status)
        }?;
        *generation += 1;
        self.status.send_replace(next);
        Some(*generation)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        *self.generation.lock() == generation
    }

    /// Apply `transition` if `generation` is still current. The transition
    /// sees the current status and returns the next one, or `None` to leave
    /// it unchanged.
    ///
    /// Returns true if the status changed.
    pub(crate) fn apply(&self, generation: u64, transition: impl FnOnce(&S) -> Option<S>) -> bool {
        let current = self.generation.lock();
        if *current != generation {
            STALE_RESPONSES_DROPPED.with_label_values(&[self.name]).inc();
            debug!(
                flow = self.name,
                generation = generation,
                current = *current,
                "Dropping response for superseded generation"
            );
            return false;
        }

        let next = {
            let status = self.status.borrow();
            transition(&*status)
        };
        match next {
            Some(next) => {
                self.status.send_replace(next);
                true
            }
            None => {
                debug!(flow = self.name, "Response no longer applies to current status");
                false
            }
        }
    }
}
