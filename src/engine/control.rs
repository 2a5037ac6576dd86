// src/engine/control.rs

//! Per-run control state.
//!
//! A [`RunControl`] lives only in memory: it is a cache that can be rebuilt
//! at any time, never a source of truth. After a restart every control starts
//! out fresh (gate open, not cancelled, no task) and the loop recovers its
//! position from persisted step status.
//!
//! Each spawned loop holds an [`ActiveTicket`] tagged with a generation. The
//! loop writes its terminal run status through [`ActiveTicket::finish`], which
//! marks the control idle under the same lock `spawn_if_idle` takes, so a
//! `retry` or `resume` that observes the terminal status always finds the
//! control idle and starts a new loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Gate, cancellation flag and background task generation of one run.
///
/// None of the methods perform IO or block beyond taking a short lock.
#[derive(Debug)]
pub struct RunControl {
    gate: watch::Sender<bool>,
    cancelled: AtomicBool,
    active: watch::Sender<bool>,
    /// Generation of the most recently spawned loop.
    generation: Mutex<u64>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            gate: watch::Sender::new(true),
            cancelled: AtomicBool::new(false),
            active: watch::Sender::new(false),
            generation: Mutex::new(0),
        }
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn is_gate_open(&self) -> bool {
        *self.gate.borrow()
    }

    /// Suspend until the gate is open.
    pub async fn wait_for_gate(&self) {
        let mut rx = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|open| *open).await;
    }

    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn clear_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a background task is currently running the loop.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Spawn the future built by `make` as the run's background task unless
    /// one is active. The future receives the task's [`ActiveTicket`].
    ///
    /// Returns `true` when a new task was spawned. Must be called from within
    /// a Tokio runtime.
    pub fn spawn_if_idle<M, F>(self: &Arc<Self>, make: M) -> bool
    where
        M: FnOnce(ActiveTicket) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = {
            let mut slot = self.generation_slot();
            if self.is_active() {
                return false;
            }
            *slot += 1;
            self.active.send_replace(true);
            *slot
        };

        let ticket = ActiveTicket {
            control: Arc::clone(self),
            generation,
        };
        tokio::spawn(make(ticket));
        true
    }

    /// Wait until no background task is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }

    fn release(&self, generation: u64) {
        let current = self.generation_slot();
        if *current == generation && self.is_active() {
            self.active.send_replace(false);
            debug!(generation, "run task released");
        }
    }

    fn generation_slot(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of being the run's active background task.
///
/// Dropping the ticket, including by panic, marks the control idle unless a
/// newer task has taken over.
#[derive(Debug)]
pub struct ActiveTicket {
    control: Arc<RunControl>,
    generation: u64,
}

impl ActiveTicket {
    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Run `f` and mark the control idle while holding the spawn lock.
    ///
    /// Used for the loop's final state write: no `start_run` can interleave
    /// between the write and the release.
    pub fn finish<T>(&self, f: impl FnOnce() -> T) -> T {
        let current = self.control.generation_slot();
        let out = f();
        if *current == self.generation {
            self.control.active.send_replace(false);
            debug!(generation = self.generation, "run task finished");
        }
        out
    }
}

impl Drop for ActiveTicket {
    fn drop(&mut self) {
        self.control.release(self.generation);
    }
}

/// Run id to [`RunControl`] mapping owned by one orchestrator.
///
/// Controls are created on first reference and never removed.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    controls: Mutex<HashMap<String, Arc<RunControl>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, run_id: &str) -> Arc<RunControl> {
        let mut controls = self.controls.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(controls.entry(run_id.to_string()).or_default())
    }

    pub fn get(&self, run_id: &str) -> Option<Arc<RunControl>> {
        let controls = self.controls.lock().unwrap_or_else(PoisonError::into_inner);
        controls.get(run_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
