//! Trigger queue and cycle phase tracking
//!
//! At most one reconciliation cycle runs per guard. Triggers that arrive
//! while it runs are collapsed into a single pending slot; when the running
//! cycle finishes it picks that slot up and runs once more against a fresh
//! read of the cart.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::model::ProductId;

/// An "item added" signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    /// Product that was just added, when the emitter knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
}

impl ItemAdded {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
        }
    }

    /// Trigger without a known product
    pub fn unknown() -> Self {
        Self { product_id: None }
    }
}

/// Where a guard is in its reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Evaluating,
    Planning,
    Applying,
    Resyncing,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Evaluating => "evaluating",
            CyclePhase::Planning => "planning",
            CyclePhase::Applying => "applying",
            CyclePhase::Resyncing => "resyncing",
        };
        f.write_str(name)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Current phase
    pub phase: CyclePhase,

    /// Whether a re-run is waiting
    pub pending: bool,

    /// Triggers received
    pub total_triggers: u64,

    /// Cycles started (including re-runs)
    pub cycles_started: u64,

    /// Triggers folded into a pending re-run
    pub coalesced: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    phase: CyclePhase,
    running: bool,
    pending: Option<ItemAdded>,
}

/// Single-flight trigger queue
#[derive(Debug, Default)]
pub struct TriggerQueue {
    state: Mutex<QueueState>,

    total_triggers: AtomicU64,
    cycles_started: AtomicU64,
    coalesced: AtomicU64,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offer a trigger.
    ///
    /// Returns a [`CycleLease`] when the caller now owns the cycle and must
    /// run it. Returns `None` when a cycle is already running; the trigger
    /// is then merged into the pending slot.
    pub fn offer(&self, trigger: ItemAdded) -> Option<CycleLease<'_>> {
        self.total_triggers.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.running {
            state.pending = Some(merge(state.pending, trigger));
            self.coalesced.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        // A lease dropped mid-cycle can leave a trigger behind
        let trigger = merge(state.pending.take(), trigger);

        state.running = true;
        self.cycles_started.fetch_add(1, Ordering::SeqCst);

        Some(CycleLease {
            queue: self,
            trigger,
            released: false,
        })
    }

    /// Take the pending trigger for a re-run, or go idle.
    fn advance(&self) -> Option<ItemAdded> {
        let mut state = self.lock();
        state.phase = CyclePhase::Idle;

        match state.pending.take() {
            Some(next) => {
                self.cycles_started.fetch_add(1, Ordering::SeqCst);
                Some(next)
            }
            None => {
                state.running = false;
                None
            }
        }
    }

    /// Give up the cycle without touching the pending slot
    fn abandon(&self) {
        let mut state = self.lock();
        state.running = false;
        state.phase = CyclePhase::Idle;
    }

    pub fn set_phase(&self, phase: CyclePhase) {
        tracing::debug!(%phase, "Cycle phase");
        self.lock().phase = phase;
    }

    pub fn phase(&self) -> CyclePhase {
        self.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn stats(&self) -> QueueStats {
        let (phase, pending) = {
            let state = self.lock();
            (state.phase, state.pending.is_some())
        };

        QueueStats {
            phase,
            pending,
            total_triggers: self.total_triggers.load(Ordering::SeqCst),
            cycles_started: self.cycles_started.load(Ordering::SeqCst),
            coalesced: self.coalesced.load(Ordering::SeqCst),
        }
    }
}

/// Ownership of the running cycle.
///
/// Dropping the lease before the queue went idle (the caller's future was
/// cancelled, or a hook panicked) frees the queue. Any pending trigger stays
/// in its slot and is folded into the next offer.
#[derive(Debug)]
pub struct CycleLease<'a> {
    queue: &'a TriggerQueue,
    trigger: ItemAdded,
    released: bool,
}

impl CycleLease<'_> {
    /// Trigger the current cycle runs for
    pub fn trigger(&self) -> ItemAdded {
        self.trigger
    }

    /// End the current cycle.
    ///
    /// Returns `true` with the pending trigger loaded when a re-run is due,
    /// `false` once the queue is idle.
    pub fn advance(&mut self) -> bool {
        match self.queue.advance() {
            Some(next) => {
                self.trigger = next;
                true
            }
            None => {
                self.released = true;
                false
            }
        }
    }
}

impl Drop for CycleLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(product_id = ?self.trigger.product_id, "Cycle abandoned before finishing");
            self.queue.abandon();
        }
    }
}

/// Most recent known product wins
fn merge(pending: Option<ItemAdded>, incoming: ItemAdded) -> ItemAdded {
    match (pending, incoming.product_id) {
        (_, Some(_)) => incoming,
        (Some(previous), None) => previous,
        (None, None) => incoming,
    }
}
