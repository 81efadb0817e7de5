//! Cart Guard - keeps a storefront cart consistent with merchant rules
//!
//! Merchants declare two kinds of rule on cart line properties:
//! - products that may not share a cart (`_produits_incompatibles`)
//! - a per-line purchasable ceiling (`_max_quantity`)
//!
//! Each time an item is added, the guard re-reads the cart, works out what
//! violates those rules, tells the user, corrects the cart through the cart
//! service and re-projects the product forms on the page.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CART GUARD                            │
//! │                                                              │
//! │  ItemAdded ──► TriggerQueue (one in flight + one pending)    │
//! │                     │                                        │
//! │   ┌─────────┐  ┌────▼─────┐  ┌─────────┐  ┌─────────┐        │
//! │   │ Reader  │─►│ Evaluate │─►│  Plan   │─►│  Apply  │        │
//! │   └─────────┘  └──────────┘  └─────────┘  └────┬────┘        │
//! │        ▲                                       │             │
//! │        └────────── refetch ──► Project (UI) ◄──┘             │
//! │                                     │                        │
//! │                      GuardHooks + CartEvent broadcast        │
//! │                                                              │
//! │  ┌──────────────── CartService ────────────────┐             │
//! │  │   RestCartService        MemoryCartService  │             │
//! │  └─────────────────────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cart_guard::{CartGuard, GuardConfig, ItemAdded, LogHooks, RestCartService};
//!
//! let config = GuardConfig::from_file("cart-guard.json")?;
//! let service = RestCartService::new(&config.cart)?;
//! let guard = CartGuard::with_hooks(config, service, LogHooks::new());
//!
//! // Call on every "item added" signal
//! guard.trigger(ItemAdded::new(ProductId(10))).await;
//! ```

pub mod apply;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod hooks;
pub mod model;
pub mod plan;
pub mod queue;
pub mod reader;
pub mod rules;
pub mod sync;
pub mod transport;

pub use apply::{apply, ApplyReport, FailedMutation};
pub use client::{CartService, MemoryCartService};
pub use config::{ApplyConfig, CartEndpointConfig, ClampDispatch, GuardConfig, Messages};
pub use error::{GuardError, GuardResult, MalformedRule, TransportError, TransportResult};
pub use evaluate::{evaluate, Clamp, Conflict, IncompatiblePair, ViolationReport};
pub use hooks::{GuardHooks, LogHooks, NoOpHooks, Notice};
pub use model::{CartPayload, CartSnapshot, LineChange, LineIndex, LineItem, ProductId, VariantId, WireLineItem};
pub use plan::{plan, Plan, ReconciliationAction};
pub use queue::{CycleLease, CyclePhase, ItemAdded, QueueStats, TriggerQueue};
pub use reader::read_snapshot;
pub use rules::{ConstraintRule, LineRules, MaxQuantity};
pub use sync::{project, ProductForm, UiDirective};
pub use transport::RestCartService;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

/// Capacity of the cart event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The cart constraint guard
pub struct CartGuard {
    /// Configuration
    config: GuardConfig,

    /// Cart service
    service: Arc<dyn CartService>,

    /// Page hooks
    hooks: Arc<dyn GuardHooks>,

    /// Single-flight trigger queue
    queue: TriggerQueue,

    /// Cart refresh broadcast
    events: broadcast::Sender<CartEvent>,
}

impl CartGuard {
    /// Create a guard without page hooks
    pub fn new<S: CartService + 'static>(config: GuardConfig, service: S) -> Self {
        Self::with_hooks(config, service, NoOpHooks)
    }

    /// Create a guard with custom page hooks
    pub fn with_hooks<S, H>(config: GuardConfig, service: S, hooks: H) -> Self
    where
        S: CartService + 'static,
        H: GuardHooks + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            service: Arc::new(service),
            hooks: Arc::new(hooks),
            queue: TriggerQueue::new(),
            events,
        }
    }

    /// Subscribe to cart events
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    /// Current cycle phase
    pub fn phase(&self) -> CyclePhase {
        self.queue.phase()
    }

    /// Trigger queue statistics
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Configuration the guard was built with
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Handle an "item added" signal.
    ///
    /// Never fails: transport and apply errors are logged and show up in the
    /// returned reports. If a cycle is already running the trigger is folded
    /// into its pending re-run and this returns immediately. Dropping the
    /// returned future mid-cycle frees the guard for the next trigger.
    pub async fn trigger(&self, event: ItemAdded) -> TriggerOutcome {
        let Some(mut lease) = self.queue.offer(event) else {
            tracing::debug!(product_id = ?event.product_id, "Cycle in flight, trigger coalesced");
            return TriggerOutcome::Coalesced;
        };

        let mut reports = Vec::new();
        loop {
            reports.push(self.run_cycle(lease.trigger()).await);

            if !lease.advance() {
                break;
            }
        }

        TriggerOutcome::Completed(reports)
    }

    /// Evaluate and plan against the live cart without writing anything
    pub async fn check(&self, event: ItemAdded) -> GuardResult<(ViolationReport, Plan)> {
        let snapshot = read_snapshot(&*self.service).await?;
        let violations = evaluate(&snapshot, event.product_id);
        let plan = plan(&violations);
        Ok((violations, plan))
    }

    async fn run_cycle(&self, trigger: ItemAdded) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", %cycle_id, product_id = ?trigger.product_id);

        async move {
            let mut report = CycleReport::new(cycle_id, trigger);

            self.queue.set_phase(CyclePhase::Evaluating);
            let snapshot = match read_snapshot(&*self.service).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read cart");
                    return report.finish(CycleOutcome::FetchFailed(e.to_string()));
                }
            };

            if snapshot.is_empty() {
                return report.finish(CycleOutcome::EmptyCart);
            }

            report.violations = evaluate(&snapshot, trigger.product_id);

            self.queue.set_phase(CyclePhase::Planning);
            report.plan = plan(&report.violations);

            if report.plan.is_empty() {
                return report.finish(CycleOutcome::Consistent);
            }

            report.notices = Notice::from_report(&report.violations);
            for notice in &report.notices {
                self.hooks.notify(notice, &notice.render(&self.config.messages));
            }

            self.queue.set_phase(CyclePhase::Applying);
            let applied = apply(&*self.service, &report.plan, self.config.apply.clamp_dispatch).await;
            if let Err(e) = applied.clone().into_result() {
                tracing::warn!(error = %e, "Cart only partially corrected");
            }

            if applied.clamps_attempted > 0 {
                self.queue.set_phase(CyclePhase::Resyncing);
                match read_snapshot(&*self.service).await {
                    Ok(fresh) => {
                        let forms = self.hooks.page_forms();
                        report.directives = project(&fresh, &forms, &self.config.messages);
                        if !report.directives.is_empty() {
                            self.hooks.apply_directives(&report.directives);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not refetch cart, UI left as is");
                    }
                }
            }

            if applied.changed_cart() {
                self.hooks.on_cart_refreshed();
                // No subscriber is fine
                let _ = self.events.send(CartEvent::Refreshed {
                    cycle_id,
                    changes: applied.applied_count(),
                    at: Utc::now(),
                });
            }

            report.applied = Some(applied);
            report.finish(CycleOutcome::Corrected)
        }
        .instrument(span)
        .await
    }
}

/// What a trigger led to
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// Cycles this call ran: its own plus any re-runs it picked up
    Completed(Vec<CycleReport>),

    /// A cycle was already running; the trigger became its pending re-run
    Coalesced,
}

impl TriggerOutcome {
    /// Reports of the cycles this call ran; empty when coalesced
    pub fn reports(&self) -> &[CycleReport] {
        match self {
            TriggerOutcome::Completed(reports) => reports,
            TriggerOutcome::Coalesced => &[],
        }
    }

    /// Whether the trigger was folded into a running cycle
    pub fn is_coalesced(&self) -> bool {
        matches!(self, TriggerOutcome::Coalesced)
    }
}

/// Broadcast to page collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    /// The cart was corrected; re-render from the next read
    Refreshed {
        cycle_id: Uuid,
        changes: usize,
        at: DateTime<Utc>,
    },
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing in the cart
    EmptyCart,
    /// No rule violated
    Consistent,
    /// Corrections were sent (possibly partially applied)
    Corrected,
    /// The cart could not be read
    FetchFailed(String),
}

/// Record of one reconciliation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub trigger: ItemAdded,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub violations: ViolationReport,
    pub plan: Plan,
    pub notices: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplyReport>,
    pub directives: Vec<UiDirective>,
}

impl CycleReport {
    fn new(cycle_id: Uuid, trigger: ItemAdded) -> Self {
        let now = Utc::now();
        Self {
            cycle_id,
            trigger,
            started_at: now,
            finished_at: now,
            outcome: CycleOutcome::Consistent,
            violations: ViolationReport::default(),
            plan: Plan::default(),
            notices: Vec::new(),
            applied: None,
            directives: Vec::new(),
        }
    }

    fn finish(mut self, outcome: CycleOutcome) -> Self {
        tracing::debug!(?outcome, actions = self.plan.len(), "Cycle finished");
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
