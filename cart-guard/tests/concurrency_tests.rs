//! Overlapping trigger tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cart_guard::rules::{INCOMPATIBLE_PRODUCTS_KEY, MAX_QUANTITY_KEY};
use cart_guard::{
    CartGuard, CartPayload, CartService, CycleOutcome, CyclePhase, GuardConfig, ItemAdded, LineChange,
    LineIndex, MemoryCartService, ProductId, TransportResult, WireLineItem,
};
use tokio::sync::{Notify, Semaphore};

/// Memory cart whose first read blocks until released
struct GatedService {
    inner: MemoryCartService,
    armed: AtomicBool,
    entered: Notify,
    gate: Semaphore,
}

impl GatedService {
    fn new(items: Vec<WireLineItem>) -> Self {
        Self {
            inner: MemoryCartService::new(items),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl CartService for GatedService {
    async fn fetch_cart(&self) -> TransportResult<CartPayload> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        self.inner.fetch_cart().await
    }

    async fn change_line(&self, change: LineChange) -> TransportResult<()> {
        self.inner.change_line(change).await
    }
}

#[tokio::test]
async fn test_overlapping_triggers_collapse_into_one_rerun() {
    let service = Arc::new(GatedService::new(vec![
        WireLineItem::new(10, 100, 1, "A").with_property(INCOMPATIBLE_PRODUCTS_KEY, "20"),
        WireLineItem::new(20, 200, 1, "B"),
    ]));
    let guard = Arc::new(CartGuard::new(GuardConfig::default(), service.clone()));

    let first = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.trigger(ItemAdded::new(ProductId(10))).await })
    };

    // First cycle is now parked inside its cart read
    service.entered.notified().await;
    assert_eq!(guard.phase(), CyclePhase::Evaluating);

    assert!(guard.trigger(ItemAdded::new(ProductId(10))).await.is_coalesced());
    assert!(guard.trigger(ItemAdded::unknown()).await.is_coalesced());
    assert!(guard.queue_stats().pending);

    service.release();
    let outcome = first.await.unwrap();
    let reports = outcome.reports();

    // Own cycle plus exactly one re-run, however many triggers piled up
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].outcome, CycleOutcome::Corrected);
    assert_eq!(reports[1].outcome, CycleOutcome::Consistent);
    assert_eq!(reports[1].trigger, ItemAdded::new(ProductId(10)));

    assert_eq!(service.inner.writes().await, vec![LineChange::remove(LineIndex(1))]);

    let stats = guard.queue_stats();
    assert_eq!(stats.total_triggers, 3);
    assert_eq!(stats.cycles_started, 2);
    assert_eq!(stats.coalesced, 2);
    assert_eq!(stats.phase, CyclePhase::Idle);
    assert!(!stats.pending);
}

#[tokio::test]
async fn test_cycle_reads_cart_rather_than_trigger_payload() {
    let service = Arc::new(GatedService::new(vec![WireLineItem::new(1, 10, 1, "Plain")]));
    let guard = Arc::new(CartGuard::new(GuardConfig::default(), service.clone()));

    let first = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.trigger(ItemAdded::new(ProductId(1))).await })
    };
    service.entered.notified().await;

    // Added before the parked read completes: the running cycle corrects it,
    // the coalesced re-run then finds nothing left to do
    service
        .inner
        .push_item(WireLineItem::new(30, 300, 9, "Capped").with_property(MAX_QUANTITY_KEY, "3"))
        .await;
    assert!(guard.trigger(ItemAdded::new(ProductId(30))).await.is_coalesced());

    service.release();
    let outcome = first.await.unwrap();

    assert_eq!(outcome.reports().len(), 2);
    assert_eq!(service.inner.items().await[1].quantity, 3);
    assert_eq!(service.inner.writes().await, vec![LineChange::set(LineIndex(2), 3)]);
    assert_eq!(outcome.reports()[1].outcome, CycleOutcome::Consistent);
}

#[tokio::test]
async fn test_sequential_triggers_each_run_a_cycle() {
    let service = Arc::new(MemoryCartService::new(vec![WireLineItem::new(1, 10, 1, "Plain")]));
    let guard = CartGuard::new(GuardConfig::default(), service.clone());

    for _ in 0..3 {
        let outcome = guard.trigger(ItemAdded::unknown()).await;
        assert!(!outcome.is_coalesced());
        assert_eq!(outcome.reports().len(), 1);
    }

    assert_eq!(guard.queue_stats().cycles_started, 3);
    assert_eq!(guard.queue_stats().coalesced, 0);
}

#[tokio::test]
async fn test_cancelled_trigger_does_not_wedge_guard() {
    let service = Arc::new(GatedService::new(vec![
        WireLineItem::new(10, 100, 1, "A").with_property(INCOMPATIBLE_PRODUCTS_KEY, "20"),
        WireLineItem::new(20, 200, 1, "B"),
    ]));
    let guard = Arc::new(CartGuard::new(GuardConfig::default(), service.clone()));

    // The first read never returns; the caller gives up on it
    let hung = tokio::time::timeout(
        Duration::from_millis(50),
        guard.trigger(ItemAdded::unknown()),
    )
    .await;
    assert!(hung.is_err());
    assert_eq!(guard.phase(), CyclePhase::Idle);

    let outcome = guard.trigger(ItemAdded::new(ProductId(10))).await;

    assert!(!outcome.is_coalesced());
    assert_eq!(outcome.reports().len(), 1);
    assert_eq!(outcome.reports()[0].outcome, CycleOutcome::Corrected);
    assert_eq!(service.inner.writes().await, vec![LineChange::remove(LineIndex(1))]);

    let stats = guard.queue_stats();
    assert_eq!(stats.phase, CyclePhase::Idle);
    assert!(!stats.pending);
}

#[tokio::test]
async fn test_trigger_stranded_by_cancelled_cycle_is_picked_up() {
    let service = Arc::new(GatedService::new(vec![
        WireLineItem::new(10, 100, 1, "A").with_property(INCOMPATIBLE_PRODUCTS_KEY, "20"),
        WireLineItem::new(20, 200, 1, "B"),
    ]));
    let guard = Arc::new(CartGuard::new(GuardConfig::default(), service.clone()));

    let hung = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.trigger(ItemAdded::unknown()).await })
    };
    service.entered.notified().await;

    assert!(guard.trigger(ItemAdded::new(ProductId(10))).await.is_coalesced());
    hung.abort();
    assert!(hung.await.unwrap_err().is_cancelled());

    // The next caller runs once, for the product that was waiting
    let outcome = guard.trigger(ItemAdded::unknown()).await;
    let reports = outcome.reports();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].trigger, ItemAdded::new(ProductId(10)));
    assert_eq!(service.inner.writes().await, vec![LineChange::remove(LineIndex(1))]);
}
