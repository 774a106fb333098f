use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::observability::metrics::{ACTIVE_SUBSCRIBERS, SUBSCRIBERS_PRUNED, TICKS_BROADCAST};
use crate::price_infra::aggregator::MarketAggregator;
use crate::types::Ticker;
use crate::utils::helper::fixed_interval;

pub type SubscriberId = Uuid;

/// Server -> client frame: `{"type": "snapshot" | "tick", "data": [..]}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MarketFrame<'a> {
    Snapshot(&'a [Ticker]),
    Tick(&'a [Ticker]),
}

impl MarketFrame<'_> {
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

struct Subscriber {
    outbound: mpsc::Sender<Message>,
    is_alive: AtomicBool,
    /// Market list handed over as the connect snapshot, if any.
    seeded_with: Option<Arc<Vec<Ticker>>>,
}

/// Owns the connected subscribers and the last tick's market list.
///
/// Every subscriber gets a bounded outbound queue drained by its connection
/// task. Delivery is best-effort: a full or closed queue removes that one
/// subscriber and nothing else.
pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, Subscriber>,
    snapshot: RwLock<Arc<Vec<Ticker>>>,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Broadcaster {
            subscribers: DashMap::new(),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber. If a non-empty snapshot is retained it is queued
    /// to this subscriber only, ahead of any later tick.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);

        // Holding the read guard keeps a concurrent tick from storing a newer
        // snapshot and pushing it before this older one is queued.
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        let mut seeded_with = None;

        if !snapshot.is_empty() {
            match MarketFrame::Snapshot(&snapshot).to_message() {
                Ok(message) => {
                    // Fresh channel with capacity >= 1, cannot be full.
                    let _ = tx.try_send(message);
                    seeded_with = Some(Arc::clone(&*snapshot));
                }
                Err(e) => tracing::error!("Failed to serialize snapshot frame: {}", e),
            }
        }

        self.subscribers.insert(id, Subscriber {
            outbound: tx,
            is_alive: AtomicBool::new(true),
            seeded_with,
        });
        drop(snapshot);

        ACTIVE_SUBSCRIBERS.inc();
        tracing::info!("Subscriber {} connected ({} active)", id, self.subscriber_count());
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            ACTIVE_SUBSCRIBERS.dec();
            tracing::info!("Subscriber {} disconnected ({} active)", id, self.subscriber_count());
        }
    }

    /// Record a pong from `id`.
    pub fn mark_alive(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.get(&id) {
            subscriber.is_alive.store(true, Ordering::SeqCst);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn snapshot(&self) -> Arc<Vec<Ticker>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run one aggregation and publish it. Returns the number of subscribers
    /// the tick was queued to.
    pub async fn on_tick(&self, aggregator: &MarketAggregator) -> usize {
        let result = aggregator.fetch_all_markets().await;
        self.publish(result.markets)
    }

    /// Store `markets` as the snapshot, even when empty, and push it to every
    /// subscriber when non-empty.
    pub fn publish(&self, markets: Vec<Ticker>) -> usize {
        let markets = self.store_snapshot(markets);

        if markets.is_empty() {
            tracing::debug!("Empty tick stored as snapshot, not pushed");
            return 0;
        }

        self.push_tick(&markets)
    }

    fn store_snapshot(&self, markets: Vec<Ticker>) -> Arc<Vec<Ticker>> {
        let markets = Arc::new(markets);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&markets);
        markets
    }

    /// Queue `markets` as a tick frame. A subscriber that registered between
    /// storing and pushing already got this exact list as its snapshot and is
    /// skipped.
    fn push_tick(&self, markets: &Arc<Vec<Ticker>>) -> usize {
        let message = match MarketFrame::Tick(&markets).to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to serialize tick frame: {}", e);
                return 0;
            }
        };

        let delivered = self.send_to_all(Some(markets), || message.clone());
        TICKS_BROADCAST.inc();
        tracing::debug!("Tick with {} tickers queued to {} subscribers", markets.len(), delivered);
        delivered
    }

    /// Drop every subscriber that missed the previous ping, then ping the rest.
    pub fn on_heartbeat(&self) {
        let unresponsive: Vec<SubscriberId> = self.subscribers.iter()
            .filter(|entry| !entry.is_alive.swap(false, Ordering::SeqCst))
            .map(|entry| *entry.key())
            .collect();

        for id in unresponsive {
            tracing::info!("Subscriber {} missed heartbeat", id);
            self.prune(id);
        }

        self.send_to_all(None, || Message::Ping(Vec::new()));
    }

    pub async fn run_ticks(self: Arc<Self>, aggregator: Arc<MarketAggregator>, period: Duration) {
        let mut timer = fixed_interval(period);
        tracing::info!("Starting broadcast tick every {:?}", period);

        loop {
            timer.tick().await;
            self.on_tick(&aggregator).await;
        }
    }

    pub async fn run_heartbeat(self: Arc<Self>, period: Duration) {
        let mut timer = fixed_interval(period);
        // The first tick of an interval fires immediately; skip it so new
        // subscribers get a full period to answer.
        timer.tick().await;

        loop {
            timer.tick().await;
            self.on_heartbeat();
        }
    }

    fn send_to_all(&self, seeded: Option<&Arc<Vec<Ticker>>>, message: impl Fn() -> Message) -> usize {
        // Snapshot membership first so no map guard is held while sending.
        let targets: Vec<(SubscriberId, mpsc::Sender<Message>)> = self.subscribers.iter()
            .filter(|entry| match (seeded, &entry.seeded_with) {
                (Some(markets), Some(snapshot)) => !Arc::ptr_eq(markets, snapshot),
                _ => true,
            })
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();

        let mut delivered = 0;
        for (id, outbound) in targets {
            match outbound.try_send(message()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {} too slow, dropping", id);
                    self.prune(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.prune(id);
                }
            }
        }
        delivered
    }

    fn prune(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            ACTIVE_SUBSCRIBERS.dec();
            SUBSCRIBERS_PRUNED.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::time::sleep;
    use crate::observability::RateLimitedLogger;
    use crate::price_infra::aggregator::LiveSource;
    use crate::price_infra::connectors::TickerSource;
    use crate::types::Symbol;

    struct FixedSource {
        name: &'static str,
    }

    #[async_trait]
    impl TickerSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
            sleep(Duration::from_millis(20)).await;
            Ok(Ticker::new(self.name, symbol, 100.0, 101.0, 1705640000000))
        }
    }

    struct HangingSource;

    #[async_trait]
    impl TickerSource for HangingSource {
        fn name(&self) -> &str {
            "B"
        }

        async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker> {
            std::future::pending().await
        }
    }

    fn live(source: impl TickerSource + 'static, timeout_ms: u64) -> LiveSource {
        LiveSource {
            source: Arc::new(source),
            per_call_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn aggregator(live: Vec<LiveSource>) -> MarketAggregator {
        MarketAggregator::new(
            live,
            Vec::new(),
            vec![Symbol::parse("BTC-USDT").unwrap()],
            Duration::from_secs(30),
            Duration::from_millis(500),
            Arc::new(RateLimitedLogger::new(Duration::from_secs(60))),
        )
    }

    fn ticker(exchange: &str, bid: f64) -> Ticker {
        Ticker::new(exchange, "BTC-USDT", bid, bid + 1.0, 1705640000000)
    }

    fn frame(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_wire_format() {
        let tickers = vec![ticker("binance", 100.0)];
        let value = frame(MarketFrame::Tick(&tickers).to_message().unwrap());

        assert_eq!(value["type"], "tick");
        assert_eq!(value["data"][0]["exchange"], "binance");
        assert_eq!(value["data"][0]["bid"], 100.0);
    }

    #[tokio::test]
    async fn test_no_snapshot_before_first_tick() {
        let broadcaster = Broadcaster::new(8);
        let (_, mut rx) = broadcaster.subscribe();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_last_non_empty_tick_as_snapshot() {
        let broadcaster = Broadcaster::new(8);
        let (_, mut early) = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(vec![ticker("a", 100.0), ticker("b", 200.0)]), 1);
        let tick = frame(early.try_recv().unwrap());
        assert_eq!(tick["type"], "tick");
        assert_eq!(tick["data"].as_array().unwrap().len(), 2);

        let (_, mut late) = broadcaster.subscribe();
        let snapshot = frame(late.try_recv().unwrap());
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["data"], tick["data"]);
        // Snapshot goes to the new subscriber only.
        assert!(early.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_tick_overwrites_snapshot_without_push() {
        let broadcaster = Broadcaster::new(8);
        broadcaster.publish(vec![ticker("a", 100.0)]);
        let (_, mut existing) = broadcaster.subscribe();
        existing.try_recv().unwrap();

        assert_eq!(broadcaster.publish(vec![]), 0);
        assert!(existing.try_recv().is_err());
        assert!(broadcaster.snapshot().is_empty());

        let (_, mut late) = broadcaster.subscribe();
        assert!(late.try_recv().is_err());

        broadcaster.publish(vec![ticker("a", 101.0)]);
        let next = frame(late.try_recv().unwrap());
        assert_eq!(next["type"], "tick");
        assert_eq!(next["data"][0]["bid"], 101.0);
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed_without_affecting_others() {
        let broadcaster = Broadcaster::new(8);
        let (gone, gone_rx) = broadcaster.subscribe();
        let (kept, mut kept_rx) = broadcaster.subscribe();
        drop(gone_rx);

        assert_eq!(broadcaster.publish(vec![ticker("a", 100.0)]), 1);
        assert!(!broadcaster.is_subscribed(gone));
        assert!(broadcaster.is_subscribed(kept));
        assert_eq!(frame(kept_rx.try_recv().unwrap())["type"], "tick");
    }

    #[tokio::test]
    async fn test_slow_subscriber_dropped_not_throttled() {
        let broadcaster = Broadcaster::new(2);
        let (slow, _slow_rx) = broadcaster.subscribe();
        let (fast, mut fast_rx) = broadcaster.subscribe();

        for bid in [100.0, 101.0, 102.0] {
            broadcaster.publish(vec![ticker("a", bid)]);
            fast_rx.try_recv().unwrap();
        }

        assert!(!broadcaster.is_subscribed(slow));
        assert!(broadcaster.is_subscribed(fast));
    }

    #[tokio::test]
    async fn test_heartbeat_prunes_unresponsive_within_two_intervals() {
        let broadcaster = Broadcaster::new(8);
        let (silent, mut silent_rx) = broadcaster.subscribe();
        let (responsive, mut responsive_rx) = broadcaster.subscribe();

        broadcaster.on_heartbeat();
        assert!(matches!(silent_rx.try_recv().unwrap(), Message::Ping(_)));
        assert!(matches!(responsive_rx.try_recv().unwrap(), Message::Ping(_)));
        broadcaster.mark_alive(responsive);

        broadcaster.on_heartbeat();
        assert!(!broadcaster.is_subscribed(silent));
        assert!(broadcaster.is_subscribed(responsive));
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_seeded_with_pending_tick_not_sent_it_twice() {
        let broadcaster = Broadcaster::new(8);
        let (_, mut existing) = broadcaster.subscribe();

        // A subscriber arriving between storing and pushing the same tick.
        let markets = broadcaster.store_snapshot(vec![ticker("a", 100.0)]);
        let (_, mut joined) = broadcaster.subscribe();
        assert_eq!(broadcaster.push_tick(&markets), 1);

        assert_eq!(frame(existing.try_recv().unwrap())["type"], "tick");
        assert_eq!(frame(joined.try_recv().unwrap())["type"], "snapshot");
        assert!(joined.try_recv().is_err());

        // The next tick is a new list and reaches both.
        assert_eq!(broadcaster.publish(vec![ticker("a", 101.0)]), 2);
        assert_eq!(frame(joined.try_recv().unwrap())["data"][0]["bid"], 101.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_tick_publishes_aggregation_result() {
        let aggregator = aggregator(vec![
            live(FixedSource { name: "A" }, 1_000),
            live(HangingSource, 50),
        ]);
        let broadcaster = Broadcaster::new(8);
        let (_, mut rx) = broadcaster.subscribe();

        assert_eq!(broadcaster.on_tick(&aggregator).await, 1);

        let snapshot = broadcaster.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].exchange, "A");
        assert_eq!(snapshot[0].symbol, "BTC-USDT");
        assert_eq!((snapshot[0].bid, snapshot[0].ask), (100.0, 101.0));

        let tick = frame(rx.try_recv().unwrap());
        assert_eq!(tick["type"], "tick");
        assert_eq!(tick["data"], serde_json::to_value(&*snapshot).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_tick_with_nothing_stores_empty_snapshot() {
        let aggregator = aggregator(vec![live(HangingSource, 50)]);
        let broadcaster = Broadcaster::new(8);
        broadcaster.publish(vec![ticker("a", 100.0)]);
        let (_, mut rx) = broadcaster.subscribe();
        rx.try_recv().unwrap();

        assert_eq!(broadcaster.on_tick(&aggregator).await, 0);
        assert!(broadcaster.snapshot().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_publishes_immediately_then_every_period() {
        let aggregator = Arc::new(aggregator(vec![live(FixedSource { name: "A" }, 1_000)]));
        let broadcaster = Arc::new(Broadcaster::new(8));
        let (_, mut rx) = broadcaster.subscribe();

        let handle = tokio::spawn(broadcaster.clone().run_ticks(aggregator, Duration::from_secs(2)));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(frame(rx.try_recv().unwrap())["type"], "tick");
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(frame(rx.try_recv().unwrap())["type"], "tick");

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_heartbeat_prunes_silent_subscriber_by_second_interval() {
        let period = Duration::from_millis(100);
        let broadcaster = Arc::new(Broadcaster::new(8));
        let (silent, mut silent_rx) = broadcaster.subscribe();
        let (responsive, mut responsive_rx) = broadcaster.subscribe();

        // Answers every ping the way a client pong would.
        let ponger = broadcaster.clone();
        let answering = tokio::spawn(async move {
            while let Some(message) = responsive_rx.recv().await {
                if matches!(message, Message::Ping(_)) {
                    ponger.mark_alive(responsive);
                }
            }
        });

        let handle = tokio::spawn(broadcaster.clone().run_heartbeat(period));

        // The immediate first interval tick is skipped: no ping yet.
        sleep(Duration::from_millis(50)).await;
        assert!(silent_rx.try_recv().is_err());

        // First ping at 1 interval; nobody is dropped yet.
        sleep(Duration::from_millis(100)).await;
        assert!(matches!(silent_rx.try_recv().unwrap(), Message::Ping(_)));
        assert!(broadcaster.is_subscribed(silent));

        // Second ping at 2 intervals drops the silent one.
        sleep(Duration::from_millis(100)).await;
        assert!(!broadcaster.is_subscribed(silent));
        assert!(broadcaster.is_subscribed(responsive));

        sleep(Duration::from_millis(300)).await;
        assert!(broadcaster.is_subscribed(responsive));
        assert_eq!(broadcaster.subscriber_count(), 1);

        handle.abort();
        answering.abort();
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broadcaster = Broadcaster::new(8);
        let (id, _rx) = broadcaster.subscribe();

        broadcaster.unsubscribe(id);
        broadcaster.unsubscribe(id);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
