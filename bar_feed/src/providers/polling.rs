//! A live feed built from repeated historical fetches.
//!
//! [`PollingLiveFeed`] refetches the subscription's recent window on a fixed
//! interval and publishes a [`BarUpdate`] whenever the latest bar differs from
//! the last one it published. `has_new_bar` is set when the latest bar's
//! timestamp moved, and cleared when only its values were revised.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    models::{bar::RawBar, request_params::LiveRequest},
    providers::{BarUpdate, HistoricalSource, LiveFeed, LiveSource, ProviderError},
};

pub struct PollingLiveFeed {
    source: Arc<dyn HistoricalSource>,
    poll_interval: Duration,
    capacity: usize,
}

impl PollingLiveFeed {
    pub fn new(source: Arc<dyn HistoricalSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            capacity: 64,
        }
    }

    /// Channel capacity; a slow consumer makes the poller wait rather than drop updates.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

/// Compares a fresh snapshot's latest bar with the last one published.
///
/// `None` when nothing changed, otherwise `Some(has_new_bar)`.
pub fn classify(previous: Option<&RawBar>, snapshot: &[RawBar]) -> Option<bool> {
    let latest = snapshot.last()?;
    match previous {
        None => Some(true),
        Some(prev) if prev.timestamp != latest.timestamp => Some(true),
        Some(prev) if prev != latest => Some(false),
        Some(_) => None,
    }
}

#[async_trait]
impl LiveSource for PollingLiveFeed {
    async fn subscribe(&self, req: LiveRequest) -> Result<LiveFeed, ProviderError> {
        // The first fetch happens here so a bad subscription fails the caller.
        let initial = self.source.fetch_bars(&req.window_ending(Utc::now())).await?;
        let mut last = initial.last().cloned();

        let (tx, rx) = mpsc::channel(self.capacity);
        if !initial.is_empty() {
            // Fresh channel with capacity >= 1, so this cannot be full.
            let _ = tx.try_send(BarUpdate::new(initial, true));
        }

        let source = Arc::clone(&self.source);
        let poll_interval = self.poll_interval;
        let symbol = req.contract.symbol.clone();
        info!(%symbol, timeframe = %req.timeframe, ?poll_interval, "live polling started");

        let worker = tokio::spawn(async move {
            let mut ticker = time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = match source.fetch_bars(&req.window_ending(Utc::now())).await {
                    Ok(bars) => bars,
                    Err(e) => {
                        warn!(%symbol, error = %e, "live poll failed");
                        continue;
                    }
                };

                let Some(has_new_bar) = classify(last.as_ref(), &snapshot) else {
                    continue;
                };
                last = snapshot.last().cloned();
                debug!(%symbol, has_new_bar, bars = snapshot.len(), "live update");
                if tx.send(BarUpdate::new(snapshot, has_new_bar)).await.is_err() {
                    break;
                }
            }
            debug!(%symbol, "live polling stopped");
        });

        Ok(LiveFeed::new(rx, worker))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::{
        models::{contract::Contract, request_params::HistoricalRequest},
        providers::ApiSnafu,
    };

    fn bar(ts: &str, close: f64) -> RawBar {
        RawBar::at(ts).with_ohlc(close, close, close, close)
    }

    #[test]
    fn classify_detects_new_and_revised_bars() {
        let a = bar("2024-01-02T14:30:00Z", 1.0);
        let a2 = bar("2024-01-02T14:30:00Z", 1.5);
        let b = bar("2024-01-02T14:31:00Z", 2.0);

        assert_eq!(classify(None, &[]), None);
        assert_eq!(classify(None, &[a.clone()]), Some(true));
        assert_eq!(classify(Some(&a), &[a.clone()]), None);
        assert_eq!(classify(Some(&a), &[a2.clone()]), Some(false));
        assert_eq!(classify(Some(&a), &[a.clone(), b.clone()]), Some(true));
        assert_eq!(classify(Some(&b), &[]), None);
    }

    /// Replays scripted snapshots, repeating the last one forever.
    struct Script(Mutex<VecDeque<Result<Vec<RawBar>, &'static str>>>);

    #[async_trait]
    impl HistoricalSource for Script {
        fn source_tag(&self) -> &str {
            "script"
        }

        async fn fetch_bars(&self, _req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError> {
            let mut q = self.0.lock().unwrap();
            let next = if q.len() > 1 { q.pop_front() } else { q.front().cloned() };
            match next.unwrap_or(Ok(Vec::new())) {
                Ok(bars) => Ok(bars),
                Err(message) => ApiSnafu { message }.fail(),
            }
        }
    }

    fn live_request() -> LiveRequest {
        LiveRequest {
            contract: Contract::new("AAPL", "SMART", "USD", "STK").unwrap(),
            timeframe: "1 min".parse().unwrap(),
            duration: "2 D".parse().unwrap(),
            what_to_show: Default::default(),
            use_rth: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_initial_snapshot_then_changes_only() {
        let a = bar("2024-01-02T14:30:00Z", 1.0);
        let a2 = bar("2024-01-02T14:30:00Z", 1.5);
        let b = bar("2024-01-02T14:31:00Z", 2.0);
        let script = Script(Mutex::new(VecDeque::from(vec![
            Ok(vec![a.clone()]),
            Ok(vec![a.clone()]),
            Err("transient"),
            Ok(vec![a2.clone()]),
            Ok(vec![a2.clone(), b.clone()]),
        ])));
        let feed = PollingLiveFeed::new(Arc::new(script), Duration::from_secs(5));
        let mut live = feed.subscribe(live_request()).await.unwrap();

        let first = live.recv().await.unwrap();
        assert!(first.has_new_bar);
        assert_eq!(first.latest(), Some(&a));

        let revised = live.recv().await.unwrap();
        assert!(!revised.has_new_bar);
        assert_eq!(revised.latest(), Some(&a2));

        let new_bar = live.recv().await.unwrap();
        assert!(new_bar.has_new_bar);
        assert_eq!(new_bar.bars.len(), 2);
        assert_eq!(new_bar.latest(), Some(&b));
    }

    #[tokio::test]
    async fn initial_fetch_error_fails_subscribe() {
        let script = Script(Mutex::new(VecDeque::from(vec![Err("no permission")])));
        let feed = PollingLiveFeed::new(Arc::new(script), Duration::from_secs(5));
        let err = feed.subscribe(live_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
    }
}
