mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use bar_feed::{
    models::{
        bar::RawBar,
        duration::DurationSpec,
        request_params::{HistoricalRequest, LiveRequest},
    },
    normalize::normalize_bar,
    providers::{
        ApiSnafu, BarUpdate, HistoricalSource, LiveFeed, LiveSource, ProviderError,
    },
};
use chrono::Duration;
use series_sync::{
    backfill::BackfillConfig,
    config::LiveSettings,
    pipeline::{PipelineError, SeriesPipeline},
    store::{BarStore, MemoryBarStore, SqliteBarStore},
    writer::SeriesWriter,
};
use tokio::sync::mpsc;

use common::{MockSource, raw, series, setup_db, spec, utc};

fn daily_backfill() -> BackfillConfig {
    let mut cfg = BackfillConfig::for_timeframe("1 day".parse().unwrap());
    cfg.page_duration = "1 D".parse::<DurationSpec>().unwrap();
    cfg.max_pages = 100;
    cfg
}

fn live_settings() -> LiveSettings {
    LiveSettings {
        duration: "2 D".parse().unwrap(),
        poll_interval: StdDuration::from_secs(5),
    }
}

/// One daily bar per page; symbols starting with `BAD` fail.
struct PerSymbol;

#[async_trait]
impl HistoricalSource for PerSymbol {
    fn source_tag(&self) -> &str {
        "mock"
    }

    async fn fetch_bars(&self, req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError> {
        if req.contract.symbol.starts_with("BAD") {
            return ApiSnafu { message: "no such symbol" }.fail();
        }
        Ok(vec![raw(req.window.end - Duration::days(1), 1.0)])
    }
}

/// Hands out channels whose senders the test drives.
#[derive(Default)]
struct ManualLive {
    senders: Mutex<Vec<(LiveRequest, mpsc::Sender<BarUpdate>)>>,
}

#[async_trait]
impl LiveSource for ManualLive {
    async fn subscribe(&self, req: LiveRequest) -> Result<LiveFeed, ProviderError> {
        let (tx, rx) = mpsc::channel(8);
        self.senders.lock().unwrap().push((req, tx));
        Ok(LiveFeed::from_receiver(rx))
    }
}

#[tokio::test]
async fn resumes_after_last_persisted_bar() {
    let (_db, conn) = setup_db();
    let store = Arc::new(SqliteBarStore::new(conn));
    let key = series("AAPL", "1 day");
    store
        .insert_bars(&[normalize_bar(&key, &raw(utc(2024, 1, 5, 0, 0), 1.0), "mock").unwrap()])
        .await
        .unwrap();

    let source = Arc::new(MockSource::always(|req| {
        vec![raw(req.window.end - Duration::days(1), 2.0)]
    }));
    let pipeline = SeriesPipeline::new(
        source.clone(),
        SeriesWriter::new(store.clone()),
        daily_backfill(),
        live_settings(),
    );
    let spec = spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0));

    let decision = pipeline.resume_decision(&spec).await.unwrap();
    assert!(decision.is_resume());
    assert_eq!(decision.effective_start, utc(2024, 1, 6, 0, 0));

    let report = pipeline
        .backfill_series(&spec, utc(2024, 1, 8, 0, 0))
        .await
        .unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(
        source.request_ends(),
        vec![utc(2024, 1, 8, 0, 0), utc(2024, 1, 7, 0, 0)]
    );
    assert_eq!(store.count(&key).await.unwrap(), 3);
    assert_eq!(store.last_timestamp(&key).await.unwrap(), Some(utc(2024, 1, 7, 0, 0)));
}

#[tokio::test]
async fn rerun_after_complete_backfill_fetches_nothing_new() {
    let store = Arc::new(MemoryBarStore::new());
    let source = Arc::new(MockSource::always(|req| {
        vec![raw(req.window.end - Duration::days(1), 1.0)]
    }));
    let pipeline = SeriesPipeline::new(
        source.clone(),
        SeriesWriter::new(store.clone()),
        daily_backfill(),
        live_settings(),
    );
    let spec = spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0));
    let now = utc(2024, 1, 4, 0, 0);

    pipeline.backfill_series(&spec, now).await.unwrap();
    let first = source.fetches();
    let report = pipeline.backfill_series(&spec, now).await.unwrap();

    assert_eq!(first, 3);
    // The last bar starts 01-03, so the resume point is `now` itself.
    assert_eq!(report.pages, 0);
    assert_eq!(store.bars(&spec.key).len(), 3);
}

#[tokio::test]
async fn one_failing_series_does_not_stop_the_others() {
    let store = Arc::new(MemoryBarStore::new());
    let pipeline = SeriesPipeline::new(
        Arc::new(PerSymbol),
        SeriesWriter::new(store.clone()),
        daily_backfill(),
        live_settings(),
    );
    let specs = vec![
        spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0)),
        spec("BADX", "1 day", utc(2024, 1, 1, 0, 0)),
        spec("MSFT", "1 day", utc(2024, 1, 1, 0, 0)),
    ];

    let summary = pipeline.run_all(specs, utc(2024, 1, 4, 0, 0)).await;

    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    let (key, err) = &summary.failed[0];
    assert_eq!(key.symbol(), "BADX");
    assert!(matches!(err, PipelineError::Backfill(_)));
    assert_eq!(store.bars(&series("AAPL", "1 day")).len(), 3);
    assert_eq!(store.bars(&series("MSFT", "1 day")).len(), 3);
    assert!(store.bars(&series("BADX", "1 day")).is_empty());
}

#[tokio::test]
async fn live_merge_attaches_after_backfill() {
    let store = Arc::new(MemoryBarStore::new());
    let live = Arc::new(ManualLive::default());
    let pipeline = SeriesPipeline::new(
        Arc::new(PerSymbol),
        SeriesWriter::new(store.clone()),
        daily_backfill(),
        live_settings(),
    )
    .with_live(live.clone())
    .with_clock(|| utc(2024, 1, 4, 0, 0));

    let mut summary = pipeline
        .run_all(vec![spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0))], utc(2024, 1, 4, 0, 0))
        .await;
    let mut subs = summary.subscriptions();
    assert_eq!(subs.len(), 1);
    let sub = subs.remove(0);
    assert_eq!(sub.series().symbol(), "AAPL");

    let (req, tx) = live.senders.lock().unwrap().remove(0);
    assert_eq!(req.contract.symbol, "AAPL");
    assert_eq!(req.duration.to_string(), "2 D");

    // Overlaps the last backfilled bar, then a fresh one.
    tx.send(BarUpdate::new(vec![raw(utc(2024, 1, 3, 0, 0), 9.0)], false))
        .await
        .unwrap();
    tx.send(BarUpdate::new(
        vec![raw(utc(2024, 1, 3, 0, 0), 9.0), raw(utc(2024, 1, 4, 0, 0), 4.0)],
        true,
    ))
    .await
    .unwrap();
    drop(tx);

    assert_eq!(sub.join().await.unwrap(), 2);
    let bars = store.bars(&series("AAPL", "1 day"));
    assert_eq!(bars.len(), 4);
    assert_eq!(bars[2].close, Some(1.0));
    assert_eq!(bars[3].timestamp, utc(2024, 1, 4, 0, 0));
}

#[tokio::test]
async fn failed_backfill_never_subscribes() {
    let live = Arc::new(ManualLive::default());
    let pipeline = SeriesPipeline::new(
        Arc::new(PerSymbol),
        SeriesWriter::new(Arc::new(MemoryBarStore::new())),
        daily_backfill(),
        live_settings(),
    )
    .with_live(live.clone());

    let summary = pipeline
        .run_all(vec![spec("BADX", "1 day", utc(2024, 1, 1, 0, 0))], utc(2024, 1, 4, 0, 0))
        .await;

    assert_eq!(summary.failed.len(), 1);
    assert!(live.senders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bars_closed_during_backfill_are_caught_up() {
    let store = Arc::new(MemoryBarStore::new());
    let live = Arc::new(ManualLive::default());
    let source = Arc::new(MockSource::always(|req| {
        vec![raw(req.window.end - Duration::days(1), 1.0)]
    }));
    // Backfill starts at 01-04; by the time it is done the clock reads 01-07.
    let pipeline = SeriesPipeline::new(
        source.clone(),
        SeriesWriter::new(store.clone()),
        daily_backfill(),
        live_settings(),
    )
    .with_live(live.clone())
    .with_clock(|| utc(2024, 1, 7, 0, 0));

    let outcome = pipeline
        .run_series(&spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0)), utc(2024, 1, 4, 0, 0))
        .await
        .unwrap();

    assert_eq!(outcome.report.pages, 3);
    let catch_up = outcome.catch_up.unwrap();
    assert_eq!(catch_up.pages, 3);
    assert_eq!(
        source.request_ends()[3..],
        [utc(2024, 1, 7, 0, 0), utc(2024, 1, 6, 0, 0), utc(2024, 1, 5, 0, 0)]
    );

    // The feed's first snapshot only contributes its newest bar.
    let (_, tx) = live.senders.lock().unwrap().remove(0);
    tx.send(BarUpdate::new(
        vec![
            raw(utc(2024, 1, 4, 0, 0), 1.0),
            raw(utc(2024, 1, 5, 0, 0), 1.0),
            raw(utc(2024, 1, 6, 0, 0), 1.0),
            raw(utc(2024, 1, 7, 0, 0), 1.0),
        ],
        true,
    ))
    .await
    .unwrap();
    drop(tx);
    outcome.subscription.unwrap().join().await.unwrap();

    let days: Vec<_> = store
        .bars(&series("AAPL", "1 day"))
        .iter()
        .map(|b| b.timestamp)
        .collect();
    let want: Vec<_> = (1..=7).map(|d| utc(2024, 1, d, 0, 0)).collect();
    assert_eq!(days, want);
}

#[tokio::test]
async fn backfill_only_runs_skip_catch_up() {
    let source = Arc::new(MockSource::always(|req| {
        vec![raw(req.window.end - Duration::days(1), 1.0)]
    }));
    let pipeline = SeriesPipeline::new(
        source.clone(),
        SeriesWriter::new(Arc::new(MemoryBarStore::new())),
        daily_backfill(),
        live_settings(),
    )
    .with_clock(|| utc(2024, 1, 7, 0, 0));

    let outcome = pipeline
        .run_series(&spec("AAPL", "1 day", utc(2024, 1, 1, 0, 0)), utc(2024, 1, 4, 0, 0))
        .await
        .unwrap();

    assert!(outcome.catch_up.is_none());
    assert!(outcome.subscription.is_none());
    assert_eq!(source.fetches(), 3);
}
