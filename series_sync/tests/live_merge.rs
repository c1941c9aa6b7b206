mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use bar_feed::{
    models::bar::RawBar,
    normalize::normalize_bar,
    providers::{BarUpdate, LiveFeed},
};
use chrono::Duration;
use series_sync::{
    live::{LiveMergeAdapter, LiveMergeError},
    store::{BarStore, MemoryBarStore},
    writer::SeriesWriter,
};
use tokio::sync::mpsc;

use common::{FailingStore, raw, series, utc};

fn adapter(store: Arc<MemoryBarStore>) -> LiveMergeAdapter {
    LiveMergeAdapter::new(SeriesWriter::new(store), "mock")
}

#[tokio::test]
async fn only_the_latest_bar_is_written() {
    let store = Arc::new(MemoryBarStore::new());
    let key = series("AAPL", "1 min");
    let t = utc(2024, 1, 2, 14, 30);

    let update = BarUpdate::new(vec![raw(t, 1.0), raw(t + Duration::minutes(1), 2.0)], true);
    let n = adapter(store.clone()).apply(&key, &update).await.unwrap();

    assert_eq!(n, 1);
    let bars = store.bars(&key);
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].timestamp, t + Duration::minutes(1));
    assert_eq!(bars[0].close, Some(2.0));
}

#[tokio::test]
async fn empty_snapshot_is_a_no_op() {
    let store = Arc::new(MemoryBarStore::new());
    let update = BarUpdate::new(Vec::<RawBar>::new(), false);

    let n = adapter(store.clone())
        .apply(&series("AAPL", "1 min"), &update)
        .await
        .unwrap();

    assert_eq!(n, 0);
    assert_eq!(store.insert_calls(), 0);
}

#[tokio::test]
async fn bar_already_backfilled_is_not_duplicated() {
    let store = Arc::new(MemoryBarStore::new());
    let key = series("AAPL", "1 min");
    let t = utc(2024, 1, 2, 14, 30);
    store
        .insert_bars(&[normalize_bar(&key, &raw(t, 1.0), "mock").unwrap()])
        .await
        .unwrap();

    let update = BarUpdate::new(vec![raw(t, 9.0)], false);
    adapter(store.clone()).apply(&key, &update).await.unwrap();

    let bars = store.bars(&key);
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].close, Some(1.0));
}

#[tokio::test]
async fn failures_are_reported_and_consumption_continues() {
    let store = Arc::new(MemoryBarStore::new());
    let key = series("AAPL", "1 min");
    let t = utc(2024, 1, 2, 14, 30);
    let (tx, rx) = mpsc::channel(8);

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let handle = adapter(store.clone()).attach(
        Arc::clone(&key),
        LiveFeed::from_receiver(rx),
        move |series, err| {
            assert!(matches!(err, LiveMergeError::MalformedTimestamp(_)));
            sink.lock().unwrap().push(series.to_string());
        },
    );

    tx.send(BarUpdate::new(vec![RawBar::at("garbage")], true)).await.unwrap();
    tx.send(BarUpdate::new(vec![raw(t, 1.0)], true)).await.unwrap();
    tx.send(BarUpdate::new(vec![raw(t, 1.0), raw(t + Duration::minutes(1), 2.0)], true))
        .await
        .unwrap();
    drop(tx);

    let written = handle.join().await.unwrap();
    assert_eq!(written, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["AAPL/1 min".to_string()]);
    assert_eq!(store.bars(&key).len(), 2);
}

#[tokio::test]
async fn write_failures_reach_the_callback() {
    let (tx, rx) = mpsc::channel(4);
    let failures: Arc<Mutex<usize>> = Arc::default();
    let sink = Arc::clone(&failures);

    let handle = LiveMergeAdapter::new(SeriesWriter::new(Arc::new(FailingStore)), "mock").attach(
        series("AAPL", "1 min"),
        LiveFeed::from_receiver(rx),
        move |_, err| {
            assert!(matches!(err, LiveMergeError::StoreWrite(_)));
            *sink.lock().unwrap() += 1;
        },
    );

    for i in 0..3 {
        let t = utc(2024, 1, 2, 14, 30) + Duration::minutes(i);
        tx.send(BarUpdate::new(vec![raw(t, 1.0)], true)).await.unwrap();
    }
    drop(tx);

    assert_eq!(handle.join().await.unwrap(), 0);
    assert_eq!(*failures.lock().unwrap(), 3);
}

#[tokio::test]
async fn cancel_stops_the_subscription() {
    let store = Arc::new(MemoryBarStore::new());
    let (tx, rx) = mpsc::channel(4);
    let handle = adapter(store).attach(
        series("AAPL", "1 min"),
        LiveFeed::from_receiver(rx),
        |_, _| {},
    );

    assert!(!handle.is_finished());
    handle.cancel();
    let err = handle.join().await.unwrap_err();
    assert!(err.is_cancelled());

    // The receiver went away with the task.
    tokio::time::timeout(StdDuration::from_secs(1), tx.closed())
        .await
        .unwrap();
}
