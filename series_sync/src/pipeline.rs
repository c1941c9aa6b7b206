//! Per-series orchestration: resume, backfill, then live merge.
//!
//! Within a series the steps are strictly ordered. With a live source, the
//! subscription is opened once the main backfill finished, then a catch-up
//! pass fills the bars that closed while backfill ran, and only then does the
//! merge start consuming (updates queue in the feed meanwhile). Across series,
//! [`SeriesPipeline::run_all`]
//! runs one task per series in a [`JoinSet`] and collects failures per series
//! instead of stopping at the first one.

use std::{collections::HashMap, sync::Arc};

use bar_feed::{
    models::{request_params::LiveRequest, series::SeriesKey},
    providers::{HistoricalSource, LiveSource, ProviderError},
};
use chrono::{DateTime, Utc};
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

use crate::{
    backfill::{BackfillConfig, BackfillError, BackfillPaginator, BackfillReport},
    config::{LiveSettings, SeriesSpec},
    live::{LiveMergeAdapter, SubscriptionHandle},
    planner::ResumeDecision,
    store::StoreError,
    writer::SeriesWriter,
};

/// Why one series did not reach the live stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading the resume point failed.
    #[error("{series}: reading last persisted bar failed: {source}")]
    Store {
        /// Series label.
        series: String,
        /// Store error.
        source: StoreError,
    },

    /// Backfill stopped early.
    #[error(transparent)]
    Backfill(#[from] BackfillError),

    /// The live subscription could not be opened.
    #[error("{series}: live subscription failed: {source}")]
    Subscribe {
        /// Series label.
        series: String,
        /// Provider error.
        source: ProviderError,
    },

    /// The series task panicked or was aborted.
    #[error("{series}: task failed: {source}")]
    Task {
        /// Series label.
        series: String,
        /// Join error.
        source: tokio::task::JoinError,
    },
}

/// What a successful series run produced.
#[derive(Debug)]
pub struct SeriesOutcome {
    /// Backfill summary.
    pub report: BackfillReport,
    /// Catch-up pass run just before the live merge attached.
    pub catch_up: Option<BackfillReport>,
    /// Live merge, when a live source is configured.
    pub subscription: Option<SubscriptionHandle>,
}

/// Results of [`SeriesPipeline::run_all`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Series that completed backfill (and attached live, if enabled).
    pub succeeded: Vec<SeriesOutcome>,
    /// Series that failed, with the reason.
    pub failed: Vec<(Arc<SeriesKey>, PipelineError)>,
}

impl RunSummary {
    /// Live subscriptions of all successful series.
    pub fn subscriptions(&mut self) -> Vec<SubscriptionHandle> {
        self.succeeded
            .iter_mut()
            .filter_map(|o| o.subscription.take())
            .collect()
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Everything needed to sync a series; cheap to clone.
#[derive(Clone)]
pub struct SeriesPipeline {
    historical: Arc<dyn HistoricalSource>,
    live: Option<Arc<dyn LiveSource>>,
    writer: SeriesWriter,
    paginator: BackfillPaginator,
    live_settings: LiveSettings,
    clock: Clock,
}

impl SeriesPipeline {
    /// A backfill-only pipeline.
    pub fn new(
        historical: Arc<dyn HistoricalSource>,
        writer: SeriesWriter,
        backfill: BackfillConfig,
        live_settings: LiveSettings,
    ) -> Self {
        let paginator = BackfillPaginator::new(Arc::clone(&historical), writer.clone(), backfill);
        Self {
            historical,
            live: None,
            writer,
            paginator,
            live_settings,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock used to start the catch-up pass.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Attaches a live feed after each backfill.
    pub fn with_live(mut self, live: Arc<dyn LiveSource>) -> Self {
        self.live = Some(live);
        self
    }

    /// Resume decision for `spec` from persisted state.
    pub async fn resume_decision(&self, spec: &SeriesSpec) -> Result<ResumeDecision, PipelineError> {
        let last = self
            .writer
            .last_timestamp(&spec.key)
            .await
            .map_err(|source| PipelineError::Store {
                series: spec.key.to_string(),
                source,
            })?;
        Ok(ResumeDecision::new(
            spec.configured_start,
            last,
            spec.key.timeframe().bar_duration(),
        ))
    }

    /// Backfills `spec` from `now` back to its resume point.
    pub async fn backfill_series(
        &self,
        spec: &SeriesSpec,
        now: DateTime<Utc>,
    ) -> Result<BackfillReport, PipelineError> {
        let decision = self.resume_decision(spec).await?;
        info!(
            series = %spec.key,
            configured_start = %decision.configured_start,
            last_persisted = ?decision.last_persisted,
            effective_start = %decision.effective_start,
            "resume planned"
        );
        Ok(self
            .paginator
            .run(&spec.key, &spec.contract, decision.effective_start, now)
            .await?)
    }

    /// Backfill, then attach the live merge if a live source is set.
    ///
    /// The main pass walks back from `now`. Bars closing after `now` are
    /// fetched by a second pass from the clock's current time down to `now`,
    /// run after subscribing so the feed's queued updates pick up from there.
    pub async fn run_series(
        &self,
        spec: &SeriesSpec,
        now: DateTime<Utc>,
    ) -> Result<SeriesOutcome, PipelineError> {
        let report = self.backfill_series(spec, now).await?;

        let Some(live) = &self.live else {
            return Ok(SeriesOutcome {
                report,
                catch_up: None,
                subscription: None,
            });
        };

        let cfg = self.paginator.config();
        let req = LiveRequest {
            contract: spec.contract.clone(),
            timeframe: spec.key.timeframe(),
            duration: self.live_settings.duration,
            what_to_show: cfg.what_to_show,
            use_rth: cfg.use_rth,
        };
        let feed = live
            .subscribe(req)
            .await
            .map_err(|source| PipelineError::Subscribe {
                series: spec.key.to_string(),
                source,
            })?;

        let caught_up_to = (self.clock)();
        let catch_up = self
            .paginator
            .run(&spec.key, &spec.contract, now, caught_up_to)
            .await?;
        if catch_up.pages > 0 {
            info!(
                series = %spec.key,
                from = %now,
                to = %caught_up_to,
                bars = catch_up.bars_written,
                "caught up before live merge"
            );
        }

        let adapter = LiveMergeAdapter::new(self.writer.clone(), self.historical.source_tag());
        let subscription = adapter.attach(Arc::clone(&spec.key), feed, |series, err| {
            warn!(%series, error = %err, "live bar not persisted");
        });
        Ok(SeriesOutcome {
            report,
            catch_up: Some(catch_up),
            subscription: Some(subscription),
        })
    }

    /// Runs every series concurrently. One series failing does not affect
    /// the others.
    pub async fn run_all(&self, specs: Vec<SeriesSpec>, now: DateTime<Utc>) -> RunSummary {
        let mut tasks = JoinSet::new();
        let mut keys: HashMap<Id, Arc<SeriesKey>> = HashMap::new();
        for spec in specs {
            let pipeline = self.clone();
            let key = Arc::clone(&spec.key);
            let handle = tasks.spawn(async move { pipeline.run_series(&spec, now).await });
            keys.insert(handle.id(), key);
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.succeeded.push(outcome),
                Ok((id, Err(e))) => {
                    error!(error = %e, "series failed");
                    if let Some(key) = keys.remove(&id) {
                        summary.failed.push((key, e));
                    }
                }
                Err(join_err) => {
                    if let Some(key) = keys.remove(&join_err.id()) {
                        let e = PipelineError::Task {
                            series: key.to_string(),
                            source: join_err,
                        };
                        error!(error = %e, "series failed");
                        summary.failed.push((key, e));
                    }
                }
            }
        }
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "all series processed"
        );
        summary
    }
}
