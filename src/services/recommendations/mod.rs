//! Recommendation pipeline.
//!
//! A run reads every positive signal once, expands each signal with every
//! generation strategy on a bounded worker pool, makes sure each distinct
//! candidate album exists in the local catalog, and records the surviving
//! (user, album) pairs. All writes are conflict tolerant, so repeated and
//! overlapping runs converge on the same recommendation set.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    db::{AlbumStore, RatingStore, RecommendationStore},
    error::{AppError, AppResult},
    models::{AlbumId, Candidate, RunStatus, RunSummary, Signal},
    services::catalog::{CatalogClient, MemoizedCatalog},
};

pub mod enrichment;
pub mod generators;
pub mod pool;
pub mod signals;
pub mod sink;

pub use enrichment::{CatalogUpsert, Ensured};
pub use generators::{
    ArtistCatalogExpansion, CandidateGenerator, CoRatingExpansion, RelatedArtistExpansion,
};
pub use pool::WorkerPool;
pub use signals::SignalReader;
pub use sink::RecommendationSink;

/// Tunables for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub positive_rating_threshold: i32,
    pub worker_pool_size: usize,
    pub related_artist_cap: usize,
    pub co_rater_cap: i64,
    pub run_deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            positive_rating_threshold: 3,
            worker_pool_size: 4,
            related_artist_cap: 5,
            co_rater_cap: 50,
            run_deadline: Duration::from_secs(3_600),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            positive_rating_threshold: config.positive_rating_threshold,
            worker_pool_size: config.worker_pool_size,
            related_artist_cap: config.related_artist_cap,
            co_rater_cap: config.co_rater_cap,
            run_deadline: config.run_deadline(),
        }
    }
}

/// Storage seams the pipeline reads and writes
#[derive(Clone)]
pub struct PipelineStores {
    pub ratings: Arc<dyn RatingStore>,
    pub albums: Arc<dyn AlbumStore>,
    pub recommendations: Arc<dyn RecommendationStore>,
}

/// Result of the enrichment stage
#[derive(Default)]
struct Enrichment {
    present: HashSet<AlbumId>,
    enriched: usize,
    dropped: usize,
    errors: usize,
}

pub struct RecommendationPipeline {
    catalog: Arc<dyn CatalogClient>,
    /// Artist-level answers shared by every unit of the current run
    memo: Arc<MemoizedCatalog>,
    reader: SignalReader,
    generators: Vec<Arc<dyn CandidateGenerator>>,
    upsert: Arc<CatalogUpsert>,
    sink: RecommendationSink,
    settings: PipelineSettings,
    /// Held for the duration of a run; a second trigger is refused
    run_lock: Arc<Mutex<()>>,
    latest: RwLock<Option<RunSummary>>,
}

impl RecommendationPipeline {
    /// Builds the pipeline with the three standard strategies.
    ///
    /// The catalog strategies go through a per-run memo, so signals sharing
    /// an artist cost one catalog call per artist and run.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        stores: PipelineStores,
        settings: PipelineSettings,
    ) -> Self {
        let memo = Arc::new(MemoizedCatalog::new(catalog.clone()));
        let generators: Vec<Arc<dyn CandidateGenerator>> = vec![
            Arc::new(ArtistCatalogExpansion::new(memo.clone())),
            Arc::new(RelatedArtistExpansion::new(
                memo.clone(),
                settings.related_artist_cap,
            )),
            Arc::new(CoRatingExpansion::new(
                stores.ratings.clone(),
                settings.positive_rating_threshold,
                settings.co_rater_cap,
            )),
        ];

        Self::assemble(catalog, memo, stores, settings, generators)
    }

    pub fn with_generators(
        catalog: Arc<dyn CatalogClient>,
        stores: PipelineStores,
        settings: PipelineSettings,
        generators: Vec<Arc<dyn CandidateGenerator>>,
    ) -> Self {
        let memo = Arc::new(MemoizedCatalog::new(catalog.clone()));
        Self::assemble(catalog, memo, stores, settings, generators)
    }

    fn assemble(
        catalog: Arc<dyn CatalogClient>,
        memo: Arc<MemoizedCatalog>,
        stores: PipelineStores,
        settings: PipelineSettings,
        generators: Vec<Arc<dyn CandidateGenerator>>,
    ) -> Self {
        Self {
            memo,
            reader: SignalReader::new(stores.ratings, settings.positive_rating_threshold),
            upsert: Arc::new(CatalogUpsert::new(catalog.clone(), stores.albums)),
            sink: RecommendationSink::new(stores.recommendations),
            catalog,
            generators,
            settings,
            run_lock: Arc::new(Mutex::new(())),
            latest: RwLock::new(None),
        }
    }

    pub fn sink(&self) -> &RecommendationSink {
        &self.sink
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Summary of the most recent finished run
    pub async fn latest(&self) -> Option<RunSummary> {
        self.latest.read().await.clone()
    }

    /// Executes one full run.
    ///
    /// Returns `RunInProgress` when another run holds this pipeline. Every
    /// other outcome, including `Failed`, is reported through the summary.
    /// Cancelling `cancel` stops new catalog calls; work already resolved is
    /// still recorded and the summary is flagged `cancelled`.
    pub async fn run_once(&self, cancel: CancellationToken) -> AppResult<RunSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| AppError::RunInProgress)?;
        Ok(self.run_locked(cancel).await)
    }

    /// Claims the run lock now and executes the run on a background task.
    ///
    /// The lock is taken before this returns, so a caller that gets `Ok` owns
    /// the run and a concurrent caller gets `RunInProgress`.
    pub fn spawn_run(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> AppResult<JoinHandle<RunSummary>> {
        let guard = self
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::RunInProgress)?;

        let pipeline = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            pipeline.run_locked(cancel).await
        }))
    }

    async fn run_locked(&self, cancel: CancellationToken) -> RunSummary {
        self.memo.clear().await;
        let summary = self.execute(cancel).await;
        self.memo.clear().await;

        tracing::info!(
            run_id = %summary.run_id,
            status = ?summary.status,
            signals = summary.signals_read,
            candidates = summary.candidates_generated,
            enriched = summary.albums_enriched,
            dropped = summary.albums_dropped,
            written = summary.recommendations_written,
            errors = summary.errors,
            cancelled = summary.cancelled,
            "Recommendation run finished"
        );

        *self.latest.write().await = Some(summary.clone());
        summary
    }

    async fn execute(&self, cancel: CancellationToken) -> RunSummary {
        let mut summary = RunSummary::new();

        // `run` fires on deadline or external cancellation; `stop` additionally
        // fires on a fatal error so outstanding work halts either way.
        let run = cancel.child_token();
        let stop = run.child_token();

        let deadline = {
            let run = run.clone();
            let limit = self.settings.run_deadline;
            let run_id = summary.run_id;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(run_id = %run_id, deadline_secs = limit.as_secs(), "Run deadline reached, abandoning remaining work");
                        run.cancel();
                    }
                    _ = run.cancelled() => {}
                }
            })
        };

        self.execute_stages(&mut summary, &run, &stop).await;
        deadline.abort();

        summary
    }

    async fn execute_stages(
        &self,
        summary: &mut RunSummary,
        run: &CancellationToken,
        stop: &CancellationToken,
    ) {
        tracing::info!(run_id = %summary.run_id, "Starting recommendation run");

        summary.advance(RunStatus::ReadingSignals);

        if let Err(e) = self.catalog.authenticate().await {
            tracing::error!(run_id = %summary.run_id, error = %e, "Catalog authentication failed");
            summary.fail(e.to_string());
            return;
        }

        let signals = match self.reader.read_positive_signals().await {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!(run_id = %summary.run_id, error = %e, "Failed to read signals");
                summary.fail(e.to_string());
                return;
            }
        };
        summary.signals_read = signals.len();

        summary.advance(RunStatus::Generating);
        let candidates = match self.generate(signals, stop, summary).await {
            Ok(candidates) => candidates,
            Err(e) => {
                summary.fail(e.to_string());
                return;
            }
        };
        summary.candidates_generated = candidates.len();

        summary.advance(RunStatus::Enriching);
        let album_ids: BTreeSet<AlbumId> =
            candidates.iter().map(|c| c.album_id.clone()).collect();
        let enrichment = match self.enrich(album_ids, stop).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                summary.fail(e.to_string());
                return;
            }
        };
        summary.albums_enriched = enrichment.enriched;
        summary.albums_dropped = enrichment.dropped;
        summary.errors += enrichment.errors;

        summary.advance(RunStatus::Sinking);
        let resolved: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| enrichment.present.contains(&c.album_id))
            .collect();

        match self.sink.record_all(&resolved).await {
            Ok(written) => summary.recommendations_written = written,
            Err(e) => {
                tracing::error!(run_id = %summary.run_id, error = %e, "Failed to record recommendations");
                summary.fail(e.to_string());
                return;
            }
        }

        summary.cancelled = run.is_cancelled();
        summary.advance(RunStatus::Done);
    }

    /// Runs every (signal, strategy) unit and merges the candidates.
    ///
    /// Artists the catalog does not know yield nothing and are not errors;
    /// other non-fatal unit failures are counted into `summary.errors`.
    async fn generate(
        &self,
        signals: Vec<Signal>,
        stop: &CancellationToken,
        summary: &mut RunSummary,
    ) -> AppResult<BTreeSet<Candidate>> {
        let mut units = Vec::with_capacity(signals.len() * self.generators.len());

        for signal in signals.into_iter().map(Arc::new) {
            for generator in &self.generators {
                let signal = signal.clone();
                let generator = generator.clone();
                let run_id = summary.run_id;

                units.push(async move {
                    let result = generator.generate(&signal).await;
                    match &result {
                        Err(AppError::NotFound(reason)) => {
                            tracing::debug!(
                                run_id = %run_id,
                                strategy = generator.name(),
                                user_id = signal.user_id,
                                reason = %reason,
                                "Artist unknown to the catalog, nothing to expand"
                            );
                        }
                        Err(e) if !e.is_fatal() => {
                            tracing::warn!(
                                run_id = %run_id,
                                strategy = generator.name(),
                                user_id = signal.user_id,
                                album_id = %signal.album_id,
                                error = %e,
                                "Skipping signal for strategy"
                            );
                        }
                        _ => {}
                    }
                    result
                });
            }
        }

        let report = WorkerPool::new(self.settings.worker_pool_size, stop.clone())
            .run_all(units)
            .await;

        let mut candidates = BTreeSet::new();
        let mut fatal = None;

        for result in report.finished {
            match result {
                Ok(generated) => candidates.extend(generated),
                Err(AppError::NotFound(_)) => {}
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(_) => summary.errors += 1,
            }
        }

        if let Some(e) = fatal {
            tracing::error!(run_id = %summary.run_id, error = %e, "Generation hit a fatal error");
            return Err(e);
        }

        if report.abandoned > 0 {
            tracing::warn!(
                run_id = %summary.run_id,
                abandoned = report.abandoned,
                "Generation units abandoned after cancellation"
            );
        }

        tracing::info!(
            run_id = %summary.run_id,
            candidates = candidates.len(),
            "Generated candidates"
        );

        Ok(candidates)
    }

    /// Ensures every distinct album once.
    ///
    /// Albums left unresolved because the run was cancelled are checked
    /// against the local store only, so no further catalog calls are made.
    async fn enrich(
        &self,
        album_ids: BTreeSet<AlbumId>,
        stop: &CancellationToken,
    ) -> AppResult<Enrichment> {
        let units: Vec<_> = album_ids
            .iter()
            .cloned()
            .map(|album_id| {
                let upsert = self.upsert.clone();
                async move {
                    let outcome = upsert.ensure_album(&album_id).await;
                    if let Err(e) = &outcome {
                        if !e.is_fatal() {
                            tracing::warn!(album_id = %album_id, error = %e, "Skipping album enrichment");
                        }
                    }
                    outcome.map(|ensured| (album_id, ensured))
                }
            })
            .collect();

        let report = WorkerPool::new(self.settings.worker_pool_size, stop.clone())
            .run_all(units)
            .await;

        let mut enrichment = Enrichment::default();
        let mut fatal = None;

        for result in report.finished {
            match result {
                Ok((album_id, ensured)) => {
                    match ensured {
                        Ensured::Enriched => enrichment.enriched += 1,
                        Ensured::Dropped => enrichment.dropped += 1,
                        Ensured::Cached => {}
                    }
                    if ensured.is_present() {
                        enrichment.present.insert(album_id);
                    }
                }
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(_) => enrichment.errors += 1,
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        if report.abandoned > 0 {
            let pending: Vec<AlbumId> = album_ids
                .into_iter()
                .filter(|id| !enrichment.present.contains(id))
                .collect();

            for album_id in pending {
                if self.upsert.resolve_local(&album_id).await? {
                    enrichment.present.insert(album_id);
                }
            }
        }

        Ok(enrichment)
    }
}
