use crate::core::store::StoreError;
use crate::database::models::{CandidatePair, PairKey};
use crate::database::repositories::CandidatePairRepository;
use crate::database::{Database, DatabaseError};
use crate::services::classifier::{Classification, PairClassifier};
use crate::services::features::EmbeddingCache;
use crate::services::image_similarity::{ImageComparison, ImageSimilarityScorer};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{self, JoinSet};

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Image pass task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Error of a single pair comparison. Never escapes the pass.
#[derive(Debug, Error)]
pub enum PairTaskError {
    #[error("Image store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PairOutcome {
    Classified(Classification),
    /// One of the items had no usable photo.
    NotComparable,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub pair_id: i64,
    pub key: PairKey,
    pub error: String,
}

/// Outcome of phase 2. `classified + skipped + failures.len() == dispatched`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImagePassReport {
    pub dispatched: usize,
    pub classified: usize,
    pub identified: usize,
    pub skipped: usize,
    pub failures: Vec<PairFailure>,
    #[serde(skip)]
    pub classifications: Vec<Classification>,
}

impl ImagePassReport {
    fn record(&mut self, pair_id: i64, key: PairKey, result: Result<PairOutcome, PairTaskError>) {
        match result {
            Ok(PairOutcome::Classified(classification)) => {
                self.classified += 1;
                if classification.is_identified {
                    self.identified += 1;
                }
                self.classifications.push(classification);
            }
            Ok(PairOutcome::NotComparable) => {
                self.skipped += 1;
            }
            Err(e) => self.fail(pair_id, key, e.to_string()),
        }
    }

    fn fail(&mut self, pair_id: i64, key: PairKey, error: String) {
        log::error!("Image comparison for pair {} {} failed: {}", pair_id, key, error);
        self.failures.push(PairFailure { pair_id, key, error });
    }
}

/// Everything one worker needs. Cloned into each task; no session is shared.
#[derive(Clone)]
struct PairTask {
    database: Database,
    cache: Arc<EmbeddingCache>,
    scorer: ImageSimilarityScorer,
    classifier: PairClassifier,
}

impl PairTask {
    fn process(&self, pair: &CandidatePair) -> Result<PairOutcome, PairTaskError> {
        let mut conn = self.database.session()?;

        let left = self.cache.get(&pair.item_number1)?;
        let right = self.cache.get(&pair.item_number2)?;

        match self.scorer.compare(&left, &right) {
            ImageComparison::NotComparable => {
                log::info!(
                    "Pair {} {} has an item without images, skipping",
                    pair.id,
                    pair.key()
                );
                Ok(PairOutcome::NotComparable)
            }
            ImageComparison::Scored { score, .. } => {
                let classification = self.classifier.apply(&mut conn, pair.id, score)?;
                Ok(PairOutcome::Classified(classification))
            }
        }
    }
}

/// Phase 2: visual comparison of every stored candidate pair on a bounded
/// pool of blocking workers.
pub struct ImagePass {
    task: PairTask,
    workers: usize,
    progress: Option<ProgressBar>,
}

impl ImagePass {
    pub fn new(database: Database, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            task: PairTask {
                database,
                cache,
                scorer: ImageSimilarityScorer::new(),
                classifier: PairClassifier::new(),
            },
            workers: DEFAULT_WORKERS,
            progress: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Load every candidate pair and process them all. Only a failure to read
    /// the pair list aborts the pass.
    pub async fn run(&self) -> Result<ImagePassReport, DispatchError> {
        let database = self.task.database.clone();
        let pairs = tokio::task::spawn_blocking(move || {
            let conn = database.session()?;
            CandidatePairRepository::new(&conn).find_all()
        })
        .await??;

        log::info!(
            "Image pass over {} candidate pairs with {} workers",
            pairs.len(),
            self.workers
        );
        Ok(self.run_pairs(pairs).await)
    }

    /// Process `pairs` with at most `workers` in flight and wait for every one
    /// of them. Task errors and panics are recorded, never propagated.
    pub async fn run_pairs(&self, pairs: Vec<CandidatePair>) -> ImagePassReport {
        let mut report = ImagePassReport {
            dispatched: pairs.len(),
            ..Default::default()
        };
        if let Some(progress) = &self.progress {
            progress.set_length(pairs.len() as u64);
        }

        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<task::Id, (i64, PairKey)> = HashMap::new();
        let mut pending = pairs.into_iter();

        loop {
            while join_set.len() < self.workers {
                let Some(pair) = pending.next() else {
                    break;
                };
                let worker = self.task.clone();
                let (pair_id, key) = (pair.id, pair.key());
                let handle = join_set.spawn_blocking(move || {
                    let result = worker.process(&pair);
                    (pair.id, pair.key(), result)
                });
                in_flight.insert(handle.id(), (pair_id, key));
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            match joined {
                Ok((id, (pair_id, key, result))) => {
                    in_flight.remove(&id);
                    report.record(pair_id, key, result);
                }
                Err(e) => match in_flight.remove(&e.id()) {
                    Some((pair_id, key)) => report.fail(pair_id, key, e.to_string()),
                    None => log::error!("Image task {} failed: {}", e.id(), e),
                },
            }
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        log::info!(
            "Image pass done: {} classified ({} identified), {} skipped, {} failed",
            report.classified,
            report.identified,
            report.skipped,
            report.failures.len()
        );
        report
    }
}
