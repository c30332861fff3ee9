use crate::core::store::StoreError;
use crate::core::vector::SimilarityMatrix;
use crate::database::models::ImageSimilarityRecord;
use crate::database::repositories::ImageSimilarityRepository;
use crate::database::{Database, DatabaseError};
use crate::services::features::{Embedding, ImageFeatureExtractor};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Result of comparing two items' photo sets.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageComparison {
    /// At least one side had no usable photo.
    NotComparable,
    /// `score` is the best single photo match, scaled to 0-100.
    Scored {
        score: f64,
        matrix: SimilarityMatrix,
    },
}

impl ImageComparison {
    pub fn score(&self) -> Option<f64> {
        match self {
            ImageComparison::NotComparable => None,
            ImageComparison::Scored { score, .. } => Some(*score),
        }
    }
}

/// Item-level visual similarity: the best match in the photo-vs-photo matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSimilarityScorer;

impl ImageSimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, a: &[Embedding], b: &[Embedding]) -> ImageComparison {
        if a.is_empty() || b.is_empty() {
            return ImageComparison::NotComparable;
        }

        let matrix = SimilarityMatrix::cosine(a, b);
        match matrix.max() {
            Some((_, _, best)) => ImageComparison::Scored {
                score: (best as f64 * 100.0).clamp(0.0, 100.0),
                matrix,
            },
            None => ImageComparison::NotComparable,
        }
    }
}

#[derive(Debug, Error)]
pub enum RawPassError {
    #[error("Image store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RawPassReport {
    pub items: usize,
    pub items_with_images: usize,
    pub item_pairs: usize,
    pub rows_written: usize,
}

/// Exploratory whole-dataset pass: every photo of every item against every
/// photo of every other item, appended to `image_similarities`.
///
/// Work grows as n²·m², so rows are flushed in fixed-size batches and the
/// number of scanned items can be capped.
pub struct RawSimilarityPass<'a> {
    extractor: &'a ImageFeatureExtractor,
    database: &'a Database,
    batch_size: usize,
    max_items: Option<usize>,
}

impl<'a> RawSimilarityPass<'a> {
    pub fn new(extractor: &'a ImageFeatureExtractor, database: &'a Database) -> Self {
        Self {
            extractor,
            database,
            batch_size: 500,
            max_items: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn run(&self) -> Result<RawPassReport, RawPassError> {
        let mut conn = self.database.session()?;
        let store = self.extractor.store();

        let mut item_numbers = store.item_numbers()?;
        if let Some(limit) = self.max_items {
            item_numbers.truncate(limit);
        }

        let embedded: Vec<(String, Vec<Embedding>)> = item_numbers
            .par_iter()
            .map(|item| {
                self.extractor
                    .extract_item(item)
                    .map(|embeddings| (item.clone(), embeddings))
            })
            .collect::<Result<_, StoreError>>()?;

        let embedded: Vec<&(String, Vec<Embedding>)> = embedded
            .iter()
            .filter(|(item, embeddings)| {
                if embeddings.is_empty() {
                    log::info!("Item {} has no usable images, skipping", item);
                }
                !embeddings.is_empty()
            })
            .collect();

        let mut report = RawPassReport {
            items: item_numbers.len(),
            items_with_images: embedded.len(),
            ..Default::default()
        };

        let mut buffer: Vec<ImageSimilarityRecord> = Vec::with_capacity(self.batch_size);
        for (i, (_, left)) in embedded.iter().enumerate() {
            for (_, right) in &embedded[i + 1..] {
                report.item_pairs += 1;
                let matrix = SimilarityMatrix::cosine(left.as_slice(), right.as_slice());
                for (row, col, similarity) in matrix.entries() {
                    buffer.push(ImageSimilarityRecord {
                        image_path1: store.relative_path(&left[row].path),
                        image_path2: store.relative_path(&right[col].path),
                        similarity: similarity as f64,
                    });
                    if buffer.len() >= self.batch_size {
                        report.rows_written += flush(&mut conn, &mut buffer)?;
                    }
                }
            }
        }
        report.rows_written += flush(&mut conn, &mut buffer)?;

        log::info!(
            "Raw image similarity pass: {} items ({} with images), {} pairs, {} rows",
            report.items,
            report.items_with_images,
            report.item_pairs,
            report.rows_written
        );
        Ok(report)
    }
}

fn flush(
    conn: &mut rusqlite::Connection,
    buffer: &mut Vec<ImageSimilarityRecord>,
) -> Result<usize, DatabaseError> {
    if buffer.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let written = ImageSimilarityRepository::new(&tx).append_batch(buffer)?;
    tx.commit()?;
    log::debug!("Flushed {} raw similarity rows", written);
    buffer.clear();
    Ok(written)
}
