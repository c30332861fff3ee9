use crate::core::encoder::{EncoderError, ImageEncoder};
use crate::core::store::{ImageStore, StoreError};
use image::ImageReader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Embedding of one photo. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub path: PathBuf,
    pub vector: Vec<f32>,
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.vector
    }
}

/// Turns an item's photos into embeddings with a shared encoder.
#[derive(Debug, Clone)]
pub struct ImageFeatureExtractor {
    encoder: Arc<dyn ImageEncoder>,
    store: ImageStore,
}

impl ImageFeatureExtractor {
    pub fn new(encoder: Arc<dyn ImageEncoder>, store: ImageStore) -> Self {
        Self { encoder, store }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn encoder(&self) -> &dyn ImageEncoder {
        self.encoder.as_ref()
    }

    /// Embed every image in `paths`, in order. Images that fail to decode or
    /// encode are logged and left out.
    pub fn extract(&self, paths: &[PathBuf]) -> Vec<Embedding> {
        paths
            .iter()
            .filter_map(|path| match self.embed_one(path) {
                Ok(vector) => Some(Embedding {
                    path: path.clone(),
                    vector,
                }),
                Err(e) => {
                    log::warn!("Failed to process image {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }

    /// Embed all cached photos of one item. An item without a photo
    /// directory yields an empty list.
    pub fn extract_item(&self, item_number: &str) -> Result<Vec<Embedding>, StoreError> {
        let paths = self.store.images_for(item_number)?;
        let embeddings = self.extract(&paths);
        log::debug!(
            "Item {}: {} of {} images embedded with {}",
            item_number,
            embeddings.len(),
            paths.len(),
            self.encoder.name()
        );
        Ok(embeddings)
    }

    fn embed_one(&self, path: &Path) -> Result<Vec<f32>, EncoderError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let vector = self.encoder.encode(&image)?;
        if vector.len() != self.encoder.dimension() {
            return Err(EncoderError::Shape {
                expected: self.encoder.dimension(),
                got: vector.len(),
            });
        }
        Ok(vector)
    }
}

type Slot = Arc<Mutex<Option<Arc<Vec<Embedding>>>>>;

/// Per-pass memo of item embeddings.
///
/// Each item is embedded at most once, however many pairs mention it and
/// however many workers ask at the same moment. Failed lookups are not
/// remembered, so the next caller retries.
#[derive(Debug)]
pub struct EmbeddingCache {
    extractor: ImageFeatureExtractor,
    slots: Mutex<HashMap<String, Slot>>,
}

impl EmbeddingCache {
    pub fn new(extractor: ImageFeatureExtractor) -> Self {
        Self {
            extractor,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn extractor(&self) -> &ImageFeatureExtractor {
        &self.extractor
    }

    pub fn get(&self, item_number: &str) -> Result<Arc<Vec<Embedding>>, StoreError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(item_number.to_string()).or_default().clone()
        };

        // only this item's slot is held while encoding
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(embeddings) = cached.as_ref() {
            return Ok(Arc::clone(embeddings));
        }

        let embeddings = Arc::new(self.extractor.extract_item(item_number)?);
        *cached = Some(Arc::clone(&embeddings));
        Ok(embeddings)
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
