pub mod classifier;
pub mod dispatch;
pub mod features;
pub mod grouper;
pub mod image_similarity;

pub use classifier::{Classification, PairClassifier};
pub use dispatch::{ImagePass, ImagePassReport};
pub use features::{Embedding, EmbeddingCache, ImageFeatureExtractor};
pub use grouper::{ItemPairGrouper, PairScores, TextPassReport};
pub use image_similarity::{ImageComparison, ImageSimilarityScorer, RawPassReport, RawSimilarityPass};
