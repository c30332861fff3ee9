pub mod candidate_pair;
pub mod image_similarity;
pub mod item;

pub use candidate_pair::CandidatePairRepository;
pub use image_similarity::ImageSimilarityRepository;
pub use item::{ItemRepository, LoadedItems};

use super::DatabaseError;
