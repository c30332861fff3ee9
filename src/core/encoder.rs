//! Visual encoders that turn a decoded photo into a fixed-length embedding.

use image::{imageops::FilterType, DynamicImage};
use std::fmt;
use thiserror::Error;

#[cfg(feature = "onnx")]
pub use onnx::OnnxImageEncoder;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unexpected embedding shape: expected {expected} values, got {got}")]
    Shape { expected: usize, got: usize },
}

/// Pretrained visual encoder shared read-only across worker tasks.
pub trait ImageEncoder: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Length of every vector returned by [`ImageEncoder::encode`].
    fn dimension(&self) -> usize;

    /// Run inference on a single decoded image.
    fn encode(&self, image: &DynamicImage) -> Result<Vec<f32>, EncoderError>;
}

impl fmt::Debug for dyn ImageEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEncoder")
            .field("name", &self.name())
            .field("dimension", &self.dimension())
            .finish()
    }
}

/// Mean-centred colour thumbnail used as an embedding.
///
/// Needs no model file. Photos of the same product that differ only in
/// compression, scale or small crops keep a high cosine similarity.
#[derive(Debug, Clone)]
pub struct ThumbnailEncoder {
    size: u32,
}

impl ThumbnailEncoder {
    pub const DEFAULT_SIZE: u32 = 16;

    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }
}

impl Default for ThumbnailEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

impl ImageEncoder for ThumbnailEncoder {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn dimension(&self) -> usize {
        let side = self.size as usize;
        side * side * 3
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<f32>, EncoderError> {
        let thumb = image
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();

        let pixels = self.size as usize * self.size as usize;
        let mut means = [0.0f32; 3];
        for pixel in thumb.pixels() {
            for (channel, mean) in means.iter_mut().enumerate() {
                *mean += pixel[channel] as f32;
            }
        }
        means.iter_mut().for_each(|m| *m /= pixels as f32);

        let mut embedding = Vec::with_capacity(self.dimension());
        for pixel in thumb.pixels() {
            for (channel, mean) in means.iter().enumerate() {
                embedding.push((pixel[channel] as f32 - mean) / 255.0);
            }
        }

        if embedding.len() != self.dimension() {
            return Err(EncoderError::Shape {
                expected: self.dimension(),
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::{EncoderError, ImageEncoder};
    use image::{imageops::FilterType, DynamicImage};
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use std::path::Path;
    use std::sync::Mutex;

    const INPUT_SIZE: u32 = 224;
    const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
    const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

    /// CLIP-style image tower exported to ONNX.
    pub struct OnnxImageEncoder {
        // ort needs `&mut Session` to run; the weights are never touched after load
        session: Mutex<Session>,
        input_name: String,
        output_name: String,
        dimension: usize,
    }

    impl OnnxImageEncoder {
        pub fn load(
            model_path: &Path,
            input_name: &str,
            output_name: &str,
            dimension: usize,
        ) -> Result<Self, EncoderError> {
            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.with_intra_threads(1))
                .and_then(|b| b.commit_from_file(model_path))
                .map_err(|e| {
                    EncoderError::Model(format!(
                        "failed to load {}: {}",
                        model_path.display(),
                        e
                    ))
                })?;

            log::info!(
                "Loaded visual encoder {} ({} -> {}, dim {})",
                model_path.display(),
                input_name,
                output_name,
                dimension
            );

            Ok(Self {
                session: Mutex::new(session),
                input_name: input_name.to_string(),
                output_name: output_name.to_string(),
                dimension,
            })
        }
    }

    impl ImageEncoder for OnnxImageEncoder {
        fn name(&self) -> &str {
            "onnx"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn encode(&self, image: &DynamicImage) -> Result<Vec<f32>, EncoderError> {
            let input = ort::value::Value::from_array(preprocess(image))
                .map_err(|e| EncoderError::Model(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| EncoderError::Model("encoder session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input])
                .map_err(|e| EncoderError::Model(e.to_string()))?;

            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                EncoderError::Model(format!("model has no output named {}", self.output_name))
            })?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::Model(e.to_string()))?;

            if data.len() != self.dimension {
                return Err(EncoderError::Shape {
                    expected: self.dimension,
                    got: data.len(),
                });
            }
            Ok(data.to_vec())
        }
    }

    /// Shortest side to 224, centre crop, CLIP normalisation, NCHW.
    fn preprocess(image: &DynamicImage) -> (Vec<usize>, Vec<f32>) {
        let (w, h) = (image.width().max(1), image.height().max(1));
        let scale = INPUT_SIZE as f32 / w.min(h) as f32;
        let (rw, rh) = (
            ((w as f32 * scale).round() as u32).max(INPUT_SIZE),
            ((h as f32 * scale).round() as u32).max(INPUT_SIZE),
        );
        let resized = image.resize_exact(rw, rh, FilterType::CatmullRom);
        let cropped = resized
            .crop_imm((rw - INPUT_SIZE) / 2, (rh - INPUT_SIZE) / 2, INPUT_SIZE, INPUT_SIZE)
            .to_rgb8();

        let size = INPUT_SIZE as usize;
        let mut data = vec![0.0f32; 3 * size * size];
        for (x, y, pixel) in cropped.enumerate_pixels() {
            let idx = y as usize * size + x as usize;
            for channel in 0..3 {
                let value = pixel[channel] as f32 / 255.0;
                data[channel * size * size + idx] = (value - CLIP_MEAN[channel]) / CLIP_STD[channel];
            }
        }

        (vec![1, 3, size, size], data)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vector::cosine_similarity;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32, flip: bool) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = ((x + y) * 255 / (width + height)) as u8;
            if flip {
                Rgb([255 - v, v, 40])
            } else {
                Rgb([v, 255 - v, 40])
            }
        }))
    }

    #[test]
    fn test_thumbnail_dimension() {
        let encoder = ThumbnailEncoder::new(8);
        let embedding = encoder.encode(&gradient(64, 48, false)).unwrap();
        assert_eq!(embedding.len(), 8 * 8 * 3);
        assert_eq!(encoder.dimension(), embedding.len());
    }

    #[test]
    fn test_rescaled_copy_is_near_identical() {
        let encoder = ThumbnailEncoder::default();
        let original = encoder.encode(&gradient(200, 200, false)).unwrap();
        let smaller = encoder.encode(&gradient(100, 100, false)).unwrap();
        let different = encoder.encode(&gradient(200, 200, true)).unwrap();

        assert!(cosine_similarity(&original, &smaller) > 0.95);
        assert!(cosine_similarity(&original, &different) < 0.5);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_large_thumbnail_dimension_does_not_overflow() {
        assert_eq!(
            ThumbnailEncoder::new(40_000).dimension(),
            40_000usize * 40_000 * 3
        );
    }

    #[test]
    fn test_flat_image_encodes_to_zero_vector() {
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([90, 90, 90])));
        let embedding = ThumbnailEncoder::new(4).encode(&flat).unwrap();
        assert!(embedding.iter().all(|v| v.abs() < 0.01));
    }
}
