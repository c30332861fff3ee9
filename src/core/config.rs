use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Create missing tables before running a pass
    pub migrate: bool,
}

/// Local image cache configuration
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Thumbnail,
    Onnx,
}

/// Largest accepted thumbnail side, in pixels.
pub const MAX_THUMBNAIL_SIZE: u32 = 256;

/// Visual encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub kind: EncoderKind,
    pub thumbnail_size: u32,
    pub model_path: Option<PathBuf>,
    pub input_name: String,
    pub output_name: String,
    pub dimension: usize,
}

/// Phase-2 worker pool and exploratory pass limits
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub workers: usize,
    pub raw_batch_size: usize,
    pub raw_max_items: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive, e.g. `info` or `listing_dedup=debug`
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub images: ImageConfig,
    pub encoder: EncoderConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: PathBuf::from("listing_dedup.db"),
                migrate: false,
            },
            images: ImageConfig {
                root: PathBuf::from("carousell_img"),
            },
            encoder: EncoderConfig {
                kind: EncoderKind::Onnx,
                thumbnail_size: 16,
                model_path: None,
                input_name: "pixel_values".to_string(),
                output_name: "image_embeds".to_string(),
                dimension: 512,
            },
            dispatch: DispatchConfig {
                workers: 10,
                raw_batch_size: 500,
                raw_max_items: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.raw_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl EncoderConfig {
    /// Checked only by the passes that embed photos.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            EncoderKind::Thumbnail => {
                if self.thumbnail_size == 0 || self.thumbnail_size > MAX_THUMBNAIL_SIZE {
                    return Err(ConfigError::Invalid {
                        field: "thumbnail_size",
                        reason: format!("must be between 1 and {}", MAX_THUMBNAIL_SIZE),
                    });
                }
            }
            EncoderKind::Onnx => {
                if self.model_path.is_none() {
                    return Err(ConfigError::Invalid {
                        field: "model",
                        reason: "the onnx encoder needs a model path (--model or DEDUP_MODEL)"
                            .to_string(),
                    });
                }
                if self.dimension == 0 {
                    return Err(ConfigError::Invalid {
                        field: "dimension",
                        reason: "must be at least 1".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
