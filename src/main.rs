use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use listing_dedup::core::config::{Config, EncoderKind};
use listing_dedup::core::encoder::{ImageEncoder, ThumbnailEncoder};
use listing_dedup::core::logging;
use listing_dedup::core::store::ImageStore;
use listing_dedup::database::repositories::ItemRepository;
use listing_dedup::services::classifier::IMAGE_SIM_THRESHOLD;
use listing_dedup::services::{
    EmbeddingCache, ImageFeatureExtractor, ImagePass, ItemPairGrouper, RawSimilarityPass,
};
use listing_dedup::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "listing-dedup",
    version,
    about = "Find duplicate marketplace listings from text and photos"
)]
struct Cli {
    /// SQLite database holding crawled items and candidate pairs
    #[arg(long, global = true, env = "DEDUP_DATABASE", default_value = "listing_dedup.db")]
    database: PathBuf,

    /// Directory with one sub-directory of photos per item number
    #[arg(long, global = true, env = "DEDUP_IMAGE_ROOT", default_value = "carousell_img")]
    image_root: PathBuf,

    /// Log filter, e.g. `info` or `listing_dedup=debug`
    #[arg(long, global = true, env = "DEDUP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Create missing tables before running
    #[arg(long, global = true)]
    migrate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Phase 1: score every item pair on text and store candidates
    Text,

    /// Phase 2: compare photos of stored candidates and classify them
    Images {
        /// Pairs compared at the same time
        #[arg(long, env = "DEDUP_WORKERS", default_value_t = 10)]
        workers: usize,

        #[command(flatten)]
        encoder: EncoderArgs,
    },

    /// Log every photo-vs-photo similarity across the whole image root
    RawImages {
        /// Rows written per transaction
        #[arg(long, default_value_t = 500)]
        batch_size: usize,

        /// Only scan the first N item directories
        #[arg(long, value_name = "N")]
        max_items: Option<usize>,

        #[command(flatten)]
        encoder: EncoderArgs,
    },

    /// List items whose photos have not been downloaded yet
    Pending,
}

#[derive(Args, Debug)]
struct EncoderArgs {
    /// Visual encoder used to embed photos [default: onnx]
    #[arg(long, value_enum)]
    encoder: Option<EncoderChoice>,

    /// Pretrained CLIP-style visual encoder exported to ONNX
    #[arg(long, value_name = "FILE", env = "DEDUP_MODEL")]
    model: Option<PathBuf>,

    /// Model input tensor name (onnx only)
    #[arg(long, default_value = "pixel_values")]
    input_name: String,

    /// Model output tensor name (onnx only)
    #[arg(long, default_value = "image_embeds")]
    output_name: String,

    /// Embedding length produced by the model (onnx only)
    #[arg(long, default_value_t = 512)]
    dimension: usize,

    /// Thumbnail side length in pixels (thumbnail only, at most 256)
    #[arg(long, default_value_t = 16)]
    thumbnail_size: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EncoderChoice {
    /// Pixel thumbnail; not calibrated for the image threshold
    Thumbnail,
    Onnx,
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::default();
    config.database.path = cli.database.clone();
    config.database.migrate = cli.migrate;
    config.images.root = cli.image_root.clone();
    config.logging.level = cli.log_level.clone();

    let encoder_args = match &cli.command {
        Commands::Images { workers, encoder } => {
            config.dispatch.workers = *workers;
            Some(encoder)
        }
        Commands::RawImages {
            batch_size,
            max_items,
            encoder,
        } => {
            config.dispatch.raw_batch_size = *batch_size;
            config.dispatch.raw_max_items = *max_items;
            Some(encoder)
        }
        Commands::Text | Commands::Pending => None,
    };

    if let Some(args) = encoder_args {
        config.encoder.kind = match args.encoder {
            Some(EncoderChoice::Thumbnail) => EncoderKind::Thumbnail,
            Some(EncoderChoice::Onnx) | None => EncoderKind::Onnx,
        };
        config.encoder.model_path = args.model.clone();
        config.encoder.input_name = args.input_name.clone();
        config.encoder.output_name = args.output_name.clone();
        config.encoder.dimension = args.dimension;
        config.encoder.thumbnail_size = args.thumbnail_size;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.validate()?;
    logging::init(&config.logging)?;

    let database = Database::new(&config.database.path);
    if config.database.migrate {
        database
            .migrate()
            .with_context(|| format!("Failed to migrate {}", config.database.path.display()))?;
    }

    match cli.command {
        Commands::Text => {
            let grouper = ItemPairGrouper::new();
            let db = database.clone();
            let report = benchmark("text pass", || {
                tokio::task::spawn_blocking(move || grouper.run(&db))
            })
            .await??;
            println!(
                "▶ {} items ({} invalid rows skipped), {} pairs compared, {} candidates stored",
                report.items, report.skipped_rows, report.pairs_compared, report.pairs_emitted
            );
        }

        Commands::Images { .. } => {
            let extractor = build_extractor(&config)?;
            let progress = ProgressBar::new(0);
            progress.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{bar:40}] {pos}/{len} pairs {msg}",
            )?);
            progress.enable_steady_tick(Duration::from_millis(100));

            let pass = ImagePass::new(database, Arc::new(EmbeddingCache::new(extractor)))
                .with_workers(config.dispatch.workers)
                .with_progress(progress.clone());
            let started = Instant::now();
            let report = pass.run().await?;
            progress.finish_with_message("done");
            log::info!("Image pass took {:.2?}", started.elapsed());

            println!(
                "▶ {} pairs: {} classified, {} identified, {} skipped, {} failed",
                report.dispatched,
                report.classified,
                report.identified,
                report.skipped,
                report.failures.len()
            );
            for failure in &report.failures {
                println!("   ✗ pair {} {}: {}", failure.pair_id, failure.key, failure.error);
            }
        }

        Commands::RawImages { .. } => {
            let extractor = build_extractor(&config)?;
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            spinner.set_message("Comparing every photo pair…");
            spinner.enable_steady_tick(Duration::from_millis(100));

            let batch_size = config.dispatch.raw_batch_size;
            let max_items = config.dispatch.raw_max_items;
            let report = tokio::task::spawn_blocking(move || {
                RawSimilarityPass::new(&extractor, &database)
                    .with_batch_size(batch_size)
                    .with_max_items(max_items)
                    .run()
            })
            .await??;
            spinner.finish_with_message("Raw pass complete");

            println!(
                "▶ {} items ({} with images), {} item pairs, {} rows written",
                report.items, report.items_with_images, report.item_pairs, report.rows_written
            );
        }

        Commands::Pending => {
            let conn = database.session()?;
            let pending = ItemRepository::new(&conn).find_pending_download()?;
            for item in &pending.items {
                println!("{}", serde_json::to_string(item)?);
            }
            log::info!(
                "{} items pending download, {} invalid rows skipped",
                pending.items.len(),
                pending.skipped
            );
        }
    }

    Ok(())
}

fn build_extractor(config: &Config) -> Result<ImageFeatureExtractor> {
    config.encoder.validate()?;
    let encoder = build_encoder(config)?;
    log::info!(
        "Using {} encoder ({} dims) over {}",
        encoder.name(),
        encoder.dimension(),
        config.images.root.display()
    );
    Ok(ImageFeatureExtractor::new(
        encoder,
        ImageStore::new(&config.images.root),
    ))
}

fn build_encoder(config: &Config) -> Result<Arc<dyn ImageEncoder>> {
    match config.encoder.kind {
        EncoderKind::Thumbnail => {
            log::warn!(
                "Thumbnail encoder scores are not CLIP-calibrated; the image threshold of {} may misclassify pairs",
                IMAGE_SIM_THRESHOLD
            );
            Ok(Arc::new(ThumbnailEncoder::new(
                config.encoder.thumbnail_size,
            )))
        }
        EncoderKind::Onnx => load_onnx(config),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(config: &Config) -> Result<Arc<dyn ImageEncoder>> {
    use listing_dedup::core::encoder::OnnxImageEncoder;

    let Some(model) = config.encoder.model_path.as_deref() else {
        bail!("--model is required for the onnx encoder");
    };
    let encoder = OnnxImageEncoder::load(
        model,
        &config.encoder.input_name,
        &config.encoder.output_name,
        config.encoder.dimension,
    )?;
    Ok(Arc::new(encoder))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_config: &Config) -> Result<Arc<dyn ImageEncoder>> {
    bail!("this build has no onnx support; rebuild with `--features onnx`")
}

async fn benchmark<T, F: std::future::Future<Output = T>>(
    label: &str,
    f: impl FnOnce() -> F,
) -> T {
    let start = Instant::now();
    let result = f().await;
    log::info!("{} took {:.2?}", label, start.elapsed());
    result
}
