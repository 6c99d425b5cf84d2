//! # img-tools - Main Entry Point
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (sottocomando, path, opzioni globali)
//! 2. Configura il logging (INFO o DEBUG, oppure `RUST_LOG`)
//! 3. Carica la configurazione da file e applica gli override da CLI
//! 4. Esegue il sottocomando: profilo su più file, self-test o report dei tool
//!
//! ## Esempio di utilizzo:
//! ```bash
//! img-tools jpeg photos/ --workers 8
//! img-tools encode cover.png --quality 85 --json
//! img-tools self-test --jpeg kindle.jpg --png lt.png
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use img_tools::file_manager::FileManager;
use img_tools::json_output::JsonMessage;
use img_tools::progress::ProgressManager;
use img_tools::self_test::{self, SelfTestSamples};
use img_tools::{BatchRunner, Config, Optimizer, Profile, Reporter};

#[derive(Parser)]
#[command(name = "img-tools")]
#[command(about = "Optimize images in place with jpegtran, optipng and cjpeg")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: <config_dir>/img-tools/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing bundled optimizer executables
    #[arg(long, global = true)]
    tools_dir: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print one JSON object per event instead of a progress bar
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Losslessly optimize JPEG files with jpegtran
    Jpeg { paths: Vec<PathBuf> },
    /// Losslessly optimize PNG files with optipng
    Png { paths: Vec<PathBuf> },
    /// Re-encode images as JPEG with cjpeg
    Encode {
        paths: Vec<PathBuf>,
        /// JPEG quality, clamped to 0-100
        #[arg(short, long, allow_negative_numbers = true)]
        quality: Option<i32>,
    },
    /// Pick the lossless optimizer from each file's extension
    Optimize { paths: Vec<PathBuf> },
    /// Run every profile on sample images and check for residue
    SelfTest {
        #[arg(long)]
        jpeg: Option<PathBuf>,
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Show where each optimizer was found
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = load_config(&args).await?;
    let optimizer = Arc::new(Optimizer::new(config));

    let result = match args.command {
        Command::Jpeg { paths } => run_batch(&optimizer, Profile::Jpeg, &paths).await,
        Command::Png { paths } => run_batch(&optimizer, Profile::Png, &paths).await,
        Command::Encode { paths, quality } => {
            let quality = quality.unwrap_or_else(|| i32::from(optimizer.config().default_quality));
            run_batch(&optimizer, Profile::Encode { quality }, &paths).await
        }
        Command::Optimize { paths } => run_batch(&optimizer, Profile::Auto, &paths).await,
        Command::SelfTest { jpeg, png } => self_test::run(&optimizer, &SelfTestSamples { jpeg, png }).await,
        Command::Tools => {
            print!("{}", optimizer.resolver().get_tools_report());
            Ok(())
        }
    };

    if let Err(ref e) = result {
        if optimizer.config().json_output {
            JsonMessage::error(format!("{:#}", e)).emit();
        }
    }
    result
}

async fn load_config(args: &Args) -> Result<Config> {
    let path = args.config.clone().or_else(Config::default_path);
    let mut config = match path {
        Some(ref path) => Config::from_file(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ref tools_dir) = args.tools_dir {
        config.tools_dir = Some(tools_dir.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.json_output |= args.json;

    config.validate()?;
    debug!("Effective config: {:?}", config);
    Ok(config)
}

async fn run_batch(optimizer: &Arc<Optimizer>, profile: Profile, paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Err(anyhow::anyhow!("No input files given"));
    }
    let accept: fn(&Path) -> bool = match profile {
        Profile::Jpeg => FileManager::is_jpeg,
        Profile::Png => FileManager::is_png,
        Profile::Encode { .. } | Profile::Auto => FileManager::is_supported_image,
    };
    let files = FileManager::expand_paths(paths, accept);
    info!("Found {} files for {}", files.len(), profile.name());

    let config = optimizer.config();
    let reporter = if config.json_output {
        Reporter::Json
    } else {
        Reporter::Progress(ProgressManager::new(files.len() as u64))
    };

    let summary = BatchRunner::new(config.workers, reporter)
        .run_profile(Arc::clone(optimizer), profile, files)
        .await;

    if summary.stats.all_replaced() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} files were not optimized",
            summary.stats.files_processed - summary.stats.files_replaced,
            summary.stats.files_processed
        ))
    }
}
