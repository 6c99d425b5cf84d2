//! # Optimizer Profiles
//!
//! Fixed command lines for the bundled optimizers:
//!
//! | Profile | Tool | Mode |
//! |---|---|---|
//! | `optimize_jpeg` | `jpegtran -copy none -optimize -progressive -maxmemory 100M -outfile <out> <in>` | in-place |
//! | `optimize_png` | `optipng -fix -clobber -strip all -o7 -out <out> <in>` | in-place |
//! | `encode_jpeg` | `cjpeg -optimize -progressive -maxmemory 100M -quality <q>` | filter, PPM on stdin |
//!
//! Memory cap and PNG level come from [`Config`]; the defaults reproduce the
//! table above.

use super::command::CommandTemplate;
use super::protocol::{run_optimizer, Mode, Outcome};
use super::pump::InputSource;
use crate::config::Config;
use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use crate::imaging;
use crate::tool_resolver::ToolPathResolver;
use std::path::Path;
use tracing::{debug, info};

pub const JPEGTRAN: &str = "jpegtran";
pub const OPTIPNG: &str = "optipng";
pub const CJPEG: &str = "cjpeg";

/// Clamp a requested JPEG quality into the encoder's 0-100 range
pub fn clamp_quality(quality: i32) -> u8 {
    quality.clamp(0, 100) as u8
}

/// Runs the named profiles with tools located by a [`ToolPathResolver`]
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: Config,
    resolver: ToolPathResolver,
}

impl Optimizer {
    pub fn new(config: Config) -> Self {
        let resolver = ToolPathResolver::new(config.tools_dir.clone());
        Self { config, resolver }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &ToolPathResolver {
        &self.resolver
    }

    pub fn jpegtran_command(&self) -> CommandTemplate {
        CommandTemplate::new(self.resolver.resolve(JPEGTRAN))
            .args(["-copy", "none", "-optimize", "-progressive", "-maxmemory"])
            .arg(&self.config.jpeg_max_memory)
            .arg("-outfile")
            .output()
            .input()
    }

    pub fn optipng_command(&self) -> CommandTemplate {
        CommandTemplate::new(self.resolver.resolve(OPTIPNG))
            .args(["-fix", "-clobber", "-strip", "all"])
            .arg(format!("-o{}", self.config.png_level))
            .arg("-out")
            .output()
            .input()
    }

    pub fn cjpeg_command(&self, quality: u8) -> CommandTemplate {
        CommandTemplate::new(self.resolver.resolve(CJPEG))
            .args(["-optimize", "-progressive", "-maxmemory"])
            .arg(&self.config.jpeg_max_memory)
            .arg("-quality")
            .arg(quality.to_string())
    }

    /// Losslessly optimize a JPEG in place
    pub async fn optimize_jpeg(&self, path: &Path) -> Result<Outcome> {
        debug!("Optimizing JPEG: {}", path.display());
        run_optimizer(path, &self.jpegtran_command(), Mode::InPlace, self.config.pump_timeout()).await
    }

    /// Losslessly optimize a PNG in place
    pub async fn optimize_png(&self, path: &Path) -> Result<Outcome> {
        debug!("Optimizing PNG: {}", path.display());
        run_optimizer(path, &self.optipng_command(), Mode::InPlace, self.config.pump_timeout()).await
    }

    /// Re-encode any decodable image as a JPEG of the given quality.
    ///
    /// The file keeps its name; only its content becomes JPEG. An image the
    /// toolkit cannot decode is rejected before the encoder is launched.
    pub async fn encode_jpeg(&self, path: &Path, quality: i32) -> Result<Outcome> {
        let quality = clamp_quality(quality);
        let owned = path.to_path_buf();
        let ppm = tokio::task::spawn_blocking(move || {
            let img = imaging::load_image(&owned)?;
            imaging::export_ppm(&img)
        })
        .await
        .map_err(|e| OptimizeError::Validation(format!("Decoder task failed: {}", e)))??;

        info!("Encoding {} at quality {}", path.display(), quality);
        run_optimizer(
            path,
            &self.cjpeg_command(quality),
            Mode::Filter(InputSource::from(ppm)),
            self.config.pump_timeout(),
        )
        .await
    }

    /// Pick the lossless profile from the file extension
    pub async fn optimize(&self, path: &Path) -> Result<Outcome> {
        if FileManager::is_jpeg(path) {
            self.optimize_jpeg(path).await
        } else if FileManager::is_png(path) {
            self.optimize_png(path).await
        } else {
            Err(OptimizeError::Validation(format!(
                "No optimizer for {} (expected .jpg, .jpeg or .png)",
                path.display()
            )))
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
