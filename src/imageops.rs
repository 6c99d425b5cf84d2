//! # Image Operations Provider
//!
//! Named filters (border trimming, sharpening, blurring, despeckling,
//! oil-paint, normalization, grayscale) are capabilities of an external
//! provider, never implemented here. The provider is chosen once per
//! process: either installed explicitly at startup with
//! [`install_provider`], or the [`ToolkitOps`] default backed by the
//! `image` crate on first use.
//!
//! | Operation | `ToolkitOps` |
//! |---|---|
//! | grayscale | `DynamicImage::grayscale` |
//! | gaussian_blur | `DynamicImage::blur` |
//! | gaussian_sharpen | `DynamicImage::unsharpen` |
//! | remove_borders, despeckle, oil_paint, normalize | `Unsupported` |

use crate::error::{OptimizeError, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::OnceLock;
use tracing::debug;

/// Default border-detection fuzz, in absolute intensity units (0-255)
pub const DEFAULT_TRIM_FUZZ: f64 = 10.0;

/// Capabilities of an image-operations provider
pub trait ImageOps: Send + Sync {
    /// Short provider name for diagnostics
    fn name(&self) -> &'static str;

    /// Crop uniform borders. `fuzz` is the color distance (0-255) still
    /// considered background.
    fn remove_borders(&self, img: &DynamicImage, fuzz: f64) -> Result<DynamicImage>;

    fn gaussian_sharpen(&self, img: &DynamicImage, radius: f64, sigma: f64, high_quality: bool) -> Result<DynamicImage>;

    fn gaussian_blur(&self, img: &DynamicImage, radius: f64, sigma: f64) -> Result<DynamicImage>;

    fn despeckle(&self, img: &DynamicImage) -> Result<DynamicImage>;

    fn oil_paint(&self, img: &DynamicImage, radius: f64, high_quality: bool) -> Result<DynamicImage>;

    fn normalize(&self, img: &DynamicImage) -> Result<DynamicImage>;

    fn grayscale(&self, img: &DynamicImage) -> Result<DynamicImage>;
}

/// Provider backed only by the `image` crate
#[derive(Debug, Default)]
pub struct ToolkitOps;

impl ToolkitOps {
    fn unsupported(operation: &'static str) -> OptimizeError {
        OptimizeError::Unsupported {
            operation,
            provider: "toolkit",
        }
    }
}

impl ImageOps for ToolkitOps {
    fn name(&self) -> &'static str {
        "toolkit"
    }

    fn remove_borders(&self, _img: &DynamicImage, _fuzz: f64) -> Result<DynamicImage> {
        Err(Self::unsupported("remove_borders"))
    }

    fn gaussian_sharpen(&self, img: &DynamicImage, _radius: f64, sigma: f64, _high_quality: bool) -> Result<DynamicImage> {
        Ok(img.unsharpen(sigma as f32, 0))
    }

    fn gaussian_blur(&self, img: &DynamicImage, _radius: f64, sigma: f64) -> Result<DynamicImage> {
        Ok(img.blur(sigma as f32))
    }

    fn despeckle(&self, _img: &DynamicImage) -> Result<DynamicImage> {
        Err(Self::unsupported("despeckle"))
    }

    fn oil_paint(&self, _img: &DynamicImage, _radius: f64, _high_quality: bool) -> Result<DynamicImage> {
        Err(Self::unsupported("oil_paint"))
    }

    fn normalize(&self, _img: &DynamicImage) -> Result<DynamicImage> {
        Err(Self::unsupported("normalize"))
    }

    fn grayscale(&self, img: &DynamicImage) -> Result<DynamicImage> {
        Ok(img.grayscale())
    }
}

static PROVIDER: OnceLock<Box<dyn ImageOps>> = OnceLock::new();

/// Install the process-wide provider. Fails if one is already in use.
pub fn install_provider(provider: Box<dyn ImageOps>) -> Result<()> {
    let name = provider.name();
    PROVIDER
        .set(provider)
        .map_err(|_| OptimizeError::Validation("an image operations provider is already installed".to_string()))?;
    debug!("Installed image operations provider: {}", name);
    Ok(())
}

/// The process-wide provider, defaulting to [`ToolkitOps`]
pub fn provider() -> &'static dyn ImageOps {
    PROVIDER.get_or_init(|| Box::new(ToolkitOps)).as_ref()
}

/// Trim borders, returning the input unchanged if nothing was trimmed.
/// `fuzz` defaults to [`DEFAULT_TRIM_FUZZ`] and is clamped at zero.
pub fn remove_borders(img: &DynamicImage, fuzz: Option<f64>) -> Result<DynamicImage> {
    remove_borders_with(provider(), img, fuzz)
}

fn remove_borders_with(ops: &dyn ImageOps, img: &DynamicImage, fuzz: Option<f64>) -> Result<DynamicImage> {
    let fuzz = fuzz.unwrap_or(DEFAULT_TRIM_FUZZ).max(0.0);
    let trimmed = ops.remove_borders(img, fuzz)?;
    if trimmed.width() == img.width() && trimmed.height() == img.height() {
        Ok(img.clone())
    } else {
        Ok(trimmed)
    }
}

pub fn gaussian_sharpen(img: &DynamicImage, radius: f64, sigma: f64, high_quality: bool) -> Result<DynamicImage> {
    provider().gaussian_sharpen(img, radius.max(0.0), sigma, high_quality)
}

pub fn gaussian_blur(img: &DynamicImage, radius: f64, sigma: f64) -> Result<DynamicImage> {
    provider().gaussian_blur(img, radius.max(0.0), sigma)
}

pub fn despeckle(img: &DynamicImage) -> Result<DynamicImage> {
    provider().despeckle(img)
}

pub fn oil_paint(img: &DynamicImage, radius: f64, high_quality: bool) -> Result<DynamicImage> {
    provider().oil_paint(img, radius, high_quality)
}

pub fn normalize(img: &DynamicImage) -> Result<DynamicImage> {
    provider().normalize(img)
}

pub fn grayscale(img: &DynamicImage) -> Result<DynamicImage> {
    provider().grayscale(img)
}

/// Channel order of the toolkit's in-memory RGBA buffers, e.g. `"RGBA"`
pub fn pixel_map() -> &'static str {
    static PIXEL_MAP: OnceLock<String> = OnceLock::new();
    PIXEL_MAP.get_or_init(|| {
        let pixel = RgbaImage::from_pixel(1, 1, Rgba([0, 1, 2, 3]));
        let raw = pixel.as_raw();
        let mut channels: Vec<(usize, char)> = "RGBA"
            .chars()
            .enumerate()
            .map(|(value, name)| (raw.iter().position(|&b| b as usize == value).unwrap_or(value), name))
            .collect();
        channels.sort_unstable();
        channels.into_iter().map(|(_, name)| name).collect()
    })
}
