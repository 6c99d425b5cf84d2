//! # Imaging Module
//!
//! Thin wrappers over the `image` crate for the operations the optimizer
//! profiles and callers need around an optimization run: decode, encode,
//! scale, composite, and the cover normalization helper.
//!
//! ## Operazioni:
//! - `image_from_data()` / `image_and_format_from_data()`: decode da bytes
//! - `image_to_data()`: encode JPEG/PNG/altri (trasparenza fusa su bianco per JPEG)
//! - `scale_image()` / `resize_to_fit()` / `fit_image()`: ridimensionamento
//! - `add_borders()` / `overlay()` / `blend_on_canvas()` / `Canvas`: composizione
//! - `save_cover_data_to()`: ricodifica solo quando serve davvero
//!
//! No pixel algorithm lives here: every transform is a single toolkit call.

use crate::error::{OptimizeError, Result};
use crate::imageops;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::pnm::{PnmSubtype, SampleEncoding};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, ImageOutputFormat, Rgb, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Default background for blending away transparency
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Largest cover produced by [`save_cover_data_to`] unless overridden
pub const MAXIMUM_COVER_SIZE: (u32, u32) = (1650, 2200);

/// Decode image bytes, guessing the format from the content
pub fn image_from_data(data: &[u8]) -> Result<DynamicImage> {
    image_and_format_from_data(data).map(|(img, _)| img)
}

/// Decode image bytes and report the detected container format
pub fn image_and_format_from_data(data: &[u8]) -> Result<(DynamicImage, ImageFormat)> {
    let reader = image::io::Reader::new(Cursor::new(data)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| OptimizeError::Validation("Not a valid image".to_string()))?;
    let img = reader.decode()?;
    Ok((img, format))
}

/// Load an image from disk, mapping any failure to [`OptimizeError::InvalidImage`]
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let data = std::fs::read(path).map_err(|e| {
        debug!("Cannot read {}: {}", path.display(), e);
        OptimizeError::InvalidImage(path.to_path_buf())
    })?;
    image_from_data(&data).map_err(|e| {
        debug!("Cannot decode {}: {}", path.display(), e);
        OptimizeError::InvalidImage(path.to_path_buf())
    })
}

/// Parse a `#rrggbb` color
pub fn parse_color(color: &str) -> Result<Rgb<u8>> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    let invalid = || OptimizeError::Validation(format!("Invalid color: {}", color));
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Map a format name or file extension to a toolkit format (`jpg` and `jpeg` are the same)
pub fn format_from_name(name: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(normalize_format_name(name))
}

pub fn normalize_format_name(fmt: &str) -> String {
    let fmt = fmt.to_lowercase();
    if fmt == "jpg" {
        "jpeg".to_string()
    } else {
        fmt
    }
}

fn export_error(format: ImageFormat, e: impl std::fmt::Display) -> OptimizeError {
    OptimizeError::Export {
        format: format!("{:?}", format),
        reason: e.to_string(),
    }
}

/// Serialize an image.
///
/// `compression_quality` (0-100) drives JPEG and the generic encoders;
/// `png_compression_level` (0-9, higher is smaller) drives PNG. JPEG output
/// has any transparency blended onto white first.
pub fn image_to_data(
    img: &DynamicImage,
    format: ImageFormat,
    compression_quality: u8,
    png_compression_level: u8,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let (width, height) = (img.width(), img.height());

    match format {
        ImageFormat::Jpeg => {
            let opaque = if img.color().has_alpha() {
                blend_image(img, WHITE)
            } else {
                img.clone()
            };
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, compression_quality.clamp(1, 100));
            let result = match opaque {
                DynamicImage::ImageLuma8(gray) => encoder.encode(gray.as_raw(), width, height, ColorType::L8),
                other => encoder.encode(other.to_rgb8().as_raw(), width, height, ColorType::Rgb8),
            };
            result.map_err(|e| export_error(format, e))?;
        }
        ImageFormat::Png => {
            let compression = match png_compression_level.min(9) {
                0..=3 => CompressionType::Fast,
                4..=6 => CompressionType::Default,
                _ => CompressionType::Best,
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilter::Adaptive);
            let result = match img.color() {
                ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {
                    encoder.write_image(img.as_bytes(), width, height, img.color())
                }
                _ => encoder.write_image(img.to_rgba8().as_raw(), width, height, ColorType::Rgba8),
            };
            result.map_err(|e| export_error(format, e))?;
        }
        ImageFormat::Pnm => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let pixmap = ImageOutputFormat::Pnm(PnmSubtype::Pixmap(SampleEncoding::Binary));
            rgb.write_to(&mut Cursor::new(&mut buf), pixmap)
                .map_err(|e| export_error(format, e))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::from(other))
                .map_err(|e| export_error(other, e))?;
        }
    }

    Ok(buf)
}

/// Binary PPM, the uncompressed container fed to streaming encoders
pub fn export_ppm(img: &DynamicImage) -> Result<Vec<u8>> {
    image_to_data(img, ImageFormat::Pnm, 100, 0)
}

/// Fit `(width, height)` inside `(pwidth, pheight)` keeping the aspect ratio.
///
/// Returns whether scaling is needed and the new size.
pub fn fit_image(width: u32, height: u32, pwidth: u32, pheight: u32) -> (bool, u32, u32) {
    let scaled = height > pheight || width > pwidth;
    let (mut w, mut h) = (width as f64, height as f64);
    let (pw, ph) = (pwidth as f64, pheight as f64);

    if h > ph {
        w = (w * ph / h).floor();
        h = ph;
    }
    if w > pw {
        h = (h * pw / w).floor();
        w = pw;
    }
    if h > ph {
        w = (w * ph / h).floor();
        h = ph;
    }
    (scaled, w as u32, h as u32)
}

/// Resize to exactly `width` x `height`
pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Shrink to fit inside `width` x `height`, if needed
pub fn resize_to_fit(img: DynamicImage, width: u32, height: u32) -> (bool, DynamicImage) {
    let (needed, nw, nh) = fit_image(img.width(), img.height(), width, height);
    if needed {
        (true, resize_image(&img, nw, nh))
    } else {
        (false, img)
    }
}

/// Scale encoded image bytes, returning the final size and JPEG or PNG data.
///
/// With `preserve_aspect_ratio` the image only shrinks to fit; otherwise it
/// is stretched to exactly `width` x `height`.
pub fn scale_image(
    data: &[u8],
    width: u32,
    height: u32,
    compression_quality: u8,
    as_png: bool,
    preserve_aspect_ratio: bool,
) -> Result<(u32, u32, Vec<u8>)> {
    let mut img = image_from_data(data)?;
    if preserve_aspect_ratio {
        img = resize_to_fit(img, width, height).1;
    } else if img.width() != width || img.height() != height {
        img = resize_image(&img, width, height);
    }

    let format = if as_png { ImageFormat::Png } else { ImageFormat::Jpeg };
    let encoded = image_to_data(&img, format, compression_quality, 9)?;
    Ok((img.width(), img.height(), encoded))
}

fn opaque_canvas(width: u32, height: u32, color: Rgb<u8>) -> RgbaImage {
    let Rgb([r, g, b]) = color;
    RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]))
}

/// Draw `img` onto `canvas` at (`left`, `top`), alpha-compositing
pub fn overlay(img: &DynamicImage, canvas: &mut DynamicImage, left: i64, top: i64) {
    let mut base = canvas.to_rgba8();
    image::imageops::overlay(&mut base, &img.to_rgba8(), left, top);
    *canvas = DynamicImage::ImageRgba8(base);
}

/// Flatten transparency onto a solid background
pub fn blend_image(img: &DynamicImage, bgcolor: Rgb<u8>) -> DynamicImage {
    let mut canvas = DynamicImage::ImageRgba8(opaque_canvas(img.width(), img.height(), bgcolor));
    overlay(img, &mut canvas, 0, 0);
    DynamicImage::ImageRgb8(canvas.to_rgb8())
}

/// Surround the image with solid borders; a no-op when every border is zero
pub fn add_borders(
    img: DynamicImage,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    border_color: Rgb<u8>,
) -> DynamicImage {
    if left == 0 && top == 0 && right == 0 && bottom == 0 {
        return img;
    }
    let mut canvas = DynamicImage::ImageRgba8(opaque_canvas(
        img.width() + left + right,
        img.height() + top + bottom,
        border_color,
    ));
    overlay(&img, &mut canvas, left as i64, top as i64);
    DynamicImage::ImageRgb8(canvas.to_rgb8())
}

/// [`add_borders`] on encoded bytes
pub fn add_borders_to_image(
    data: &[u8],
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    border_color: Rgb<u8>,
    format: ImageFormat,
) -> Result<Vec<u8>> {
    let img = add_borders(image_from_data(data)?, left, top, right, bottom, border_color);
    image_to_data(&img, format, 95, 9)
}

/// Center the image, shrunk to fit if needed, on a `width` x `height` canvas
pub fn blend_on_canvas(img: &DynamicImage, width: u32, height: u32, bgcolor: Rgb<u8>) -> DynamicImage {
    let (scaled, nw, nh) = fit_image(img.width(), img.height(), width, height);
    let fitted = if scaled { resize_image(img, nw, nh) } else { img.clone() };

    let mut canvas = DynamicImage::ImageRgba8(opaque_canvas(width, height, bgcolor));
    let x = (width - fitted.width()) / 2;
    let y = (height - fitted.height()) / 2;
    overlay(&fitted, &mut canvas, x as i64, y as i64);
    DynamicImage::ImageRgb8(canvas.to_rgb8())
}

pub fn flip_image(img: &DynamicImage, horizontal: bool, vertical: bool) -> DynamicImage {
    let mut out = img.clone();
    if horizontal {
        out = out.fliph();
    }
    if vertical {
        out = out.flipv();
    }
    out
}

fn is_all_gray(img: &DynamicImage) -> bool {
    match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => true,
        _ => img.to_rgb8().pixels().all(|&Rgb([r, g, b])| r == g && g == b),
    }
}

/// A solid canvas other images are composed onto
pub struct Canvas {
    img: DynamicImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, bgcolor: Rgb<u8>) -> Self {
        Self {
            img: DynamicImage::ImageRgba8(opaque_canvas(width, height, bgcolor)),
        }
    }

    /// Decode `data` and draw it at (`x`, `y`)
    pub fn compose(&mut self, data: &[u8], x: i64, y: i64) -> Result<()> {
        let img = image_from_data(data)?;
        self.compose_image(&img, x, y);
        Ok(())
    }

    pub fn compose_image(&mut self, img: &DynamicImage, x: i64, y: i64) {
        overlay(img, &mut self.img, x, y);
    }

    pub fn export(&self, format: ImageFormat, compression_quality: u8) -> Result<Vec<u8>> {
        image_to_data(&DynamicImage::ImageRgb8(self.img.to_rgb8()), format, compression_quality, 9)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.img
    }
}

/// Options for [`save_cover_data_to`]
#[derive(Debug, Clone)]
pub struct CoverOptions {
    pub bgcolor: Rgb<u8>,
    /// Exact size to stretch to before any minification
    pub resize_to: Option<(u32, u32)>,
    pub compression_quality: u8,
    /// Maximum size; defaults to [`MAXIMUM_COVER_SIZE`]
    pub minify_to: Option<(u32, u32)>,
    pub grayscale: bool,
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self {
            bgcolor: WHITE,
            resize_to: None,
            compression_quality: 90,
            minify_to: None,
            grayscale: false,
        }
    }
}

/// Normalize cover image bytes and write them to `path`, in the format
/// named by its extension, or return them as JPEG when `path` is `None`.
///
/// The input bytes are kept as-is unless the format changes, a resize or
/// minification happens, transparency has to be removed, or grayscale is
/// requested for an image that has color.
pub fn save_cover_data_to(data: &[u8], path: Option<&Path>, opts: &CoverOptions) -> Result<Option<Vec<u8>>> {
    let (mut img, orig_format) = image_and_format_from_data(data)?;

    let format = match path {
        None => ImageFormat::Jpeg,
        Some(path) => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(format_from_name)
            .ok_or_else(|| OptimizeError::Validation(format!("Unknown image format for {}", path.display())))?,
    };
    let mut changed = format != orig_format;

    if let Some((width, height)) = opts.resize_to {
        changed = true;
        img = resize_image(&img, width, height);
    }

    let (max_width, max_height) = opts.minify_to.unwrap_or(MAXIMUM_COVER_SIZE);
    let (scaled, nw, nh) = fit_image(img.width(), img.height(), max_width, max_height);
    if scaled {
        changed = true;
        img = resize_image(&img, nw, nh);
    }

    if img.color().has_alpha() {
        changed = true;
        img = blend_image(&img, opts.bgcolor);
    }

    if opts.grayscale && !is_all_gray(&img) {
        changed = true;
        img = imageops::grayscale(&img)?;
    }

    let output = if changed {
        image_to_data(&img, format, opts.compression_quality, 9)?
    } else {
        data.to_vec()
    };

    match path {
        None => Ok(Some(output)),
        Some(path) => {
            std::fs::write(path, output)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;

    pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 128]));
        image_to_data(&DynamicImage::ImageRgb8(img), ImageFormat::Jpeg, 90, 9).unwrap()
    }

    pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 200, 128]));
        image_to_data(&DynamicImage::ImageRgba8(img), ImageFormat::Png, 95, 9).unwrap()
    }

    #[test]
    fn test_fit_image() {
        assert_eq!(fit_image(100, 50, 200, 200), (false, 100, 50));
        assert_eq!(fit_image(400, 200, 200, 200), (true, 200, 100));
        assert_eq!(fit_image(200, 400, 200, 200), (true, 100, 200));
        assert_eq!(fit_image(300, 300, 100, 50), (true, 50, 50));
    }

    #[test]
    fn test_decode_reports_format() {
        let (img, format) = image_and_format_from_data(&sample_jpeg(10, 10)).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!((img.width(), img.height()), (10, 10));

        let (_, format) = image_and_format_from_data(&sample_png(4, 4)).unwrap();
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn test_garbage_is_not_an_image() {
        assert!(image_from_data(b"definitely not an image").is_err());
        assert!(image_from_data(b"").is_err());
    }

    #[test]
    fn test_load_image_maps_to_invalid_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(err.to_string().contains("is not a valid image file"));
    }

    #[test]
    fn test_jpeg_export_blends_alpha() {
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 0])));
        let data = image_to_data(&transparent, ImageFormat::Jpeg, 95, 9).unwrap();
        let decoded = image_from_data(&data).unwrap().to_rgb8();
        let Rgb([r, g, b]) = *decoded.get_pixel(1, 1);
        assert!(r > 240 && g > 240 && b > 240);
    }

    #[test]
    fn test_ppm_export_header() {
        let img = image_from_data(&sample_jpeg(10, 10)).unwrap();
        let ppm = export_ppm(&img).unwrap();
        assert!(ppm.starts_with(b"P6"));
    }

    #[test]
    fn test_scale_image_preserves_aspect_ratio() {
        let (w, h, data) = scale_image(&sample_jpeg(120, 60), 60, 80, 70, false, true).unwrap();
        assert_eq!((w, h), (60, 30));
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Jpeg);

        let (w, h, data) = scale_image(&sample_jpeg(120, 60), 60, 80, 70, true, false).unwrap();
        assert_eq!((w, h), (60, 80));
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_add_borders() {
        let img = image_from_data(&sample_jpeg(10, 10)).unwrap();
        let bordered = add_borders(img.clone(), 1, 2, 3, 4, WHITE);
        assert_eq!((bordered.width(), bordered.height()), (14, 16));

        let untouched = add_borders(img, 0, 0, 0, 0, WHITE);
        assert_eq!((untouched.width(), untouched.height()), (10, 10));
    }

    #[test]
    fn test_blend_on_canvas_centers() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let canvas = blend_on_canvas(&img, 30, 10, WHITE).to_rgb8();
        assert_eq!(*canvas.get_pixel(0, 5), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(15, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_canvas_compose_and_export() {
        let mut canvas = Canvas::new(20, 20, parse_color("#ff0000").unwrap());
        canvas.compose(&sample_jpeg(5, 5), 0, 0).unwrap();
        let data = canvas.export(ImageFormat::Png, 95).unwrap();
        let img = image_from_data(&data).unwrap();
        assert_eq!((img.width(), img.height()), (20, 20));
        assert_eq!(*img.to_rgb8().get_pixel(19, 19), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ffffff").unwrap(), WHITE);
        assert_eq!(parse_color("102030").unwrap(), Rgb([0x10, 0x20, 0x30]));
        assert!(parse_color("#fff").is_err());
        assert!(parse_color("#gggggg").is_err());
    }

    #[test]
    fn test_normalize_format_name() {
        assert_eq!(normalize_format_name("JPG"), "jpeg");
        assert_eq!(normalize_format_name("Png"), "png");
        assert_eq!(format_from_name("jpg"), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_save_cover_keeps_unchanged_data() {
        let jpeg = sample_jpeg(10, 10);
        let out = save_cover_data_to(&jpeg, None, &CoverOptions::default()).unwrap().unwrap();
        assert_eq!(out, jpeg);
    }

    #[test]
    fn test_save_cover_converts_and_minifies() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cover.jpg");
        let opts = CoverOptions {
            minify_to: Some((4, 4)),
            ..Default::default()
        };

        let returned = save_cover_data_to(&sample_png(8, 8), Some(&path), &opts).unwrap();
        assert!(returned.is_none());

        let (img, format) = image_and_format_from_data(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn test_save_cover_grayscale_uses_provider() {
        let opts = CoverOptions {
            grayscale: true,
            ..Default::default()
        };
        let out = save_cover_data_to(&sample_jpeg(10, 10), None, &opts).unwrap().unwrap();
        assert!(matches!(image_from_data(&out).unwrap(), DynamicImage::ImageLuma8(_)));
    }
}
