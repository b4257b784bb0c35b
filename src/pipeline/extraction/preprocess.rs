//! Scan conditioning for the text recognizer.
//!
//! Three fixed stages, each a pure function over the previous plane:
//! 1. Grayscale via ITU-R BT.601 luminance
//! 2. Global histogram equalization over the 256-bucket luma histogram
//! 3. Adaptive mean thresholding, windowed mean in O(1) per pixel via a
//!    summed-area table
//!
//! The output is strictly two-valued per channel and dimension-identical to
//! the input. The input buffer is decoded fresh and never mutated; one
//! pipeline run exclusively owns its working planes.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Side length of the centered window the local mean is taken over.
/// Default for typical scanned-form geometry; clipped at image edges.
pub const THRESHOLD_WINDOW: u32 = 15;

/// Subtracted from the local mean before comparison. Pixels must clear the
/// mean by this margin to stay white.
pub const THRESHOLD_OFFSET: f64 = 10.0;

// ═══════════════════════════════════════════════════════════
// Preprocessor boundary
// ═══════════════════════════════════════════════════════════

/// Conditions raw scan bytes for the recognizer.
///
/// Pure image-to-image transform, no I/O beyond decode/encode. A failure
/// here is fatal to preprocessing only; the orchestrator falls back to the
/// unprocessed image.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedScan, ExtractionError>;
}

/// Result of one conditioning run.
#[derive(Debug)]
pub struct PreparedScan {
    /// Binarized image, lossless PNG encoding.
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Production preprocessor: grayscale → equalize → adaptive binarize.
#[derive(Debug, Clone)]
pub struct ScanBinarizer {
    window: u32,
    offset: f64,
}

impl Default for ScanBinarizer {
    fn default() -> Self {
        Self {
            window: THRESHOLD_WINDOW,
            offset: THRESHOLD_OFFSET,
        }
    }
}

impl ImagePreprocessor for ScanBinarizer {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedScan, ExtractionError> {
        validate_image_bytes(image_bytes)?;

        let decoded = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::Preprocessing(format!("undecodable image: {e}")))?;
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractionError::Preprocessing(
                "zero-dimension image".into(),
            ));
        }

        let gray = grayscale_luma(&decoded.to_rgb8());
        let equalized = equalize_histogram(&gray);
        let binary = binarize_adaptive(&equalized, self.window, self.offset);

        // Replicate the binary plane to all channels for the recognizer.
        let rgb = RgbImage::from_fn(width, height, |x, y| {
            let v = binary.get_pixel(x, y).0[0];
            Rgb([v, v, v])
        });
        let png_bytes = encode_png(&rgb)?;

        debug!(
            dimensions = format!("{width}x{height}"),
            window = self.window,
            png_size = png_bytes.len(),
            "Scan conditioned for recognition"
        );

        Ok(PreparedScan {
            png_bytes,
            width,
            height,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Stage 1: grayscale
// ═══════════════════════════════════════════════════════════

/// ITU-R BT.601 luminance: `0.299 R + 0.587 G + 0.114 B`.
pub fn grayscale_luma(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
                as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

// ═══════════════════════════════════════════════════════════
// Stage 2: histogram equalization
// ═══════════════════════════════════════════════════════════

/// Spread the luma distribution across the full 0–255 range.
///
/// Each value remaps through the cumulative distribution:
/// `round((cdf[v] - cdf_min) / (total - cdf_min) * 255)` where `cdf_min` is
/// the first nonzero cumulative count. A single-valued image maps through
/// unchanged. The mapping is monotone nondecreasing in the input value.
pub fn equalize_histogram(gray: &GrayImage) -> GrayImage {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total = gray.width() as u64 * gray.height() as u64;
    let lut = equalization_lut(&histogram, total);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        out.put_pixel(x, y, Luma([lut[pixel.0[0] as usize]]));
    }
    out
}

/// Build the 256-entry remap table from a luma histogram.
pub fn equalization_lut(histogram: &[u32; 256], total: u64) -> [u8; 256] {
    let mut lut = [0u8; 256];

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (v, &count) in histogram.iter().enumerate() {
        running += count as u64;
        cdf[v] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min);
    if denom == 0 {
        // Single-valued image: identity, nothing to spread.
        for (v, entry) in lut.iter_mut().enumerate() {
            *entry = v as u8;
        }
        return lut;
    }

    for v in 0..256 {
        let spread = cdf[v].saturating_sub(cdf_min) as f64 / denom as f64 * 255.0;
        lut[v] = spread.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// ═══════════════════════════════════════════════════════════
// Stage 3: adaptive binarization
// ═══════════════════════════════════════════════════════════

/// Threshold each pixel against the mean of its centered `window`×`window`
/// neighborhood (clipped at edges) minus `offset`. Above the threshold is
/// 255, otherwise 0.
///
/// The windowed mean comes from a summed-area table, so cost per pixel is
/// constant regardless of window size.
pub fn binarize_adaptive(gray: &GrayImage, window: u32, offset: f64) -> GrayImage {
    let (w, h) = (gray.width(), gray.height());
    let integral = integral_table(gray);
    let half = (window / 2) as i64;

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let x0 = (x as i64 - half).max(0) as u32;
            let y0 = (y as i64 - half).max(0) as u32;
            let x1 = (x as i64 + half).min(w as i64 - 1) as u32;
            let y1 = (y as i64 + half).min(h as i64 - 1) as u32;

            let count = ((x1 - x0 + 1) as u64 * (y1 - y0 + 1) as u64) as f64;
            let sum = window_sum(&integral, w, x0, y0, x1, y1) as f64;
            let threshold = sum / count - offset;

            let v = gray.get_pixel(x, y).0[0];
            let bit = if (v as f64) > threshold { 255 } else { 0 };
            out.put_pixel(x, y, Luma([bit]));
        }
    }
    out
}

/// Summed-area table with a zero border row/column: entry `(x, y)` holds
/// the sum of all pixels strictly above and left of it. Dimensions are
/// `(w + 1) × (h + 1)`, row-major.
fn integral_table(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x as u32, y as u32).0[0] as u64;
            table[(y + 1) * stride + (x + 1)] = table[y * stride + (x + 1)] + row_sum;
        }
    }
    table
}

/// Sum over the inclusive pixel rectangle `(x0, y0)-(x1, y1)`.
fn window_sum(integral: &[u64], width: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
    let stride = width as usize + 1;
    let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
    integral[(y1 + 1) * stride + (x1 + 1)] + integral[y0 * stride + x0]
        - integral[y0 * stride + (x1 + 1)]
        - integral[(y1 + 1) * stride + x0]
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
/// Returns early error for clearly invalid input, saving decode time.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::Preprocessing(
            "image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::Preprocessing(format!(
            "image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Encode an RGB image as PNG bytes. Lossless by construction; the
/// recognizer must see exactly the binarized values.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::Preprocessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Mock preprocessor that fails every call. Exercises the orchestrator's
/// unprocessed-image fallback.
pub struct FailingPreprocessor;

impl ImagePreprocessor for FailingPreprocessor {
    fn preprocess(&self, _image_bytes: &[u8]) -> Result<PreparedScan, ExtractionError> {
        Err(ExtractionError::Preprocessing(
            "mock preprocessing failure".into(),
        ))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_test_png(img: &RgbImage) -> Vec<u8> {
        encode_png(img).unwrap()
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory(bytes).unwrap().to_rgb8()
    }

    /// Mid-gray canvas with a dark rectangle, enough texture for every stage.
    fn scan_like_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (10..30).contains(&x) && (10..20).contains(&y) {
                Rgb([40, 40, 40])
            } else {
                Rgb([170, 175, 180])
            }
        })
    }

    // ── grayscale ──

    #[test]
    fn grayscale_uses_bt601_weights() {
        let img = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));
        let gray = grayscale_luma(&img);
        // 0.299 * 255 = 76.2 → truncated to 76
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
    }

    // ── histogram equalization ──

    #[test]
    fn equalization_lut_is_monotone() {
        let mut histogram = [0u32; 256];
        // Lumpy distribution concentrated in the dark range
        for v in 0..64 {
            histogram[v] = 10;
        }
        histogram[128] = 500;
        histogram[200] = 3;
        let total: u64 = histogram.iter().map(|&c| c as u64).sum();

        let lut = equalization_lut(&histogram, total);
        for v in 1..256 {
            assert!(
                lut[v] >= lut[v - 1],
                "rank reversal at {v}: {} < {}",
                lut[v],
                lut[v - 1]
            );
        }
    }

    #[test]
    fn equalization_spreads_to_full_range() {
        let gray = GrayImage::from_fn(16, 16, |x, _| Luma([100 + (x as u8)]));
        let eq = equalize_histogram(&gray);
        let max = eq.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(max, 255, "brightest value should reach 255");
    }

    #[test]
    fn equalization_single_valued_image_unchanged() {
        let gray = GrayImage::from_pixel(8, 8, Luma([97]));
        let eq = equalize_histogram(&gray);
        assert!(eq.pixels().all(|p| p.0[0] == 97));
    }

    // ── adaptive binarization ──

    #[test]
    fn binarize_uniform_image_is_all_white() {
        // Local mean equals the value everywhere, so v > v - offset holds.
        let gray = GrayImage::from_pixel(20, 20, Luma([128]));
        let binary = binarize_adaptive(&gray, THRESHOLD_WINDOW, THRESHOLD_OFFSET);
        assert!(binary.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn binarize_separates_ink_from_paper() {
        let gray = grayscale_luma(&scan_like_image(50, 40));
        let binary = binarize_adaptive(&gray, THRESHOLD_WINDOW, THRESHOLD_OFFSET);
        // Center of the dark rectangle goes black, far background stays white.
        assert_eq!(binary.get_pixel(20, 15).0[0], 0);
        assert_eq!(binary.get_pixel(45, 35).0[0], 255);
    }

    #[test]
    fn integral_table_window_sums() {
        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x + y * 4) as u8 + 1]));
        let integral = integral_table(&gray);
        // Whole image: 1 + 2 + ... + 12 = 78
        assert_eq!(window_sum(&integral, 4, 0, 0, 3, 2), 78);
        // Single pixel (2, 1) holds 7
        assert_eq!(window_sum(&integral, 4, 2, 1, 2, 1), 7);
        // 2x2 block at (1, 1): 6 + 7 + 10 + 11 = 34
        assert_eq!(window_sum(&integral, 4, 1, 1, 2, 2), 34);
    }

    // ── full pipeline ──

    #[test]
    fn output_is_two_valued_and_dimension_preserving() {
        let bytes = encode_test_png(&scan_like_image(64, 48));
        let prepared = ScanBinarizer::default().preprocess(&bytes).unwrap();

        assert_eq!(prepared.width, 64);
        assert_eq!(prepared.height, 48);

        let out = decode(&prepared.png_bytes);
        assert_eq!(out.dimensions(), (64, 48));
        for p in out.pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255, "channel not binary: {:?}", p);
            assert_eq!(p.0[0], p.0[1]);
            assert_eq!(p.0[1], p.0[2]);
        }
    }

    #[test]
    fn rejects_undecodable_input() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(32);
        let result = ScanBinarizer::default().preprocess(&garbage);
        assert!(matches!(result, Err(ExtractionError::Preprocessing(_))));
    }

    #[test]
    fn rejects_undersized_input() {
        let result = ScanBinarizer::default().preprocess(&[0x89, 0x50, 0x4E]);
        assert!(matches!(result, Err(ExtractionError::Preprocessing(_))));
    }

    #[test]
    fn input_bytes_are_not_mutated() {
        let bytes = encode_test_png(&scan_like_image(32, 32));
        let before = bytes.clone();
        let _ = ScanBinarizer::default().preprocess(&bytes).unwrap();
        assert_eq!(bytes, before);
    }
}
