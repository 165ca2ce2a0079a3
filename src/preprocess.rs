//! Image preprocessing ahead of OCR.
//!
//! Grayscale -> auto-contrast (2% tail cutoff) -> conditional x2 upscale ->
//! sharpen -> binarize at 140. The returned scale factors map processed
//! pixel coordinates back into the original image's pixel space, which is
//! the space all stored word geometry lives in.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

/// Images whose shorter side is below this are upscaled x2 before OCR.
const UPSCALE_MIN_SIDE: u32 = 1500;
/// Binarization threshold on the 0-255 gray scale.
const BINARIZE_THRESHOLD: u8 = 140;
/// Histogram share clipped at each tail during auto-contrast.
const CONTRAST_CUTOFF: f64 = 0.02;

pub struct Preprocessed {
    pub image: GrayImage,
    /// original_width / processed_width
    pub sx: f64,
    /// original_height / processed_height
    pub sy: f64,
}

/// Run the full preprocessing chain. Pure — the input is not mutated.
pub fn preprocess(input: &DynamicImage) -> Preprocessed {
    let (orig_w, orig_h) = (input.width(), input.height());

    let mut gray = input.to_luma8();
    auto_contrast(&mut gray, CONTRAST_CUTOFF);

    if gray.width().min(gray.height()) < UPSCALE_MIN_SIDE {
        gray = imageops::resize(&gray, gray.width() * 2, gray.height() * 2, FilterType::Lanczos3);
    }

    let sharpened = imageops::filter3x3(&gray, &[0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0]);

    let binarized = binarize(&sharpened, BINARIZE_THRESHOLD);

    let sx = orig_w as f64 / binarized.width() as f64;
    let sy = orig_h as f64 / binarized.height() as f64;
    Preprocessed { image: binarized, sx, sy }
}

/// Stretch the histogram so that `cutoff` of the pixels at each tail clip
/// to pure black/white.
fn auto_contrast(img: &mut GrayImage, cutoff: f64) {
    let mut histogram = [0u64; 256];
    for Luma([v]) in img.pixels() {
        histogram[*v as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return;
    }
    let clip = (total as f64 * cutoff) as u64;

    let mut lo = 0usize;
    let mut acc = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        acc += count;
        if acc > clip {
            lo = i;
            break;
        }
    }

    let mut hi = 255usize;
    acc = 0;
    for (i, count) in histogram.iter().enumerate().rev() {
        acc += count;
        if acc > clip {
            hi = i;
            break;
        }
    }

    if hi <= lo {
        return;
    }
    let scale = 255.0 / (hi - lo) as f64;
    for Luma([v]) in img.pixels_mut() {
        *v = (((*v as f64 - lo as f64) * scale).round()).clamp(0.0, 255.0) as u8;
    }
}

/// Two-tone threshold; the result stays a grayscale buffer.
fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = img.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = if *v >= threshold { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> DynamicImage {
        let img = GrayImage::from_fn(w, h, |x, _| Luma([(x % 256) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn small_images_are_upscaled_twice() {
        let out = preprocess(&gradient_image(400, 300));
        assert_eq!(out.image.width(), 800);
        assert_eq!(out.image.height(), 600);
        assert!((out.sx - 0.5).abs() < 1e-9);
        assert!((out.sy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn large_images_keep_their_size() {
        let out = preprocess(&gradient_image(1600, 1700));
        assert_eq!(out.image.width(), 1600);
        assert_eq!(out.image.height(), 1700);
        assert!((out.sx - 1.0).abs() < 1e-9);
        assert!((out.sy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn output_is_two_tone() {
        let out = preprocess(&gradient_image(1600, 1600));
        assert!(out.image.pixels().all(|Luma([v])| *v == 0 || *v == 255));
    }

    #[test]
    fn input_is_not_mutated() {
        let input = gradient_image(100, 100);
        let before = input.to_luma8().into_raw();
        let _ = preprocess(&input);
        assert_eq!(input.to_luma8().into_raw(), before);
    }
}
