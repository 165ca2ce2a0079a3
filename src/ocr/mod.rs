//! OCR subsystem: preprocess -> word-level engine -> text assembly.
//!
//! The outcome carries the canonical full text, per-word geometry in
//! original pixel space with byte-exact text intervals, and the mean
//! word confidence (0-100).

pub mod assemble;
pub mod pdf;
pub mod tesseract;

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::models::OcrPage;
use crate::preprocess::preprocess;

use assemble::AssembledPage;
use tesseract::RawWord;

pub use assemble::PAGE_SEPARATOR;

const IMAGE_SUFFIXES: &[&str] = &["jpg", "jpeg", "png", "tiff", "bmp", "webp"];

pub struct OcrOutcome {
    pub text: String,
    pub pages: Vec<OcrPage>,
    pub konfidenz: f64,
}

/// OCR one uploaded file (PDF or image).
pub async fn process_file(config: &Config, path: &Path) -> Result<OcrOutcome> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let assembled = if ext == "pdf" {
        let dir = tempfile::tempdir().context("cannot create temp dir")?;
        let page_paths = pdf::rasterize_pdf(path, pdf::OCR_DPI, dir.path()).await?;
        let mut pages = Vec::with_capacity(page_paths.len());
        for page_path in &page_paths {
            pages.push(ocr_page(page_path, &config.ocr_language).await?);
        }
        pages
    } else if IMAGE_SUFFIXES.contains(&ext.as_str()) {
        vec![ocr_page(path, &config.ocr_language).await?]
    } else {
        bail!("unsupported file type: .{ext}");
    };

    let (text, pages) = assemble::merge_pages(assembled);
    let konfidenz = assemble::mean_confidence(&pages);
    Ok(OcrOutcome { text, pages, konfidenz })
}

/// OCR one page image: preprocess, recognize, scale boxes back into the
/// original image's pixel space, assemble the page text.
async fn ocr_page(path: &Path, lang: &str) -> Result<(AssembledPage, u32, u32)> {
    let path_buf = path.to_path_buf();
    let (tmp, sx, sy, width, height) =
        tokio::task::spawn_blocking(move || -> Result<(tempfile::NamedTempFile, f64, f64, u32, u32)> {
            let img = image::open(&path_buf)
                .with_context(|| format!("cannot read image {}", path_buf.display()))?;
            let (width, height) = (img.width(), img.height());
            let pre = preprocess(&img);
            let tmp = tempfile::Builder::new()
                .prefix("belegsync-ocr")
                .suffix(".png")
                .tempfile()
                .context("cannot create temp image")?;
            pre.image.save(tmp.path()).context("cannot write processed image")?;
            Ok((tmp, pre.sx, pre.sy, width, height))
        })
        .await
        .context("preprocessing task panicked")??;

    let raw = tesseract::recognize(tmp.path(), lang).await?;
    drop(tmp);

    let scaled: Vec<RawWord> = raw
        .into_iter()
        .map(|w| RawWord {
            x: (w.x as f64 * sx).round() as i32,
            y: (w.y as f64 * sy).round() as i32,
            w: (w.w as f64 * sx).round() as i32,
            h: (w.h as f64 * sy).round() as i32,
            ..w
        })
        .collect();

    Ok((assemble::assemble_page(scaled), width, height))
}
