//! PDF rasterization via the `pdftoppm` CLI (poppler).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// DPI used when rasterizing pages for OCR.
pub const OCR_DPI: u32 = 300;
/// DPI used when rendering page 1 for the vision pass.
pub const VISION_DPI: u32 = 200;

/// Rasterize all pages of a PDF into PNGs under `out_dir`, returned in
/// page order.
pub async fn rasterize_pdf(path: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let prefix = out_dir.join("page");
    let output = Command::new("pdftoppm")
        .args(["-png", "-r", &dpi.to_string()])
        .arg(path)
        .arg(&prefix)
        .output()
        .await
        .context("cannot run pdftoppm")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("pdftoppm failed ({}): {}", output.status, stderr.trim());
    }

    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_path = entry.path();
        if let Some(page_no) = page_number(&file_path) {
            pages.push((page_no, file_path));
        }
    }
    if pages.is_empty() {
        bail!("pdftoppm produced no pages for {}", path.display());
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// Render only the first page as a JPEG and return its bytes.
pub async fn render_first_page_jpeg(path: &Path, dpi: u32) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir().context("cannot create temp dir")?;
    let prefix = dir.path().join("vision");
    let output = Command::new("pdftoppm")
        .args(["-jpeg", "-f", "1", "-l", "1", "-r", &dpi.to_string()])
        .arg(path)
        .arg(&prefix)
        .output()
        .await
        .context("cannot run pdftoppm")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("pdftoppm failed ({}): {}", output.status, stderr.trim());
    }

    let mut entries = tokio::fs::read_dir(dir.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_path = entry.path();
        if file_path.extension().and_then(|e| e.to_str()) == Some("jpg") {
            return Ok(tokio::fs::read(&file_path).await?);
        }
    }
    bail!("pdftoppm produced no page image for {}", path.display())
}

/// Extract the page number from a `page-<n>.png` filename.
fn page_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix("page-")?;
    rest.strip_suffix(".png")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_sort_numerically() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/page-02.png")), Some(2));
        assert_eq!(page_number(Path::new("/tmp/x/other.png")), None);
        assert_eq!(page_number(Path::new("/tmp/x/page-1.jpg")), None);
    }
}
