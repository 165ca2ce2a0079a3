//! Word-level OCR via the `tesseract` CLI.
//!
//! Any engine that emits `(text, x, y, w, h, conf, block, line)` tuples
//! satisfies the adapter contract; tesseract's TSV output carries exactly
//! that (level-5 rows are words).

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// One raw word as reported by the engine, in *processed-image* pixel
/// coordinates. The caller scales boxes back into original space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWord {
    pub block: u32,
    pub par: u32,
    pub line: u32,
    pub word: u32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub conf: f64,
    pub text: String,
}

/// Run tesseract over one image and return its word list.
pub async fn recognize(image_path: &Path, lang: &str) -> Result<Vec<RawWord>> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", lang, "--psm", "3", "tsv"])
        .output()
        .await
        .context("cannot run tesseract")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("tesseract failed ({}): {}", output.status, stderr.trim());
    }

    let tsv = String::from_utf8_lossy(&output.stdout);
    Ok(parse_tsv(&tsv))
}

/// Parse tesseract TSV output. Columns:
/// `level page_num block_num par_num line_num word_num left top width height conf text`.
/// Only word rows (level 5) with non-empty trimmed text are kept.
pub fn parse_tsv(tsv: &str) -> Vec<RawWord> {
    let mut words = Vec::new();
    for row in tsv.lines() {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() != 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let parsed = (|| {
            Some(RawWord {
                block: cols[2].parse().ok()?,
                par: cols[3].parse().ok()?,
                line: cols[4].parse().ok()?,
                word: cols[5].parse().ok()?,
                x: cols[6].parse().ok()?,
                y: cols[7].parse().ok()?,
                w: cols[8].parse().ok()?,
                h: cols[9].parse().ok()?,
                conf: cols[10].parse().ok()?,
                text: text.to_string(),
            })
        })();
        if let Some(word) = parsed {
            words.push(word);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "\
level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1200\t800\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t500\t30\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t120\t30\t96.5\tRechnung
5\t1\t1\t1\t1\t2\t140\t10\t80\t30\t91.2\tNr.
5\t1\t1\t1\t1\t3\t230\t10\t90\t28\t88.0\t2024-0815
5\t1\t1\t1\t2\t1\t10\t50\t200\t30\t70.0\t
5\t1\t2\t1\t1\t1\t10\t120\t220\t30\t93.1\tBrutto:";

    #[test]
    fn parses_only_word_rows_with_text() {
        let words = parse_tsv(SAMPLE_TSV);
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].text, "Rechnung");
        assert_eq!(words[0].x, 10);
        assert_eq!(words[0].conf, 96.5);
        assert_eq!(words[3].block, 2);
    }

    #[test]
    fn blank_and_structural_rows_are_skipped() {
        assert!(parse_tsv("level\tpage_num\n1\t1").is_empty());
        assert!(parse_tsv("").is_empty());
    }
}
