//! Text assembly: turn the engine's word soup into one canonical string
//! plus a byte interval per word.
//!
//! Words group into lines by `(block, par, line)`. Within a line words are
//! joined by a single space, lines by a newline, blocks by one extra
//! newline. Offsets are byte offsets into the assembled string, so
//! `text[word.char_start..word.char_end] == word.text` holds exactly.

use std::collections::BTreeMap;

use crate::models::{OcrPage, OcrWord};

use super::tesseract::RawWord;

/// Inserted between the texts of consecutive pages; later pages' word
/// offsets shift past it.
pub const PAGE_SEPARATOR: &str = "\n\n--- Seite ---\n\n";

pub struct AssembledPage {
    pub text: String,
    pub words: Vec<OcrWord>,
}

/// Assemble one page. Word boxes are taken as-is (the caller has already
/// scaled them into original pixel space).
pub fn assemble_page(words: Vec<RawWord>) -> AssembledPage {
    let mut lines: BTreeMap<(u32, u32, u32), Vec<RawWord>> = BTreeMap::new();
    for word in words {
        lines.entry((word.block, word.par, word.line)).or_default().push(word);
    }
    for line in lines.values_mut() {
        line.sort_by_key(|w| w.word);
    }

    let mut text = String::new();
    let mut out = Vec::new();
    let mut prev_block: Option<u32> = None;

    for ((block, _, _), line) in &lines {
        match prev_block {
            None => {}
            Some(prev) if prev != *block => text.push_str("\n\n"),
            Some(_) => text.push('\n'),
        }
        for (i, word) in line.iter().enumerate() {
            if i > 0 {
                text.push(' ');
            }
            let char_start = text.len();
            text.push_str(&word.text);
            out.push(OcrWord {
                text: word.text.clone(),
                x: word.x,
                y: word.y,
                w: word.w,
                h: word.h,
                conf: word.conf,
                char_start,
                char_end: text.len(),
            });
        }
        prev_block = Some(*block);
    }

    AssembledPage { text, words: out }
}

/// Join per-page texts with [`PAGE_SEPARATOR`] and shift every later page's
/// word offsets into the global string.
pub fn merge_pages(pages: Vec<(AssembledPage, u32, u32)>) -> (String, Vec<OcrPage>) {
    let mut full_text = String::new();
    let mut out = Vec::new();

    for (i, (page, width, height)) in pages.into_iter().enumerate() {
        if i > 0 {
            full_text.push_str(PAGE_SEPARATOR);
        }
        let offset = full_text.len();
        full_text.push_str(&page.text);

        let words = page
            .words
            .into_iter()
            .map(|w| OcrWord {
                char_start: w.char_start + offset,
                char_end: w.char_end + offset,
                ..w
            })
            .collect();

        out.push(OcrPage { page: (i + 1) as u32, width, height, words });
    }

    (full_text, out)
}

/// Mean of all per-word confidences > 0, rounded to two decimals.
pub fn mean_confidence(pages: &[OcrPage]) -> f64 {
    let confs: Vec<f64> = pages
        .iter()
        .flat_map(|p| p.words.iter())
        .map(|w| w.conf)
        .filter(|c| *c > 0.0)
        .collect();
    if confs.is_empty() {
        return 0.0;
    }
    let mean = confs.iter().sum::<f64>() / confs.len() as f64;
    (mean * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(block: u32, par: u32, line: u32, word: u32, text: &str) -> RawWord {
        RawWord {
            block,
            par,
            line,
            word,
            x: 10 * word as i32,
            y: 20 * line as i32,
            w: 50,
            h: 18,
            conf: 90.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn words_of_one_line_are_space_separated() {
        let page = assemble_page(vec![
            raw(1, 1, 1, 2, "Schmidt"),
            raw(1, 1, 1, 1, "Malermeister"),
            raw(1, 1, 1, 3, "GmbH"),
        ]);
        assert_eq!(page.text, "Malermeister Schmidt GmbH");
    }

    #[test]
    fn lines_and_blocks_get_their_separators() {
        let page = assemble_page(vec![
            raw(1, 1, 1, 1, "Rechnung"),
            raw(1, 1, 2, 1, "Nr."),
            raw(2, 1, 1, 1, "Brutto:"),
        ]);
        assert_eq!(page.text, "Rechnung\nNr.\n\nBrutto:");
    }

    #[test]
    fn every_word_interval_slices_back_to_its_text() {
        let page = assemble_page(vec![
            raw(1, 1, 1, 1, "Gesamt"),
            raw(1, 1, 1, 2, "netto:"),
            raw(1, 1, 2, 1, "1.540,00"),
            raw(1, 1, 2, 2, "€"),
            raw(2, 1, 1, 1, "MwSt"),
        ]);
        for word in &page.words {
            assert_eq!(&page.text[word.char_start..word.char_end], word.text);
        }
    }

    #[test]
    fn intervals_within_a_page_are_sorted_and_disjoint() {
        let page = assemble_page(vec![
            raw(1, 1, 1, 1, "Müller"),
            raw(1, 1, 1, 2, "&"),
            raw(1, 1, 2, 1, "Söhne"),
        ]);
        for pair in page.words.windows(2) {
            assert!(pair[0].char_start < pair[0].char_end);
            assert!(pair[0].char_end <= pair[1].char_start);
        }
    }

    #[test]
    fn page_offsets_shift_past_the_separator() {
        let first = assemble_page(vec![raw(1, 1, 1, 1, "Seite-eins")]);
        let second = assemble_page(vec![raw(1, 1, 1, 1, "Seite-zwei")]);
        let first_len = first.text.len();

        let (full_text, pages) = merge_pages(vec![(first, 1200, 800), (second, 1200, 800)]);

        let w2 = &pages[1].words[0];
        assert_eq!(w2.char_start, first_len + PAGE_SEPARATOR.len());
        assert_eq!(&full_text[w2.char_start..w2.char_end], "Seite-zwei");

        let w1_last = pages[0].words.last().unwrap();
        assert_eq!(w2.char_start, w1_last.char_end + PAGE_SEPARATOR.len());
    }

    #[test]
    fn confidence_ignores_nonpositive_scores() {
        let mut page = assemble_page(vec![
            raw(1, 1, 1, 1, "a"),
            raw(1, 1, 1, 2, "b"),
        ]);
        page.words[0].conf = 80.0;
        page.words[1].conf = 91.005;

        let (_, mut pages) = merge_pages(vec![(page, 100, 100)]);
        pages[0].words.push(OcrWord {
            text: "c".into(),
            x: 0,
            y: 0,
            w: 1,
            h: 1,
            conf: -1.0,
            char_start: 0,
            char_end: 1,
        });
        assert_eq!(mean_confidence(&pages), 85.5);
    }
}
