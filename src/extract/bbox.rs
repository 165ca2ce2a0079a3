//! Geometric enrichment: project a text span onto the union of the
//! bounding boxes of all OCR words whose interval overlaps it.

use crate::models::{OcrPage, SourceSpan, SpanBBox};

/// Attach the union bbox of all overlapping words to `span`. Spans whose
/// interval touches no word are left untouched.
pub fn enrich_span(span: &mut SourceSpan, pages: &[OcrPage]) {
    let mut bbox: Option<SpanBBox> = None;

    for page in pages {
        for word in &page.words {
            if word.char_start < span.end && word.char_end > span.start {
                match &mut bbox {
                    None => {
                        bbox = Some(SpanBBox {
                            page: page.page,
                            x: word.x,
                            y: word.y,
                            w: word.w,
                            h: word.h,
                        });
                    }
                    Some(b) => {
                        let right = (b.x + b.w).max(word.x + word.w);
                        let bottom = (b.y + b.h).max(word.y + word.h);
                        b.x = b.x.min(word.x);
                        b.y = b.y.min(word.y);
                        b.w = right - b.x;
                        b.h = bottom - b.y;
                    }
                }
            }
        }
    }

    if bbox.is_some() {
        span.bbox = bbox;
    }
}

/// Enrich a whole span list in place.
pub fn enrich_spans(spans: &mut [SourceSpan], pages: &[OcrPage]) {
    for span in spans.iter_mut() {
        enrich_span(span, pages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OcrWord;

    fn word(text: &str, x: i32, y: i32, w: i32, h: i32, start: usize, end: usize) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            x,
            y,
            w,
            h,
            conf: 95.0,
            char_start: start,
            char_end: end,
        }
    }

    fn page(words: Vec<OcrWord>) -> OcrPage {
        OcrPage { page: 1, width: 1200, height: 800, words }
    }

    #[test]
    fn span_over_two_words_gets_the_union_box() {
        // "Brutto: 1.877,82" -> "Brutto:" [0,7), "1.877,82" [8,16)
        let pages = vec![page(vec![
            word("Brutto:", 100, 200, 80, 20, 0, 7),
            word("1.877,82", 190, 198, 90, 24, 8, 16),
        ])];
        let mut span = SourceSpan {
            start: 0,
            end: 16,
            text: "Brutto: 1.877,82".to_string(),
            feld: "betrag_brutto".to_string(),
            bbox: None,
        };
        enrich_span(&mut span, &pages);

        let bbox = span.bbox.unwrap();
        assert_eq!(bbox.page, 1);
        assert_eq!(bbox.x, 100);
        assert_eq!(bbox.y, 198);
        assert_eq!(bbox.w, 180); // 190 + 90 - 100
        assert_eq!(bbox.h, 24); // max bottom 222 - min top 198
        assert!(bbox.w > 0 && bbox.h > 0);
    }

    #[test]
    fn partial_overlap_counts() {
        let pages = vec![page(vec![word("Gesamtbetrag", 10, 10, 120, 20, 5, 17)])];
        let mut span = SourceSpan {
            start: 0,
            end: 8,
            text: "xxx Gesa".to_string(),
            feld: "beschreibung".to_string(),
            bbox: None,
        };
        enrich_span(&mut span, &pages);
        assert!(span.bbox.is_some());
    }

    #[test]
    fn disjoint_span_stays_bare() {
        let pages = vec![page(vec![word("Datum", 10, 10, 50, 20, 0, 5)])];
        let mut span = SourceSpan {
            start: 20,
            end: 30,
            text: "1877,82".to_string(),
            feld: "betrag_brutto".to_string(),
            bbox: None,
        };
        enrich_span(&mut span, &pages);
        assert!(span.bbox.is_none());
    }

    #[test]
    fn adjacent_interval_is_not_an_overlap() {
        // Word ends exactly where the span starts.
        let pages = vec![page(vec![word("Netto", 10, 10, 50, 20, 0, 5)])];
        let mut span = SourceSpan {
            start: 5,
            end: 9,
            text: "1540".to_string(),
            feld: "betrag_netto".to_string(),
            bbox: None,
        };
        enrich_span(&mut span, &pages);
        assert!(span.bbox.is_none());
    }
}
