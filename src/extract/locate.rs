//! Quote localization: find the interval of the OCR text a literal model
//! quote came from.
//!
//! Four tiers, first hit wins:
//!   1. exact substring
//!   2. case-insensitive substring
//!   3. whitespace-normalized (collapsed runs, lowercased) with offsets
//!      mapped back onto the original text
//!   4. fuzzy bigram sliding window (Dice >= 0.80, quotes of >= 5 chars)
//!
//! All offsets are byte offsets into the original text; the fuzzy window
//! search itself runs over chars and converts at the end.

use std::collections::{HashMap, HashSet};

/// Minimum quote length (chars) before the fuzzy tier is consulted.
const FUZZY_MIN_QUOTE_CHARS: usize = 5;
/// Dice score a fuzzy window must reach.
const FUZZY_MIN_SCORE: f64 = 0.80;
/// Smallest fuzzy window considered.
const FUZZY_MIN_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Locate `quote` in `text`, returning the smallest best-matching interval.
pub fn locate_quote(text: &str, quote: &str) -> Option<QuoteMatch> {
    if quote.is_empty() || text.is_empty() {
        return None;
    }

    // Tier 1: exact.
    if let Some(start) = text.find(quote) {
        return Some(QuoteMatch {
            start,
            end: start + quote.len(),
            text: quote.to_string(),
        });
    }

    // Tier 2: case-insensitive.
    if let Some(m) = find_case_insensitive(text, quote) {
        return Some(m);
    }

    // Tier 3: whitespace-normalized.
    if let Some(m) = find_whitespace_normalized(text, quote) {
        return Some(m);
    }

    // Tier 4: fuzzy bigram window.
    if quote.chars().count() >= FUZZY_MIN_QUOTE_CHARS {
        return find_fuzzy(text, quote);
    }
    None
}

// ---------------------------------------------------------------------------
// Tier 2
// ---------------------------------------------------------------------------

/// Per-char view of a string: lowercased char plus the original byte range.
fn lowered_chars(s: &str) -> Vec<(char, usize, usize)> {
    s.char_indices()
        .map(|(i, c)| {
            let lower = c.to_lowercase().next().unwrap_or(c);
            (lower, i, i + c.len_utf8())
        })
        .collect()
}

pub(crate) fn find_case_insensitive(text: &str, quote: &str) -> Option<QuoteMatch> {
    let haystack = lowered_chars(text);
    let needle: Vec<char> = quote.chars().map(|c| c.to_lowercase().next().unwrap_or(c)).collect();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    for at in 0..=(haystack.len() - needle.len()) {
        if haystack[at..at + needle.len()]
            .iter()
            .zip(&needle)
            .all(|((h, _, _), n)| h == n)
        {
            let start = haystack[at].1;
            let end = haystack[at + needle.len() - 1].2;
            return Some(QuoteMatch {
                start,
                end,
                text: text[start..end].to_string(),
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tier 3
// ---------------------------------------------------------------------------

/// Collapse whitespace runs to single spaces and lowercase, keeping the
/// original byte range each normalized char covers. A collapsed space
/// covers its whole whitespace run, so mapped intervals stay exact.
fn normalize_ws(s: &str) -> (Vec<char>, Vec<(usize, usize)>) {
    let mut chars = Vec::new();
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if let (Some(' '), Some(range)) = (chars.last().copied(), ranges.last_mut()) {
                range.1 = i + c.len_utf8();
            } else {
                chars.push(' ');
                ranges.push((i, i + c.len_utf8()));
            }
        } else {
            chars.push(c.to_lowercase().next().unwrap_or(c));
            ranges.push((i, i + c.len_utf8()));
        }
    }
    (chars, ranges)
}

fn find_whitespace_normalized(text: &str, quote: &str) -> Option<QuoteMatch> {
    let (haystack, ranges) = normalize_ws(text);
    let (needle, _) = normalize_ws(quote);
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    for at in 0..=(haystack.len() - needle.len()) {
        if haystack[at..at + needle.len()] == needle[..] {
            let start = ranges[at].0;
            let end = ranges[at + needle.len() - 1].1;
            return Some(QuoteMatch {
                start,
                end,
                text: text[start..end].to_string(),
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tier 4
// ---------------------------------------------------------------------------

fn bigram_set(chars: &[char]) -> HashSet<(char, char)> {
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Candidate window sizes around the quote length, de-duplicated and
/// clipped to the text length.
fn window_sizes(quote_len: usize, text_len: usize) -> Vec<usize> {
    let q = quote_len;
    // floor(0.8q), floor(0.9q), q, ceil(1.1q), ceil(1.2q) in exact integer
    // arithmetic.
    let mut sizes: Vec<usize> = [
        q * 8 / 10,
        q * 9 / 10,
        q,
        (q * 11).div_ceil(10),
        (q * 12).div_ceil(10),
    ]
    .into_iter()
    .map(|w| w.clamp(FUZZY_MIN_WINDOW, text_len.max(FUZZY_MIN_WINDOW)))
    .filter(|w| *w <= text_len)
    .collect();
    sizes.sort_unstable();
    sizes.dedup();
    sizes
}

struct Candidate {
    score: f64,
    start: usize,
    window: usize,
}

/// Slide windows of several sizes over the text, scoring each by the Dice
/// coefficient of its bigram set against the quote's. A rolling bigram
/// counter keeps each size pass at O(|text|).
fn find_fuzzy(text: &str, quote: &str) -> Option<QuoteMatch> {
    let haystack = lowered_chars(text);
    let quote_chars: Vec<char> =
        quote.chars().map(|c| c.to_lowercase().next().unwrap_or(c)).collect();
    let quote_bigrams = bigram_set(&quote_chars);
    if quote_bigrams.is_empty() || haystack.is_empty() {
        return None;
    }

    let text_chars: Vec<char> = haystack.iter().map(|(c, _, _)| *c).collect();
    let mut best: Option<Candidate> = None;

    struct Rolling<'a> {
        counts: HashMap<(char, char), usize>,
        distinct: usize,
        shared: usize,
        quote: &'a HashSet<(char, char)>,
    }

    impl Rolling<'_> {
        fn add(&mut self, bg: (char, char)) {
            let n = self.counts.entry(bg).or_insert(0);
            *n += 1;
            if *n == 1 {
                self.distinct += 1;
                if self.quote.contains(&bg) {
                    self.shared += 1;
                }
            }
        }

        fn remove(&mut self, bg: (char, char)) {
            if let Some(n) = self.counts.get_mut(&bg) {
                *n -= 1;
                if *n == 0 {
                    self.counts.remove(&bg);
                    self.distinct -= 1;
                    if self.quote.contains(&bg) {
                        self.shared -= 1;
                    }
                }
            }
        }
    }

    for window in window_sizes(quote_chars.len(), text_chars.len()) {
        let mut rolling = Rolling {
            counts: HashMap::new(),
            distinct: 0,
            shared: 0,
            quote: &quote_bigrams,
        };

        for i in 0..window.saturating_sub(1) {
            rolling.add((text_chars[i], text_chars[i + 1]));
        }

        for start in 0..=(text_chars.len() - window) {
            if start > 0 {
                rolling.remove((text_chars[start - 1], text_chars[start]));
                rolling.add((text_chars[start + window - 2], text_chars[start + window - 1]));
            }

            let score =
                2.0 * rolling.shared as f64 / (quote_bigrams.len() + rolling.distinct) as f64;
            let better = match &best {
                None => true,
                Some(b) => {
                    score > b.score
                        || (score == b.score
                            && (start < b.start || (start == b.start && window < b.window)))
                }
            };
            if better {
                best = Some(Candidate { score, start, window });
            }
        }
    }

    let best = best.filter(|b| b.score >= FUZZY_MIN_SCORE)?;
    let start = haystack[best.start].1;
    let end = haystack[best.start + best.window - 1].2;
    Some(QuoteMatch {
        start,
        end,
        text: text[start..end].to_string(),
    })
}
