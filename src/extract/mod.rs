//! Structured extraction with source grounding.
//!
//! Drives the text model over the OCR text, normalizes its loosely shaped
//! JSON, localizes every quoted value inside the OCR text, falls back to
//! direct value search for ungrounded fields, optionally re-reads the raw
//! image with a vision model when OCR quality is poor, assigns an SKR03
//! account, projects spans onto page geometry and scores a confidence
//! tier.

pub mod bbox;
pub mod json_repair;
pub mod locate;
pub mod prompts;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::kontierung;
use crate::llm::{self, GenerateRequest};
use crate::models::{ExtrahierteDaten, Konfidenz, OcrPage, SourceSpan};
use crate::ocr::pdf;

/// OCR text is truncated to this many chars before prompting.
const PROMPT_TEXT_BUDGET: usize = 4000;

/// String values the model uses as "unknown".
const STRING_SENTINELS: &[&str] = &["null", "none", "", "n/a", "nicht angegeben", "unbekannt"];

/// Money fields where the model's `0` almost always means "unknown".
const OPTIONAL_MONEY_FIELDS: &[&str] =
    &["betrag_netto", "mwst_betrag", "mwst_satz", "arbeitskosten_35a", "materialkosten"];

pub struct ExtractOutcome {
    pub daten: ExtrahierteDaten,
    pub quellreferenzen: Vec<SourceSpan>,
    pub methode: String,
    pub konfidenz: Konfidenz,
}

/// Run the full extraction for one Beleg.
pub async fn extract_beleg(
    config: &Config,
    http: &reqwest::Client,
    ocr_text: &str,
    pages: &[OcrPage],
    ocr_konfidenz: f64,
    image_path: Option<&Path>,
) -> Result<ExtractOutcome> {
    if ocr_text.trim().is_empty() {
        return Ok(ExtractOutcome {
            daten: ExtrahierteDaten::default(),
            quellreferenzen: Vec::new(),
            methode: "leer".to_string(),
            konfidenz: Konfidenz::Niedrig,
        });
    }

    let prompt = prompts::build_extraction_prompt(truncate_chars(ocr_text, PROMPT_TEXT_BUDGET));

    // One retry inside the extractor, covering both failed calls and
    // unparseable output. Anything beyond that is the pipeline's failure
    // path; recovery is an explicit reprocess.
    let mut parsed = None;
    for attempt in 1..=2 {
        let result = llm::generate(
            http,
            &config.ollama_url,
            GenerateRequest {
                model: &config.ollama_model,
                prompt: &prompt,
                images: None,
                temperature: 0.1,
                num_predict: 1024,
                timeout: llm::TEXT_TIMEOUT,
            },
        )
        .await;

        match result {
            Ok(raw) => {
                if let Some(value) = json_repair::recover_json(&raw) {
                    parsed = Some(value);
                    break;
                }
                if attempt == 2 {
                    return Err(anyhow!("Modellantwort enthielt kein gültiges JSON"));
                }
                tracing::warn!("extraction attempt {attempt} returned no parseable JSON");
            }
            Err(e) if attempt == 2 => return Err(e.into()),
            Err(e) => tracing::warn!("extraction attempt {attempt} failed: {e}"),
        }
    }
    let value = parsed.ok_or_else(|| anyhow!("Modellantwort enthielt kein gültiges JSON"))?;

    let (mut fields, quotes) = unwrap_response(&value);
    clean_fields(&mut fields);
    let mut daten = coerce_daten(&fields);

    let mut spans = ground_quotes(ocr_text, &quotes);
    fallback_spans(ocr_text, &daten, &mut spans);

    let mut methode = "ollama_direkt".to_string();

    let key_found = [
        daten.betrag_brutto.is_some(),
        daten.aussteller.is_some(),
        daten.datum_beleg.is_some(),
    ]
    .into_iter()
    .filter(|found| *found)
    .count();

    if let (Some(path), Some(vision_model)) = (image_path, config.vision_model.as_deref())
        && (ocr_konfidenz < config.vision_threshold || key_found < 2)
    {
        match vision_pass(config, http, vision_model, path).await {
            Ok(Some(vision_daten)) => {
                if merge_vision(&mut daten, vision_daten) {
                    methode = "vision_merged".to_string();
                }
            }
            Ok(None) => tracing::debug!("vision pass returned no parseable JSON"),
            Err(e) => tracing::warn!("vision pass failed: {e:#}"),
        }
    }

    if let Some(beleg_typ) = daten.beleg_typ.clone()
        && daten.skr03_konto.is_none()
    {
        let k = kontierung::auto_kontierung(&beleg_typ, daten.mwst_satz);
        daten.skr03_konto = Some(k.skr03_konto.to_string());
        daten.skr03_bezeichnung = Some(k.skr03_bezeichnung.to_string());
        if daten.bu_schluessel.is_none() && !k.bu_schluessel.is_empty() {
            daten.bu_schluessel = Some(k.bu_schluessel);
        }
    }

    bbox::enrich_spans(&mut spans, pages);
    spans.sort_by(|a, b| (a.start, a.end, &a.feld).cmp(&(b.start, b.end, &b.feld)));

    let konfidenz = assess_konfidenz(&daten, &spans);
    Ok(ExtractOutcome { daten, quellreferenzen: spans, methode, konfidenz })
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Split the response into plain field values and a parallel quote map.
/// Tolerant of flat responses: a value that is not a `{wert, quelle}`
/// object passes through unchanged.
fn unwrap_response(value: &Value) -> (Map<String, Value>, HashMap<String, String>) {
    let mut fields = Map::new();
    let mut quotes = HashMap::new();

    if let Some(obj) = value.as_object() {
        for (key, entry) in obj {
            match entry.as_object() {
                Some(inner) if inner.contains_key("wert") => {
                    fields.insert(key.clone(), inner["wert"].clone());
                    if let Some(quote) = inner.get("quelle").and_then(Value::as_str)
                        && !quote.trim().is_empty()
                    {
                        quotes.insert(key.clone(), quote.to_string());
                    }
                }
                _ => {
                    fields.insert(key.clone(), entry.clone());
                }
            }
        }
    }
    (fields, quotes)
}

/// Null out string sentinels everywhere and zero on the optional money
/// fields.
fn clean_fields(fields: &mut Map<String, Value>) {
    for (key, value) in fields.iter_mut() {
        let nulled = match &*value {
            Value::String(s) => STRING_SENTINELS.contains(&s.trim().to_lowercase().as_str()),
            Value::Number(n) => {
                OPTIONAL_MONEY_FIELDS.contains(&key.as_str()) && n.as_f64() == Some(0.0)
            }
            _ => false,
        };
        if nulled {
            *value = Value::Null;
        }
    }
}

/// Static mapping from response keys to the typed record. Unknown keys are
/// dropped silently.
fn coerce_daten(fields: &Map<String, Value>) -> ExtrahierteDaten {
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let number = |key: &str| fields.get(key).and_then(parse_amount);

    ExtrahierteDaten {
        beleg_typ: text("beleg_typ").map(|s| s.to_lowercase()),
        aussteller: text("aussteller"),
        beschreibung: text("beschreibung"),
        rechnungsnummer: text("rechnungsnummer"),
        datum_beleg: text("datum_beleg"),
        betrag_brutto: number("betrag_brutto"),
        betrag_netto: number("betrag_netto"),
        mwst_satz: number("mwst_satz"),
        mwst_betrag: number("mwst_betrag"),
        arbeitskosten_35a: number("arbeitskosten_35a"),
        materialkosten: number("materialkosten"),
        steuer_kategorie: text("steuer_kategorie"),
        skr03_konto: text("skr03_konto"),
        skr03_bezeichnung: text("skr03_bezeichnung"),
        bu_schluessel: text("bu_schluessel"),
    }
}

/// Accept numbers directly and German/Latin formatted strings
/// ("1.234,56", "1234.56", "292,60", "19").
fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_german_number(s),
        _ => None,
    }
}

fn parse_german_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_end_matches('€')
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse().ok()
}

// ---------------------------------------------------------------------------
// Source grounding
// ---------------------------------------------------------------------------

/// Locate every model quote in the OCR text.
fn ground_quotes(ocr_text: &str, quotes: &HashMap<String, String>) -> Vec<SourceSpan> {
    let mut spans = Vec::new();
    for (feld, quote) in quotes {
        if let Some(m) = locate::locate_quote(ocr_text, quote) {
            spans.push(SourceSpan {
                start: m.start,
                end: m.end,
                text: m.text,
                feld: feld.clone(),
                bbox: None,
            });
        }
    }
    spans.sort_by(|a, b| (a.start, a.end, &a.feld).cmp(&(b.start, b.end, &b.feld)));
    spans
}

/// Direct value search for fields the quote pass left ungrounded.
fn fallback_spans(ocr_text: &str, daten: &ExtrahierteDaten, spans: &mut Vec<SourceSpan>) {
    let grounded: HashSet<String> = spans.iter().map(|s| s.feld.clone()).collect();

    let numeric = [
        ("betrag_brutto", daten.betrag_brutto),
        ("betrag_netto", daten.betrag_netto),
        ("mwst_betrag", daten.mwst_betrag),
        ("mwst_satz", daten.mwst_satz),
        ("arbeitskosten_35a", daten.arbeitskosten_35a),
        ("materialkosten", daten.materialkosten),
    ];
    for (feld, value) in numeric {
        if grounded.contains(feld) {
            continue;
        }
        let Some(value) = value else { continue };
        for variant in number_variants(value) {
            if let Some(start) = ocr_text.find(&variant) {
                spans.push(SourceSpan {
                    start,
                    end: start + variant.len(),
                    text: variant,
                    feld: feld.to_string(),
                    bbox: None,
                });
                break;
            }
        }
    }

    let texty = [
        ("aussteller", daten.aussteller.as_deref()),
        ("rechnungsnummer", daten.rechnungsnummer.as_deref()),
        ("datum_beleg", daten.datum_beleg.as_deref()),
    ];
    for (feld, value) in texty {
        if grounded.contains(feld) {
            continue;
        }
        let Some(value) = value else { continue };

        if let Some(start) = ocr_text.find(value) {
            spans.push(SourceSpan {
                start,
                end: start + value.len(),
                text: value.to_string(),
                feld: feld.to_string(),
                bbox: None,
            });
            continue;
        }
        if let Some(m) = locate::find_case_insensitive(ocr_text, value) {
            spans.push(SourceSpan {
                start: m.start,
                end: m.end,
                text: m.text,
                feld: feld.to_string(),
                bbox: None,
            });
            continue;
        }
        // Multi-word issuers: first two words with liberal whitespace.
        if feld == "aussteller" {
            let words: Vec<&str> = value.split_whitespace().collect();
            if words.len() >= 2 {
                let pattern =
                    format!("(?i){}\\s+{}", regex::escape(words[0]), regex::escape(words[1]));
                if let Ok(re) = regex::Regex::new(&pattern)
                    && let Some(m) = re.find(ocr_text)
                {
                    spans.push(SourceSpan {
                        start: m.start(),
                        end: m.end(),
                        text: m.as_str().to_string(),
                        feld: feld.to_string(),
                        bbox: None,
                    });
                }
            }
        }
    }
}

/// Render the German/Latin spellings a number may take in OCR text:
/// "1877.82", "1877,82", "1.877,82" (and "19" for integral rates).
fn number_variants(value: f64) -> Vec<String> {
    let raw = if value.fract().abs() < 1e-9 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    };
    let swapped = raw.replace('.', ",");
    let german = format_german_number(value);
    let plain_comma = german.replace('.', "");

    let mut variants = vec![raw, swapped, german, plain_comma];
    let mut seen = HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants
}

/// 1234.56 -> "1.234,56"
fn format_german_number(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as i64;
    let (int, frac) = (cents / 100, cents % 100);

    let digits = int.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped},{frac:02}")
}

// ---------------------------------------------------------------------------
// Vision dual-pass
// ---------------------------------------------------------------------------

/// Re-read the raw image with the vision model. For PDFs only page 1 is
/// rendered. Returns `None` when the model output defies parsing.
async fn vision_pass(
    config: &Config,
    http: &reqwest::Client,
    model: &str,
    path: &Path,
) -> Result<Option<ExtrahierteDaten>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = if ext == "pdf" {
        pdf::render_first_page_jpeg(path, pdf::VISION_DPI).await?
    } else {
        tokio::fs::read(path).await?
    };
    let encoded = BASE64.encode(&bytes);

    let raw = llm::generate(
        http,
        &config.ollama_url,
        GenerateRequest {
            model,
            prompt: prompts::VISION_PROMPT,
            images: Some(vec![encoded]),
            temperature: 0.1,
            num_predict: 512,
            timeout: llm::VISION_TIMEOUT,
        },
    )
    .await?;

    let Some(value) = json_repair::recover_json(&raw) else {
        return Ok(None);
    };
    let (mut fields, _) = unwrap_response(&value);
    clean_fields(&mut fields);
    Ok(Some(coerce_daten(&fields)))
}

/// Fill only fields the text pass left null; never overwrite. Returns
/// whether anything was filled.
fn merge_vision(daten: &mut ExtrahierteDaten, vision: ExtrahierteDaten) -> bool {
    let mut filled = false;

    macro_rules! fill {
        ($field:ident) => {
            if daten.$field.is_none() && vision.$field.is_some() {
                daten.$field = vision.$field;
                filled = true;
            }
        };
    }

    fill!(beleg_typ);
    fill!(aussteller);
    fill!(beschreibung);
    fill!(rechnungsnummer);
    fill!(datum_beleg);
    fill!(betrag_brutto);
    fill!(betrag_netto);
    fill!(mwst_satz);
    fill!(mwst_betrag);
    filled
}

// ---------------------------------------------------------------------------
// Confidence scoring
// ---------------------------------------------------------------------------

/// Tier from populated key fields (K) and grounded key fields (G).
/// Kassenbons carry less text, so their bar is lower.
fn assess_konfidenz(daten: &ExtrahierteDaten, spans: &[SourceSpan]) -> Konfidenz {
    let populated = [
        daten.beleg_typ.is_some(),
        daten.betrag_brutto.is_some(),
        daten.aussteller.is_some(),
        daten.datum_beleg.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();

    let span_fields: HashSet<&str> = spans.iter().map(|s| s.feld.as_str()).collect();
    let grounded = ["betrag_brutto", "aussteller", "datum_beleg"]
        .into_iter()
        .filter(|feld| span_fields.contains(feld))
        .count();

    if daten.beleg_typ.as_deref() == Some("kassenbon") {
        if populated >= 3 && grounded >= 1 {
            Konfidenz::Hoch
        } else if populated >= 2 {
            Konfidenz::Mittel
        } else {
            Konfidenz::Niedrig
        }
    } else if populated >= 4 && grounded >= 2 {
        Konfidenz::Hoch
    } else if populated >= 2 {
        Konfidenz::Mittel
    } else {
        Konfidenz::Niedrig
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_splits_values_and_quotes() {
        let value = json!({
            "betrag_brutto": {"wert": 1877.82, "quelle": "Brutto: 1.877,82 €"},
            "beleg_typ": {"wert": "handwerkerrechnung", "quelle": null},
            "mwst_satz": 19
        });
        let (fields, quotes) = unwrap_response(&value);
        assert_eq!(fields["betrag_brutto"], json!(1877.82));
        assert_eq!(fields["beleg_typ"], json!("handwerkerrechnung"));
        assert_eq!(fields["mwst_satz"], json!(19));
        assert_eq!(quotes["betrag_brutto"], "Brutto: 1.877,82 €");
        assert!(!quotes.contains_key("beleg_typ"));
    }

    #[test]
    fn sentinels_become_null() {
        let mut fields = json!({
            "aussteller": "nicht angegeben",
            "rechnungsnummer": "  N/A ",
            "beschreibung": "Anstricharbeiten"
        })
        .as_object()
        .unwrap()
        .clone();
        clean_fields(&mut fields);
        assert!(fields["aussteller"].is_null());
        assert!(fields["rechnungsnummer"].is_null());
        assert_eq!(fields["beschreibung"], json!("Anstricharbeiten"));
    }

    #[test]
    fn zero_is_null_only_on_optional_money_fields() {
        let mut fields = json!({
            "betrag_brutto": 0.0,
            "betrag_netto": 0.0,
            "mwst_betrag": 0,
            "arbeitskosten_35a": 0.0
        })
        .as_object()
        .unwrap()
        .clone();
        clean_fields(&mut fields);
        assert_eq!(fields["betrag_brutto"], json!(0.0));
        assert!(fields["betrag_netto"].is_null());
        assert!(fields["mwst_betrag"].is_null());
        assert!(fields["arbeitskosten_35a"].is_null());
    }

    #[test]
    fn amounts_parse_from_german_and_latin_spellings() {
        assert_eq!(parse_amount(&json!(1877.82)), Some(1877.82));
        assert_eq!(parse_amount(&json!("1.877,82")), Some(1877.82));
        assert_eq!(parse_amount(&json!("1877.82")), Some(1877.82));
        assert_eq!(parse_amount(&json!("292,60")), Some(292.60));
        assert_eq!(parse_amount(&json!("19")), Some(19.0));
        assert_eq!(parse_amount(&json!("1.877,82 €")), Some(1877.82));
        assert_eq!(parse_amount(&json!("unbezifferbar")), None);
    }

    #[test]
    fn number_variants_cover_the_common_spellings() {
        let variants = number_variants(1877.82);
        assert!(variants.contains(&"1877.82".to_string()));
        assert!(variants.contains(&"1877,82".to_string()));
        assert!(variants.contains(&"1.877,82".to_string()));

        let rate = number_variants(19.0);
        assert!(rate.contains(&"19".to_string()));
        assert!(rate.contains(&"19,00".to_string()));
    }

    #[test]
    fn german_grouping_handles_millions() {
        assert_eq!(format_german_number(1234567.5), "1.234.567,50");
        assert_eq!(format_german_number(500.0), "500,00");
    }

    #[test]
    fn fallback_grounds_amounts_in_german_spelling() {
        let text = "Anstricharbeiten\nBrutto: 1.877,82 €\nDatum: 15.03.2024";
        let daten = ExtrahierteDaten {
            betrag_brutto: Some(1877.82),
            datum_beleg: Some("15.03.2024".to_string()),
            ..Default::default()
        };
        let mut spans = Vec::new();
        fallback_spans(text, &daten, &mut spans);

        let brutto = spans.iter().find(|s| s.feld == "betrag_brutto").unwrap();
        assert_eq!(&text[brutto.start..brutto.end], "1.877,82");
        let datum = spans.iter().find(|s| s.feld == "datum_beleg").unwrap();
        assert_eq!(datum.text, "15.03.2024");
    }

    #[test]
    fn fallback_issuer_matches_across_line_breaks() {
        let text = "Malermeister\nSchmidt GmbH & Co. KG\nHauptstr. 12";
        let daten = ExtrahierteDaten {
            aussteller: Some("Malermeister Schmidt GmbH".to_string()),
            ..Default::default()
        };
        let mut spans = Vec::new();
        fallback_spans(text, &daten, &mut spans);

        let span = spans.iter().find(|s| s.feld == "aussteller").unwrap();
        assert_eq!(span.text, "Malermeister\nSchmidt");
    }

    #[test]
    fn already_grounded_fields_are_skipped() {
        let text = "Summe 7,77";
        let daten = ExtrahierteDaten {
            betrag_brutto: Some(7.77),
            ..Default::default()
        };
        let mut spans = vec![SourceSpan {
            start: 0,
            end: 10,
            text: "Summe 7,77".to_string(),
            feld: "betrag_brutto".to_string(),
            bbox: None,
        }];
        fallback_spans(text, &daten, &mut spans);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn vision_merge_never_overwrites() {
        let mut daten = ExtrahierteDaten {
            betrag_brutto: Some(7.77),
            beleg_typ: Some("kassenbon".to_string()),
            ..Default::default()
        };
        let vision = ExtrahierteDaten {
            betrag_brutto: Some(9.99),
            aussteller: Some("REWE Markt GmbH".to_string()),
            ..Default::default()
        };
        assert!(merge_vision(&mut daten, vision));
        assert_eq!(daten.betrag_brutto, Some(7.77));
        assert_eq!(daten.aussteller.as_deref(), Some("REWE Markt GmbH"));
    }

    #[test]
    fn vision_merge_reports_when_nothing_fills() {
        let mut daten = ExtrahierteDaten {
            betrag_brutto: Some(7.77),
            ..Default::default()
        };
        let vision = ExtrahierteDaten {
            betrag_brutto: Some(9.99),
            ..Default::default()
        };
        assert!(!merge_vision(&mut daten, vision));
    }

    fn span_for(feld: &str) -> SourceSpan {
        SourceSpan {
            start: 0,
            end: 1,
            text: "x".to_string(),
            feld: feld.to_string(),
            bbox: None,
        }
    }

    #[test]
    fn full_invoice_with_grounding_scores_high() {
        let daten = ExtrahierteDaten {
            beleg_typ: Some("handwerkerrechnung".to_string()),
            betrag_brutto: Some(1877.82),
            aussteller: Some("Malermeister Schmidt GmbH".to_string()),
            datum_beleg: Some("15.03.2024".to_string()),
            ..Default::default()
        };
        let spans = vec![span_for("betrag_brutto"), span_for("aussteller")];
        assert_eq!(assess_konfidenz(&daten, &spans), Konfidenz::Hoch);
    }

    #[test]
    fn kassenbon_needs_less_to_score_high() {
        let daten = ExtrahierteDaten {
            beleg_typ: Some("kassenbon".to_string()),
            betrag_brutto: Some(7.77),
            datum_beleg: Some("12.03.2024".to_string()),
            ..Default::default()
        };
        let spans = vec![span_for("betrag_brutto")];
        assert_eq!(assess_konfidenz(&daten, &spans), Konfidenz::Hoch);

        // The general rule would only reach mittel here.
        let mut rechnung = daten.clone();
        rechnung.beleg_typ = Some("rechnung".to_string());
        assert_eq!(assess_konfidenz(&rechnung, &spans), Konfidenz::Mittel);
    }

    #[test]
    fn sparse_fields_score_low() {
        let daten = ExtrahierteDaten {
            beschreibung: Some("unleserlich".to_string()),
            ..Default::default()
        };
        assert_eq!(assess_konfidenz(&daten, &[]), Konfidenz::Niedrig);
    }

    #[test]
    fn ungrounded_but_complete_scores_medium() {
        let daten = ExtrahierteDaten {
            beleg_typ: Some("rechnung".to_string()),
            betrag_brutto: Some(100.0),
            aussteller: Some("X GmbH".to_string()),
            datum_beleg: Some("01.02.2024".to_string()),
            ..Default::default()
        };
        assert_eq!(assess_konfidenz(&daten, &[]), Konfidenz::Mittel);
    }

    #[test]
    fn tradesman_invoice_grounds_every_quoted_field() {
        let ocr_text = "Rechnung Nr. 2024-0815\nMalermeister Schmidt GmbH\n\
                        Arbeitskosten netto: 1.315,00 €\nBrutto: 1.877,82 €\nDatum: 15.03.2024";
        let response = json!({
            "betrag_brutto": {"wert": 1877.82, "quelle": "Brutto: 1.877,82 €"},
            "arbeitskosten_35a": {"wert": 1315.00, "quelle": "Arbeitskosten netto: 1.315,00 €"},
            "aussteller": {"wert": "Malermeister Schmidt GmbH", "quelle": "Malermeister Schmidt GmbH"},
            "datum_beleg": {"wert": "15.03.2024", "quelle": "Datum: 15.03.2024"},
            "beleg_typ": {"wert": "handwerkerrechnung", "quelle": null}
        });

        let (mut fields, quotes) = unwrap_response(&response);
        clean_fields(&mut fields);
        let daten = coerce_daten(&fields);
        let mut spans = ground_quotes(ocr_text, &quotes);
        fallback_spans(ocr_text, &daten, &mut spans);

        assert_eq!(daten.beleg_typ.as_deref(), Some("handwerkerrechnung"));
        assert_eq!(daten.betrag_brutto, Some(1877.82));
        assert_eq!(daten.arbeitskosten_35a, Some(1315.0));

        assert_eq!(spans.len(), 4);
        for span in &spans {
            assert_eq!(&ocr_text[span.start..span.end], span.text);
        }

        let k = crate::kontierung::auto_kontierung(daten.beleg_typ.as_deref().unwrap(), None);
        assert_eq!(k.skr03_konto, "4946");
        assert_eq!(assess_konfidenz(&daten, &spans), Konfidenz::Hoch);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "äöü".repeat(10);
        assert_eq!(truncate_chars(&s, 5), "äöüäö");
        assert_eq!(truncate_chars("kurz", 4000), "kurz");
    }
}
