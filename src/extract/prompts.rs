//! Prompt contracts for the extraction models.
//!
//! The text prompt demands one source quote per field (`quelle`), which is
//! what makes the provenance trail possible. The vision prompt is the
//! stricter, shorter variant without the grounding requirement — a vision
//! model has no OCR text to quote from.

/// Text-extraction contract: JSON only, `{"wert", "quelle"}` per field,
/// German number normalization, `TT.MM.JJJJ` dates, explicit null.
pub const EXTRACTION_PROMPT: &str = r#"Du bist ein Experte für deutsche Steuerdokumente. Analysiere den OCR-Text und extrahiere als JSON.

NUR valides JSON, kein anderer Text. Jeder Wert ist ein Objekt {"wert": ..., "quelle": ...}, wobei "quelle" das WÖRTLICHE Zitat aus dem OCR-Text ist, aus dem der Wert stammt. Bei abgeleiteten Feldern (beleg_typ, steuer_kategorie, skr03_konto) darf "quelle" null sein.

{
  "beleg_typ": {"wert": "rechnung|handwerkerrechnung|lohnsteuerbescheinigung|spendenbescheinigung|versicherungsnachweis|kontoauszug|nebenkostenabrechnung|arztrechnung|fahrtkosten|bewirtungsbeleg|kassenbon|sonstig", "quelle": null},
  "aussteller": {"wert": "Name", "quelle": "Zitat"},
  "beschreibung": {"wert": "Kurzbeschreibung", "quelle": "Zitat"},
  "betrag_brutto": {"wert": 0.00, "quelle": "Zitat"},
  "betrag_netto": {"wert": 0.00, "quelle": "Zitat"},
  "mwst_satz": {"wert": 19, "quelle": "Zitat"},
  "mwst_betrag": {"wert": 0.00, "quelle": "Zitat"},
  "datum_beleg": {"wert": "TT.MM.JJJJ", "quelle": "Zitat"},
  "rechnungsnummer": {"wert": "falls vorhanden", "quelle": "Zitat"},
  "steuer_kategorie": {"wert": "Werbungskosten|Sonderausgaben|Außergewöhnliche Belastungen|Haushaltsnahe Dienstleistungen §35a|Handwerkerleistungen §35a|Vorsorgeaufwendungen|Spenden und Mitgliedsbeiträge|Einkünfte nichtselbständige Arbeit", "quelle": null},
  "skr03_konto": {"wert": "4-stellig", "quelle": null},
  "arbeitskosten_35a": {"wert": 0.00, "quelle": "Zitat"},
  "materialkosten": {"wert": 0.00, "quelle": "Zitat"}
}

Wichtig: Bei Handwerkerrechnungen und Nebenkostenabrechnungen trenne Arbeitskosten (§35a absetzbar) von Materialkosten (nicht absetzbar). arbeitskosten_35a = nur Lohn-/Arbeitsanteil. materialkosten = Material, Verbrauchsstoffe, Entsorgung etc.
Bei Kassenbons (Supermarkt, Tankstelle): beleg_typ "kassenbon", aussteller = Händlername, betrag_brutto = Summe.
Deutsche Zahlen: 1.234,56 → 1234.56 im JSON. Unbekannte Felder: null.

OCR-TEXT:
"#;

/// Vision contract: shorter field list, no grounding requirement.
pub const VISION_PROMPT: &str = r#"Du siehst das Foto/Scan eines deutschen Steuerbelegs. Extrahiere die sichtbaren Kerndaten als JSON.

NUR valides JSON, kein anderer Text:
{
  "beleg_typ": "rechnung|handwerkerrechnung|lohnsteuerbescheinigung|spendenbescheinigung|versicherungsnachweis|kontoauszug|nebenkostenabrechnung|arztrechnung|fahrtkosten|bewirtungsbeleg|kassenbon|sonstig",
  "aussteller": "Name",
  "beschreibung": "Kurzbeschreibung",
  "betrag_brutto": 0.00,
  "mwst_satz": 19,
  "mwst_betrag": 0.00,
  "datum_beleg": "TT.MM.JJJJ",
  "rechnungsnummer": "falls vorhanden"
}

Deutsche Zahlen: 1.234,56 → 1234.56 im JSON. Unbekannte Felder: null."#;

/// Build the full text prompt for one document.
pub fn build_extraction_prompt(ocr_text: &str) -> String {
    let mut prompt = String::with_capacity(EXTRACTION_PROMPT.len() + ocr_text.len());
    prompt.push_str(EXTRACTION_PROMPT);
    prompt.push_str(ocr_text);
    prompt
}
