//! DATEV integration via the Maesn REST bridge, with a Buchungsstapel CSV
//! export as fallback for non-Maesn users.
//!
//! The bridge combines the Belegbild upload with a Buchungsvorschlag built
//! from the extracted fields; the provenance spans travel along as
//! metadata so the Steuerberater can audit every value in DUO. Every
//! attempt is written to the sync log, success or not.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::config::Config;
use crate::models::Beleg;

const BRIDGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Outcome of one bridge upload attempt.
#[derive(Debug, Clone)]
pub struct UploadErgebnis {
    pub success: bool,
    pub datev_document_id: Option<String>,
    pub datev_booking_id: Option<String>,
    pub error: Option<String>,
}

pub fn is_configured(config: &Config) -> bool {
    !config.maesn_api_key.is_empty()
}

/// Probe the bridge. Never errors — connectivity is reported as data.
pub async fn test_connection(config: &Config, http: &reqwest::Client) -> Value {
    if !is_configured(config) {
        return json!({ "connected": false, "error": "MAESN_API_KEY nicht konfiguriert" });
    }
    let url = format!("{}/health", config.maesn_api_url.trim_end_matches('/'));
    match http
        .get(&url)
        .bearer_auth(&config.maesn_api_key)
        .header("X-Sandbox", config.maesn_sandbox.to_string())
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
    {
        Ok(resp) => json!({ "connected": resp.status().is_success(), "status": resp.status().as_u16() }),
        Err(e) => json!({ "connected": false, "error": e.to_string() }),
    }
}

/// Upload one Beleg (file + Buchungsvorschlag + provenance metadata).
pub async fn upload_beleg(
    config: &Config,
    http: &reqwest::Client,
    beleg: &Beleg,
    company_id: &str,
) -> UploadErgebnis {
    if !is_configured(config) {
        return failed("Maesn nicht konfiguriert");
    }

    let file_bytes = match tokio::fs::read(&beleg.dateipfad).await {
        Ok(bytes) => bytes,
        Err(_) => return failed(&format!("Datei nicht gefunden: {}", beleg.dateipfad)),
    };

    let payload = build_payload(beleg, company_id);

    let form = reqwest::multipart::Form::new()
        .text("payload", payload.to_string())
        .part(
            "file",
            reqwest::multipart::Part::bytes(file_bytes).file_name(beleg.dateiname.clone()),
        );

    let url = format!("{}/documents", config.maesn_api_url.trim_end_matches('/'));
    let resp = match http
        .post(&url)
        .bearer_auth(&config.maesn_api_key)
        .header("X-Sandbox", config.maesn_sandbox.to_string())
        .timeout(BRIDGE_TIMEOUT)
        .multipart(form)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => return failed(&e.to_string()),
    };

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return failed(&format!("HTTP {}: {}", status.as_u16(), body));
    }

    let body: Value = match resp.json().await {
        Ok(body) => body,
        Err(e) => return failed(&format!("ungültige Antwort: {e}")),
    };

    UploadErgebnis {
        success: true,
        datev_document_id: body["id"].as_str().map(str::to_string),
        datev_booking_id: body["booking_proposal_id"].as_str().map(str::to_string),
        error: None,
    }
}

fn failed(error: &str) -> UploadErgebnis {
    UploadErgebnis {
        success: false,
        datev_document_id: None,
        datev_booking_id: None,
        error: Some(error.to_string()),
    }
}

/// The Maesn document payload: file metadata, Buchungsvorschlag and the
/// source-grounding metadata block.
fn build_payload(beleg: &Beleg, company_id: &str) -> Value {
    let mut payload = json!({
        "company_id": company_id,
        "document": {
            "filename": beleg.dateiname,
            "category": map_beleg_typ(beleg.beleg_typ.as_deref()),
        },
        "booking_proposal": {
            "amount": beleg.betrag_brutto,
            "amount_net": beleg.betrag_netto,
            "tax_rate": beleg.mwst_satz,
            "tax_amount": beleg.mwst_betrag,
            "date": format_date_iso(beleg.datum_beleg.as_deref()),
            "description": beleg.beschreibung.as_deref().unwrap_or(""),
            "vendor": beleg.aussteller.as_deref().unwrap_or(""),
            "invoice_number": beleg.rechnungsnummer,
            "account": beleg.skr03_konto,
            "counter_account": beleg.gegenkonto,
            "bu_code": beleg.bu_schluessel,
            "cost_center": beleg.kostenstelle,
            "tax_category": beleg.steuer_kategorie,
        },
    });

    if let Some(spans) = &beleg.quellreferenzen {
        payload["metadata"] = json!({
            "source_grounding": spans,
            "extraction_method": beleg.extraktion_methode.as_deref().unwrap_or("belegsync"),
            "extraction_confidence": beleg.extraktion_konfidenz.as_deref().unwrap_or("mittel"),
            "belegsync_version": env!("CARGO_PKG_VERSION"),
        });
    }
    payload
}

/// Map a Belegtyp to the Maesn/DATEV document category.
fn map_beleg_typ(typ: Option<&str>) -> &'static str {
    match typ {
        Some("rechnung" | "handwerkerrechnung" | "arztrechnung") => "incoming_invoice",
        Some("lohnsteuerbescheinigung") => "payroll",
        Some("spendenbescheinigung") => "donation_receipt",
        Some("versicherungsnachweis") => "insurance",
        Some("kontoauszug") => "bank_statement",
        Some("nebenkostenabrechnung") => "utility_bill",
        Some("fahrtkosten") => "travel_expense",
        Some("bewirtungsbeleg") => "entertainment",
        Some("kassenbon") => "cash_receipt",
        _ => "other",
    }
}

/// TT.MM.JJJJ -> YYYY-MM-DD; anything else passes through unchanged.
fn format_date_iso(datum: Option<&str>) -> Option<String> {
    let datum = datum?;
    let normalized = datum.replace('-', ".");
    let parts: Vec<&str> = normalized.split('.').collect();
    if parts.len() == 3 {
        return Some(format!("{}-{:0>2}-{:0>2}", parts[2], parts[1], parts[0]));
    }
    Some(datum.to_string())
}

// ---------------------------------------------------------------------------
// Buchungsstapel CSV export
// ---------------------------------------------------------------------------

/// Fixed DATEV Buchungsstapel column set.
const CSV_HEADER: [&str; 14] = [
    "Umsatz (ohne Soll/Haben-Kz)",
    "Soll/Haben-Kennzeichen",
    "WKZ Umsatz",
    "Kurs",
    "Basis-Umsatz",
    "WKZ Basis-Umsatz",
    "Konto",
    "Gegenkonto (ohne BU-Schlüssel)",
    "BU-Schlüssel",
    "Belegdatum",
    "Belegfeld 1",
    "Belegfeld 2",
    "Skonto",
    "Buchungstext",
];

/// Render the Buchungsstapel CSV: one metadata line identifying the batch,
/// the 14-column header, then one quoted, semicolon-separated row per
/// Beleg that carries a gross amount.
pub fn generate_buchungsstapel_csv(
    belege: &[Beleg],
    mandant_name: &str,
    jahr: i32,
    erstellt: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    let stamp = erstellt.format("%Y%m%d%H%M%S");
    out.push_str(&format!(
        "\"EXTF\";700;21;\"Buchungsstapel\";12;{stamp};;\"BelegSync\";\"\";\"\";\"\";{jahr}0101;4;{jahr}1231;\"{mandant_name}\";\"\";1;;\"\";\"\"\n",
    ));

    out.push_str(&CSV_HEADER.map(quote).join(";"));
    out.push('\n');

    for beleg in belege {
        let Some(brutto) = beleg.betrag_brutto else { continue };

        let betrag = format!("{:.2}", brutto.abs()).replace('.', ",");
        let soll_haben = if brutto > 0.0 { "S" } else { "H" };
        let datum = beleg
            .datum_beleg
            .as_deref()
            .map(format_date_ddmm)
            .unwrap_or_default();
        let text: String = beleg
            .beschreibung
            .as_deref()
            .or(beleg.aussteller.as_deref())
            .unwrap_or(&beleg.dateiname)
            .chars()
            .take(60)
            .collect();
        let belegfeld_1: String = beleg.dateiname.chars().take(36).collect();

        let row = [
            betrag.as_str(),
            soll_haben,
            "EUR",
            "",
            "",
            "",
            beleg.skr03_konto.as_deref().unwrap_or("4900"),
            beleg.gegenkonto.as_str(),
            beleg.bu_schluessel.as_deref().unwrap_or(""),
            datum.as_str(),
            belegfeld_1.as_str(),
            &beleg.id.to_string(),
            "",
            text.as_str(),
        ];
        out.push_str(&row.map(quote).join(";"));
        out.push('\n');
    }

    out
}

/// DATEV Belegdatum: DDMM.
fn format_date_ddmm(datum: &str) -> String {
    let normalized = datum.replace('-', ".");
    let parts: Vec<&str> = normalized.split('.').collect();
    if parts.len() >= 2 {
        format!("{:0>2}{:0>2}", parts[0], parts[1])
    } else {
        String::new()
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

// ---------------------------------------------------------------------------
// Sync log
// ---------------------------------------------------------------------------

/// Append one immutable audit row per bridge attempt.
pub async fn log_sync_attempt(
    db: &PgPool,
    beleg_id: i64,
    mandant_id: i64,
    aktion: &str,
    success: bool,
    response: Option<&Value>,
    fehler: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO datev_sync_log (beleg_id, mandant_id, aktion, status, response_data, fehler_nachricht) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(beleg_id)
    .bind(mandant_id)
    .bind(aktion)
    .bind(if success { "success" } else { "error" })
    .bind(response)
    .bind(fehler)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn beleg(id: i64, brutto: Option<f64>) -> Beleg {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Beleg {
            id,
            steuerjahr_id: 1,
            dateiname: "rechnung_schmidt.pdf".to_string(),
            dateipfad: "/tmp/rechnung_schmidt.pdf".to_string(),
            dateityp: Some("pdf".to_string()),
            dateigroesse: Some(1024),
            ocr_text: None,
            ocr_daten: None,
            ocr_konfidenz: None,
            status: "extrahiert".to_string(),
            beleg_typ: Some("handwerkerrechnung".to_string()),
            extrahierte_daten: None,
            quellreferenzen: None,
            extraktion_methode: Some("ollama_direkt".to_string()),
            extraktion_konfidenz: Some("hoch".to_string()),
            betrag_brutto: brutto,
            betrag_netto: Some(1540.0),
            mwst_satz: Some(19.0),
            mwst_betrag: Some(292.6),
            datum_beleg: Some("15.03.2024".to_string()),
            aussteller: Some("Malermeister Schmidt GmbH".to_string()),
            beschreibung: Some("Anstricharbeiten Wohnzimmer".to_string()),
            rechnungsnummer: Some("2024-0815".to_string()),
            skr03_konto: Some("4946".to_string()),
            skr03_bezeichnung: Some("Fremdleistungen".to_string()),
            gegenkonto: "1200".to_string(),
            kostenstelle: None,
            bu_schluessel: Some("3".to_string()),
            steuer_kategorie: Some("Handwerkerleistungen §35a".to_string()),
            paragraph_35a_anteil: Some(1315.0),
            materialkosten: Some(340.0),
            datev_sync_status: None,
            datev_sync_at: None,
            datev_sync_id: None,
            datev_buchungsvorschlag_id: None,
            manuell_geprueft: true,
            pruefnotiz: None,
            erstellt_am: now,
            aktualisiert_am: now,
        }
    }

    #[test]
    fn iso_dates_convert_from_german_format() {
        assert_eq!(format_date_iso(Some("15.03.2024")), Some("2024-03-15".to_string()));
        assert_eq!(format_date_iso(Some("1.3.2024")), Some("2024-03-01".to_string()));
        assert_eq!(format_date_iso(Some("2024")), Some("2024".to_string()));
        assert_eq!(format_date_iso(None), None);
    }

    #[test]
    fn belegtyp_maps_to_bridge_categories() {
        assert_eq!(map_beleg_typ(Some("handwerkerrechnung")), "incoming_invoice");
        assert_eq!(map_beleg_typ(Some("spendenbescheinigung")), "donation_receipt");
        assert_eq!(map_beleg_typ(Some("irgendwas")), "other");
        assert_eq!(map_beleg_typ(None), "other");
    }

    #[test]
    fn payload_carries_the_provenance_metadata() {
        let mut b = beleg(7, Some(1877.82));
        b.quellreferenzen = Some(serde_json::json!([
            {"start": 0, "end": 18, "text": "Brutto: 1.877,82 €", "feld": "betrag_brutto"}
        ]));
        let payload = build_payload(&b, "company-1");
        assert_eq!(payload["company_id"], "company-1");
        assert_eq!(payload["booking_proposal"]["amount"], 1877.82);
        assert_eq!(payload["booking_proposal"]["date"], "2024-03-15");
        assert_eq!(payload["metadata"]["extraction_confidence"], "hoch");
        assert_eq!(payload["metadata"]["source_grounding"][0]["feld"], "betrag_brutto");
    }

    #[test]
    fn payload_without_spans_has_no_metadata_block() {
        let payload = build_payload(&beleg(7, Some(10.0)), "c");
        assert!(payload.get("metadata").is_none());
    }

    #[test]
    fn csv_has_metadata_line_header_and_quoted_rows() {
        let erstellt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let csv = generate_buchungsstapel_csv(&[beleg(7, Some(1877.82))], "Muster GmbH", 2024, erstellt);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"EXTF\";700;21;\"Buchungsstapel\";12;20240601120000"));
        assert!(lines[0].contains("20240101;4;20241231;\"Muster GmbH\""));
        assert!(lines[1].starts_with("\"Umsatz (ohne Soll/Haben-Kz)\";"));
        assert_eq!(lines[1].split(';').count(), 14);

        let row: Vec<&str> = lines[2].split(';').collect();
        assert_eq!(row[0], "\"1877,82\"");
        assert_eq!(row[1], "\"S\"");
        assert_eq!(row[2], "\"EUR\"");
        assert_eq!(row[6], "\"4946\"");
        assert_eq!(row[7], "\"1200\"");
        assert_eq!(row[8], "\"3\"");
        assert_eq!(row[9], "\"1503\"");
        assert_eq!(row[11], "\"7\"");
        assert_eq!(row[13], "\"Anstricharbeiten Wohnzimmer\"");
    }

    #[test]
    fn negative_amounts_book_haben() {
        let erstellt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let csv = generate_buchungsstapel_csv(&[beleg(1, Some(-50.0))], "M", 2024, erstellt);
        let row: Vec<&str> = csv.lines().nth(2).unwrap().split(';').collect();
        assert_eq!(row[0], "\"50,00\"");
        assert_eq!(row[1], "\"H\"");
    }

    #[test]
    fn belege_without_amount_are_skipped() {
        let erstellt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let csv = generate_buchungsstapel_csv(&[beleg(1, None)], "M", 2024, erstellt);
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote(r#"Restaurant "Zur Post""#), r#""Restaurant ""Zur Post""""#);
    }
}
