use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// DB row types
// ---------------------------------------------------------------------------

/// Mandant — a tax advisor's client. Owns Steuerjahre.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Mandant {
    pub id: i64,
    pub name: String,
    pub firma: Option<String>,
    pub steuernummer: Option<String>,
    pub steuer_id: Option<String>,
    pub email: Option<String>,
    pub telefon: Option<String>,
    pub adresse: Option<String>,
    pub notizen: Option<String>,
    pub aktiv: bool,
    pub maesn_company_id: Option<String>,
    pub datev_berater_nr: Option<String>,
    pub datev_mandant_nr: Option<String>,
    pub erstellt_am: chrono::DateTime<chrono::Utc>,
    pub aktualisiert_am: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Steuerjahr {
    pub id: i64,
    pub mandant_id: i64,
    pub jahr: i32,
    pub status: String,
    pub notizen: Option<String>,
    pub erstellt_am: chrono::DateTime<chrono::Utc>,
}

/// Beleg — the central entity: one uploaded receipt and everything the
/// pipeline derived from it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Beleg {
    pub id: i64,
    pub steuerjahr_id: i64,

    // Datei
    pub dateiname: String,
    pub dateipfad: String,
    pub dateityp: Option<String>,
    pub dateigroesse: Option<i64>,

    // OCR
    pub ocr_text: Option<String>,
    /// Word-level geometry, serialized `{"pages": [...]}` (see [`OcrPage`]).
    pub ocr_daten: Option<Value>,
    pub ocr_konfidenz: Option<f64>,

    pub status: String,

    // Extraktion
    pub beleg_typ: Option<String>,
    pub extrahierte_daten: Option<Value>,
    /// Source-grounding spans (see [`SourceSpan`]).
    pub quellreferenzen: Option<Value>,
    pub extraktion_methode: Option<String>,
    pub extraktion_konfidenz: Option<String>,

    // Steuerliche Daten
    pub betrag_brutto: Option<f64>,
    pub betrag_netto: Option<f64>,
    pub mwst_satz: Option<f64>,
    pub mwst_betrag: Option<f64>,
    pub datum_beleg: Option<String>,
    pub aussteller: Option<String>,
    pub beschreibung: Option<String>,
    pub rechnungsnummer: Option<String>,

    // Kontierung (SKR03)
    pub skr03_konto: Option<String>,
    pub skr03_bezeichnung: Option<String>,
    pub gegenkonto: String,
    pub kostenstelle: Option<String>,
    pub bu_schluessel: Option<String>,

    pub steuer_kategorie: Option<String>,
    pub paragraph_35a_anteil: Option<f64>,
    pub materialkosten: Option<f64>,

    // DATEV Sync
    pub datev_sync_status: Option<String>,
    pub datev_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub datev_sync_id: Option<String>,
    pub datev_buchungsvorschlag_id: Option<String>,

    // Pruefung
    pub manuell_geprueft: bool,
    pub pruefnotiz: Option<String>,

    pub erstellt_am: chrono::DateTime<chrono::Utc>,
    pub aktualisiert_am: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct DatevSyncLogEintrag {
    pub id: i64,
    pub beleg_id: Option<i64>,
    pub mandant_id: Option<i64>,
    pub aktion: Option<String>,
    pub status: Option<String>,
    pub fehler_nachricht: Option<String>,
    pub erstellt_am: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// Pipeline status
// ---------------------------------------------------------------------------

/// Pipeline states of a Beleg. Stored as strings in the DB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BelegStatus {
    Hochgeladen,
    OcrLaeuft,
    OcrFertig,
    ExtraktionLaeuft,
    Extrahiert,
    Geprueft,
    AnDatev,
    Fehler,
}

impl BelegStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BelegStatus::Hochgeladen => "hochgeladen",
            BelegStatus::OcrLaeuft => "ocr_laeuft",
            BelegStatus::OcrFertig => "ocr_fertig",
            BelegStatus::ExtraktionLaeuft => "extraktion_laeuft",
            BelegStatus::Extrahiert => "extrahiert",
            BelegStatus::Geprueft => "geprueft",
            BelegStatus::AnDatev => "an_datev",
            BelegStatus::Fehler => "fehler",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "hochgeladen" => BelegStatus::Hochgeladen,
            "ocr_laeuft" => BelegStatus::OcrLaeuft,
            "ocr_fertig" => BelegStatus::OcrFertig,
            "extraktion_laeuft" => BelegStatus::ExtraktionLaeuft,
            "extrahiert" => BelegStatus::Extrahiert,
            "geprueft" => BelegStatus::Geprueft,
            "an_datev" => BelegStatus::AnDatev,
            "fehler" => BelegStatus::Fehler,
            _ => return None,
        })
    }

    /// Legal state-machine arrows. `hochgeladen` is additionally reachable
    /// from any state via an explicit reprocess.
    pub fn can_transition_to(self, next: BelegStatus) -> bool {
        use BelegStatus::*;
        matches!(
            (self, next),
            (Hochgeladen, OcrLaeuft)
                | (OcrLaeuft, OcrFertig)
                | (OcrLaeuft, Fehler)
                | (OcrFertig, ExtraktionLaeuft)
                | (ExtraktionLaeuft, Extrahiert)
                | (ExtraktionLaeuft, Fehler)
                | (Extrahiert, Geprueft)
                | (Geprueft, AnDatev)
        )
    }
}

// ---------------------------------------------------------------------------
// Extraction confidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Konfidenz {
    Hoch,
    Mittel,
    Niedrig,
}

impl Konfidenz {
    pub fn as_str(self) -> &'static str {
        match self {
            Konfidenz::Hoch => "hoch",
            Konfidenz::Mittel => "mittel",
            Konfidenz::Niedrig => "niedrig",
        }
    }
}

// ---------------------------------------------------------------------------
// OCR geometry
// ---------------------------------------------------------------------------

/// One recognized word with its box in the *original* image's pixel space
/// and its byte interval into the assembled full text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub conf: f64,
    pub char_start: usize,
    pub char_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub words: Vec<OcrWord>,
}

// ---------------------------------------------------------------------------
// Source grounding
// ---------------------------------------------------------------------------

/// Union box of the OCR words a span covers, in original pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SpanBBox {
    pub page: u32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// One provenance span: `text == full_text[start..end]`, `feld` names the
/// structured field the span justifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub feld: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<SpanBBox>,
}

// ---------------------------------------------------------------------------
// Extracted fields (normalized LLM output)
// ---------------------------------------------------------------------------

/// The structured fields the extractor produces. All optional — the cleaner
/// nulls out sentinels and zero-valued optional money fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtrahierteDaten {
    pub beleg_typ: Option<String>,
    pub aussteller: Option<String>,
    pub beschreibung: Option<String>,
    pub rechnungsnummer: Option<String>,
    pub datum_beleg: Option<String>,
    pub betrag_brutto: Option<f64>,
    pub betrag_netto: Option<f64>,
    pub mwst_satz: Option<f64>,
    pub mwst_betrag: Option<f64>,
    pub arbeitskosten_35a: Option<f64>,
    pub materialkosten: Option<f64>,
    pub steuer_kategorie: Option<String>,
    pub skr03_konto: Option<String>,
    pub skr03_bezeichnung: Option<String>,
    pub bu_schluessel: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MandantCreate {
    pub name: String,
    pub firma: Option<String>,
    pub steuernummer: Option<String>,
    pub steuer_id: Option<String>,
    pub email: Option<String>,
    pub telefon: Option<String>,
    pub adresse: Option<String>,
    pub notizen: Option<String>,
    pub datev_berater_nr: Option<String>,
    pub datev_mandant_nr: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MandantUpdate {
    pub name: Option<String>,
    pub firma: Option<String>,
    pub steuernummer: Option<String>,
    pub steuer_id: Option<String>,
    pub email: Option<String>,
    pub telefon: Option<String>,
    pub adresse: Option<String>,
    pub notizen: Option<String>,
    pub aktiv: Option<bool>,
    pub maesn_company_id: Option<String>,
    pub datev_berater_nr: Option<String>,
    pub datev_mandant_nr: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MandantResponse {
    #[serde(flatten)]
    pub mandant: Mandant,
    pub anzahl_steuerjahre: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SteuerjahrCreate {
    pub mandant_id: i64,
    pub jahr: i32,
    pub notizen: Option<String>,
}

/// Missing-document report for one Steuerjahr.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct Vollstaendigkeit {
    pub fehlende: Vec<String>,
    pub vorhandene: Vec<String>,
    pub empfehlungen: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SteuerjahrResponse {
    #[serde(flatten)]
    pub steuerjahr: Steuerjahr,
    pub anzahl_belege: i64,
    pub belege_geprueft: i64,
    pub belege_synced: i64,
    pub summe_brutto: f64,
    pub vollstaendigkeit: Vollstaendigkeit,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BelegUpdate {
    pub beleg_typ: Option<String>,
    pub betrag_brutto: Option<f64>,
    pub betrag_netto: Option<f64>,
    pub mwst_satz: Option<f64>,
    pub mwst_betrag: Option<f64>,
    pub datum_beleg: Option<String>,
    pub aussteller: Option<String>,
    pub beschreibung: Option<String>,
    pub rechnungsnummer: Option<String>,
    pub skr03_konto: Option<String>,
    pub skr03_bezeichnung: Option<String>,
    pub gegenkonto: Option<String>,
    pub bu_schluessel: Option<String>,
    pub kostenstelle: Option<String>,
    pub steuer_kategorie: Option<String>,
    pub paragraph_35a_anteil: Option<f64>,
    pub manuell_geprueft: Option<bool>,
    pub pruefnotiz: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DatevSyncRequest {
    pub steuerjahr_id: i64,
    #[serde(default = "default_nur_gepruefte")]
    pub nur_gepruefte: bool,
}

fn default_nur_gepruefte() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub mandanten_aktiv: i64,
    pub belege_gesamt: i64,
    pub belege_offen: i64,
    pub belege_geprueft: i64,
    pub belege_synced: i64,
    pub belege_fehler: i64,
    pub summe_brutto: f64,
    pub extraktion_rate: f64,
    pub datev_sync_rate: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for s in [
            BelegStatus::Hochgeladen,
            BelegStatus::OcrLaeuft,
            BelegStatus::OcrFertig,
            BelegStatus::ExtraktionLaeuft,
            BelegStatus::Extrahiert,
            BelegStatus::Geprueft,
            BelegStatus::AnDatev,
            BelegStatus::Fehler,
        ] {
            assert_eq!(BelegStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BelegStatus::parse("unbekannt"), None);
    }

    #[test]
    fn transitions_follow_the_pipeline_arrows() {
        use BelegStatus::*;
        assert!(Hochgeladen.can_transition_to(OcrLaeuft));
        assert!(OcrLaeuft.can_transition_to(OcrFertig));
        assert!(OcrLaeuft.can_transition_to(Fehler));
        assert!(OcrFertig.can_transition_to(ExtraktionLaeuft));
        assert!(ExtraktionLaeuft.can_transition_to(Extrahiert));
        assert!(ExtraktionLaeuft.can_transition_to(Fehler));
        assert!(Extrahiert.can_transition_to(Geprueft));
        assert!(Geprueft.can_transition_to(AnDatev));

        // No shortcuts.
        assert!(!Hochgeladen.can_transition_to(Extrahiert));
        assert!(!OcrFertig.can_transition_to(Extrahiert));
        assert!(!Extrahiert.can_transition_to(AnDatev));
        assert!(!Fehler.can_transition_to(OcrLaeuft));
    }

    #[test]
    fn span_without_bbox_serializes_without_the_key() {
        let span = SourceSpan {
            start: 3,
            end: 11,
            text: "Beispiel".to_string(),
            feld: "aussteller".to_string(),
            bbox: None,
        };
        let json = serde_json::to_value(&span).unwrap();
        assert!(json.get("bbox").is_none());
    }
}
