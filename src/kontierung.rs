//! Auto-Kontierung (SKR03) and the missing-documents catalog.

use crate::models::Vollstaendigkeit;

/// Result of the deterministic Belegtyp -> SKR03 mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kontierung {
    pub skr03_konto: &'static str,
    pub skr03_bezeichnung: &'static str,
    pub bu_schluessel: String,
}

/// Fixed table: Belegtyp -> (Konto, Bezeichnung, Standard-BU-Schlüssel).
const KONTIERUNG_MAP: &[(&str, &str, &str, &str)] = &[
    ("handwerkerrechnung", "4946", "Fremdleistungen", "3"),
    ("rechnung", "4900", "Sonst. betriebl. Aufwend.", "3"),
    ("spendenbescheinigung", "6300", "Sonst. betriebl. Aufwend.", ""),
    ("bewirtungsbeleg", "4650", "Bewirtungskosten", "3"),
    ("fahrtkosten", "4500", "Fahrzeugkosten", ""),
    ("arztrechnung", "4900", "Sonst. betriebl. Aufwend.", ""),
    ("versicherungsnachweis", "4300", "Versicherungen", ""),
    ("nebenkostenabrechnung", "4210", "Miete", ""),
    ("lohnsteuerbescheinigung", "4120", "Gehälter", ""),
    ("kassenbon", "4900", "Sonst. betriebl. Aufwend.", ""),
];

/// Fallback for unknown kinds: generic operating expense.
const KONTIERUNG_FALLBACK: (&str, &str, &str) = ("4900", "Sonst. betriebl. Aufwend.", "");

/// Map a Belegtyp to its SKR03 account. Total and deterministic. When the
/// table carries no BU-Schlüssel, a known VAT rate derives one.
pub fn auto_kontierung(beleg_typ: &str, mwst_satz: Option<f64>) -> Kontierung {
    let (konto, bezeichnung, bu) = KONTIERUNG_MAP
        .iter()
        .find(|(typ, _, _, _)| *typ == beleg_typ)
        .map(|(_, konto, bez, bu)| (*konto, *bez, *bu))
        .unwrap_or(KONTIERUNG_FALLBACK);

    let mut bu = bu.to_string();
    if bu.is_empty()
        && let Some(satz) = mwst_satz
    {
        if satz >= 15.0 {
            bu = "3".to_string();
        } else if satz >= 5.0 {
            bu = "2".to_string();
        }
    }

    Kontierung { skr03_konto: konto, skr03_bezeichnung: bezeichnung, bu_schluessel: bu }
}

// ---------------------------------------------------------------------------
// Missing-documents detection
// ---------------------------------------------------------------------------

/// Expected document kinds per tax year, by priority tier.
const ERWARTETE_BELEGE: &[(&str, &[(&str, &str)])] = &[
    ("Pflicht", &[("lohnsteuerbescheinigung", "Lohnsteuerbescheinigung")]),
    (
        "Häufig relevant",
        &[
            ("versicherungsnachweis", "Krankenversicherung"),
            ("spendenbescheinigung", "Spendenbescheinigungen"),
            ("handwerkerrechnung", "Handwerkerrechnungen (§35a)"),
            ("nebenkostenabrechnung", "Nebenkostenabrechnung"),
        ],
    ),
    (
        "Prüfen",
        &[
            ("arztrechnung", "Arztrechnungen (außergew. Belastungen)"),
            ("fahrtkosten", "Fahrtkosten (Pendlerpauschale)"),
            ("bewirtungsbeleg", "Bewirtungsbelege"),
        ],
    ),
];

fn tier_icon(prio: &str) -> &'static str {
    match prio {
        "Pflicht" => "🔴",
        "Häufig relevant" => "🟡",
        _ => "🔵",
    }
}

/// Which expected kinds are missing from a tax year, with a prioritized
/// recommendation list. Presence is set-based — duplicates don't matter.
pub fn detect_missing(beleg_typen: &[String]) -> Vollstaendigkeit {
    let vorhandene: std::collections::BTreeSet<&str> =
        beleg_typen.iter().map(String::as_str).collect();

    let mut fehlende = Vec::new();
    let mut empfehlungen = Vec::new();
    for (prio, items) in ERWARTETE_BELEGE {
        for (typ, label) in *items {
            if !vorhandene.contains(typ) {
                fehlende.push((*label).to_string());
                empfehlungen.push(format!("{} {}: {}", tier_icon(prio), prio, label));
            }
        }
    }

    Vollstaendigkeit {
        fehlende,
        vorhandene: vorhandene.into_iter().map(str::to_string).collect(),
        empfehlungen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handwerkerrechnung_maps_to_fremdleistungen() {
        let k = auto_kontierung("handwerkerrechnung", None);
        assert_eq!(k.skr03_konto, "4946");
        assert_eq!(k.skr03_bezeichnung, "Fremdleistungen");
        assert_eq!(k.bu_schluessel, "3");
    }

    #[test]
    fn unknown_kind_falls_through_to_generic_expense() {
        let k = auto_kontierung("quittungsblock", None);
        assert_eq!(k.skr03_konto, "4900");
        assert_eq!(k.bu_schluessel, "");
    }

    #[test]
    fn bu_schluessel_derives_from_the_vat_rate() {
        assert_eq!(auto_kontierung("fahrtkosten", Some(19.0)).bu_schluessel, "3");
        assert_eq!(auto_kontierung("fahrtkosten", Some(7.0)).bu_schluessel, "2");
        assert_eq!(auto_kontierung("fahrtkosten", Some(0.0)).bu_schluessel, "");
        // A table-provided key is never overridden.
        assert_eq!(auto_kontierung("handwerkerrechnung", Some(7.0)).bu_schluessel, "3");
    }

    #[test]
    fn classifier_is_deterministic() {
        assert_eq!(
            auto_kontierung("spendenbescheinigung", Some(19.0)),
            auto_kontierung("spendenbescheinigung", Some(19.0)),
        );
    }

    #[test]
    fn missing_kinds_are_reported_by_tier() {
        let present = vec!["lohnsteuerbescheinigung".to_string(), "rechnung".to_string()];
        let report = detect_missing(&present);
        assert!(!report.fehlende.contains(&"Lohnsteuerbescheinigung".to_string()));
        assert!(report.fehlende.contains(&"Krankenversicherung".to_string()));
        assert!(report.empfehlungen.iter().any(|e| e.starts_with("🟡 Häufig relevant:")));
        assert!(report.empfehlungen.iter().all(|e| !e.contains("Lohnsteuerbescheinigung")));
    }

    #[test]
    fn duplicates_do_not_matter() {
        let twice = vec!["arztrechnung".to_string(), "arztrechnung".to_string()];
        let once = vec!["arztrechnung".to_string()];
        let a = detect_missing(&twice);
        let b = detect_missing(&once);
        assert_eq!(a.fehlende, b.fehlende);
        assert_eq!(a.vorhandene, b.vorhandene);
    }

    #[test]
    fn empty_year_misses_everything_mandatory_first() {
        let report = detect_missing(&[]);
        assert_eq!(report.empfehlungen[0], "🔴 Pflicht: Lohnsteuerbescheinigung");
        assert_eq!(report.fehlende.len(), 8);
    }
}
