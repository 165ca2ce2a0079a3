//! Per-Beleg processing pipeline: OCR -> Extraktion -> Auto-Kontierung.
//!
//! Runs as a background task off the request path. Each phase commits its
//! full artifact set in a single UPDATE, so a failed phase leaves the
//! previous state intact. Errors never escape — they end up as status
//! `fehler` plus a note on the Beleg, and recovery is an explicit
//! reprocess.

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use crate::extract::{self, ExtractOutcome};
use crate::models::BelegStatus;
use crate::ocr;
use crate::state::AppState;

/// Minimum trimmed OCR text length considered usable.
const MIN_OCR_TEXT_LEN: usize = 20;

/// Spawn the pipeline for one Beleg in the background.
pub fn enqueue(state: AppState, beleg_id: i64) {
    tokio::spawn(run_pipeline(state, beleg_id));
}

/// Run the pipeline for one Beleg. Concurrent runs for the same id are
/// serialized; runs for distinct ids proceed independently.
pub async fn run_pipeline(state: AppState, beleg_id: i64) {
    let lock = state.pipeline_lock(beleg_id).await;
    let guard = lock.lock().await;

    if let Err(e) = run_phases(&state, beleg_id).await {
        // DB-level failure; the Beleg keeps whatever state was last committed.
        tracing::error!(beleg_id, "pipeline aborted: {e:#}");
    }

    drop(guard);
    state.release_pipeline_lock(beleg_id).await;
}

async fn run_phases(state: &AppState, beleg_id: i64) -> Result<()> {
    let db = &state.db;

    let Some((dateipfad,)) =
        sqlx::query_as::<_, (String,)>("SELECT dateipfad FROM belege WHERE id = $1")
            .bind(beleg_id)
            .fetch_optional(db)
            .await?
    else {
        tracing::warn!(beleg_id, "pipeline started for unknown Beleg");
        return Ok(());
    };

    // ── Phase 1: OCR ────────────────────────────────────────────────
    set_status(db, beleg_id, BelegStatus::OcrLaeuft).await?;

    let outcome = match ocr::process_file(&state.config, Path::new(&dateipfad)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return fail(db, beleg_id, &format!("OCR-Fehler: {e:#}")).await;
        }
    };

    if outcome.text.trim().len() < MIN_OCR_TEXT_LEN {
        return fail(db, beleg_id, "OCR lieferte keinen verwertbaren Text").await;
    }

    sqlx::query(
        "UPDATE belege SET ocr_text = $1, ocr_daten = $2, ocr_konfidenz = $3, status = $4, \
         aktualisiert_am = now() WHERE id = $5",
    )
    .bind(&outcome.text)
    .bind(json!({ "pages": outcome.pages }))
    .bind(outcome.konfidenz)
    .bind(BelegStatus::OcrFertig.as_str())
    .bind(beleg_id)
    .execute(db)
    .await?;

    tracing::info!(
        beleg_id,
        konfidenz = outcome.konfidenz,
        chars = outcome.text.len(),
        pages = outcome.pages.len(),
        "OCR complete"
    );

    // ── Phase 2: Extraktion ─────────────────────────────────────────
    set_status(db, beleg_id, BelegStatus::ExtraktionLaeuft).await?;

    let extraction = extract::extract_beleg(
        &state.config,
        &state.client,
        &outcome.text,
        &outcome.pages,
        outcome.konfidenz,
        Some(Path::new(&dateipfad)),
    )
    .await;

    match extraction {
        Ok(result) => {
            persist_extraction(db, beleg_id, &result).await?;
            tracing::info!(
                beleg_id,
                methode = %result.methode,
                konfidenz = result.konfidenz.as_str(),
                spans = result.quellreferenzen.len(),
                "extraction complete"
            );
        }
        Err(e) => {
            return fail(db, beleg_id, &format!("Extraktion-Fehler: {e:#}")).await;
        }
    }

    Ok(())
}

async fn set_status(db: &PgPool, beleg_id: i64, status: BelegStatus) -> Result<()> {
    sqlx::query("UPDATE belege SET status = $1, aktualisiert_am = now() WHERE id = $2")
        .bind(status.as_str())
        .bind(beleg_id)
        .execute(db)
        .await?;
    Ok(())
}

/// One atomic UPDATE for the whole extraction artifact set.
async fn persist_extraction(db: &PgPool, beleg_id: i64, result: &ExtractOutcome) -> Result<()> {
    let daten = &result.daten;
    sqlx::query(
        "UPDATE belege SET \
           extrahierte_daten = $1, quellreferenzen = $2, extraktion_methode = $3, \
           extraktion_konfidenz = $4, beleg_typ = $5, aussteller = $6, beschreibung = $7, \
           rechnungsnummer = $8, datum_beleg = $9, steuer_kategorie = $10, skr03_konto = $11, \
           skr03_bezeichnung = $12, bu_schluessel = $13, betrag_brutto = $14, betrag_netto = $15, \
           mwst_satz = $16, mwst_betrag = $17, paragraph_35a_anteil = $18, materialkosten = $19, \
           status = $20, aktualisiert_am = now() \
         WHERE id = $21",
    )
    .bind(serde_json::to_value(daten)?)
    .bind(serde_json::to_value(&result.quellreferenzen)?)
    .bind(&result.methode)
    .bind(result.konfidenz.as_str())
    .bind(&daten.beleg_typ)
    .bind(&daten.aussteller)
    .bind(&daten.beschreibung)
    .bind(&daten.rechnungsnummer)
    .bind(&daten.datum_beleg)
    .bind(&daten.steuer_kategorie)
    .bind(&daten.skr03_konto)
    .bind(&daten.skr03_bezeichnung)
    .bind(&daten.bu_schluessel)
    .bind(daten.betrag_brutto)
    .bind(daten.betrag_netto)
    .bind(daten.mwst_satz)
    .bind(daten.mwst_betrag)
    .bind(daten.arbeitskosten_35a)
    .bind(daten.materialkosten)
    .bind(BelegStatus::Extrahiert.as_str())
    .bind(beleg_id)
    .execute(db)
    .await?;
    Ok(())
}

async fn fail(db: &PgPool, beleg_id: i64, note: &str) -> Result<()> {
    tracing::warn!(beleg_id, "pipeline failed: {note}");
    sqlx::query(
        "UPDATE belege SET status = $1, pruefnotiz = $2, aktualisiert_am = now() WHERE id = $3",
    )
    .bind(BelegStatus::Fehler.as_str())
    .bind(note)
    .bind(beleg_id)
    .execute(db)
    .await?;
    Ok(())
}
