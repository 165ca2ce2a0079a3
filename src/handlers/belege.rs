// ---------------------------------------------------------------------------
// handlers/belege.rs — upload, listing, review updates, reprocess, delete.
// Upload starts the background pipeline per created Beleg.
// ---------------------------------------------------------------------------

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{Beleg, BelegStatus, BelegUpdate};
use crate::pipeline;
use crate::state::AppState;

use super::ApiError;

/// Upload suffix allowlist; anything else is silently dropped.
const ALLOWED_SUFFIXES: &[&str] = &["pdf", "jpg", "jpeg", "png", "tiff", "bmp", "webp"];

#[derive(Debug, Deserialize)]
pub struct BelegeListParams {
    pub status: Option<String>,
}

#[utoipa::path(post, path = "/api/belege/upload/{steuerjahr_id}", tag = "belege",
    responses(
        (status = 200, description = "Created Belege; the pipeline runs in background", body = [Beleg]),
        (status = 400, description = "No file with an accepted suffix"),
        (status = 404, description = "Unknown Steuerjahr")
    )
)]
pub async fn upload_belege(
    State(state): State<AppState>,
    Path(steuerjahr_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Vec<Beleg>>, ApiError> {
    let steuerjahr: Option<(i64, i64, i32)> =
        sqlx::query_as("SELECT id, mandant_id, jahr FROM steuerjahre WHERE id = $1")
            .bind(steuerjahr_id)
            .fetch_optional(&state.db)
            .await?;
    let Some((_, mandant_id, jahr)) = steuerjahr else {
        return Err(ApiError::NotFound("Steuerjahr nicht gefunden".to_string()));
    };

    let mut created = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("ungültiger Upload: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let ext = std::path::Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_SUFFIXES.contains(&ext.as_str()) {
            tracing::debug!(file_name, "dropping upload with unsupported suffix");
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Upload abgebrochen: {e}")))?;
        if data.is_empty() {
            continue;
        }

        // Random prefix against name collisions within the partition.
        let token = uuid::Uuid::new_v4().simple().to_string();
        let base_name = std::path::Path::new(&file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let safe_name = format!("{}_{}", &token[..12], base_name);

        let dest_dir = state
            .config
            .upload_dir
            .join(mandant_id.to_string())
            .join(jahr.to_string());
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| ApiError::Internal(format!("Upload-Verzeichnis: {e}")))?;
        let dest = dest_dir.join(&safe_name);
        tokio::fs::write(&dest, &data)
            .await
            .map_err(|e| ApiError::Internal(format!("Datei schreiben: {e}")))?;

        let beleg = sqlx::query_as::<_, Beleg>(
            "INSERT INTO belege (steuerjahr_id, dateiname, dateipfad, dateityp, dateigroesse) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(steuerjahr_id)
        .bind(&file_name)
        .bind(dest.to_string_lossy().as_ref())
        .bind(&ext)
        .bind(data.len() as i64)
        .fetch_one(&state.db)
        .await?;

        tracing::info!(beleg_id = beleg.id, file_name, "Beleg uploaded, pipeline enqueued");
        pipeline::enqueue(state.clone(), beleg.id);
        created.push(beleg);
    }

    if created.is_empty() {
        return Err(ApiError::BadRequest("Keine gültigen Dateien".to_string()));
    }
    Ok(Json(created))
}

#[utoipa::path(get, path = "/api/belege/steuerjahr/{steuerjahr_id}", tag = "belege",
    params(("status" = Option<String>, Query, description = "Filter by pipeline status")),
    responses((status = 200, description = "Belege of one Steuerjahr, newest first", body = [Beleg]))
)]
pub async fn list_belege(
    State(state): State<AppState>,
    Path(steuerjahr_id): Path<i64>,
    Query(params): Query<BelegeListParams>,
) -> Result<Json<Vec<Beleg>>, ApiError> {
    let belege = match &params.status {
        Some(status) => {
            sqlx::query_as::<_, Beleg>(
                "SELECT * FROM belege WHERE steuerjahr_id = $1 AND status = $2 \
                 ORDER BY erstellt_am DESC",
            )
            .bind(steuerjahr_id)
            .bind(status)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Beleg>(
                "SELECT * FROM belege WHERE steuerjahr_id = $1 ORDER BY erstellt_am DESC",
            )
            .bind(steuerjahr_id)
            .fetch_all(&state.db)
            .await?
        }
    };
    Ok(Json(belege))
}

#[utoipa::path(get, path = "/api/belege/{id}", tag = "belege",
    responses(
        (status = 200, description = "One Beleg", body = Beleg),
        (status = 404, description = "Unknown Beleg")
    )
)]
pub async fn get_beleg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Beleg>, ApiError> {
    Ok(Json(fetch_beleg(&state, id).await?))
}

#[utoipa::path(put, path = "/api/belege/{id}", tag = "belege",
    request_body = BelegUpdate,
    responses(
        (status = 200, description = "Updated Beleg", body = Beleg),
        (status = 404, description = "Unknown Beleg")
    )
)]
pub async fn update_beleg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<BelegUpdate>,
) -> Result<Json<Beleg>, ApiError> {
    let mut b = fetch_beleg(&state, id).await?;

    b.beleg_typ = body.beleg_typ.or(b.beleg_typ);
    b.betrag_brutto = body.betrag_brutto.or(b.betrag_brutto);
    b.betrag_netto = body.betrag_netto.or(b.betrag_netto);
    b.mwst_satz = body.mwst_satz.or(b.mwst_satz);
    b.mwst_betrag = body.mwst_betrag.or(b.mwst_betrag);
    b.datum_beleg = body.datum_beleg.or(b.datum_beleg);
    b.aussteller = body.aussteller.or(b.aussteller);
    b.beschreibung = body.beschreibung.or(b.beschreibung);
    b.rechnungsnummer = body.rechnungsnummer.or(b.rechnungsnummer);
    b.skr03_konto = body.skr03_konto.or(b.skr03_konto);
    b.skr03_bezeichnung = body.skr03_bezeichnung.or(b.skr03_bezeichnung);
    b.gegenkonto = body.gegenkonto.unwrap_or(b.gegenkonto);
    b.bu_schluessel = body.bu_schluessel.or(b.bu_schluessel);
    b.kostenstelle = body.kostenstelle.or(b.kostenstelle);
    b.steuer_kategorie = body.steuer_kategorie.or(b.steuer_kategorie);
    b.paragraph_35a_anteil = body.paragraph_35a_anteil.or(b.paragraph_35a_anteil);
    b.pruefnotiz = body.pruefnotiz.or(b.pruefnotiz);
    if let Some(geprueft) = body.manuell_geprueft {
        b.manuell_geprueft = geprueft;
        // Reviewer sign-off advances the pipeline.
        if geprueft {
            b.status = BelegStatus::Geprueft.as_str().to_string();
        }
    }

    let updated = sqlx::query_as::<_, Beleg>(
        "UPDATE belege SET beleg_typ = $1, betrag_brutto = $2, betrag_netto = $3, \
         mwst_satz = $4, mwst_betrag = $5, datum_beleg = $6, aussteller = $7, \
         beschreibung = $8, rechnungsnummer = $9, skr03_konto = $10, skr03_bezeichnung = $11, \
         gegenkonto = $12, bu_schluessel = $13, kostenstelle = $14, steuer_kategorie = $15, \
         paragraph_35a_anteil = $16, manuell_geprueft = $17, pruefnotiz = $18, status = $19, \
         aktualisiert_am = now() WHERE id = $20 RETURNING *",
    )
    .bind(&b.beleg_typ)
    .bind(b.betrag_brutto)
    .bind(b.betrag_netto)
    .bind(b.mwst_satz)
    .bind(b.mwst_betrag)
    .bind(&b.datum_beleg)
    .bind(&b.aussteller)
    .bind(&b.beschreibung)
    .bind(&b.rechnungsnummer)
    .bind(&b.skr03_konto)
    .bind(&b.skr03_bezeichnung)
    .bind(&b.gegenkonto)
    .bind(&b.bu_schluessel)
    .bind(&b.kostenstelle)
    .bind(&b.steuer_kategorie)
    .bind(b.paragraph_35a_anteil)
    .bind(b.manuell_geprueft)
    .bind(&b.pruefnotiz)
    .bind(&b.status)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated))
}

#[utoipa::path(post, path = "/api/belege/{id}/reprocess", tag = "belege",
    responses(
        (status = 200, description = "Reset to hochgeladen and re-enqueued"),
        (status = 404, description = "Unknown Beleg")
    )
)]
pub async fn reprocess_beleg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query(
        "UPDATE belege SET status = $1, extrahierte_daten = NULL, quellreferenzen = NULL, \
         extraktion_methode = NULL, extraktion_konfidenz = NULL, pruefnotiz = NULL, \
         aktualisiert_am = now() WHERE id = $2",
    )
    .bind(BelegStatus::Hochgeladen.as_str())
    .bind(id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Beleg nicht gefunden".to_string()));
    }

    pipeline::enqueue(state.clone(), id);
    Ok(Json(json!({ "ok": true, "status": "reprocessing" })))
}

#[utoipa::path(delete, path = "/api/belege/{id}", tag = "belege",
    responses(
        (status = 200, description = "Beleg and its on-disk file removed"),
        (status = 404, description = "Unknown Beleg")
    )
)]
pub async fn delete_beleg(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let beleg = fetch_beleg(&state, id).await?;

    if let Err(e) = tokio::fs::remove_file(&beleg.dateipfad).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(beleg_id = id, "could not remove file {}: {e}", beleg.dateipfad);
    }

    sqlx::query("DELETE FROM belege WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn fetch_beleg(state: &AppState, id: i64) -> Result<Beleg, ApiError> {
    sqlx::query_as::<_, Beleg>("SELECT * FROM belege WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Beleg nicht gefunden".to_string()))
}
