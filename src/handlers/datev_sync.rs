// ---------------------------------------------------------------------------
// handlers/datev_sync.rs — Maesn bridge sync, CSV export, audit log
// ---------------------------------------------------------------------------

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::datev;
use crate::models::{Beleg, BelegStatus, DatevSyncLogEintrag, DatevSyncRequest, Mandant};
use crate::state::AppState;

use super::ApiError;

#[utoipa::path(get, path = "/api/datev/status", tag = "datev",
    responses((status = 200, description = "Bridge configuration and connectivity"))
)]
pub async fn datev_status(State(state): State<AppState>) -> Json<Value> {
    let connection = datev::test_connection(&state.config, &state.client).await;
    Json(json!({
        "maesn_configured": datev::is_configured(&state.config),
        "connection": connection,
        "sandbox": state.config.maesn_sandbox,
    }))
}

#[utoipa::path(post, path = "/api/datev/sync", tag = "datev",
    request_body = DatevSyncRequest,
    responses(
        (status = 200, description = "Per-Beleg sync results"),
        (status = 400, description = "Mandant has no Maesn company id"),
        (status = 404, description = "Unknown Steuerjahr")
    )
)]
pub async fn datev_sync(
    State(state): State<AppState>,
    Json(body): Json<DatevSyncRequest>,
) -> Result<Json<Value>, ApiError> {
    let mandant = mandant_of_steuerjahr(&state, body.steuerjahr_id).await?;
    let Some(company_id) = mandant.maesn_company_id.clone() else {
        return Err(ApiError::BadRequest(
            "Mandant hat keine Maesn Company ID. Bitte zuerst DATEV-Verknüpfung einrichten."
                .to_string(),
        ));
    };

    let mut query = String::from(
        "SELECT * FROM belege WHERE steuerjahr_id = $1 \
         AND status IN ('extrahiert', 'geprueft') \
         AND (datev_sync_status IS NULL OR datev_sync_status <> 'synced')",
    );
    if body.nur_gepruefte {
        query.push_str(" AND manuell_geprueft");
    }
    let belege = sqlx::query_as::<_, Beleg>(&query)
        .bind(body.steuerjahr_id)
        .fetch_all(&state.db)
        .await?;

    if belege.is_empty() {
        return Ok(Json(json!({ "message": "Keine Belege zum Sync vorhanden", "total": 0 })));
    }

    let mut success = 0usize;
    let mut errors = 0usize;
    let mut details = Vec::with_capacity(belege.len());

    for beleg in &belege {
        let result = datev::upload_beleg(&state.config, &state.client, beleg, &company_id).await;

        let detail = json!({
            "beleg_id": beleg.id,
            "dateiname": beleg.dateiname,
            "success": result.success,
            "datev_document_id": result.datev_document_id,
            "datev_booking_id": result.datev_booking_id,
            "error": result.error,
        });

        if result.success {
            success += 1;
            sqlx::query(
                "UPDATE belege SET datev_sync_status = 'synced', datev_sync_at = now(), \
                 datev_sync_id = $1, datev_buchungsvorschlag_id = $2, status = $3, \
                 aktualisiert_am = now() WHERE id = $4",
            )
            .bind(&result.datev_document_id)
            .bind(&result.datev_booking_id)
            .bind(BelegStatus::AnDatev.as_str())
            .bind(beleg.id)
            .execute(&state.db)
            .await?;
        } else {
            errors += 1;
            // Bridge failures never transition the Beleg out of its review state.
            sqlx::query(
                "UPDATE belege SET datev_sync_status = 'error', \
                 pruefnotiz = concat(coalesce(pruefnotiz, ''), $1::text), \
                 aktualisiert_am = now() WHERE id = $2",
            )
            .bind(format!(
                "\nDATEV-Fehler: {}",
                result.error.as_deref().unwrap_or("unbekannt")
            ))
            .bind(beleg.id)
            .execute(&state.db)
            .await?;
        }

        if let Err(e) = datev::log_sync_attempt(
            &state.db,
            beleg.id,
            mandant.id,
            "sync_beleg",
            result.success,
            Some(&detail),
            result.error.as_deref(),
        )
        .await
        {
            tracing::warn!(beleg_id = beleg.id, "sync log write failed: {e}");
        }

        details.push(detail);
    }

    Ok(Json(json!({
        "total": belege.len(),
        "success": success,
        "errors": errors,
        "details": details,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CsvExportParams {
    #[serde(default)]
    pub nur_gepruefte: bool,
}

#[utoipa::path(get, path = "/api/datev/export/csv/{steuerjahr_id}", tag = "datev",
    params(("nur_gepruefte" = Option<bool>, Query, description = "Only manually reviewed Belege")),
    responses(
        (status = 200, description = "DATEV Buchungsstapel CSV", body = String, content_type = "text/csv"),
        (status = 404, description = "Unknown Steuerjahr or no Belege")
    )
)]
pub async fn datev_export_csv(
    State(state): State<AppState>,
    Path(steuerjahr_id): Path<i64>,
    Query(params): Query<CsvExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mandant = mandant_of_steuerjahr(&state, steuerjahr_id).await?;
    let (jahr,): (i32,) = sqlx::query_as("SELECT jahr FROM steuerjahre WHERE id = $1")
        .bind(steuerjahr_id)
        .fetch_one(&state.db)
        .await?;

    let mut query = String::from(
        "SELECT * FROM belege WHERE steuerjahr_id = $1 \
         AND status IN ('extrahiert', 'geprueft', 'an_datev')",
    );
    if params.nur_gepruefte {
        query.push_str(" AND manuell_geprueft");
    }
    query.push_str(" ORDER BY erstellt_am ASC");

    let belege = sqlx::query_as::<_, Beleg>(&query)
        .bind(steuerjahr_id)
        .fetch_all(&state.db)
        .await?;
    if belege.is_empty() {
        return Err(ApiError::NotFound("Keine Belege vorhanden".to_string()));
    }

    let csv = datev::generate_buchungsstapel_csv(&belege, &mandant.name, jahr, chrono::Utc::now());
    let filename = format!("EXTF_Buchungsstapel_{}_{}.csv", mandant.name, jahr);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SyncLogParams {
    pub limit: Option<i64>,
}

#[utoipa::path(get, path = "/api/datev/log/{mandant_id}", tag = "datev",
    params(("limit" = Option<i64>, Query, description = "Max rows, default 50")),
    responses((status = 200, description = "Sync audit log, newest first", body = [DatevSyncLogEintrag]))
)]
pub async fn datev_sync_log(
    State(state): State<AppState>,
    Path(mandant_id): Path<i64>,
    Query(params): Query<SyncLogParams>,
) -> Result<Json<Vec<DatevSyncLogEintrag>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let entries = sqlx::query_as::<_, DatevSyncLogEintrag>(
        "SELECT id, beleg_id, mandant_id, aktion, status, fehler_nachricht, erstellt_am \
         FROM datev_sync_log WHERE mandant_id = $1 ORDER BY erstellt_am DESC LIMIT $2",
    )
    .bind(mandant_id)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(entries))
}

async fn mandant_of_steuerjahr(state: &AppState, steuerjahr_id: i64) -> Result<Mandant, ApiError> {
    sqlx::query_as::<_, Mandant>(
        "SELECT m.* FROM mandanten m \
         JOIN steuerjahre s ON s.mandant_id = m.id WHERE s.id = $1",
    )
    .bind(steuerjahr_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Steuerjahr nicht gefunden".to_string()))
}
