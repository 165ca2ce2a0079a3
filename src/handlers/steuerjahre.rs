// ---------------------------------------------------------------------------
// handlers/steuerjahre.rs — Steuerjahre CRUD with per-year stats and the
// missing-documents report
// ---------------------------------------------------------------------------

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::kontierung;
use crate::models::{Steuerjahr, SteuerjahrCreate, SteuerjahrResponse};
use crate::state::AppState;

use super::ApiError;

#[utoipa::path(get, path = "/api/steuerjahre/mandant/{mandant_id}", tag = "steuerjahre",
    responses((status = 200, description = "Steuerjahre of one Mandant", body = [SteuerjahrResponse]))
)]
pub async fn list_steuerjahre(
    State(state): State<AppState>,
    Path(mandant_id): Path<i64>,
) -> Result<Json<Vec<SteuerjahrResponse>>, ApiError> {
    let jahre = sqlx::query_as::<_, Steuerjahr>(
        "SELECT * FROM steuerjahre WHERE mandant_id = $1 ORDER BY jahr DESC",
    )
    .bind(mandant_id)
    .fetch_all(&state.db)
    .await?;

    let mut response = Vec::with_capacity(jahre.len());
    for jahr in jahre {
        response.push(with_stats(&state, jahr).await?);
    }
    Ok(Json(response))
}

#[utoipa::path(post, path = "/api/steuerjahre", tag = "steuerjahre",
    request_body = SteuerjahrCreate,
    responses(
        (status = 200, description = "Created Steuerjahr", body = SteuerjahrResponse),
        (status = 404, description = "Unknown Mandant"),
        (status = 409, description = "Steuerjahr already exists for this Mandant")
    )
)]
pub async fn create_steuerjahr(
    State(state): State<AppState>,
    Json(body): Json<SteuerjahrCreate>,
) -> Result<Json<SteuerjahrResponse>, ApiError> {
    let mandant_exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM mandanten WHERE id = $1")
            .bind(body.mandant_id)
            .fetch_optional(&state.db)
            .await?;
    if mandant_exists.is_none() {
        return Err(ApiError::NotFound("Mandant nicht gefunden".to_string()));
    }

    let created = sqlx::query_as::<_, Steuerjahr>(
        "INSERT INTO steuerjahre (mandant_id, jahr, notizen) VALUES ($1, $2, $3) \
         ON CONFLICT (mandant_id, jahr) DO NOTHING RETURNING *",
    )
    .bind(body.mandant_id)
    .bind(body.jahr)
    .bind(&body.notizen)
    .fetch_optional(&state.db)
    .await?;

    match created {
        Some(jahr) => Ok(Json(with_stats(&state, jahr).await?)),
        None => Err(ApiError::Conflict(format!(
            "Steuerjahr {} existiert bereits für diesen Mandanten",
            body.jahr
        ))),
    }
}

#[utoipa::path(get, path = "/api/steuerjahre/{id}", tag = "steuerjahre",
    responses(
        (status = 200, description = "One Steuerjahr with stats and completeness", body = SteuerjahrResponse),
        (status = 404, description = "Unknown Steuerjahr")
    )
)]
pub async fn get_steuerjahr(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SteuerjahrResponse>, ApiError> {
    let jahr = sqlx::query_as::<_, Steuerjahr>("SELECT * FROM steuerjahre WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Steuerjahr nicht gefunden".to_string()))?;
    Ok(Json(with_stats(&state, jahr).await?))
}

#[utoipa::path(delete, path = "/api/steuerjahre/{id}", tag = "steuerjahre",
    responses(
        (status = 200, description = "Deleted (Belege cascade)"),
        (status = 404, description = "Unknown Steuerjahr")
    )
)]
pub async fn delete_steuerjahr(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM steuerjahre WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Steuerjahr nicht gefunden".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

/// Decorate a Steuerjahr row with Beleg counts, gross sum and the
/// missing-documents report.
async fn with_stats(state: &AppState, jahr: Steuerjahr) -> Result<SteuerjahrResponse, ApiError> {
    let (anzahl_belege, belege_geprueft, belege_synced, summe_brutto): (i64, i64, i64, f64) =
        sqlx::query_as(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE status = 'geprueft'), \
             COUNT(*) FILTER (WHERE status = 'an_datev'), \
             COALESCE(SUM(betrag_brutto), 0) \
             FROM belege WHERE steuerjahr_id = $1",
        )
        .bind(jahr.id)
        .fetch_one(&state.db)
        .await?;

    let typen: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT beleg_typ FROM belege WHERE steuerjahr_id = $1 AND beleg_typ IS NOT NULL",
    )
    .bind(jahr.id)
    .fetch_all(&state.db)
    .await?;
    let typen: Vec<String> = typen.into_iter().map(|(t,)| t).collect();

    Ok(SteuerjahrResponse {
        steuerjahr: jahr,
        anzahl_belege,
        belege_geprueft,
        belege_synced,
        summe_brutto: (summe_brutto * 100.0).round() / 100.0,
        vollstaendigkeit: kontierung::detect_missing(&typen),
    })
}
