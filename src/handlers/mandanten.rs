// ---------------------------------------------------------------------------
// handlers/mandanten.rs — Mandanten CRUD
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::models::{Mandant, MandantCreate, MandantResponse, MandantUpdate};
use crate::state::AppState;

use super::ApiError;

#[utoipa::path(get, path = "/api/mandanten", tag = "mandanten",
    responses((status = 200, description = "All Mandanten with their Steuerjahr counts", body = [MandantResponse]))
)]
pub async fn list_mandanten(
    State(state): State<AppState>,
) -> Result<Json<Vec<MandantResponse>>, ApiError> {
    let mandanten = sqlx::query_as::<_, Mandant>("SELECT * FROM mandanten ORDER BY name ASC")
        .fetch_all(&state.db)
        .await?;

    let counts: HashMap<i64, i64> =
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT mandant_id, COUNT(*) FROM steuerjahre GROUP BY mandant_id",
        )
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .collect();

    let response = mandanten
        .into_iter()
        .map(|m| {
            let anzahl_steuerjahre = counts.get(&m.id).copied().unwrap_or(0);
            MandantResponse { mandant: m, anzahl_steuerjahre }
        })
        .collect();
    Ok(Json(response))
}

#[utoipa::path(post, path = "/api/mandanten", tag = "mandanten",
    request_body = MandantCreate,
    responses((status = 200, description = "Created Mandant", body = MandantResponse))
)]
pub async fn create_mandant(
    State(state): State<AppState>,
    Json(body): Json<MandantCreate>,
) -> Result<Json<MandantResponse>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name darf nicht leer sein".to_string()));
    }

    let mandant = sqlx::query_as::<_, Mandant>(
        "INSERT INTO mandanten (name, firma, steuernummer, steuer_id, email, telefon, adresse, \
         notizen, datev_berater_nr, datev_mandant_nr) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(body.name.trim())
    .bind(&body.firma)
    .bind(&body.steuernummer)
    .bind(&body.steuer_id)
    .bind(&body.email)
    .bind(&body.telefon)
    .bind(&body.adresse)
    .bind(&body.notizen)
    .bind(&body.datev_berater_nr)
    .bind(&body.datev_mandant_nr)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(MandantResponse { mandant, anzahl_steuerjahre: 0 }))
}

#[utoipa::path(get, path = "/api/mandanten/{id}", tag = "mandanten",
    responses(
        (status = 200, description = "One Mandant", body = MandantResponse),
        (status = 404, description = "Unknown Mandant")
    )
)]
pub async fn get_mandant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MandantResponse>, ApiError> {
    let mandant = fetch_mandant(&state, id).await?;
    let anzahl_steuerjahre: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM steuerjahre WHERE mandant_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    Ok(Json(MandantResponse { mandant, anzahl_steuerjahre }))
}

#[utoipa::path(put, path = "/api/mandanten/{id}", tag = "mandanten",
    request_body = MandantUpdate,
    responses(
        (status = 200, description = "Updated Mandant", body = MandantResponse),
        (status = 404, description = "Unknown Mandant")
    )
)]
pub async fn update_mandant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<MandantUpdate>,
) -> Result<Json<MandantResponse>, ApiError> {
    let mut m = fetch_mandant(&state, id).await?;

    if let Some(name) = body.name {
        m.name = name;
    }
    m.firma = body.firma.or(m.firma);
    m.steuernummer = body.steuernummer.or(m.steuernummer);
    m.steuer_id = body.steuer_id.or(m.steuer_id);
    m.email = body.email.or(m.email);
    m.telefon = body.telefon.or(m.telefon);
    m.adresse = body.adresse.or(m.adresse);
    m.notizen = body.notizen.or(m.notizen);
    m.aktiv = body.aktiv.unwrap_or(m.aktiv);
    m.maesn_company_id = body.maesn_company_id.or(m.maesn_company_id);
    m.datev_berater_nr = body.datev_berater_nr.or(m.datev_berater_nr);
    m.datev_mandant_nr = body.datev_mandant_nr.or(m.datev_mandant_nr);

    let mandant = sqlx::query_as::<_, Mandant>(
        "UPDATE mandanten SET name = $1, firma = $2, steuernummer = $3, steuer_id = $4, \
         email = $5, telefon = $6, adresse = $7, notizen = $8, aktiv = $9, \
         maesn_company_id = $10, datev_berater_nr = $11, datev_mandant_nr = $12, \
         aktualisiert_am = now() WHERE id = $13 RETURNING *",
    )
    .bind(&m.name)
    .bind(&m.firma)
    .bind(&m.steuernummer)
    .bind(&m.steuer_id)
    .bind(&m.email)
    .bind(&m.telefon)
    .bind(&m.adresse)
    .bind(&m.notizen)
    .bind(m.aktiv)
    .bind(&m.maesn_company_id)
    .bind(&m.datev_berater_nr)
    .bind(&m.datev_mandant_nr)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    let anzahl_steuerjahre: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM steuerjahre WHERE mandant_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    Ok(Json(MandantResponse { mandant, anzahl_steuerjahre }))
}

#[utoipa::path(delete, path = "/api/mandanten/{id}", tag = "mandanten",
    responses(
        (status = 200, description = "Deleted (Steuerjahre and Belege cascade)"),
        (status = 404, description = "Unknown Mandant")
    )
)]
pub async fn delete_mandant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM mandanten WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Mandant nicht gefunden".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn fetch_mandant(state: &AppState, id: i64) -> Result<Mandant, ApiError> {
    sqlx::query_as::<_, Mandant>("SELECT * FROM mandanten WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Mandant nicht gefunden".to_string()))
}
