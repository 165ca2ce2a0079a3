// ---------------------------------------------------------------------------
// handlers/system.rs — health probe and dashboard aggregates
// ---------------------------------------------------------------------------

use axum::extract::State;
use axum::Json;

use crate::models::{DashboardStats, HealthResponse};
use crate::state::AppState;

use super::ApiError;

#[utoipa::path(get, path = "/api/health", tag = "health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "belegsync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[utoipa::path(get, path = "/api/dashboard", tag = "system",
    responses((status = 200, description = "Aggregate processing stats", body = DashboardStats))
)]
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    let mandanten_aktiv: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM mandanten WHERE aktiv")
            .fetch_one(&state.db)
            .await?;

    let status_counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM belege GROUP BY status")
            .fetch_all(&state.db)
            .await?;

    let count = |status: &str| {
        status_counts
            .iter()
            .find(|(s, _)| s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let belege_gesamt: i64 = status_counts.iter().map(|(_, n)| n).sum();
    let belege_offen = count("hochgeladen") + count("ocr_laeuft") + count("ocr_fertig")
        + count("extraktion_laeuft");
    let belege_geprueft = count("geprueft");
    let belege_synced = count("an_datev");
    let belege_fehler = count("fehler");
    let belege_extrahiert = count("extrahiert") + belege_geprueft + belege_synced;

    let summe_brutto: f64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(betrag_brutto), 0) FROM belege")
            .fetch_one(&state.db)
            .await?;

    let rate = |n: i64| (n as f64 / belege_gesamt.max(1) as f64 * 1000.0).round() / 10.0;

    Ok(Json(DashboardStats {
        mandanten_aktiv,
        belege_gesamt,
        belege_offen,
        belege_geprueft,
        belege_synced,
        belege_fehler,
        summe_brutto: (summe_brutto * 100.0).round() / 100.0,
        extraktion_rate: rate(belege_extrahiert),
        datev_sync_rate: rate(belege_synced),
    }))
}
