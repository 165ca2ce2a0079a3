// ---------------------------------------------------------------------------
// handlers/ — one sub-module per resource; mod.rs re-exports all public
// items so lib.rs routes stay short.
// ---------------------------------------------------------------------------

pub(crate) mod belege;
pub(crate) mod datev_sync;
pub(crate) mod mandanten;
pub(crate) mod steuerjahre;
pub(crate) mod system;

// ── Re-exports ───────────────────────────────────────────────────────────────

pub use system::{dashboard, health};

pub use mandanten::{
    create_mandant, delete_mandant, get_mandant, list_mandanten, update_mandant,
};

pub use steuerjahre::{
    create_steuerjahr, delete_steuerjahr, get_steuerjahr, list_steuerjahre,
};

pub use belege::{
    delete_beleg, get_beleg, list_belege, reprocess_beleg, update_beleg, upload_belege,
};

pub use datev_sync::{datev_export_csv, datev_status, datev_sync, datev_sync_log};

// ── utoipa __path_* re-exports ───────────────────────────────────────────────
// The #[utoipa::path] attribute macro generates private structs like
// __path_health; the OpenApi derive in lib.rs expects them here.
pub use belege::{
    __path_delete_beleg, __path_get_beleg, __path_list_belege, __path_reprocess_beleg,
    __path_update_beleg, __path_upload_belege,
};
pub use datev_sync::{
    __path_datev_export_csv, __path_datev_status, __path_datev_sync, __path_datev_sync_log,
};
pub use mandanten::{
    __path_create_mandant, __path_delete_mandant, __path_get_mandant, __path_list_mandanten,
    __path_update_mandant,
};
pub use steuerjahre::{
    __path_create_steuerjahr, __path_delete_steuerjahr, __path_get_steuerjahr,
    __path_list_steuerjahre,
};
pub use system::{__path_dashboard, __path_health};

// ── Shared error type ────────────────────────────────────────────────────────

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

/// Centralized API error for all handlers. Logs full details server-side,
/// returns a structured JSON body to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal errors never leak their details to the client.
    fn sanitized_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        tracing::error!(code = self.error_code(), "API error ({}): {}", status.as_u16(), self);

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.sanitized_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}
