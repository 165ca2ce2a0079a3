pub mod config;
pub mod datev;
pub mod extract;
pub mod handlers;
pub mod kontierung;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod state;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

// ---------------------------------------------------------------------------
// Request-id middleware
// ---------------------------------------------------------------------------

/// Middleware that assigns a UUID correlation ID to every request.
/// - Adds the ID to the current tracing span for structured logging.
/// - Returns it as `X-Request-Id` response header for client-side correlation.
pub async fn request_id_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::Span::current().record("request_id", tracing::field::display(&request_id));
    tracing::debug!(request_id = %request_id, "assigned correlation ID");

    let mut response = next.run(request).await;

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", val);
    }

    response
}

// ── OpenAPI documentation ────────────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BelegSync API",
        version = "1.0.0",
        description = "KI-gestützte Belegverarbeitung mit Source Grounding für DATEV"
    ),
    paths(
        // Health & dashboard
        handlers::health,
        handlers::dashboard,
        // Mandanten
        handlers::list_mandanten,
        handlers::create_mandant,
        handlers::get_mandant,
        handlers::update_mandant,
        handlers::delete_mandant,
        // Steuerjahre
        handlers::list_steuerjahre,
        handlers::create_steuerjahr,
        handlers::get_steuerjahr,
        handlers::delete_steuerjahr,
        // Belege
        handlers::upload_belege,
        handlers::list_belege,
        handlers::get_beleg,
        handlers::update_beleg,
        handlers::reprocess_beleg,
        handlers::delete_beleg,
        // DATEV
        handlers::datev_status,
        handlers::datev_sync,
        handlers::datev_export_csv,
        handlers::datev_sync_log,
    ),
    components(schemas(
        models::Mandant,
        models::MandantCreate,
        models::MandantUpdate,
        models::MandantResponse,
        models::Steuerjahr,
        models::SteuerjahrCreate,
        models::SteuerjahrResponse,
        models::Vollstaendigkeit,
        models::Beleg,
        models::BelegUpdate,
        models::SourceSpan,
        models::SpanBBox,
        models::DatevSyncRequest,
        models::DatevSyncLogEintrag,
        models::DashboardStats,
        models::HealthResponse,
    )),
    tags(
        (name = "health", description = "Health endpoints"),
        (name = "system", description = "Dashboard aggregates"),
        (name = "mandanten", description = "Mandanten CRUD"),
        (name = "steuerjahre", description = "Steuerjahre with completeness reports"),
        (name = "belege", description = "Upload, pipeline and review"),
        (name = "datev", description = "DATEV bridge sync and CSV export"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    // 120 requests per minute per IP across the API.
    let default_governor = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(120)
        .use_headers()
        .finish()
        .expect("rate-limit config is valid");

    let max_upload_bytes = state.config.max_upload_size_mb * 1024 * 1024;

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/dashboard", get(handlers::dashboard))
        // Mandanten
        .route(
            "/api/mandanten",
            get(handlers::list_mandanten).post(handlers::create_mandant),
        )
        .route(
            "/api/mandanten/{id}",
            get(handlers::get_mandant)
                .put(handlers::update_mandant)
                .delete(handlers::delete_mandant),
        )
        // Steuerjahre
        .route("/api/steuerjahre", post(handlers::create_steuerjahr))
        .route(
            "/api/steuerjahre/mandant/{mandant_id}",
            get(handlers::list_steuerjahre),
        )
        .route(
            "/api/steuerjahre/{id}",
            get(handlers::get_steuerjahr).delete(handlers::delete_steuerjahr),
        )
        // Belege — upload starts the background pipeline
        .route("/api/belege/upload/{steuerjahr_id}", post(handlers::upload_belege))
        .route(
            "/api/belege/steuerjahr/{steuerjahr_id}",
            get(handlers::list_belege),
        )
        .route(
            "/api/belege/{id}",
            get(handlers::get_beleg)
                .put(handlers::update_beleg)
                .delete(handlers::delete_beleg),
        )
        .route("/api/belege/{id}/reprocess", post(handlers::reprocess_beleg))
        // DATEV
        .route("/api/datev/status", get(handlers::datev_status))
        .route("/api/datev/sync", post(handlers::datev_sync))
        .route(
            "/api/datev/export/csv/{steuerjahr_id}",
            get(handlers::datev_export_csv),
        )
        .route("/api/datev/log/{mandant_id}", get(handlers::datev_sync_log))
        // Uploaded files, served for the document viewer
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::extract::DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(GovernorLayer::new(default_governor))
        .with_state(state)
}
