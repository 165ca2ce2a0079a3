// BelegSync - Validates the generated OpenAPI schema

use utoipa::OpenApi;

#[test]
fn openapi_schema_is_valid_json() {
    let schema = serde_json::to_string_pretty(&belegsync_backend::ApiDoc::openapi())
        .expect("OpenAPI schema should serialize to JSON");
    assert!(!schema.is_empty(), "Schema should not be empty");
}

#[test]
fn openapi_schema_contains_required_fields() {
    let schema = serde_json::to_string_pretty(&belegsync_backend::ApiDoc::openapi())
        .expect("OpenAPI schema should serialize to JSON");
    assert!(schema.contains("openapi"), "Schema should contain 'openapi' version field");
    assert!(schema.contains("/api/health"), "Schema should document /api/health");
    assert!(schema.contains("BelegSync"), "Schema should contain project name");
}

#[test]
fn openapi_schema_documents_key_endpoints() {
    let schema = serde_json::to_string_pretty(&belegsync_backend::ApiDoc::openapi())
        .expect("OpenAPI schema should serialize to JSON");
    assert!(schema.contains("/api/mandanten"), "Schema should document /api/mandanten");
    assert!(
        schema.contains("/api/belege/upload/{steuerjahr_id}"),
        "Schema should document the upload endpoint"
    );
    assert!(
        schema.contains("/api/belege/{id}/reprocess"),
        "Schema should document reprocess"
    );
    assert!(schema.contains("/api/datev/sync"), "Schema should document /api/datev/sync");
    assert!(
        schema.contains("/api/datev/export/csv/{steuerjahr_id}"),
        "Schema should document the CSV export"
    );
}

#[test]
fn openapi_schema_parses_to_valid_structure() {
    let doc = belegsync_backend::ApiDoc::openapi();
    let value = serde_json::to_value(&doc).expect("Schema should convert to Value");
    assert!(value.is_object(), "Schema root should be an object");
    assert!(value.get("info").is_some(), "Schema should have 'info' section");
    assert!(value.get("paths").is_some(), "Schema should have 'paths' section");
}
