//! Application configuration, loaded once at startup from the environment.
//!
//! The resulting [`Config`] is immutable and lives on `AppState`; the
//! pipeline and the extractor receive it explicitly instead of reading
//! env vars at call sites.

use std::path::PathBuf;

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub upload_dir: PathBuf,
    /// Tesseract language pack, e.g. "deu".
    pub ocr_language: String,
    /// Base URL of the generate endpoint, e.g. "http://localhost:11434".
    pub ollama_url: String,
    /// Text extraction model id.
    pub ollama_model: String,
    /// Optional vision model id — enables the dual-pass when set.
    pub vision_model: Option<String>,
    /// OCR mean confidence (0-100) below which the vision pass kicks in.
    pub vision_threshold: f64,
    pub max_upload_size_mb: usize,
    pub maesn_api_url: String,
    pub maesn_api_key: String,
    pub maesn_sandbox: bool,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/belegsync".to_string()),
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            ocr_language: std::env::var("OCR_LANGUAGE").unwrap_or_else(|_| "deu".to_string()),
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: std::env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.1:8b-instruct-q4_K_M".to_string()),
            vision_model: std::env::var("VISION_MODEL").ok().filter(|s| !s.is_empty()),
            vision_threshold: std::env::var("VISION_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(80.0),
            max_upload_size_mb: std::env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            maesn_api_url: std::env::var("MAESN_API_URL")
                .unwrap_or_else(|_| "https://api.maesn.com/v1".to_string()),
            maesn_api_key: std::env::var("MAESN_API_KEY").unwrap_or_default(),
            maesn_sandbox: std::env::var("MAESN_SANDBOX")
                .map(|s| s.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        }
    }
}
