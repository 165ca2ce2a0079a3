//! Ollama generate-endpoint client.
//!
//! Single stateless operation against `POST {base_url}/api/generate` with
//! `{model, prompt, stream:false, images?, options:{temperature, num_predict}}`.
//! The response body carries the generated text in a `response` field.
//! Retry policy is the caller's business — the extractor retries once on
//! unparseable output, the pipeline records everything else as `fehler`.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

/// Timeout for text-only extraction calls.
pub const TEXT_TIMEOUT: Duration = Duration::from_secs(180);
/// Timeout for vision calls (image payloads, stricter prompt).
pub const VISION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM endpoint not reachable: {0}")]
    Unreachable(String),
    #[error("LLM request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("LLM endpoint returned HTTP {0}")]
    Http(StatusCode),
    #[error("LLM returned an empty response")]
    Empty,
}

pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// Base64-encoded images for vision models.
    pub images: Option<Vec<String>>,
    pub temperature: f64,
    pub num_predict: u32,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Fire one generate call and return the raw response text.
pub async fn generate(
    http: &reqwest::Client,
    base_url: &str,
    req: GenerateRequest<'_>,
) -> Result<String, LlmError> {
    let url = format!("{}/api/generate", base_url.trim_end_matches('/'));

    let mut body = json!({
        "model": req.model,
        "prompt": req.prompt,
        "stream": false,
        "options": {
            "temperature": req.temperature,
            "num_predict": req.num_predict,
        },
    });
    if let Some(images) = &req.images {
        body["images"] = json!(images);
    }

    let resp = http
        .post(&url)
        .timeout(req.timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(req.timeout)
            } else {
                LlmError::Unreachable(e.to_string())
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(LlmError::Http(status));
    }

    let parsed: GenerateResponse = resp.json().await.map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout(req.timeout)
        } else {
            LlmError::Empty
        }
    })?;

    if parsed.response.trim().is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(parsed.response)
}
