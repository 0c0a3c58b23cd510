use project::Settings;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::JobError;

const API_KEY_HEADER: &str = "xi-api-key";

/// Request body of the generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub text: String,
    pub duration_seconds: f64,
    pub prompt_influence: f64,
}

/// Text-to-audio backend. One call is one attempt; retrying is the caller's
/// business.
pub trait GenerationClient: Send + Sync {
    fn generate(&self, params: &GenerationParams) -> Result<Vec<u8>, JobError>;
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: u16, body: String) -> JobError {
    match status {
        429 => JobError::GenerationRateLimited(body),
        500..=599 => JobError::GenerationServerError { status, body },
        _ => JobError::GenerationRejected { status, body },
    }
}

pub struct HttpGenerationClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(settings: &Settings) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| JobError::Transport(e.to_string()))?;
        Ok(Self { client, url: settings.api_url.clone(), api_key: settings.api_key.clone() })
    }
}

impl GenerationClient for HttpGenerationClient {
    fn generate(&self, params: &GenerationParams) -> Result<Vec<u8>, JobError> {
        let mut request = self.client.post(&self.url).header(ACCEPT, "audio/mpeg").json(params);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = request.send().map_err(|e| JobError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().map_err(|e| JobError::Transport(e.to_string()))?;
            debug!(bytes = bytes.len(), "generation response received");
            return Ok(bytes.to_vec());
        }
        let body = response.text().unwrap_or_default();
        Err(classify_status(status.as_u16(), error_message(&body)))
    }
}

/// Pull the human-readable part out of a JSON error body such as
/// `{"detail": {"message": "..."}}`; anything else passes through as is.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else { return body.trim().to_string() };
    let detail = value.get("detail").unwrap_or(&value);
    let message = detail
        .get("message")
        .or_else(|| detail.get("error"))
        .and_then(|m| m.as_str())
        .or_else(|| detail.as_str());
    match message {
        Some(m) => m.to_string(),
        None => body.trim().to_string(),
    }
}
