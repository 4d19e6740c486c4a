//! HTTP client for the extraction service, plus a scriptable mock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::types::{ExtractionRequest, ExtractorClient};
use super::ExtractionError;

/// Blocking HTTP client for an Ollama-compatible generation endpoint.
pub struct HttpExtractorClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpExtractorClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Connection(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

/// Request body for the generation endpoint.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response body from the generation endpoint.
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl ExtractorClient for HttpExtractorClient {
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String, ExtractionError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: build_extraction_prompt(request.masked_text),
            system: EXTRACTION_SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                // Clinical extraction runs fully deterministic
                temperature: if request.deterministic { 0.0 } else { 0.7 },
            },
        };

        tracing::debug!(
            txn_id = %request.transaction_id,
            model = %self.model,
            input_length = request.masked_text.len(),
            "Calling extraction service"
        );

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ExtractionError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                ExtractionError::Timeout(self.timeout_secs)
            } else {
                ExtractionError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}

/// Scriptable extractor for tests — plays back a queued sequence of
/// results, then keeps returning the fallback response.
pub struct MockExtractorClient {
    script: Mutex<VecDeque<Result<String, ExtractionError>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl MockExtractorClient {
    /// A mock that always returns `response`.
    pub fn new(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that plays `script` in order before falling back to `fallback`.
    pub fn with_script(
        script: Vec<Result<String, ExtractionError>>,
        fallback: &str,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of extract calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractorClient for MockExtractorClient {
    fn extract(&self, _request: &ExtractionRequest<'_>) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Ok(self.fallback.clone())
    }
}
