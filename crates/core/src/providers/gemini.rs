use crate::error::CollaboratorError;
use crate::models::{GenerationOutcome, GenerationRequest};
use crate::traits::GenerativeModel;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Gemini generateContent client. Coerces the HTTP surface into the fixed
/// [`GenerationOutcome`] variants at this boundary; callers decide what to
/// retry.
pub struct GeminiModel {
    endpoint: String,
    model: String,
    api_key: String,
    client: Client,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, DEFAULT_MODEL, api_key)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn request_url(&self) -> Result<Url, CollaboratorError> {
        let url = Url::parse(&format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        ))?;
        Ok(url)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, CollaboratorError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(self.request_url()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(GenerationOutcome::RateLimited);
        }
        if status.is_server_error() {
            return Ok(GenerationOutcome::Unavailable(format!(
                "backend returned {status}"
            )));
        }
        if status.is_client_error() {
            let details = response.text().await.unwrap_or_default();
            return Ok(GenerationOutcome::InvalidRequest(format!(
                "{status}: {details}"
            )));
        }

        let payload: Value = response.json().await?;
        match extract_answer_text(&payload) {
            Some(text) if !text.trim().is_empty() => Ok(GenerationOutcome::Answer(text)),
            _ => Err(CollaboratorError::BackendResponse {
                backend: "gemini".to_string(),
                details: "response contained no candidate text".to_string(),
            }),
        }
    }
}

fn extract_answer_text(payload: &Value) -> Option<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
