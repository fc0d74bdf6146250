use crate::error::CollaboratorError;
use crate::models::VoiceParams;
use crate::traits::SpeechSynthesizer;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://api.elevenlabs.io";
const MODEL_ID: &str = "eleven_turbo_v2_5";

/// ElevenLabs text-to-speech client: one segment in, mp3 bytes out.
pub struct ElevenLabsSynthesizer {
    endpoint: String,
    api_key: String,
    client: Client,
}

/// Character-alignment entry from the with-timestamps endpoint.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub characters: Vec<String>,
    pub start_times_s: Vec<f64>,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn speech_url(&self, voice_id: &str, with_timestamps: bool) -> Result<Url, CollaboratorError> {
        let suffix = if with_timestamps {
            "/stream/with-timestamps"
        } else {
            "/stream"
        };
        let url = Url::parse(&format!(
            "{}/v1/text-to-speech/{voice_id}{suffix}",
            self.endpoint
        ))?;
        Ok(url)
    }

    /// Synthesis variant that also returns character timing, for callers
    /// that highlight text during playback. The endpoint streams JSON lines
    /// carrying base64 audio plus alignment blocks.
    pub async fn synthesize_with_alignment(
        &self,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<(Vec<u8>, Vec<Alignment>), CollaboratorError> {
        let response = self
            .client
            .post(self.speech_url(&voice.voice_id, true)?)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": MODEL_ID,
                "output_format": voice.output_format,
            }))
            .send()
            .await?
            .error_for_status()?;

        let raw = response.text().await?;
        decode_alignment_lines(&raw)
    }
}

/// Decodes the with-timestamps response body: one JSON object per line,
/// each carrying base64 audio and, when present, an alignment block.
fn decode_alignment_lines(raw: &str) -> Result<(Vec<u8>, Vec<Alignment>), CollaboratorError> {
    let mut audio = Vec::new();
    let mut alignments = Vec::new();

    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let value: Value =
            serde_json::from_str(line).map_err(|error| CollaboratorError::BackendResponse {
                backend: "elevenlabs".to_string(),
                details: format!("bad alignment line: {error}"),
            })?;

        if let Some(encoded) = value.get("audio_base64").and_then(Value::as_str) {
            let bytes =
                STANDARD
                    .decode(encoded)
                    .map_err(|error| CollaboratorError::BackendResponse {
                        backend: "elevenlabs".to_string(),
                        details: format!("bad base64 audio: {error}"),
                    })?;
            audio.extend(bytes);
        }

        if let Some(alignment) = value.get("alignment").filter(|v| !v.is_null()) {
            alignments.push(parse_alignment(alignment));
        }
    }

    Ok((audio, alignments))
}

fn parse_alignment(value: &Value) -> Alignment {
    let characters = value
        .get("characters")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let start_times_s = value
        .get("character_start_times_seconds")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    Alignment {
        characters,
        start_times_s,
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let response = self
            .client
            .post(self.speech_url(&voice.voice_id, false)?)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": MODEL_ID,
                "output_format": voice.output_format,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}
