use crate::prompt::PromptKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A parsed, normalized document. Immutable once built; the id is a SHA-256
/// fingerprint of the uploaded bytes, so re-uploading identical content
/// yields identical chunk and cache keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub pages: Vec<Page>,
    pub parsed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    /// Normalized page text, empty when extraction produced nothing usable.
    pub text: String,
    /// Set when page extraction failed or yielded mostly non-text garbage.
    pub low_confidence: bool,
}

/// A bounded-length, overlapping slice of a document's normalized text,
/// the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Document fingerprint plus sequence number.
    pub chunk_id: String,
    pub document_id: String,
    pub page_start: usize,
    pub page_end: usize,
    pub chunk_index: usize,
    pub text: String,
    /// Whitespace-token estimate of `text`.
    pub token_estimate: usize,
    /// Tokens at the head of `text` carried over from the previous chunk.
    pub overlap_with_previous: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub cited_chunk_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: String,
    pub text: String,
    pub cited_chunk_ids: Vec<String>,
    pub from_cache: bool,
    /// Collaborator attempts spent producing the answer (1 when it came
    /// straight from the cache's original computation).
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Fixed internal result set the generation boundary coerces dynamic
/// collaborator responses into. Internal code never branches on raw payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Answer(String),
    RateLimited,
    InvalidRequest(String),
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceParams {
    pub voice_id: String,
    pub output_format: String,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice_id: "YFpUSo240svj7tcmDapZ".to_string(),
            output_format: "mp3_44100_128".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentAudio {
    Bytes(Vec<u8>),
    /// Synthesis failed for this segment; playback skips it.
    Skipped,
}

/// One speech-safe slice of an answer, discarded after playback.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub answer_id: String,
    pub index: usize,
    pub text: String,
    pub audio: SegmentAudio,
}

/// Which side loses when history and retrieved chunks compete for prompt
/// budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Drop oldest history turns first (default).
    HistoryFirst,
    /// Drop lowest-ranked chunks first.
    ChunksFirst,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub top_k: usize,
    pub min_score: f64,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    pub prompt_budget_tokens: usize,
    pub prompt_kind: PromptKind,
    pub truncation: TruncationPolicy,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub call_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub segment_max_chars: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 220,
            chunk_overlap_tokens: 32,
            top_k: 6,
            // Above the cosine noise floor of the trigram signatures, so
            // off-topic queries fall through to NoGroundingFound.
            min_score: 0.2,
            lexical_weight: 0.55,
            vector_weight: 0.35,
            prompt_budget_tokens: 1_800,
            prompt_kind: PromptKind::GroundedAnswer,
            truncation: TruncationPolicy::HistoryFirst,
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(2),
            call_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(15 * 60),
            cache_capacity: 256,
            segment_max_chars: 400,
            temperature: 0.4,
            max_output_tokens: 2_048,
        }
    }
}
