pub mod cache;
pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod narrator;
pub mod prompt;
pub mod providers;
pub mod session;
pub mod traits;

pub use cache::{CacheEntry, CacheKey, ResponseCache};
pub use chunking::{chunk_document, split_sentences, token_estimate, ChunkingConfig};
pub use conversation::{normalize_query, ConversationManager, SessionState};
pub use embeddings::{Embedder, HashedTrigramEmbedder, DEFAULT_SIGNATURE_DIMENSIONS};
pub use error::{ChatError, CollaboratorError, FailureKind, GenerationFailure, ParseError};
pub use extractor::{fingerprint, normalize_whitespace, parse};
pub use index::{ChunkIndex, RankedChunk, RetrievalOptions};
pub use models::{
    Answer, AudioSegment, ChatOptions, Chunk, ConversationTurn, Document, GenerationOutcome,
    GenerationRequest, Page, Role, SegmentAudio, TruncationPolicy, VoiceParams,
};
pub use narrator::{plan_segments, Narrator};
pub use prompt::{PromptBuilder, PromptKind};
pub use providers::{ElevenLabsSynthesizer, GeminiModel};
pub use session::ChatSession;
pub use traits::{GenerativeModel, SpeechSynthesizer};
