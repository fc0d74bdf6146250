use crate::cache::ResponseCache;
use crate::chunking::{chunk_document, ChunkingConfig};
use crate::conversation::{ConversationManager, SessionState};
use crate::embeddings::HashedTrigramEmbedder;
use crate::error::{ChatError, ParseError};
use crate::extractor;
use crate::index::ChunkIndex;
use crate::models::{Answer, AudioSegment, ChatOptions, ConversationTurn, Document, VoiceParams};
use crate::narrator::Narrator;
use crate::traits::{GenerativeModel, SpeechSynthesizer};
use std::sync::Arc;
use tracing::info;

/// One uploaded paper and its conversation. Built by [`ChatSession::upload`],
/// which runs parse → chunk → index exactly once; the document is immutable
/// afterwards. Sessions are independent and share only the injected
/// process-wide [`ResponseCache`].
pub struct ChatSession {
    document: Document,
    manager: ConversationManager,
    narrator: Option<Narrator>,
}

impl ChatSession {
    /// Upload boundary: raw PDF bytes in, ready-to-query session out.
    pub fn upload(
        bytes: &[u8],
        model: Arc<dyn GenerativeModel>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        cache: Arc<ResponseCache>,
        options: ChatOptions,
    ) -> Result<Self, ParseError> {
        let document = extractor::parse(bytes)?;
        let chunks = chunk_document(&document, ChunkingConfig::from(&options));
        let index = ChunkIndex::build(
            document.document_id.clone(),
            chunks,
            Box::new(HashedTrigramEmbedder::default()),
        );

        info!(
            document_id = %document.document_id,
            pages = document.pages.len(),
            chunks = index.chunk_count(),
            "session ready"
        );

        let narrator = synthesizer.map(|synthesizer| {
            Narrator::new(
                synthesizer,
                VoiceParams::default(),
                options.segment_max_chars,
                options.call_timeout,
            )
        });
        let manager = ConversationManager::new(index, model, cache, options);

        Ok(Self {
            document,
            manager,
            narrator,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document.document_id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.manager.history()
    }

    /// Query boundary: question in, grounded answer out.
    pub async fn ask(&mut self, query: &str) -> Result<Answer, ChatError> {
        self.manager.ask(query).await
    }

    /// Like [`ask`](Self::ask), additionally narrating the answer. Segments
    /// that fail synthesis come back as skipped markers; narration without a
    /// configured synthesizer is an error.
    pub async fn ask_narrated(
        &mut self,
        query: &str,
    ) -> Result<(Answer, Vec<AudioSegment>), ChatError> {
        let narrator = self.narrator.as_ref().ok_or_else(|| {
            ChatError::NarrationFailed("no speech synthesizer configured".to_string())
        })?;

        let answer = self.manager.ask(query).await?;
        let segments = narrator.narrate(&answer.answer_id, &answer.text).await;
        Ok((answer, segments))
    }
}
