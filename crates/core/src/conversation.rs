use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::error::{ChatError, FailureKind, GenerationFailure};
use crate::index::{ChunkIndex, RetrievalOptions};
use crate::models::{
    Answer, ChatOptions, ConversationTurn, GenerationOutcome, GenerationRequest, Role,
};
use crate::prompt::PromptBuilder;
use crate::traits::GenerativeModel;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Conversation lifecycle. `Failed` is reached on an unrecoverable
/// collaborator error and reported once; the manager then resets to
/// `AwaitingQuery` with history intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingQuery,
    Retrieving,
    Generating,
    Failed,
}

/// Holds turn history for one document, assembles bounded prompts from
/// retrieved chunks plus history, and dispatches to the generative-model
/// collaborator through the shared [`ResponseCache`].
///
/// A session serializes its own `ask` calls (`&mut self`); independent
/// sessions share nothing but the injected cache.
pub struct ConversationManager {
    index: ChunkIndex,
    history: Vec<ConversationTurn>,
    model: Arc<dyn GenerativeModel>,
    cache: Arc<ResponseCache>,
    builder: PromptBuilder,
    options: ChatOptions,
    state: SessionState,
}

impl ConversationManager {
    pub fn new(
        index: ChunkIndex,
        model: Arc<dyn GenerativeModel>,
        cache: Arc<ResponseCache>,
        options: ChatOptions,
    ) -> Self {
        let builder = PromptBuilder::new(
            options.prompt_kind,
            options.prompt_budget_tokens,
            options.truncation,
        );
        Self {
            index,
            history: Vec::new(),
            model,
            cache,
            builder,
            options,
            state: SessionState::AwaitingQuery,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn document_id(&self) -> &str {
        self.index.document_id()
    }

    /// Answers `query` from the document. Repeating an identical query
    /// against the unchanged document and retrieved-chunk set returns the
    /// cached answer without a collaborator call.
    pub async fn ask(&mut self, query: &str) -> Result<Answer, ChatError> {
        let document_id = self.index.document_id().to_string();
        let normalized_query = normalize_query(query);

        self.state = SessionState::Retrieving;
        let retrieved = self.index.retrieve(
            query,
            self.options.top_k,
            RetrievalOptions {
                lexical_weight: self.options.lexical_weight,
                vector_weight: self.options.vector_weight,
                min_score: self.options.min_score,
            },
        );

        if retrieved.is_empty() {
            self.state = SessionState::AwaitingQuery;
            debug!(%document_id, query, "no chunk cleared the relevance threshold");
            return Err(ChatError::NoGroundingFound {
                document_id,
                query: query.to_string(),
            });
        }

        let cited: Vec<String> = retrieved
            .iter()
            .map(|ranked| ranked.chunk.chunk_id.clone())
            .collect();
        let key = CacheKey::new(document_id.clone(), normalized_query, cited.clone());

        let prompt = self.builder.build(&self.history, &retrieved, query);
        let request = GenerationRequest {
            prompt,
            temperature: self.options.temperature,
            max_output_tokens: self.options.max_output_tokens,
        };

        self.state = SessionState::Generating;
        let model = Arc::clone(&self.model);
        let options = self.options.clone();
        let cited_for_entry = cited.clone();

        let outcome = self
            .cache
            .get_or_compute(key, move || async move {
                let (text, attempts) = generate_with_retry(model.as_ref(), &request, &options).await?;
                Ok(CacheEntry {
                    answer_text: text,
                    cited_chunk_ids: cited_for_entry,
                    attempts,
                    created_at: Utc::now(),
                })
            })
            .await;

        match outcome {
            Ok((entry, from_cache)) => {
                self.history.push(ConversationTurn {
                    role: Role::User,
                    text: query.to_string(),
                    cited_chunk_ids: Vec::new(),
                    created_at: Utc::now(),
                });
                self.history.push(ConversationTurn {
                    role: Role::Assistant,
                    text: entry.answer_text.clone(),
                    cited_chunk_ids: entry.cited_chunk_ids.clone(),
                    created_at: Utc::now(),
                });
                self.state = SessionState::AwaitingQuery;

                info!(%document_id, from_cache, attempts = entry.attempts, "answered query");
                Ok(Answer {
                    answer_id: Uuid::new_v4().to_string(),
                    text: entry.answer_text,
                    cited_chunk_ids: entry.cited_chunk_ids,
                    from_cache,
                    attempts: entry.attempts,
                })
            }
            Err(failure) => {
                // Report the failed turn without appending it, then reset so
                // the next ask can proceed with history preserved.
                self.state = SessionState::Failed;
                warn!(
                    %document_id,
                    attempts = failure.attempts,
                    kind = ?failure.kind,
                    "generation failed"
                );
                let error = ChatError::GenerationUnavailable {
                    document_id,
                    query: query.to_string(),
                    attempts: failure.attempts,
                    retryable: failure.kind.is_retryable(),
                    message: failure.message,
                };
                self.state = SessionState::AwaitingQuery;
                Err(error)
            }
        }
    }
}

pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Bounded retry loop around one collaborator call. Transient outcomes
/// (rate limited, unavailable, timeout) retry with capped exponential
/// backoff; `InvalidRequest` surfaces immediately. Returns the answer text
/// and the number of attempts spent.
async fn generate_with_retry(
    model: &dyn GenerativeModel,
    request: &GenerationRequest,
    options: &ChatOptions,
) -> Result<(String, u32), GenerationFailure> {
    let max_attempts = options.max_attempts.max(1);
    let mut last: Option<(FailureKind, String)> = None;

    for attempt in 1..=max_attempts {
        let call = tokio::time::timeout(options.call_timeout, model.generate(request)).await;

        let transient = match call {
            Ok(Ok(GenerationOutcome::Answer(text))) => return Ok((text, attempt)),
            Ok(Ok(GenerationOutcome::InvalidRequest(message))) => {
                return Err(GenerationFailure {
                    kind: FailureKind::InvalidRequest,
                    message,
                    attempts: attempt,
                });
            }
            Ok(Ok(GenerationOutcome::RateLimited)) => {
                (FailureKind::RateLimited, "rate limited".to_string())
            }
            Ok(Ok(GenerationOutcome::Unavailable(message))) => {
                (FailureKind::Unavailable, message)
            }
            Ok(Err(error)) => (FailureKind::Unavailable, error.to_string()),
            Err(_) => (
                FailureKind::Timeout,
                format!("no response within {:?}", options.call_timeout),
            ),
        };

        warn!(attempt, kind = ?transient.0, "transient generation failure");
        last = Some(transient);

        if attempt < max_attempts {
            tokio::time::sleep(backoff_delay(options, attempt)).await;
        }
    }

    let (kind, message) = last.unwrap_or((FailureKind::Unavailable, "unknown".to_string()));
    Err(GenerationFailure {
        kind,
        message,
        attempts: max_attempts,
    })
}

fn backoff_delay(options: &ChatOptions, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = options.backoff_base.saturating_mul(1u32 << exponent);
    delay.min(options.backoff_cap)
}
