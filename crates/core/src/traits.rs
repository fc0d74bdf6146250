use crate::error::CollaboratorError;
use crate::models::{GenerationOutcome, GenerationRequest, VoiceParams};
use async_trait::async_trait;

/// Opaque generative-model collaborator. Implementations coerce whatever the
/// backend returns into a [`GenerationOutcome`] variant; retry and backoff
/// policy lives in the caller, not here.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, CollaboratorError>;
}

/// Opaque speech-synthesis collaborator: one text segment in, raw audio
/// bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<Vec<u8>, CollaboratorError>;
}
