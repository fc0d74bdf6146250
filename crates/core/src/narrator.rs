use crate::chunking::split_sentences;
use crate::models::{AudioSegment, SegmentAudio, VoiceParams};
use crate::traits::SpeechSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Splits answer text into speech-safe pieces, each at most `max_chars`
/// characters, on sentence boundaries first, clause boundaries when a
/// sentence alone exceeds the limit, and word boundaries as a last resort.
/// Boundaries are computed up front, the plan is deterministic, and the
/// pieces cover the text in order with no gaps or overlaps in content.
pub fn plan_segments(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<String> = Vec::new();

    for sentence in split_sentences(text) {
        if sentence.len() <= max_chars {
            pieces.push(sentence);
        } else {
            pieces.extend(split_clauses(&sentence, max_chars));
        }
    }

    // Greedy re-packing so short sentences share a synthesis request.
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.len() + 1 + piece.len() <= max_chars {
            current.push(' ');
            current.push_str(&piece);
        } else {
            if !current.is_empty() {
                segments.push(current);
            }
            current = piece;
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn split_clauses(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut clauses: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in sentence.chars() {
        current.push(c);
        if matches!(c, ',' | ';' | ':') && current.len() >= max_chars / 2 {
            clauses.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current.trim().to_string());
    }

    clauses
        .into_iter()
        .flat_map(|clause| {
            if clause.len() <= max_chars {
                vec![clause]
            } else {
                split_words(&clause, max_chars)
            }
        })
        .collect()
}

fn split_words(clause: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in clause.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Drives the speech-synthesis collaborator over a precomputed segment
/// plan. Per-segment failures degrade to a skipped marker instead of
/// aborting narration; no audio is cached, so re-invoking `narrate` on the
/// same text issues fresh synthesis calls over the same segmentation.
pub struct Narrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceParams,
    max_chars: usize,
    call_timeout: Duration,
}

impl Narrator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceParams,
        max_chars: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            max_chars,
            call_timeout,
        }
    }

    pub async fn narrate(&self, answer_id: &str, text: &str) -> Vec<AudioSegment> {
        let plan = plan_segments(text, self.max_chars);
        debug!(answer_id, segments = plan.len(), "narration plan ready");

        let mut segments = Vec::with_capacity(plan.len());
        for (index, segment_text) in plan.into_iter().enumerate() {
            let call = tokio::time::timeout(
                self.call_timeout,
                self.synthesizer.synthesize(&segment_text, &self.voice),
            )
            .await;

            let audio = match call {
                Ok(Ok(bytes)) => SegmentAudio::Bytes(bytes),
                Ok(Err(error)) => {
                    warn!(answer_id, index, %error, "segment synthesis failed, skipping");
                    SegmentAudio::Skipped
                }
                Err(_) => {
                    warn!(answer_id, index, "segment synthesis timed out, skipping");
                    SegmentAudio::Skipped
                }
            };

            segments.push(AudioSegment {
                answer_id: answer_id.to_string(),
                index,
                text: segment_text,
                audio,
            });
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySynthesizer {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FlakySynthesizer {
        async fn synthesize(
            &self,
            text: &str,
            _voice: &VoiceParams,
        ) -> Result<Vec<u8>, CollaboratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on {
                return Err(CollaboratorError::BackendResponse {
                    backend: "tts".to_string(),
                    details: "synthesis refused".to_string(),
                });
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn answer_text() -> String {
        // Six 80-char sentences, ~500 chars in all; at a 200-char limit the
        // planner packs them pairwise into exactly three segments.
        let sentence = format!("{}.", "word ".repeat(16).trim());
        assert_eq!(sentence.len(), 80);
        vec![sentence; 6].join(" ")
    }

    #[test]
    fn planning_a_500_char_answer_at_200_yields_three_ordered_segments() {
        let text = answer_text();
        let segments = plan_segments(&text, 200);

        assert_eq!(segments.len(), 3);
        for segment in &segments {
            assert!(segment.len() <= 200);
        }
        // No gaps or overlaps: rejoining reproduces the original content.
        assert_eq!(segments.join(" "), text);
    }

    #[test]
    fn planning_is_restartable() {
        let text = answer_text();
        assert_eq!(plan_segments(&text, 200), plan_segments(&text, 200));
    }

    #[test]
    fn oversized_sentence_falls_back_to_clause_boundaries() {
        let sentence = format!(
            "{}, {}, {}.",
            "alpha ".repeat(20).trim(),
            "beta ".repeat(20).trim(),
            "gamma ".repeat(20).trim()
        );
        let segments = plan_segments(&sentence, 150);
        assert!(segments.len() >= 2);
        for segment in &segments {
            assert!(segment.len() <= 150, "segment too long: {segment}");
        }
    }

    #[test]
    fn clause_without_boundaries_splits_on_words() {
        let clause = "unbroken ".repeat(40);
        let segments = plan_segments(clause.trim(), 100);
        assert!(segments.len() >= 3);
        for segment in &segments {
            assert!(segment.len() <= 100);
        }
        assert_eq!(segments.join(" "), clause.trim());
    }

    #[tokio::test]
    async fn failed_segment_is_skipped_and_the_rest_continue() {
        let synthesizer = Arc::new(FlakySynthesizer {
            calls: AtomicUsize::new(0),
            fail_on: Some(1),
        });
        let narrator = Narrator::new(
            synthesizer,
            VoiceParams::default(),
            200,
            Duration::from_secs(1),
        );

        let segments = narrator.narrate("answer-1", &answer_text()).await;
        assert_eq!(segments.len(), 3);
        assert!(matches!(segments[0].audio, SegmentAudio::Bytes(_)));
        assert_eq!(segments[1].audio, SegmentAudio::Skipped);
        assert!(matches!(segments[2].audio, SegmentAudio::Bytes(_)));
        for (index, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, index);
            assert_eq!(segment.answer_id, "answer-1");
        }
    }
}
