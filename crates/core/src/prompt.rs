use crate::chunking::token_estimate;
use crate::index::RankedChunk;
use crate::models::{ConversationTurn, Role, TruncationPolicy};

/// Prompt flavors for a grounded exchange with one paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Default conversational mode: answer from the cited excerpts only.
    GroundedAnswer,
    /// Short executive summary of the retrieved material.
    QuickSummary,
    /// Focus on research design, data collection, analysis techniques.
    MethodologyAnalysis,
    /// Extract the principal findings and their significance.
    KeyFindings,
}

impl PromptKind {
    pub fn system_instructions(self) -> &'static str {
        match self {
            PromptKind::GroundedAnswer => {
                "You are a research assistant answering questions about a single paper. \
                 Answer using only the numbered excerpts provided below. \
                 Cite the excerpt ids you relied on. \
                 If the excerpts do not contain the answer, say so plainly. \
                 Write in clear prose that reads well when spoken aloud."
            }
            PromptKind::QuickSummary => {
                "Summarize the provided excerpts of a research paper in a short, \
                 decision-oriented briefing: the core question, why it matters, the \
                 essential method, and the critical findings. Stay within the excerpts."
            }
            PromptKind::MethodologyAnalysis => {
                "Analyze the methodology described in the provided excerpts: research \
                 design, data collection, analysis techniques, strengths, and \
                 limitations. Do not speculate beyond the excerpts."
            }
            PromptKind::KeyFindings => {
                "Extract the principal findings from the provided excerpts, with their \
                 significance and any stated limitations. Cite excerpt ids."
            }
        }
    }
}

/// Assembles system instructions + truncated history + retrieved excerpts +
/// the query into one prompt under a token budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    pub kind: PromptKind,
    pub budget_tokens: usize,
    pub policy: TruncationPolicy,
}

impl PromptBuilder {
    pub fn new(kind: PromptKind, budget_tokens: usize, policy: TruncationPolicy) -> Self {
        Self {
            kind,
            budget_tokens,
            policy,
        }
    }

    pub fn build(
        &self,
        history: &[ConversationTurn],
        retrieved: &[RankedChunk],
        query: &str,
    ) -> String {
        let system = self.kind.system_instructions();
        let fixed_cost = token_estimate(system) + token_estimate(query) + 16;

        let chunk_cost: Vec<usize> = retrieved
            .iter()
            .map(|ranked| token_estimate(&ranked.chunk.text) + 4)
            .collect();
        let history_cost: Vec<usize> = history
            .iter()
            .map(|turn| token_estimate(&turn.text) + 3)
            .collect();

        let mut kept_chunks = retrieved.len();
        let mut dropped_oldest = 0;

        let total = |kept_chunks: usize, dropped_oldest: usize| -> usize {
            fixed_cost
                + chunk_cost.iter().take(kept_chunks).sum::<usize>()
                + history_cost.iter().skip(dropped_oldest).sum::<usize>()
        };

        match self.policy {
            TruncationPolicy::HistoryFirst => {
                while total(kept_chunks, dropped_oldest) > self.budget_tokens
                    && dropped_oldest < history.len()
                {
                    dropped_oldest += 1;
                }
                // Retrieved chunks are the grounding; only shed them once the
                // whole history is gone and the budget still does not fit.
                while total(kept_chunks, dropped_oldest) > self.budget_tokens && kept_chunks > 1 {
                    kept_chunks -= 1;
                }
            }
            TruncationPolicy::ChunksFirst => {
                while total(kept_chunks, dropped_oldest) > self.budget_tokens && kept_chunks > 1 {
                    kept_chunks -= 1;
                }
                while total(kept_chunks, dropped_oldest) > self.budget_tokens
                    && dropped_oldest < history.len()
                {
                    dropped_oldest += 1;
                }
            }
        }

        let mut prompt = String::new();
        prompt.push_str(system);
        prompt.push_str("\n\n");

        if dropped_oldest < history.len() {
            prompt.push_str("Conversation so far:\n");
            for turn in &history[dropped_oldest..] {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{speaker}: {}\n", turn.text));
            }
            prompt.push('\n');
        }

        prompt.push_str("Excerpts:\n");
        for ranked in retrieved.iter().take(kept_chunks) {
            prompt.push_str(&format!(
                "[{}] (pages {}-{}) {}\n",
                ranked.chunk.chunk_id,
                ranked.chunk.page_start + 1,
                ranked.chunk.page_end + 1,
                ranked.chunk.text
            ));
        }

        prompt.push_str(&format!("\nQuestion: {query}\n"));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use chrono::Utc;

    fn ranked(index: usize, text: &str) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                chunk_id: format!("doc-{index:04}"),
                document_id: "doc".to_string(),
                page_start: 0,
                page_end: 0,
                chunk_index: index,
                text: text.to_string(),
                token_estimate: text.split_whitespace().count(),
                overlap_with_previous: 0,
            },
            score: 1.0 - index as f64 * 0.1,
        }
    }

    fn turn(role: Role, text: &str) -> ConversationTurn {
        ConversationTurn {
            role,
            text: text.to_string(),
            cited_chunk_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prompt_contains_all_sections() {
        let builder = PromptBuilder::new(
            PromptKind::GroundedAnswer,
            2_000,
            TruncationPolicy::HistoryFirst,
        );
        let history = vec![
            turn(Role::User, "What is the abstract about?"),
            turn(Role::Assistant, "It studies sparse retrieval."),
        ];
        let prompt = builder.build(
            &history,
            &[ranked(0, "Methods: a randomized trial.")],
            "What method was used?",
        );

        assert!(prompt.contains("research assistant"));
        assert!(prompt.contains("Conversation so far:"));
        assert!(prompt.contains("It studies sparse retrieval."));
        assert!(prompt.contains("[doc-0000]"));
        assert!(prompt.contains("Question: What method was used?"));
    }

    #[test]
    fn oldest_history_is_dropped_first() {
        // Budget fits system + chunk + query + the newest turn, not more.
        let budget = token_estimate(PromptKind::GroundedAnswer.system_instructions()) + 40;
        let builder =
            PromptBuilder::new(PromptKind::GroundedAnswer, budget, TruncationPolicy::HistoryFirst);
        let history = vec![
            turn(Role::User, "oldest question about background material"),
            turn(Role::Assistant, "an older answer about the background"),
            turn(Role::User, "newest question still pending context"),
        ];
        let prompt = builder.build(
            &history,
            &[ranked(0, "Excerpt text kept intact.")],
            "current question",
        );

        assert!(!prompt.contains("oldest question"));
        assert!(prompt.contains("newest question"));
        assert!(prompt.contains("Excerpt text kept intact."));
    }

    #[test]
    fn chunks_first_policy_sheds_lowest_ranked_chunks() {
        let long = "word ".repeat(30);
        let builder =
            PromptBuilder::new(PromptKind::GroundedAnswer, 120, TruncationPolicy::ChunksFirst);
        let history = vec![turn(Role::User, "kept history line")];
        let prompt = builder.build(
            &history,
            &[ranked(0, &long), ranked(1, &long), ranked(2, &long)],
            "question",
        );

        assert!(prompt.contains("kept history line"));
        assert!(prompt.contains("[doc-0000]"));
        assert!(!prompt.contains("[doc-0002]"));
    }

    #[test]
    fn each_kind_renders_its_own_instructions() {
        let cases = [
            (PromptKind::QuickSummary, "decision-oriented briefing"),
            (PromptKind::MethodologyAnalysis, "research design"),
            (PromptKind::KeyFindings, "principal findings"),
        ];
        for (kind, marker) in cases {
            let builder = PromptBuilder::new(kind, 2_000, TruncationPolicy::HistoryFirst);
            let prompt = builder.build(&[], &[ranked(0, "Excerpt body.")], "question");
            assert!(prompt.contains(marker), "{kind:?} missing its instructions");
            assert!(prompt.contains("Question: question"));
        }
    }

    #[test]
    fn empty_history_omits_the_history_section() {
        let builder = PromptBuilder::new(
            PromptKind::GroundedAnswer,
            2_000,
            TruncationPolicy::HistoryFirst,
        );
        let prompt = builder.build(&[], &[ranked(0, "text")], "q");
        assert!(!prompt.contains("Conversation so far:"));
    }
}
