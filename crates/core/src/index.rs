use crate::embeddings::{cosine_similarity, Embedder};
use crate::models::Chunk;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-chunk term multiset and signature vector. Rebuilt from scratch when a
/// document is uploaded; documents are otherwise immutable, so at most once.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_index: usize,
    terms: HashMap<String, usize>,
    signature: Vec<f32>,
}

/// Scoring weights and floor for one retrieval call.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub lexical_weight: f64,
    pub vector_weight: f64,
    pub min_score: f64,
}

#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// In-memory lexical + signature index over one document's chunks.
pub struct ChunkIndex {
    document_id: String,
    chunks: Vec<Chunk>,
    entries: Vec<IndexEntry>,
    embedder: Box<dyn Embedder + Send + Sync>,
}

impl ChunkIndex {
    pub fn build(
        document_id: impl Into<String>,
        chunks: Vec<Chunk>,
        embedder: Box<dyn Embedder + Send + Sync>,
    ) -> Self {
        let entries = chunks
            .iter()
            .map(|chunk| IndexEntry {
                chunk_index: chunk.chunk_index,
                terms: term_counts(&chunk.text),
                signature: embedder.embed(&chunk.text),
            })
            .collect();

        Self {
            document_id: document_id.into(),
            chunks,
            entries,
            embedder,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Ranks chunks against `query`: weighted sum of lexical term overlap
    /// and signature cosine similarity, ties broken by lower chunk sequence
    /// number. Never mutates the index. Returns an empty vec (not an error)
    /// when nothing clears `min_score`.
    pub fn retrieve(&self, query: &str, k: usize, options: RetrievalOptions) -> Vec<RankedChunk> {
        let query_terms = query_terms(query);
        let query_signature = self.embedder.embed(query);

        // Entries and chunks run in lockstep, so rank by position; the
        // chunk's own sequence number may be sparse when the caller indexed
        // a filtered chunk list.
        let mut ranked: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let lexical = lexical_overlap(&query_terms, &entry.terms);
                let vector = cosine_similarity(&query_signature, &entry.signature).max(0.0);
                let score = options.lexical_weight * lexical + options.vector_weight * vector;
                (position, score)
            })
            .filter(|(_, score)| *score >= options.min_score)
            .collect();

        ranked.sort_by(|left, right| {
            right.1.total_cmp(&left.1).then_with(|| {
                self.chunks[left.0]
                    .chunk_index
                    .cmp(&self.chunks[right.0].chunk_index)
            })
        });

        debug!(
            document_id = %self.document_id,
            candidates = ranked.len(),
            k,
            "retrieval ranked chunks"
        );

        ranked
            .into_iter()
            .take(k)
            .map(|(position, score)| RankedChunk {
                chunk: self.chunks[position].clone(),
                score,
            })
            .collect()
    }
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in text.split_whitespace() {
        let term: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if term.len() > 2 {
            *counts.entry(term).or_insert(0) += 1;
        }
    }
    counts
}

fn query_terms(query: &str) -> HashSet<String> {
    term_counts(query).into_keys().collect()
}

/// Fraction of distinct query terms present in the chunk, in `[0, 1]`.
fn lexical_overlap(query_terms: &HashSet<String>, chunk_terms: &HashMap<String, usize>) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let matched = query_terms
        .iter()
        .filter(|term| chunk_terms.contains_key(*term))
        .count();
    matched as f64 / query_terms.len() as f64
}
