use crate::models::{ChatOptions, Chunk, Document};
use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl From<&ChatOptions> for ChunkingConfig {
    fn from(options: &ChatOptions) -> Self {
        Self {
            max_tokens: options.chunk_max_tokens,
            overlap_tokens: options.chunk_overlap_tokens,
        }
    }
}

/// Whitespace-token count, the unit every budget in the pipeline is
/// expressed in. Cheap and deterministic, which cache-key stability needs.
pub fn token_estimate(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Splits normalized text into sentences on `.`/`!`/`?` boundaries. The
/// trailing run without terminal punctuation is kept as a final sentence, so
/// the pieces always partition the input.
pub fn split_sentences(text: &str) -> Vec<String> {
    // Unwrap is safe: the pattern is a compile-time constant.
    let boundary = Regex::new(r"[^.!?]*[.!?]+").expect("valid sentence pattern");

    let mut sentences = Vec::new();
    let mut consumed = 0;
    for found in boundary.find_iter(text) {
        let sentence = found.as_str().trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        consumed = found.end();
    }

    let tail = text[consumed..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Splits each page's text on sentence boundaries and greedily packs
/// sentences into chunks of at most `max_tokens` tokens, carrying the last
/// `overlap_tokens` tokens of a chunk into the next. A single sentence
/// longer than the bound is kept whole as its own chunk. Deterministic for a
/// given document and config.
pub fn chunk_document(document: &Document, config: ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in &document.pages {
        if page.text.trim().is_empty() {
            continue;
        }

        let sentences = split_sentences(&page.text);
        let mut packed: Vec<(String, usize)> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0;
        let mut carried = 0;

        let mut flush =
            |current: &mut String, current_tokens: &mut usize, carried: &mut usize| {
                if !current.is_empty() {
                    packed.push((std::mem::take(current), *carried));
                    let overlap: Vec<&str> = packed
                        .last()
                        .map(|(text, _)| {
                            let words: Vec<&str> = text.split_whitespace().collect();
                            let keep = config.overlap_tokens.min(words.len());
                            words[words.len() - keep..].to_vec()
                        })
                        .unwrap_or_default();
                    *current = overlap.join(" ");
                    *carried = overlap.len();
                    *current_tokens = *carried;
                }
            };

        for sentence in sentences {
            let sentence_tokens = token_estimate(&sentence);

            if current_tokens + sentence_tokens > config.max_tokens && current_tokens > carried
            {
                flush(&mut current, &mut current_tokens, &mut carried);
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
            current_tokens += sentence_tokens;

            // An oversized sentence stands alone rather than being truncated.
            if sentence_tokens > config.max_tokens {
                flush(&mut current, &mut current_tokens, &mut carried);
            }
        }

        if current_tokens > carried || (current_tokens > 0 && packed.is_empty()) {
            packed.push((current, carried));
        }

        for (text, overlap) in packed {
            let chunk_index = chunks.len();
            chunks.push(Chunk {
                chunk_id: format!("{}-{:04}", document.document_id, chunk_index),
                document_id: document.document_id.clone(),
                page_start: page.index,
                page_end: page.index,
                chunk_index,
                token_estimate: token_estimate(&text),
                overlap_with_previous: overlap,
                text,
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Page};
    use chrono::Utc;

    fn document(pages: &[&str]) -> Document {
        Document {
            document_id: "doc".to_string(),
            pages: pages
                .iter()
                .enumerate()
                .map(|(index, text)| Page {
                    index,
                    text: text.to_string(),
                    low_confidence: false,
                })
                .collect(),
            parsed_at: Utc::now(),
        }
    }

    fn config(max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens: max,
            overlap_tokens: overlap,
        }
    }

    #[test]
    fn sentences_partition_the_text() {
        let sentences = split_sentences("One two. Three four! Five six? Trailing words");
        assert_eq!(
            sentences,
            vec!["One two.", "Three four!", "Five six?", "Trailing words"]
        );
    }

    #[test]
    fn chunking_is_deterministic() {
        let doc = document(&["Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa."]);
        let first = chunk_document(&doc, config(5, 2));
        let second = chunk_document(&doc, config(5, 2));
        assert_eq!(first, second);
        assert!(first.len() > 1);
    }

    #[test]
    fn chunks_respect_the_token_bound() {
        let text = (0..40)
            .map(|i| format!("word{i} word{i} word{i} word{i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let doc = document(&[&text]);
        for chunk in chunk_document(&doc, config(20, 4)) {
            assert!(chunk.token_estimate <= 20, "chunk exceeded bound: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_share_the_overlap() {
        let text = (0..30)
            .map(|i| format!("tok{i} tok{i} tok{i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let doc = document(&[&text]);
        let chunks = chunk_document(&doc, config(12, 3));
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let previous: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            let carried = pair[1].overlap_with_previous;
            assert_eq!(carried, 3);
            assert_eq!(&previous[previous.len() - carried..], &next[..carried]);
        }
    }

    #[test]
    fn oversized_sentence_is_kept_whole() {
        let long_sentence = (0..30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ") + ".";
        let text = format!("Short one. {long_sentence} Short two.");
        let doc = document(&[&text]);
        let chunks = chunk_document(&doc, config(10, 2));

        let whole = chunks
            .iter()
            .find(|chunk| chunk.text.contains("w0") && chunk.text.contains("w29"));
        assert!(whole.is_some(), "long sentence was split: {chunks:?}");
    }

    #[test]
    fn dropping_overlaps_reconstructs_the_page_text() {
        let text = (0..25)
            .map(|i| format!("alpha{i} beta{i} gamma{i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let doc = document(&[&text]);
        let chunks = chunk_document(&doc, config(15, 4));

        let mut rebuilt_words: Vec<String> = Vec::new();
        for chunk in &chunks {
            let words: Vec<&str> = chunk.text.split_whitespace().collect();
            for word in &words[chunk.overlap_with_previous..] {
                rebuilt_words.push((*word).to_string());
            }
        }
        assert_eq!(rebuilt_words.join(" "), text);
    }

    #[test]
    fn chunk_ids_embed_document_id_and_sequence() {
        let doc = document(&["First page sentence one. Sentence two.", "Second page text here."]);
        let chunks = chunk_document(&doc, config(50, 5));
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, format!("doc-{index:04}"));
            assert_eq!(chunk.chunk_index, index);
        }
    }
}
