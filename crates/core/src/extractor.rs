use crate::error::ParseError;
use crate::models::{Document, Page};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Boilerplate detection: a header/footer is a short line repeated
/// identically at a page edge on at least this many pages.
const BOILERPLATE_MIN_PAGES: usize = 3;
const BOILERPLATE_MAX_CHARS: usize = 80;
/// Lines inspected at the top and bottom of each page for boilerplate.
const EDGE_LINES: usize = 2;

/// Parses a PDF byte stream into a normalized [`Document`].
///
/// Pages that fail extraction individually are kept with
/// `low_confidence = true` rather than failing the whole document. Fails
/// with [`ParseError::UnreadableDocument`] when the bytes are not a valid
/// PDF and [`ParseError::EmptyDocument`] when no extractable text survives
/// normalization. No network calls.
pub fn parse(bytes: &[u8]) -> Result<Document, ParseError> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|error| ParseError::UnreadableDocument(error.to_string()))?;

    let document_id = fingerprint(bytes);

    let mut raw_pages = Vec::new();
    for (position, (page_no, _object_id)) in pdf.get_pages().into_iter().enumerate() {
        match pdf.extract_text(&[page_no]) {
            Ok(text) => raw_pages.push((position, strip_control_chars(&text), false)),
            Err(error) => {
                warn!(page = position, %error, "page text extraction failed");
                raw_pages.push((position, String::new(), true));
            }
        }
    }

    let boilerplate = detect_boilerplate(raw_pages.iter().map(|(_, text, _)| text.as_str()));

    let pages: Vec<Page> = raw_pages
        .into_iter()
        .map(|(index, text, failed)| {
            let normalized = normalize_page_text(&text, &boilerplate);
            let low_confidence = failed || is_low_confidence(&normalized);
            Page {
                index,
                text: normalized,
                low_confidence,
            }
        })
        .collect();

    if pages.iter().all(|page| page.text.trim().is_empty()) {
        return Err(ParseError::EmptyDocument);
    }

    debug!(
        document_id = %document_id,
        pages = pages.len(),
        low_confidence = pages.iter().filter(|p| p.low_confidence).count(),
        "parsed document"
    );

    Ok(Document {
        document_id,
        pages,
        parsed_at: Utc::now(),
    })
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Drops control characters but keeps line breaks, which boilerplate
/// detection still needs.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect()
}

/// Collects short lines that repeat identically at the top or bottom of
/// `BOILERPLATE_MIN_PAGES` or more pages.
fn detect_boilerplate<'a>(pages: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for page in pages {
        let lines: Vec<&str> = page
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        // Deduped per page so a line sitting at both edges of one page
        // still counts that page once.
        let mut edge: HashSet<&str> = lines.iter().take(EDGE_LINES).copied().collect();
        if lines.len() > 2 * EDGE_LINES {
            edge.extend(lines.iter().rev().take(EDGE_LINES).copied());
        } else {
            edge.extend(lines.iter().skip(EDGE_LINES).copied());
        }

        for line in edge {
            if line.len() <= BOILERPLATE_MAX_CHARS {
                *counts.entry(line.to_string()).or_insert(0) += 1;
            }
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count >= BOILERPLATE_MIN_PAGES)
        .map(|(line, _)| line)
        .collect()
}

/// Removes boilerplate lines, then collapses all remaining whitespace runs
/// to single spaces.
fn normalize_page_text(text: &str, boilerplate: &[String]) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !boilerplate.iter().any(|b| b == line))
        .collect();

    normalize_whitespace(&kept.join(" "))
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A page whose surviving text is tiny or mostly non-alphanumeric is likely
/// a scanned image or extraction garbage.
fn is_low_confidence(normalized: &str) -> bool {
    let trimmed = normalized.trim();
    if trimmed.len() < 16 {
        return true;
    }
    let alnum = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    (alnum as f64) / (trimmed.chars().count() as f64) < 0.3
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::path::Path;

    /// Writes a one-page PDF carrying `text` in a single text object.
    fn write_pdf(path: &Path, text: &str) {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = pdf.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = pdf.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        pdf.trailer.set("Root", catalog_id);
        pdf.save(path).expect("save pdf");
    }

    #[test]
    fn pdf_on_disk_round_trips_through_parse() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("paper.pdf");
        write_pdf(
            &path,
            "Sparse retrieval methods improve with larger corpora.",
        );

        let bytes = std::fs::read(&path).expect("read pdf");
        let document = parse(&bytes).expect("parse");

        assert_eq!(document.pages.len(), 1);
        assert!(document.pages[0].text.contains("retrieval methods"));
        assert!(!document.pages[0].low_confidence);
        assert_eq!(document.document_id, fingerprint(&bytes));
    }

    #[test]
    fn invalid_bytes_are_unreadable() {
        let result = parse(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(ParseError::UnreadableDocument(_))));
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }

    #[test]
    fn control_chars_are_stripped_but_newlines_kept() {
        let cleaned = strip_control_chars("a\u{0}b\nc\td");
        assert_eq!(cleaned, "ab\ncd");
    }

    #[test]
    fn repeated_edge_lines_become_boilerplate() {
        let pages = [
            "Journal of Testing\nIntroduction text here.\nPage 1",
            "Journal of Testing\nMethods text here.\nPage 2",
            "Journal of Testing\nResults text here.\nPage 3",
        ];
        let boilerplate = detect_boilerplate(pages.iter().copied());
        assert!(boilerplate.contains(&"Journal of Testing".to_string()));
        // Page numbers differ per page, so they are not repeated lines.
        assert!(!boilerplate.contains(&"Page 1".to_string()));
    }

    #[test]
    fn boilerplate_needs_three_pages() {
        let pages = ["Header\nBody one.", "Header\nBody two."];
        let boilerplate = detect_boilerplate(pages.iter().copied());
        assert!(boilerplate.is_empty());
    }

    #[test]
    fn line_at_both_edges_of_a_page_counts_that_page_once() {
        // "Acme Corp" appears as header and footer of each page; two pages
        // must still fall short of the three-page threshold.
        let pages = [
            "Acme Corp\nIntroduction body text spanning the page.\nMore body.\nEven more body.\nAcme Corp",
            "Acme Corp\nMethods body text spanning the page.\nMore body.\nEven more body.\nAcme Corp",
        ];
        let boilerplate = detect_boilerplate(pages.iter().copied());
        assert!(boilerplate.is_empty());
    }

    #[test]
    fn normalization_drops_boilerplate_and_collapses_whitespace() {
        let boilerplate = vec!["Journal of Testing".to_string()];
        let text = "Journal of Testing\n  The   quick\nbrown fox.  ";
        assert_eq!(
            normalize_page_text(text, &boilerplate),
            "The quick brown fox."
        );
    }

    #[test]
    fn short_or_symbol_heavy_pages_are_low_confidence() {
        assert!(is_low_confidence(""));
        assert!(is_low_confidence(". . . | | | --- ===  ### ..."));
        assert!(!is_low_confidence(
            "A perfectly ordinary paragraph of extracted sentence text."
        ));
    }
}
