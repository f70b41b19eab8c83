//! Text normalization and sentence-window splitting for converted documents.

use unicode_segmentation::UnicodeSegmentation;

use crate::domain::{ChunkMetadata, Document, DocumentChunk, DomainError};

pub const PAGE_BREAK: char = '\x0c';

/// Normalizes extraction artifacts in every page of `text`.
///
/// Page breaks survive; inside a page, whitespace runs collapse to one
/// space, lines are trimmed and empty lines are dropped.
pub fn clean_content(text: &str) -> String {
    text.split(PAGE_BREAK)
        .map(clean_page)
        .collect::<Vec<_>>()
        .join(&PAGE_BREAK.to_string())
}

fn clean_page(page: &str) -> String {
    normalize_glyphs(page)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_glyphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\0' | '\u{00AD}' => {}
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            _ => out.push(c),
        }
    }
    out
}

/// Splits a document into overlapping windows of sentences.
///
/// Each window holds `split_length` sentences and starts
/// `split_length - split_overlap` sentences after the previous one. The
/// last window is the first one that reaches the end of the text.
pub fn split_by_sentence(
    document: &Document,
    split_length: usize,
    split_overlap: usize,
) -> Result<Vec<DocumentChunk>, DomainError> {
    if split_length == 0 {
        return Err(DomainError::configuration("split length must be positive"));
    }
    if split_overlap >= split_length {
        return Err(DomainError::configuration(format!(
            "split overlap ({split_overlap}) must be smaller than split length ({split_length})"
        )));
    }

    let content = document.content.as_str();
    // Extracted text breaks at every visual line. Sentence bounds are taken
    // on a copy with newlines as spaces; both are one byte, so offsets hold.
    let flowed = content.replace('\n', " ");
    let starts: Vec<usize> = flowed
        .split_sentence_bound_indices()
        .map(|(idx, _)| idx)
        .collect();

    let mut chunks = Vec::new();
    if starts.is_empty() {
        return Ok(chunks);
    }

    let step = split_length - split_overlap;
    let mut start = 0;
    loop {
        let end = (start + split_length).min(starts.len());
        let byte_start = starts[start];
        let byte_end = starts.get(end).copied().unwrap_or(content.len());
        let text = &content[byte_start..byte_end];

        if !text.trim().is_empty() {
            let metadata = ChunkMetadata {
                source: document.source.clone(),
                page_number: 1 + content[..byte_start].matches(PAGE_BREAK).count(),
                split_idx_start: byte_start,
            };
            chunks.push(DocumentChunk::new(document.id, text, chunks.len()).with_metadata(metadata));
        }

        if end == starts.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
