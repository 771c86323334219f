//! Document chunking.
//!
//! Splits text at paragraph boundaries into size-bounded chunks. The
//! `semantic` method additionally breaks before section headings, prefers
//! sentence boundaries when a paragraph must be split, and carries trailing
//! overlap from the previous chunk as leading context.

use lattice_core::{Chunk, ChunkConfig, ChunkMethod};
use uuid::Uuid;

/// A produced chunk before it is bound to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSlice {
    pub ordinal: usize,
    pub text: String,
    /// Byte offset of the chunk's own (non-overlap) text in the source.
    pub char_offset: usize,
    /// Leading bytes copied from the previous chunk as context.
    pub overlap_len: usize,
}

/// Snap a byte position to the nearest char boundary at or before it.
fn snap_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn is_heading(paragraph: &str) -> bool {
    let first = paragraph.lines().next().unwrap_or("");
    first.starts_with('#')
}

/// Split into (absolute byte offset, paragraph) pairs at blank-line
/// boundaries. Whitespace-only paragraphs are skipped.
fn split_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        // A paragraph break is a newline followed by a blank line.
        if bytes[i] == b'\n' {
            let rest = &text[i..];
            let blank_end = rest
                .char_indices()
                .take_while(|(_, c)| c.is_whitespace())
                .filter(|(_, c)| *c == '\n')
                .nth(1);
            if blank_end.is_some() {
                push_paragraph(&mut out, text, start, i);
                // Skip the whitespace run.
                let skipped = rest
                    .char_indices()
                    .find(|(_, c)| !c.is_whitespace())
                    .map(|(j, _)| j)
                    .unwrap_or(rest.len());
                start = i + skipped;
                i = start;
                continue;
            }
        }
        i += 1;
    }
    push_paragraph(&mut out, text, start, text.len());
    out
}

fn push_paragraph<'a>(out: &mut Vec<(usize, &'a str)>, text: &'a str, start: usize, end: usize) {
    if start >= end {
        return;
    }
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    out.push((start + lead, trimmed));
}

/// Split a paragraph after sentence-ending punctuation (or newlines),
/// returning offsets relative to the paragraph.
fn split_sentences(paragraph: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end_here = match c {
            '.' | '!' | '?' => chars
                .peek()
                .map(|(_, next)| next.is_whitespace())
                .unwrap_or(true),
            '\n' => true,
            _ => false,
        };
        if end_here {
            let end = i + c.len_utf8();
            let piece = paragraph[start..end].trim();
            if !piece.is_empty() {
                let lead = paragraph[start..end].len() - paragraph[start..end].trim_start().len();
                out.push((start + lead, piece));
            }
            start = end;
        }
    }
    if start < paragraph.len() {
        let piece = paragraph[start..].trim();
        if !piece.is_empty() {
            let lead = paragraph[start..].len() - paragraph[start..].trim_start().len();
            out.push((start + lead, piece));
        }
    }
    out
}

/// Break an oversized block into pieces no longer than `max_len`, at
/// sentence boundaries where possible, hard-splitting as a last resort.
fn split_oversize(offset: usize, block: &str, max_len: usize) -> Vec<(usize, String)> {
    let mut pieces: Vec<(usize, String)> = Vec::new();
    let mut cur = String::new();
    let mut cur_offset = offset;

    for (rel, sentence) in split_sentences(block) {
        let abs = offset + rel;
        if sentence.len() > max_len {
            if !cur.is_empty() {
                pieces.push((cur_offset, std::mem::take(&mut cur)));
            }
            // Hard-split a single overlong sentence.
            let mut p = 0;
            while p < sentence.len() {
                let end = snap_boundary(sentence, p + max_len);
                let end = if end <= p { sentence.len() } else { end };
                pieces.push((abs + p, sentence[p..end].to_string()));
                p = end;
            }
            cur_offset = abs + sentence.len();
            continue;
        }
        if !cur.is_empty() && cur.len() + 1 + sentence.len() > max_len {
            pieces.push((cur_offset, std::mem::take(&mut cur)));
        }
        if cur.is_empty() {
            cur_offset = abs;
            cur.push_str(sentence);
        } else {
            cur.push(' ');
            cur.push_str(sentence);
        }
    }
    if !cur.is_empty() {
        pieces.push((cur_offset, cur));
    }
    pieces
}

/// Chunk `text` per the config. Ordinals are 0-based and dense; empty
/// chunks are dropped; no chunk exceeds 2x the target size.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<ChunkSlice> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let target = config.target_size.max(64);
    let max_chunk = target + target / 2;
    // Overlap is capped so overlap + body stays within the 2x bound.
    let overlap = match config.method {
        ChunkMethod::Semantic => config.overlap.min(target / 2),
        ChunkMethod::Fixed => 0,
    };

    // Gather packable blocks: paragraphs, oversize ones pre-split.
    let mut blocks: Vec<(usize, String, bool)> = Vec::new();
    for (offset, paragraph) in split_paragraphs(text) {
        let heading = config.method == ChunkMethod::Semantic && is_heading(paragraph);
        if paragraph.len() > max_chunk {
            for (i, (abs, piece)) in split_oversize(offset, paragraph, max_chunk).into_iter().enumerate() {
                blocks.push((abs, piece, heading && i == 0));
            }
        } else {
            blocks.push((offset, paragraph.to_string(), heading));
        }
    }

    // Greedy packing into [target/2, 1.5*target].
    let mut cores: Vec<(usize, String)> = Vec::new();
    let mut cur = String::new();
    let mut cur_offset = 0;
    for (offset, block, heading) in blocks {
        let fits = cur.is_empty() || cur.len() + 2 + block.len() <= max_chunk;
        let break_for_heading = heading && cur.len() >= target / 2;
        if !cur.is_empty() && (!fits || break_for_heading) {
            cores.push((cur_offset, std::mem::take(&mut cur)));
        }
        if cur.is_empty() {
            cur_offset = offset;
            cur.push_str(&block);
        } else {
            cur.push_str("\n\n");
            cur.push_str(&block);
        }
    }
    if !cur.is_empty() {
        cores.push((cur_offset, cur));
    }

    // Attach overlap context and ordinals.
    let mut slices = Vec::with_capacity(cores.len());
    for (ordinal, (offset, core)) in cores.iter().enumerate() {
        let (text, overlap_len) = if overlap > 0 && ordinal > 0 {
            let prev = &cores[ordinal - 1].1;
            let from = snap_boundary(prev, prev.len().saturating_sub(overlap));
            let ctx = &prev[from..];
            (format!("{ctx}{core}"), ctx.len())
        } else {
            (core.clone(), 0)
        };
        slices.push(ChunkSlice {
            ordinal,
            text,
            char_offset: *offset,
            overlap_len,
        });
    }
    slices
}

/// Bind produced slices to a document.
pub fn bind_chunks(document_id: Uuid, slices: Vec<ChunkSlice>) -> Vec<Chunk> {
    slices
        .into_iter()
        .map(|s| Chunk {
            id: Uuid::new_v4(),
            document_id,
            ordinal: s.ordinal,
            char_count: s.text.chars().count(),
            char_offset: s.char_offset,
            overlap_len: s.overlap_len,
            text: s.text,
            embedding: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_ws(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn config(target: usize, overlap: usize, method: ChunkMethod) -> ChunkConfig {
        ChunkConfig {
            target_size: target,
            overlap,
            method,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
        assert!(chunk_text("  \n\n  ", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn ordinals_are_dense_and_zero_based() {
        let text = "First paragraph with some words.\n\nSecond paragraph here.\n\nThird one.";
        let slices = chunk_text(text, &config(64, 0, ChunkMethod::Fixed));
        for (i, s) in slices.iter().enumerate() {
            assert_eq!(s.ordinal, i);
        }
    }

    #[test]
    fn fixed_reconstruction_up_to_whitespace() {
        let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta iota kappa.\n\nLambda mu nu xi omicron pi rho.\n\nSigma tau upsilon phi chi psi omega.";
        let slices = chunk_text(text, &config(80, 0, ChunkMethod::Fixed));
        assert!(slices.len() > 1);
        let joined = slices
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize_ws(&joined), normalize_ws(text));
    }

    #[test]
    fn semantic_overlap_strips_to_reconstruct() {
        let text = "# Heading One\n\nBody of the first section with enough words to matter.\n\n# Heading Two\n\nSecond section body, also with a reasonable amount of text in it.";
        let slices = chunk_text(text, &config(80, 24, ChunkMethod::Semantic));
        assert!(slices.len() > 1);
        // Stripping each chunk's overlap prefix reproduces the document.
        let joined = slices
            .iter()
            .map(|s| &s.text[s.overlap_len..])
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize_ws(&joined), normalize_ws(text));
        // Later chunks carry previous context.
        assert!(slices[1].overlap_len > 0);
        assert!(slices[1].text.len() > slices[1].overlap_len);
    }

    #[test]
    fn no_chunk_exceeds_twice_target() {
        let long_sentence = "word ".repeat(400);
        let text = format!("{long_sentence}\n\nShort tail paragraph.");
        for method in [ChunkMethod::Fixed, ChunkMethod::Semantic] {
            let cfg = config(200, 60, method);
            for s in chunk_text(&text, &cfg) {
                assert!(
                    s.text.len() <= 2 * cfg.target_size,
                    "chunk of {} bytes exceeds 2x target",
                    s.text.len()
                );
            }
        }
    }

    #[test]
    fn oversize_paragraph_splits_at_sentences() {
        let text = "First sentence is right here. Second sentence follows on. Third sentence now. Fourth sentence ends it.";
        let slices = chunk_text(text, &config(64, 0, ChunkMethod::Fixed));
        assert!(slices.len() >= 2);
        // Every piece ends at a sentence boundary.
        for s in &slices[..slices.len() - 1] {
            assert!(s.text.trim_end().ends_with('.'), "piece {:?}", s.text);
        }
    }

    #[test]
    fn char_offsets_point_into_source() {
        let text = "Opening paragraph.\n\nClosing paragraph comes after.";
        let slices = chunk_text(text, &config(1000, 0, ChunkMethod::Fixed));
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].char_offset, 0);

        let slices = chunk_text(text, &config(64, 0, ChunkMethod::Fixed));
        for s in &slices {
            let head: String = s.text[s.overlap_len..].chars().take(8).collect();
            assert!(text[s.char_offset..].starts_with(&head));
        }
    }

    #[test]
    fn utf8_text_never_panics() {
        let text = "Zürich — naïve façade über alles. ".repeat(40);
        for method in [ChunkMethod::Fixed, ChunkMethod::Semantic] {
            let slices = chunk_text(&text, &config(100, 30, method));
            assert!(!slices.is_empty());
        }
    }
}
