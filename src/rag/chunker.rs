//! Splits source text into overlapping chunks for embedding.
//!
//! Markdown and code are split on structural boundaries (headings, fenced
//! code blocks) first, then any boundary-delimited section still over the
//! soft cap is folded into a plain sliding window. Everything else (task
//! text, context values, messages) goes straight to the sliding window.

use crate::models::SourceType;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub content_hash: String,
}

pub fn chunk_source(source_type: SourceType, text: &str, soft_cap_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let sections = match source_type {
        SourceType::Markdown => split_markdown(text),
        SourceType::Code => split_code(text),
        SourceType::Context | SourceType::Task | SourceType::Message => vec![text.to_string()],
    };

    let mut chunks = Vec::new();
    for section in sections {
        for window in sliding_window(&section, soft_cap_tokens, overlap_tokens) {
            if window.trim().is_empty() {
                continue;
            }
            let content_hash = hash(&window);
            chunks.push(Chunk { text: window, content_hash });
        }
    }
    chunks
}

fn hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Splits on top-level `#`-style headings, keeping each heading with its
/// following body as one section.
fn split_markdown(text: &str) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.starts_with('#') && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }
    if sections.is_empty() {
        sections.push(text.to_string());
    }
    sections
}

/// Splits on fenced code blocks (` ``` `), keeping each fence's contents
/// as its own section along with the prose around it.
fn split_code(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;
    for line in text.lines() {
        let is_fence_marker = line.trim_start().starts_with("```");
        current.push_str(line);
        current.push('\n');
        if is_fence_marker {
            if in_fence {
                sections.push(std::mem::take(&mut current));
            }
            in_fence = !in_fence;
        }
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }
    if sections.is_empty() {
        sections.push(text.to_string());
    }
    sections
}

/// Whitespace-token sliding window with overlap; a section already within
/// the cap comes back as a single window.
fn sliding_window(text: &str, soft_cap_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= soft_cap_tokens {
        return vec![text.to_string()];
    }
    let stride = soft_cap_tokens.saturating_sub(overlap_tokens).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + soft_cap_tokens).min(tokens.len());
        windows.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += stride;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_source(SourceType::Task, "a short task description", 800, 80);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_plain_text_overlaps() {
        let text = (0..2000).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_source(SourceType::Context, &text, 800, 80);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn identical_text_hashes_identically() {
        let a = chunk_source(SourceType::Task, "stable content", 800, 80);
        let b = chunk_source(SourceType::Task, "stable content", 800, 80);
        assert_eq!(a[0].content_hash, b[0].content_hash);
    }

    #[test]
    fn markdown_splits_on_headings() {
        let text = "# Title\nintro\n## Section\nbody";
        let sections = split_markdown(text);
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn code_keeps_fences_distinct() {
        let text = "prose\n```rust\nfn main() {}\n```\nmore prose";
        let sections = split_code(text);
        assert!(sections.len() >= 1);
    }
}
