//! Core data models used throughout repo-chat.
//!
//! These types represent the chunks that flow from the chunker into the
//! vector index and back out of it as retrieval results.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// 1-based inclusive line range of a chunk within its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// A bounded span of a source file's text produced for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunk {
    /// Deterministic ID derived from path, index and text.
    pub id: String,
    /// Path relative to the repository root, `/`-separated.
    pub source_path: String,
    pub language: String,
    /// Position of this chunk within its file, contiguous from 0.
    pub chunk_index: usize,
    /// Line range, absent for synthesized text (e.g. simplified module code).
    pub span: Option<LineSpan>,
    pub text: String,
}

impl DocumentChunk {
    pub fn new(
        source_path: &str,
        language: &str,
        chunk_index: usize,
        span: Option<LineSpan>,
        text: String,
    ) -> Self {
        Self {
            id: chunk_id(source_path, chunk_index, &text),
            source_path: source_path.to_string(),
            language: language.to_string(),
            chunk_index,
            span,
            text,
        }
    }

    /// Short label used when quoting the chunk in a prompt.
    pub fn label(&self) -> String {
        match self.span {
            Some(span) => format!(
                "{} (lines {}-{})",
                self.source_path, span.start_line, span.end_line
            ),
            None => self.source_path.clone(),
        }
    }
}

fn chunk_id(source_path: &str, chunk_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update((chunk_index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// One question/answer exchange held in conversation memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = DocumentChunk::new("app.py", "python", 0, None, "print(1)".into());
        let b = DocumentChunk::new("app.py", "python", 0, None, "print(1)".into());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn test_chunk_id_depends_on_position_and_path() {
        let a = DocumentChunk::new("app.py", "python", 0, None, "x = 1".into());
        let b = DocumentChunk::new("app.py", "python", 1, None, "x = 1".into());
        let c = DocumentChunk::new("lib.py", "python", 0, None, "x = 1".into());
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_label_includes_lines_when_known() {
        let span = LineSpan {
            start_line: 3,
            end_line: 9,
        };
        let chunk = DocumentChunk::new("pkg/mod.py", "python", 0, Some(span), "def f(): pass".into());
        assert_eq!(chunk.label(), "pkg/mod.py (lines 3-9)");
    }
}
