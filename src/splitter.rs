//! Text splitters.
//!
//! Two strategies turn a file's text into bounded, overlapping segments:
//!
//! - [`StructuredSplitter`] parses Python with tree-sitter and emits one
//!   segment group per top-level function or class, plus a "simplified"
//!   module body in which each definition is replaced by a placeholder.
//! - [`WindowSplitter`] recursively splits on language-specific separators
//!   and merges the pieces into windows of at most `chunk_size` characters,
//!   carrying up to `chunk_overlap` characters from one window to the next.
//!
//! The chunker tries splitters in precedence order; a splitter returns
//! `None` when it does not apply, and the window splitter always applies.
//! All lengths are measured in characters, not bytes.

use std::collections::VecDeque;
use tree_sitter::Parser;

use crate::models::LineSpan;

const PYTHON_SEPARATORS: &[&str] = &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""];

const HTML_SEPARATORS: &[&str] = &[
    "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6", "<span",
    "<table", "<tr", "<td", "<th", "<ul", "<ol", "<header", "<footer", "<nav", "<head",
    "<style", "<script", "<meta", "<title", "\n\n", "\n", " ", "",
];

const CSS_SEPARATORS: &[&str] = &["\n@media", "\n\n", "\n", " ", ""];

const TEXT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

const PYTHON_DEFINITION_KINDS: &[&str] =
    &["function_definition", "class_definition", "decorated_definition"];

/// A piece of text produced by a splitter, with its line range when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub span: Option<LineSpan>,
}

pub trait Splitter {
    /// Split `text`, or return `None` if this strategy does not apply.
    fn split(&self, text: &str) -> Option<Vec<Segment>>;
}

/// Separator list for a language name as produced by `language_for_extension`.
pub fn separators_for(language: &str) -> &'static [&'static str] {
    match language {
        "python" => PYTHON_SEPARATORS,
        "html" => HTML_SEPARATORS,
        "css" => CSS_SEPARATORS,
        _ => TEXT_SEPARATORS,
    }
}

// ============ Window splitter ============

#[derive(Debug, Clone)]
pub struct WindowSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl WindowSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, language: &str) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: separators_for(language),
        }
    }

    /// Split text into trimmed, non-empty windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.windows(text)
            .into_iter()
            .map(|(_, window)| window.to_string())
            .collect()
    }

    /// Trimmed, non-empty windows with their byte offset in `text`.
    fn windows<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        self.split_recursive(text, 0, self.separators)
            .into_iter()
            .filter_map(|(offset, window)| {
                let trimmed = window.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let leading = window.len() - window.trim_start().len();
                Some((offset + leading, trimmed))
            })
            .collect()
    }

    /// `text` starts at byte `base` of the outermost input; returned offsets
    /// are relative to that input.
    fn split_recursive<'a>(
        &self,
        text: &'a str,
        base: usize,
        separators: &[&str],
    ) -> Vec<(usize, &'a str)> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = *sep;
                break;
            }
            if text.contains(sep) {
                separator = *sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut output = Vec::new();
        let mut small: Vec<(usize, &'a str)> = Vec::new();

        for (start, piece) in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push((start, piece));
                continue;
            }
            if !small.is_empty() {
                output.extend(self.merge(text, base, &small));
                small.clear();
            }
            if finer.is_empty() {
                output.push((base + start, piece));
            } else {
                output.extend(self.split_recursive(piece, base + start, finer));
            }
        }
        if !small.is_empty() {
            output.extend(self.merge(text, base, &small));
        }
        output
    }

    /// Greedily pack consecutive pieces into windows, keeping a tail of at
    /// most `chunk_overlap` characters as the head of the next window.
    ///
    /// `pieces` are adjacent slices of `text`, so every window is itself a
    /// slice of `text`.
    fn merge<'a>(
        &self,
        text: &'a str,
        base: usize,
        pieces: &[(usize, &'a str)],
    ) -> Vec<(usize, &'a str)> {
        let mut windows = Vec::new();
        let mut current: VecDeque<(usize, &'a str)> = VecDeque::new();
        let mut total = 0usize;

        for &(start, piece) in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_window(&mut windows, text, base, &current);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, front)) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back((start, piece));
            total += len;
        }
        push_window(&mut windows, text, base, &current);
        windows
    }
}

impl Splitter for WindowSplitter {
    fn split(&self, text: &str) -> Option<Vec<Segment>> {
        Some(locate(text, self.windows(text), 0))
    }
}

fn push_window<'a>(
    windows: &mut Vec<(usize, &'a str)>,
    text: &'a str,
    base: usize,
    current: &VecDeque<(usize, &'a str)>,
) {
    if let (Some(&(start, _)), Some(&(last, piece))) = (current.front(), current.back()) {
        let window = &text[start..last + piece.len()];
        if !window.trim().is_empty() {
            windows.push((base + start, window));
        }
    }
}

/// Split on `separator`, attaching it to the start of each following piece.
/// Pieces are returned with their byte offset in `text`.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<(usize, &'a str)> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| (i, &text[i..i + c.len_utf8()]))
            .collect();
    }
    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(text.match_indices(separator).map(|(i, _)| i).filter(|&i| i > 0));
    bounds.push(text.len());

    bounds
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| (pair[0], &text[pair[0]..pair[1]]))
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Turn windows at known byte offsets of `text` into segments with line
/// spans. `line_offset` is the 0-based line of `text` in its file. Lines
/// are counted incrementally since window offsets only move forward.
fn locate(text: &str, windows: Vec<(usize, &str)>, line_offset: usize) -> Vec<Segment> {
    let mut cursor = 0usize;
    let mut newlines = 0usize;
    windows
        .into_iter()
        .map(|(start, window)| {
            if start < cursor {
                cursor = 0;
                newlines = 0;
            }
            newlines += text[cursor..start].matches('\n').count();
            cursor = start;
            let start_line = line_offset + newlines + 1;
            Segment {
                text: window.to_string(),
                span: Some(LineSpan {
                    start_line,
                    end_line: start_line + window.matches('\n').count(),
                }),
            }
        })
        .collect()
}

// ============ Structured splitter ============

/// tree-sitter based splitter for Python sources.
#[derive(Debug, Clone)]
pub struct StructuredSplitter {
    window: WindowSplitter,
}

impl StructuredSplitter {
    pub fn python(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            window: WindowSplitter::new(chunk_size, chunk_overlap, "python"),
        }
    }
}

impl Splitter for StructuredSplitter {
    fn split(&self, text: &str) -> Option<Vec<Segment>> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .ok()?;
        let tree = parser.parse(text, None)?;
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }

        // (start_byte, end_byte, start_row) of each top-level definition
        let mut definitions = Vec::new();
        for i in 0..root.named_child_count() {
            if let Some(child) = root.named_child(i) {
                if PYTHON_DEFINITION_KINDS.contains(&child.kind()) {
                    definitions.push((child.start_byte(), child.end_byte(), child.start_position().row));
                }
            }
        }
        if definitions.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        let mut simplified = String::with_capacity(text.len());
        let mut last_end = 0usize;

        for &(start, end, row) in &definitions {
            let body = &text[start..end];
            segments.extend(locate(body, self.window.windows(body), row));

            let first_line = body.lines().next().unwrap_or_default();
            simplified.push_str(&text[last_end..start]);
            simplified.push_str("# Code for: ");
            simplified.push_str(first_line);
            last_end = end;
        }
        simplified.push_str(&text[last_end..]);

        segments.extend(
            self.window
                .split_text(&simplified)
                .into_iter()
                .map(|text| Segment { text, span: None }),
        );

        Some(segments)
    }
}
