//! Repository walker that turns source files into [`DocumentChunk`]s.
//!
//! Files are discovered up front (sorted by relative path) but read and
//! split lazily, one file at a time, as the returned [`Chunks`] is iterated.
//! Iterating the same [`Chunks`] again re-reads the files and yields the
//! same sequence for unchanged input.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::error::ChunkError;
use crate::models::DocumentChunk;
use crate::splitter::{Segment, Splitter, StructuredSplitter, WindowSplitter};

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8192;

const EXCLUDED_DIRS: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/__pycache__/**",
    "**/.venv/**",
];

/// Fixed chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerSettings {
    /// Lower-case extensions including the dot.
    pub extensions: Vec<String>,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of a file.
    pub chunk_overlap: usize,
    /// Minimum line count before Python files are parsed structurally.
    pub parser_threshold: usize,
    /// Files larger than this are never parsed structurally.
    pub max_structured_bytes: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            extensions: vec![".py".into(), ".html".into(), ".css".into()],
            chunk_size: 500,
            chunk_overlap: 20,
            parser_threshold: 500,
            max_structured_bytes: 1024 * 1024,
        }
    }
}

/// Which splitting strategy a file gets, in order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterKind {
    /// tree-sitter parse, falling back to `Window` if parsing fails.
    Structured,
    Window,
}

impl ChunkerSettings {
    pub fn splitter_kind(&self, language: &str, text: &str) -> SplitterKind {
        if language == "python"
            && text.len() <= self.max_structured_bytes
            && text.lines().count() >= self.parser_threshold
        {
            SplitterKind::Structured
        } else {
            SplitterKind::Window
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        match extension_of(path) {
            Some(ext) => self.extensions.iter().any(|allowed| allowed == &ext),
            None => false,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

pub fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        ".py" => "python",
        ".html" | ".htm" => "html",
        ".css" => "css",
        _ => "text",
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentChunker {
    settings: Arc<ChunkerSettings>,
}

impl DocumentChunker {
    pub fn new(settings: ChunkerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ChunkerSettings {
        &self.settings
    }

    /// Enumerate matching files under `root`.
    ///
    /// Fails only if `root` is missing or cannot be listed; unreadable
    /// entries below it are skipped.
    pub fn chunk(&self, root: &Path) -> Result<Chunks, ChunkError> {
        if !root.exists() {
            return Err(ChunkError::RootMissing(root.to_path_buf()));
        }
        std::fs::read_dir(root).map_err(|source| ChunkError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let exclude_set = build_globset(EXCLUDED_DIRS);

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if exclude_set.as_ref().is_some_and(|set| set.is_match(&rel_str)) {
                continue;
            }
            if !self.settings.matches_extension(path) {
                continue;
            }

            files.push(SourceFile {
                path: path.to_path_buf(),
                relative: rel_str,
            });
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        tracing::debug!(root = %root.display(), files = files.len(), "discovered source files");

        Ok(Chunks {
            files: Arc::new(files),
            settings: self.settings.clone(),
        })
    }
}

fn build_globset(patterns: &[&str]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).ok()?);
    }
    builder.build().ok()
}

#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    relative: String,
}

/// The chunk sequence of one repository snapshot.
#[derive(Debug, Clone)]
pub struct Chunks {
    files: Arc<Vec<SourceFile>>,
    settings: Arc<ChunkerSettings>,
}

impl Chunks {
    /// Number of files that will be read.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Relative paths of the files that will be read, in order.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.relative.as_str())
    }

    /// A fresh lazy iterator over all chunks.
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            files: self.files.clone(),
            settings: self.settings.clone(),
            next_file: 0,
            pending: VecDeque::new(),
        }
    }
}

impl IntoIterator for Chunks {
    type Item = DocumentChunk;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

impl IntoIterator for &Chunks {
    type Item = DocumentChunk;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

pub struct ChunkIter {
    files: Arc<Vec<SourceFile>>,
    settings: Arc<ChunkerSettings>,
    next_file: usize,
    pending: VecDeque<DocumentChunk>,
}

impl Iterator for ChunkIter {
    type Item = DocumentChunk;

    fn next(&mut self) -> Option<DocumentChunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            let file = self.files.get(self.next_file)?;
            self.next_file += 1;
            self.pending = chunk_file(&self.settings, file).into();
        }
    }
}

/// Read and split one file. Unreadable, binary and non-UTF-8 files yield
/// no chunks.
fn chunk_file(settings: &ChunkerSettings, file: &SourceFile) -> Vec<DocumentChunk> {
    let text = match read_text(&file.path) {
        Some(text) => text,
        None => return Vec::new(),
    };

    let ext = extension_of(&file.path).unwrap_or_default();
    let language = language_for_extension(&ext);
    let window = WindowSplitter::new(settings.chunk_size, settings.chunk_overlap, language);

    let segments: Vec<Segment> = match settings.splitter_kind(language, &text) {
        SplitterKind::Structured => {
            let structured = StructuredSplitter::python(settings.chunk_size, settings.chunk_overlap);
            match structured.split(&text) {
                Some(segments) => segments,
                None => {
                    tracing::debug!(path = %file.relative, "structured split declined, using window");
                    window.split(&text).unwrap_or_default()
                }
            }
        }
        SplitterKind::Window => window.split(&text).unwrap_or_default(),
    };

    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            DocumentChunk::new(&file.relative, language, index, segment.span, segment.text)
        })
        .collect()
}

fn read_text(path: &Path) -> Option<String> {
    let mut bytes = Vec::new();
    if let Err(e) = std::fs::File::open(path).and_then(|mut f| f.read_to_end(&mut bytes)) {
        tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
        return None;
    }

    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        tracing::debug!(path = %path.display(), "skipping binary file");
        return None;
    }

    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            tracing::debug!(path = %path.display(), "skipping non-UTF-8 file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let err = DocumentChunker::default()
            .chunk(Path::new("/no/such/repository"))
            .unwrap_err();
        assert!(matches!(err, ChunkError::RootMissing(_)));
    }

    #[test]
    fn test_filters_by_extension_and_excluded_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "README.md", b"# Readme\n");
        write(root, "app.py", b"def main():\n    pass\n");
        write(root, "web/index.HTML", b"<html><body>hi</body></html>");
        write(root, "web/site.css", b"body { color: red; }\n");
        write(root, "notes.txt", b"notes");
        write(root, ".git/hooks/pre-commit.py", b"print('hook')\n");
        write(root, "pkg/__pycache__/mod.py", b"cached = True\n");

        let chunks = DocumentChunker::default().chunk(root).unwrap();
        let paths: Vec<&str> = chunks.file_paths().collect();
        assert_eq!(paths, vec!["app.py", "web/index.HTML", "web/site.css"]);
    }

    #[test]
    fn test_skips_binary_and_non_utf8_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "ok.py", b"x = 1\n");
        write(root, "blob.py", b"\x00\x01\x02binary");
        write(root, "latin1.py", b"name = '\xe9t\xe9'\n");

        let chunks: Vec<DocumentChunk> = DocumentChunker::default().chunk(root).unwrap().iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_path, "ok.py");
        assert_eq!(chunks[0].language, "python");
    }

    #[test]
    fn test_chunk_indices_contiguous_per_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let body = (0..200)
            .map(|i| format!("value_{i} = compute({i})"))
            .collect::<Vec<_>>()
            .join("\n");
        write(root, "a.py", body.as_bytes());
        write(root, "b.py", body.as_bytes());

        let chunks: Vec<DocumentChunk> = DocumentChunker::default().chunk(root).unwrap().iter().collect();
        for path in ["a.py", "b.py"] {
            let indices: Vec<usize> = chunks
                .iter()
                .filter(|c| c.source_path == path)
                .map(|c| c.chunk_index)
                .collect();
            assert!(indices.len() > 1);
            assert_eq!(indices, (0..indices.len()).collect::<Vec<_>>());
        }
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 500));
    }

    #[test]
    fn test_iteration_is_restartable_and_deterministic() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let body = (0..80)
            .map(|i| format!("def f{i}():\n    return {i}\n"))
            .collect::<Vec<_>>()
            .join("\n");
        write(root, "mod.py", body.as_bytes());
        write(root, "style.css", b".a { margin: 0 }\n\n.b { padding: 0 }\n");

        let chunker = DocumentChunker::default();
        let chunks = chunker.chunk(root).unwrap();
        let first: Vec<DocumentChunk> = chunks.iter().collect();
        let second: Vec<DocumentChunk> = chunks.iter().collect();
        let rerun: Vec<DocumentChunk> = chunker.chunk(root).unwrap().into_iter().collect();
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert_eq!(first, rerun);
    }

    #[test]
    fn test_structured_split_applies_above_threshold() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(
            root,
            "service.py",
            b"import json\n\ndef load(path):\n    return json.load(open(path))\n\nCONFIG = load('c.json')\n",
        );

        let settings = ChunkerSettings {
            parser_threshold: 3,
            ..ChunkerSettings::default()
        };
        let chunks: Vec<DocumentChunk> = DocumentChunker::new(settings).chunk(root).unwrap().iter().collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("def load(path):"));
        assert_eq!(chunks[0].span.unwrap().start_line, 3);
        assert!(chunks[1].text.contains("# Code for: def load(path):"));
        assert!(chunks[1].span.is_none());
    }

    #[test]
    fn test_small_python_files_use_window_split() {
        let settings = ChunkerSettings::default();
        let text = "def f():\n    pass\n";
        assert_eq!(settings.splitter_kind("python", text), SplitterKind::Window);
        assert_eq!(settings.splitter_kind("css", text), SplitterKind::Window);

        let long = "x = 1\n".repeat(600);
        assert_eq!(settings.splitter_kind("python", &long), SplitterKind::Structured);

        let tight = ChunkerSettings {
            max_structured_bytes: 100,
            ..ChunkerSettings::default()
        };
        assert_eq!(tight.splitter_kind("python", &long), SplitterKind::Window);
    }

    #[test]
    fn test_empty_repository_yields_no_chunks() {
        let tmp = TempDir::new().unwrap();
        let chunks = DocumentChunker::default().chunk(tmp.path()).unwrap();
        assert_eq!(chunks.file_count(), 0);
        assert_eq!(chunks.iter().count(), 0);
    }
}
