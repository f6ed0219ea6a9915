//! Content-aware chunker.
//!
//! Splits a document into [`Snippet`]s, the unit that gets embedded. The
//! strategy depends on the document's [`ContentType`]:
//!
//! | Content type | Split points | Intent |
//! |--------------|--------------|--------|
//! | `code` (python, js/ts, go, rust) | lines starting a definition | detected per chunk |
//! | `code` (other languages) | line accumulation | `text` |
//! | `markdown` | headings | `section` |
//! | `plain` | line accumulation with line overlap | `text` |
//!
//! Any piece longer than `max_chunk_size` characters is re-split by line
//! accumulation. Line numbers are 1-based and refer to the original content.
//! Non-empty content always yields at least one snippet.
//!
//! # Example
//!
//! ```rust
//! use devkb_core::chunk::{chunk_content, ChunkSettings};
//! use devkb_core::models::ContentType;
//!
//! let code = "def a():\n    return 1\n\ndef b():\n    return 2\n";
//! let snippets = chunk_content("doc-1", code, ContentType::Code, Some("python"), &ChunkSettings::default());
//! assert_eq!(snippets.len(), 2);
//! assert_eq!(snippets[1].start_line, Some(4));
//! ```

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{ContentType, Snippet};

/// File extensions picked up by directory indexing.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "md", "txt", "py", "js", "ts", "jsx", "tsx", "json", "yaml", "yml", "toml", "sql", "sh",
    "bash", "go", "rs", "java", "c", "cpp", "h", "html", "css", "scss",
];

/// Chunk size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Maximum characters per chunk.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Lines carried over from the end of one text chunk into the next.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_max_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Language name for a file extension, if it is one DevKB knows.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "sql" => "sql",
        "sh" | "bash" => "shell",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" => "cpp",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "md" => "markdown",
        "txt" => "plain",
        _ => return None,
    };
    Some(lang)
}

/// Classify a document by its extension.
///
/// Markdown with more than two fenced code blocks is treated as code.
pub fn detect_content_type(path: &str, content: &str) -> (ContentType, Option<String>) {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let language = language_for_path(path).map(str::to_string);

    let content_type = match ext.as_str() {
        "md" => {
            if content.matches("```").count() / 2 > 2 {
                ContentType::Code
            } else {
                ContentType::Markdown
            }
        }
        "py" | "js" | "ts" | "go" | "rs" | "java" | "sql" | "sh" | "json" | "yaml" | "toml" => {
            ContentType::Code
        }
        _ => ContentType::Plain,
    };
    (content_type, language)
}

/// Title from the first `# ` heading of a markdown file, else the file stem
/// in title case.
pub fn extract_title(path: &str, content: &str) -> String {
    let p = Path::new(path);
    if p.extension().and_then(|e| e.to_str()) == Some("md") {
        if let Some(heading) = content
            .lines()
            .find_map(|l| l.strip_prefix("# ").or_else(|| l.strip_prefix("#\t")))
        {
            let heading = heading.trim();
            if !heading.is_empty() {
                return heading.to_string();
            }
        }
    }
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or(path);
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// SHA-256 of `text`, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Guess what a piece of code is for. The first matching rule wins.
pub fn detect_code_intent(code: &str) -> &'static str {
    let lower = code.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("test") || has("spec") {
        "test"
    } else if has("config") || has("settings") {
        "config"
    } else if has("class ") {
        "class"
    } else if has("def ") || has("function ") || has("fn ") || has("func ") {
        "function"
    } else if has("interface ") || has("type ") || has("struct ") {
        "type"
    } else if has("route") || has("endpoint") {
        "endpoint"
    } else if has("query") || has("select") {
        "query"
    } else {
        "utility"
    }
}

fn definition_pattern(language: &str) -> Option<&'static Regex> {
    static PYTHON: OnceLock<Regex> = OnceLock::new();
    static JS: OnceLock<Regex> = OnceLock::new();
    static GO: OnceLock<Regex> = OnceLock::new();
    static RUST: OnceLock<Regex> = OnceLock::new();

    let (cell, pattern) = match language {
        "python" => (&PYTHON, r"^(def |class |async def )"),
        "javascript" | "typescript" => (
            &JS,
            r"^(export )?(default )?(function |const |let |class |async |interface )",
        ),
        "go" => (&GO, r"^(func |type |package )"),
        "rust" => (
            &RUST,
            r"^(pub(\([a-z]+\))? )?(async )?(fn |struct |enum |impl |trait |mod )",
        ),
        _ => return None,
    };
    Some(cell.get_or_init(|| Regex::new(pattern).expect("static definition pattern")))
}

fn heading_pattern() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(r"^#{1,6}\s+\S").expect("static heading pattern"))
}

/// A chunk before it becomes a [`Snippet`]. Lines are 1-based.
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    start_line: usize,
    end_line: usize,
    intent: &'static str,
}

/// Split `content` into snippets for `document_id`.
pub fn chunk_content(
    document_id: &str,
    content: &str,
    content_type: ContentType,
    language: Option<&str>,
    settings: &ChunkSettings,
) -> Vec<Snippet> {
    let max = settings.max_chunk_size.max(1);
    let lines: Vec<&str> = content.split('\n').collect();

    let pieces = match content_type {
        ContentType::Code => match language.and_then(definition_pattern) {
            Some(re) => resplit_oversize(split_at_matches(&lines, re, true), max, settings),
            None => chunk_lines(&lines, 1, max, settings.chunk_overlap, "text"),
        },
        ContentType::Markdown => {
            resplit_oversize(split_at_matches(&lines, heading_pattern(), false), max, settings)
        }
        ContentType::Plain => chunk_lines(&lines, 1, max, settings.chunk_overlap, "text"),
    };

    let mut pieces: Vec<Piece> = pieces
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .collect();
    if pieces.is_empty() && !content.trim().is_empty() {
        pieces.push(Piece {
            text: content.to_string(),
            start_line: 1,
            end_line: lines.len(),
            intent: "text",
        });
    }

    let snippet_language = match content_type {
        ContentType::Markdown => Some("markdown".to_string()),
        _ => language.map(str::to_string),
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, p)| Snippet {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: i as i64,
            hash: content_hash(&p.text),
            text: p.text,
            start_line: Some(p.start_line as i64),
            end_line: Some(p.end_line as i64),
            language: snippet_language.clone(),
            intent: Some(p.intent.to_string()),
        })
        .collect()
}

/// Start a new piece at every line matching `re`. For code the match is
/// tested against the line with leading whitespace removed so methods split
/// too.
fn split_at_matches(lines: &[&str], re: &Regex, code: bool) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let probe = if code { line.trim_start() } else { line };
        if i > start && re.is_match(probe) {
            pieces.push(make_piece(&lines[start..i], start + 1, code));
            start = i;
        }
    }
    if start < lines.len() {
        pieces.push(make_piece(&lines[start..], start + 1, code));
    }
    pieces
}

fn make_piece(lines: &[&str], start_line: usize, code: bool) -> Piece {
    let text = lines.join("\n");
    let intent = if code {
        detect_code_intent(&text)
    } else {
        "section"
    };
    Piece {
        text,
        start_line,
        end_line: start_line + lines.len().saturating_sub(1),
        intent,
    }
}

fn resplit_oversize(pieces: Vec<Piece>, max: usize, settings: &ChunkSettings) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    for p in pieces {
        if p.text.chars().count() <= max {
            out.push(p);
            continue;
        }
        let lines: Vec<&str> = p.text.split('\n').collect();
        out.extend(chunk_lines(
            &lines,
            p.start_line,
            max,
            settings.chunk_overlap,
            p.intent,
        ));
    }
    out
}

/// Accumulate lines until `max` characters, carrying up to `overlap`
/// trailing lines into the next chunk. The carried lines never exceed half
/// of `max` and never make up a whole chunk, so every chunk advances.
/// Lines longer than `max` are hard-split on char boundaries.
fn chunk_lines(
    lines: &[&str],
    first_line: usize,
    max: usize,
    overlap: usize,
    intent: &'static str,
) -> Vec<Piece> {
    // (line number, segment) with over-long lines broken up.
    let mut items: Vec<(usize, String)> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let no = first_line + i;
        if line.chars().count() <= max {
            items.push((no, line.to_string()));
        } else {
            let chars: Vec<char> = line.chars().collect();
            for seg in chars.chunks(max) {
                items.push((no, seg.iter().collect()));
            }
        }
    }

    let mut pieces = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();

    for item in items {
        let len = item.1.chars().count();
        if !current.is_empty() && joined_len(&current) + 1 + len > max {
            pieces.push(piece_from(&current, intent));

            let mut keep = overlap.min(current.len() - 1);
            while keep > 0 && joined_len(&current[current.len() - keep..]) > max / 2 {
                keep -= 1;
            }
            current.drain(..current.len() - keep);
        }
        current.push(item);
    }
    if !current.is_empty() {
        pieces.push(piece_from(&current, intent));
    }
    pieces
}

/// Character length of the items joined with newlines.
fn joined_len(items: &[(usize, String)]) -> usize {
    let chars: usize = items.iter().map(|(_, s)| s.chars().count()).sum();
    chars + items.len().saturating_sub(1)
}

fn piece_from(items: &[(usize, String)], intent: &'static str) -> Piece {
    let text = items
        .iter()
        .map(|(_, s)| s.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Piece {
        text,
        start_line: items.first().map(|(n, _)| *n).unwrap_or(1),
        end_line: items.last().map(|(n, _)| *n).unwrap_or(1),
        intent,
    }
}
