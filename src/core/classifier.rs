// TfScope - core/classifier.rs
//
// Per-line continuation decisions for the parser.
//
// A small explicit state machine: a bracket-depth counter (`BlockState`)
// plus the `LineClass` verdict for each line. Kept apart from timestamp and
// level extraction so the continuation rules can be tested on their own.
//
// Bracket depth beats prefix matching: Terraform request/response bodies
// contain lines that look like log prefixes.

use crate::core::model::Level;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// What a raw line does to the entry being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// The line begins a new entry and leaves no JSON block open.
    StartNewEntry,
    /// The line belongs to the current entry; no JSON block involved.
    ContinueCurrent,
    /// The line opens a JSON block that stays open past its end.
    /// `opens_entry` tells whether it also begins a new entry.
    StartJsonBlock { opens_entry: bool },
    /// The line is inside an open JSON block that is still open after it.
    ContinueJsonBlock,
    /// The line closes the open JSON block.
    EndJsonBlock,
}

impl LineClass {
    /// Whether this line begins a new entry.
    pub fn starts_entry(self) -> bool {
        matches!(
            self,
            LineClass::StartNewEntry | LineClass::StartJsonBlock { opens_entry: true }
        )
    }
}

/// Running bracket state for one parse invocation.
///
/// String tracking resets at every line end: JSON strings cannot contain raw
/// newlines, so a stray quote in free text never leaks into later lines.
#[derive(Debug, Clone, Default)]
pub struct BlockState {
    depth: usize,
    lines_open: usize,
}

impl BlockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a JSON block is currently open.
    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Current bracket nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of lines the current block has been open for.
    pub fn lines_open(&self) -> usize {
        self.lines_open
    }

    /// Abandon the open block (used when it exceeds the line limit).
    pub fn reset(&mut self) {
        self.depth = 0;
        self.lines_open = 0;
    }

    /// Feed one line through the bracket counter.
    fn scan(&mut self, line: &str) {
        let mut in_string = false;
        let mut escaped = false;
        for ch in line.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' | '[' => self.depth += 1,
                '}' | ']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }
        if self.depth > 0 {
            self.lines_open += 1;
        } else {
            self.lines_open = 0;
        }
    }
}

/// Classify `line` given the accumulation state.
///
/// `has_current` is false before the first entry exists; such a line always
/// opens an entry so that every raw line lands somewhere.
pub fn classify(line: &str, state: &mut BlockState, has_current: bool) -> LineClass {
    if state.is_open() {
        state.scan(line);
        return if state.is_open() {
            LineClass::ContinueJsonBlock
        } else {
            LineClass::EndJsonBlock
        };
    }

    let opens_entry = !has_current || begins_entry(line);
    state.scan(line);

    if state.is_open() {
        LineClass::StartJsonBlock { opens_entry }
    } else if opens_entry {
        LineClass::StartNewEntry
    } else {
        LineClass::ContinueCurrent
    }
}

/// Outside a JSON block: does this line begin a new entry?
///
/// Prefixed lines and JSON log records always do. Of the rest, blank lines,
/// indented lines and lines starting with a bracket continue the previous
/// entry; any other text is an unstructured entry of its own.
fn begins_entry(line: &str) -> bool {
    if has_entry_prefix(line) || is_json_record(line) {
        return true;
    }
    match line.chars().next() {
        None => false,
        Some(c) if c.is_whitespace() => false,
        Some('{' | '[' | '}' | ']') => false,
        Some(_) => true,
    }
}

// =============================================================================
// Entry prefix grammar
// =============================================================================

/// Timestamp shapes accepted at the start of a log line.
///
/// RFC 3339 (`Z`, `+HH:MM`, `+HHMM`), ISO 8601 without a zone, and the Go
/// `log` package default `YYYY/MM/DD HH:MM:SS`.
const TIMESTAMP_PATTERN: &str = r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?|\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?";

const LEVEL_WORDS: &str = r"(?i:error|warning|warn|info|debug|trace)";

/// Compiled entry-prefix regex.
///
/// Groups: `ts` (timestamp), `ts_blevel` / `ts_level` (level after a
/// timestamp, bracketed or bare), `blevel` (bracketed level) and `level`
/// (bare `LEVEL:` token) for lines without a timestamp. After a timestamp a
/// bare level word needs no colon (`<ts> ERROR boom`); without one it does,
/// so prose such as `errors were found` is not a prefix. The whole match is
/// the prefix to strip from the line.
pub(crate) fn entry_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| {
        let pattern = format!(
            r"^(?:(?P<ts>{TIMESTAMP_PATTERN})\s*(?:\[(?P<ts_blevel>{LEVEL_WORDS})\]:?|(?P<ts_level>{LEVEL_WORDS})(?::|\b))?|\[(?P<blevel>{LEVEL_WORDS})\]:?|(?P<level>{LEVEL_WORDS}):)?\s*"
        );
        Regex::new(&pattern).expect("entry prefix regex")
    })
}

/// Level token captured by [`entry_prefix`], whichever form it took.
pub(crate) fn prefix_level(caps: &Captures<'_>) -> Option<Level> {
    ["ts_blevel", "ts_level", "blevel", "level"]
        .iter()
        .find_map(|name| caps.name(name))
        .and_then(|m| Level::from_token(m.as_str()))
}

/// Whether `line` starts with a timestamp, a level token, or both.
pub fn has_entry_prefix(line: &str) -> bool {
    entry_prefix()
        .captures(line)
        .is_some_and(|caps| caps.name("ts").is_some() || prefix_level(&caps).is_some())
}

/// Whether `line` is a single-line JSON log record (Terraform `TF_LOG_JSON`
/// style) rather than a fragment of a pretty-printed body.
pub fn is_json_record(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && (trimmed.contains("\"@level\"") || trimmed.contains("\"@message\""))
}
