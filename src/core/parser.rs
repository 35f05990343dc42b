// TfScope - core/parser.rs
//
// Single-pass, order-preserving parsing of a Terraform log into entries.
// Core layer: accepts bytes or text, never touches the filesystem.
//
// Pipeline per file:
//   raw line -> classifier (continuation decision) -> line group
//   line group -> entry interpretation (timestamp, level, JSON, fields)
//   entry -> section tracker (phase stamp) -> ordered entry list
//
// All mutable state lives in a `FileParser` owned by one invocation, so
// independent files can be parsed concurrently.

use crate::core::classifier::{self, BlockState};
use crate::core::model::{Level, LogEntry, ParsingStats, PhasePeriod, RequestKind};
use crate::core::section::SectionTracker;
use crate::util::constants;
use crate::util::error::ParseError;
use crate::util::logging::preview;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Configuration for parsing operations.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Lines a JSON block may stay open before it is force-closed.
    pub max_json_block_lines: usize,
    /// ID given to the first entry; later entries count up from here.
    pub id_start: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_json_block_lines: constants::DEFAULT_MAX_JSON_BLOCK_LINES,
            id_start: constants::FIRST_ENTRY_ID,
        }
    }
}

/// Result of parsing a single log file.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Entries in line order.
    pub entries: Vec<LogEntry>,
    /// Statistics computed over `entries`.
    pub stats: ParsingStats,
    /// Plan/apply/other periods in order of appearance.
    pub phases: Vec<PhasePeriod>,
    /// Total raw lines consumed.
    pub lines_processed: u64,
}

/// Parse raw log bytes.
///
/// Fails only when the input as a whole is unusable: empty, binary (NUL
/// bytes near the start), or not UTF-8 from its very first byte. Input that
/// is mostly UTF-8 with stray invalid sequences is decoded lossily so one
/// damaged line cannot hide the rest of the file.
pub fn parse_bytes(bytes: &[u8], config: &ParseConfig) -> Result<ParseResult, ParseError> {
    let head = &bytes[..bytes.len().min(constants::BINARY_SNIFF_BYTES)];
    if let Some(offset) = head.iter().position(|b| *b == 0) {
        return Err(ParseError::NotText { offset });
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => parse_content(text, config),
        Err(e) if e.valid_up_to() == 0 => Err(ParseError::InvalidEncoding { source: e }),
        Err(e) => {
            tracing::warn!(
                valid_up_to = e.valid_up_to(),
                "Input contains invalid UTF-8; decoding lossily"
            );
            let text = String::from_utf8_lossy(bytes);
            parse_content(&text, config)
        }
    }
}

/// Parse already-decoded log text.
pub fn parse_content(content: &str, config: &ParseConfig) -> Result<ParseResult, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut parser = FileParser::new(config);
    for line in raw_lines(content) {
        parser.push_line(line);
    }
    Ok(parser.finish())
}

/// Split on `\n` only. A `\r` before the newline stays on the line so
/// `raw_message` keeps the input bytes; a final newline adds no empty line.
fn raw_lines(content: &str) -> std::str::Split<'_, char> {
    content
        .strip_suffix('\n')
        .unwrap_or(content)
        .split('\n')
}

// =============================================================================
// Per-file parsing context
// =============================================================================

/// Raw lines accumulated for the entry currently being built.
#[derive(Debug)]
struct LineGroup<'a> {
    line_number: u64,
    lines: Vec<&'a str>,
}

struct FileParser<'a> {
    config: &'a ParseConfig,
    block: BlockState,
    tracker: SectionTracker,
    pending: Option<LineGroup<'a>>,
    entries: Vec<LogEntry>,
    next_id: u64,
    lines_processed: u64,
}

impl<'a> FileParser<'a> {
    fn new(config: &'a ParseConfig) -> Self {
        Self {
            config,
            block: BlockState::new(),
            tracker: SectionTracker::new(),
            pending: None,
            entries: Vec::new(),
            next_id: config.id_start,
            lines_processed: 0,
        }
    }

    fn push_line(&mut self, line: &'a str) {
        self.lines_processed += 1;
        let line_number = self.lines_processed;
        let class = classifier::classify(line, &mut self.block, self.pending.is_some());

        match self.pending.as_mut() {
            Some(group) if !class.starts_entry() => group.lines.push(line),
            _ => {
                self.flush();
                self.pending = Some(LineGroup {
                    line_number,
                    lines: vec![line],
                });
            }
        }

        if self.block.lines_open() > self.config.max_json_block_lines {
            tracing::warn!(
                line = line_number,
                limit = self.config.max_json_block_lines,
                "JSON block exceeded line limit; closing it"
            );
            self.block.reset();
        }
    }

    fn flush(&mut self) {
        let Some(group) = self.pending.take() else {
            return;
        };
        let mut entry = build_entry(&group, self.next_id);
        entry.section = self.tracker.observe(&entry.message, entry.timestamp);
        self.next_id += 1;
        self.entries.push(entry);
    }

    fn finish(mut self) -> ParseResult {
        self.flush();
        if self.block.is_open() {
            tracing::debug!(
                depth = self.block.depth(),
                "Input ended inside an open JSON block"
            );
        }

        let phases = self.tracker.finish();
        let stats = ParsingStats::compute(&self.entries);

        tracing::debug!(
            entries = self.entries.len(),
            lines = self.lines_processed,
            phases = phases.len(),
            parse_errors = stats.parse_error_count,
            "Parsing complete"
        );

        ParseResult {
            entries: self.entries,
            stats,
            phases,
            lines_processed: self.lines_processed,
        }
    }
}

// =============================================================================
// Entry interpretation
// =============================================================================

/// A structural failure that prevents interpreting an entry at all.
#[derive(Debug)]
enum LineFault {
    MalformedRecord(serde_json::Error),
}

impl fmt::Display for LineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRecord(e) => write!(f, "malformed JSON log record: {e}"),
        }
    }
}

/// Correlation and provenance fields pulled from JSON or plain text.
#[derive(Debug, Default, PartialEq)]
struct Fields {
    tf_req_id: Option<String>,
    tf_resource_type: Option<String>,
    tf_rpc: Option<String>,
    tf_provider_addr: Option<String>,
    module: Option<String>,
    tf_proto_version: Option<String>,
}

impl Fields {
    fn request_kind(&self) -> Option<RequestKind> {
        if self.tf_rpc.is_some() {
            Some(RequestKind::Request)
        } else if self.tf_proto_version.is_some() {
            Some(RequestKind::Response)
        } else {
            None
        }
    }
}

/// Everything recovered from one line group.
#[derive(Debug, Default)]
struct Interpreted {
    timestamp: Option<DateTime<Utc>>,
    level: Option<Level>,
    message: String,
    json_body: Option<String>,
    fields: Fields,
    /// A timestamp token was present but could not be converted.
    timestamp_fault: Option<String>,
}

fn build_entry(group: &LineGroup<'_>, id: u64) -> LogEntry {
    let raw = group.lines.join("\n");
    let mut entry = LogEntry::unparsed(id, group.line_number, raw, group.lines.len());

    match interpret(&entry.raw_message) {
        Ok(parsed) => {
            entry.request_kind = parsed.fields.request_kind();
            entry.timestamp = parsed.timestamp;
            entry.level = parsed.level;
            entry.message = parsed.message;
            entry.has_json = parsed.json_body.is_some();
            entry.json_body = parsed.json_body;
            entry.tf_req_id = parsed.fields.tf_req_id;
            entry.tf_resource_type = parsed.fields.tf_resource_type;
            entry.tf_rpc = parsed.fields.tf_rpc;
            entry.tf_provider_addr = parsed.fields.tf_provider_addr;
            entry.module = parsed.fields.module;
            if let Some(reason) = parsed.timestamp_fault {
                entry.parsing_error = true;
                entry.parsing_error_message = Some(reason);
            }
        }
        Err(fault) => {
            tracing::debug!(
                line = group.line_number,
                error = %fault,
                preview = preview(&entry.raw_message),
                "Entry could not be interpreted"
            );
            entry.message = entry.raw_message.clone();
            entry.parsing_error = true;
            entry.parsing_error_message = Some(fault.to_string());
        }
    }
    entry
}

fn interpret(raw: &str) -> Result<Interpreted, LineFault> {
    let (first_line, rest) = match raw.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (raw, None),
    };
    if classifier::is_json_record(first_line) {
        interpret_record(first_line, rest)
    } else {
        Ok(interpret_text(raw))
    }
}

/// A `TF_LOG_JSON` style record: the whole line is the payload.
fn interpret_record(line: &str, rest: Option<&str>) -> Result<Interpreted, LineFault> {
    let body = line.trim();
    let value: Value = serde_json::from_str(body).map_err(LineFault::MalformedRecord)?;

    let mut parsed = Interpreted {
        level: string_key(&value, "@level").and_then(|l| Level::from_token(&l)),
        message: string_key(&value, "@message").unwrap_or_default(),
        fields: extract_fields(Some(&value), ""),
        json_body: Some(body.to_string()),
        ..Default::default()
    };
    if let Some(raw_ts) = string_key(&value, "@timestamp") {
        match parse_timestamp(&raw_ts) {
            Some(ts) => parsed.timestamp = Some(ts),
            None => parsed.timestamp_fault = Some(format!("unrecognised timestamp '{raw_ts}'")),
        }
    }
    if let Some(extra) = rest {
        parsed.message.push('\n');
        let extra = extra.trim_end().replace("\r\n", "\n");
        parsed.message.push_str(&decode_escapes(&extra));
    }
    Ok(parsed)
}

/// A plain-text line group: optional prefix, free text, optional JSON tail.
fn interpret_text(raw: &str) -> Interpreted {
    let mut parsed = Interpreted::default();
    let mut body_start = 0;

    if let Some(caps) = classifier::entry_prefix().captures(raw) {
        if let Some(ts) = caps.name("ts") {
            match parse_timestamp(ts.as_str()) {
                Some(parsed_ts) => parsed.timestamp = Some(parsed_ts),
                None => {
                    parsed.timestamp_fault =
                        Some(format!("unrecognised timestamp '{}'", ts.as_str()))
                }
            }
        }
        parsed.level = classifier::prefix_level(&caps);
        if let Some(whole) = caps.get(0) {
            body_start = whole.end();
        }
    }

    let body = &raw[body_start..];
    let (text, json) = match find_json_tail(body) {
        Some((start, value)) => (&body[..start], Some((body[start..].trim_end(), value))),
        None => (body, None),
    };

    let value = json.as_ref().map(|(_, value)| value);
    parsed.fields = extract_fields(value, text);
    if let Some(value) = value {
        if parsed.level.is_none() {
            parsed.level = string_key(value, "@level")
                .or_else(|| string_key(value, "level"))
                .and_then(|l| Level::from_token(&l));
        }
        if parsed.timestamp.is_none() && parsed.timestamp_fault.is_none() {
            parsed.timestamp = string_key(value, "@timestamp").and_then(|t| parse_timestamp(&t));
        }
    }
    parsed.json_body = json.map(|(body, _)| body.to_string());
    let text = text.trim();
    parsed.message = if text.contains('\r') {
        decode_escapes(&text.replace("\r\n", "\n"))
    } else {
        decode_escapes(text)
    };
    parsed
}

// =============================================================================
// JSON detection
// =============================================================================

/// Find a JSON value that runs to the (trimmed) end of `text`.
///
/// Returns the byte offset where it starts plus the parsed value. The
/// earliest opener whose matching closer is the final character and whose
/// span parses as JSON wins; balanced-but-invalid spans are plain text.
fn find_json_tail(text: &str) -> Option<(usize, Value)> {
    let region = text.trim_end();
    let last = region.char_indices().last()?;
    if last.1 != '}' && last.1 != ']' {
        return None;
    }

    let mut stack: Vec<(usize, char)> = Vec::new();
    let mut candidates: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in region.char_indices() {
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
            '"' if !stack.is_empty() => in_string = true,
            '{' | '[' => stack.push((idx, ch)),
            '}' | ']' => match stack.pop() {
                Some((open, open_ch)) if closes(open_ch, ch) => {
                    if idx == last.0 {
                        candidates.push(open);
                    }
                }
                Some(_) => stack.clear(),
                None => {}
            },
            _ => {}
        }
    }

    candidates.sort_unstable();
    candidates.into_iter().find_map(|start| {
        serde_json::from_str::<Value>(&region[start..])
            .ok()
            .map(|value| (start, value))
    })
}

fn closes(open: char, close: char) -> bool {
    matches!((open, close), ('{', '}') | ('[', ']'))
}

// =============================================================================
// Correlation field extraction
// =============================================================================

/// Keys recognised by the plain-text fallback, in lookup order.
const TEXT_FIELD_PATTERN: &str = r#"(?:^|[\s"{,(])"?(?P<key>@module|tf_req_id|tf_resource_type|resource_type|tf_rpc|tf_provider_addr|tf_proto_version)"?\s*[=:]\s*"?(?P<value>[^\s",}\]]+)"#;

fn extract_fields(json: Option<&Value>, text: &str) -> Fields {
    let from_text = text_fields(text);
    let pick = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|key| json.and_then(|v| lookup_key(v, key)))
            .or_else(|| keys.iter().find_map(|key| from_text.get(*key).cloned()))
    };

    Fields {
        tf_req_id: pick(&["tf_req_id"]),
        tf_resource_type: pick(&["tf_resource_type", "resource_type"]),
        tf_rpc: pick(&["tf_rpc"]),
        tf_provider_addr: pick(&["tf_provider_addr"]),
        module: pick(&["@module"]),
        tf_proto_version: pick(&["tf_proto_version"]),
    }
}

/// First occurrence of each known `key=value` / `key: value` /
/// `"key":"value"` pair in free text.
fn text_fields(text: &str) -> HashMap<&'static str, String> {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    let re = FIELD.get_or_init(|| Regex::new(TEXT_FIELD_PATTERN).expect("text field regex"));

    let mut found = HashMap::new();
    if text.is_empty() {
        return found;
    }
    for caps in re.captures_iter(text) {
        let (Some(key), Some(value)) = (caps.name("key"), caps.name("value")) else {
            continue;
        };
        if let Some(known) = canonical_key(key.as_str()) {
            found
                .entry(known)
                .or_insert_with(|| value.as_str().to_string());
        }
    }
    found
}

fn canonical_key(key: &str) -> Option<&'static str> {
    Some(match key {
        "@module" => "@module",
        "tf_req_id" => "tf_req_id",
        "tf_resource_type" => "tf_resource_type",
        "resource_type" => "resource_type",
        "tf_rpc" => "tf_rpc",
        "tf_provider_addr" => "tf_provider_addr",
        "tf_proto_version" => "tf_proto_version",
        _ => return None,
    })
}

/// Look `key` up at this level first, then depth-first in nested values.
fn lookup_key(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get(key)
            .and_then(scalar_string)
            .or_else(|| map.values().find_map(|v| lookup_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| lookup_key(v, key)),
        _ => None,
    }
}

/// Top-level string field of a JSON object.
fn string_key(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(scalar_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Message decoding
// =============================================================================

/// Resolve backslash escapes (`\n \t \r \" \\ \/ \uXXXX`). Unknown or
/// incomplete escapes are kept verbatim.
pub(crate) fn decode_escapes(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let simple = match chars.peek() {
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            Some('"') => Some('"'),
            Some('\\') => Some('\\'),
            Some('/') => Some('/'),
            _ => None,
        };
        if let Some(decoded) = simple {
            chars.next();
            out.push(decoded);
            continue;
        }
        if chars.peek() == Some(&'u') {
            let hex: String = chars.clone().skip(1).take(4).collect();
            let code = (hex.len() == 4)
                .then(|| u32::from_str_radix(&hex, 16).ok())
                .flatten()
                .and_then(char::from_u32);
            if let Some(ch) = code {
                for _ in 0..5 {
                    chars.next();
                }
                out.push(ch);
                continue;
            }
        }
        out.push('\\');
    }
    out
}

// =============================================================================
// Timestamp parsing
// =============================================================================

/// A recognised timestamp format and the converter for it.
struct TimestampFormat {
    name: &'static str,
    parse: fn(&str) -> Option<DateTime<Utc>>,
}

/// Formats tried in order; the first successful conversion wins.
const TIMESTAMP_FORMATS: &[TimestampFormat] = &[
    // 2024-01-15T14:30:22Z, 2024-01-15T14:30:22.319437+03:00, ...+0300
    TimestampFormat {
        name: "rfc3339",
        parse: parse_rfc3339,
    },
    // 2024-01-15T14:30:22, 2024-01-15 14:30:22.123 (assumed UTC)
    TimestampFormat {
        name: "iso8601-naive",
        parse: parse_iso_naive,
    },
    // 2024/01/15 14:30:22 (Go `log` default)
    TimestampFormat {
        name: "go-log",
        parse: parse_go_log,
    },
];

/// Convert a timestamp token using the recognised formats.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS.iter().find_map(|format| {
        let ts = (format.parse)(trimmed)?;
        tracing::trace!(format = format.name, raw = trimmed, "Timestamp matched");
        Some(ts)
    })
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    let mut s = raw.replace(',', ".");
    if s.len() > 10 && s.as_bytes()[10] == b' ' {
        s.replace_range(10..11, "T");
    }
    if let Some(fixed) = insert_offset_colon(&s) {
        s = fixed;
    }
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalise `+0530` -> `+05:30` so `parse_from_rfc3339` accepts it.
fn insert_offset_colon(s: &str) -> Option<String> {
    let n = s.len();
    if n < 5 || !s.is_char_boundary(n - 5) {
        return None;
    }
    let tail = &s[n - 5..];
    let bytes = tail.as_bytes();
    let signed = bytes[0] == b'+' || bytes[0] == b'-';
    if signed && bytes[1..].iter().all(u8::is_ascii_digit) {
        Some(format!("{}{}:{}", &s[..n - 5], &tail[..3], &tail[3..]))
    } else {
        None
    }
}

fn parse_iso_naive(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.replace('T', " ").replace(',', ".");
    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn parse_go_log(raw: &str) -> Option<DateTime<Utc>> {
    if !raw.contains('/') {
        return None;
    }
    parse_iso_naive(&raw.replace('/', "-"))
}
