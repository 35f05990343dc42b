// TfScope - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Log Entry (normalised output of parsing)
// =============================================================================

/// A single parsed log event built from one or more raw lines.
///
/// Entries are immutable once the parser hands them out, with the single
/// exception of `is_read`, which only `filter::mark_read` touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique, monotonically assigned ID within the parsed file.
    pub id: u64,

    /// 1-based line number of the first raw line of this entry.
    pub line_number: u64,

    /// Number of raw lines this entry spans (1 for single-line entries).
    pub line_count: usize,

    /// Parsed timestamp in UTC. `None` if the entry had no recognisable
    /// timestamp.
    pub timestamp: Option<DateTime<Utc>>,

    /// Severity level, `None` if undeterminable.
    pub level: Option<Level>,

    /// Terraform phase in effect when the entry was observed.
    pub section: Section,

    /// Human-readable text with any JSON body stripped and escapes decoded.
    pub message: String,

    /// Original text of every line this entry spans, joined with `\n`.
    pub raw_message: String,

    /// Whether a well-formed JSON payload was found in the entry.
    pub has_json: bool,

    /// Verbatim text of the JSON payload when `has_json` is set.
    pub json_body: Option<String>,

    /// Provider request id used to group entries into request chains.
    pub tf_req_id: Option<String>,

    /// Terraform resource type (e.g. `aws_instance`).
    pub tf_resource_type: Option<String>,

    /// Provider RPC name (e.g. `ApplyResourceChange`).
    pub tf_rpc: Option<String>,

    /// Provider address (e.g. `registry.terraform.io/hashicorp/aws`).
    pub tf_provider_addr: Option<String>,

    /// Emitting Terraform module (`@module`), e.g. `provider.terraform-provider-aws`.
    pub module: Option<String>,

    /// Whether the entry is the request or the response half of a provider RPC.
    pub request_kind: Option<RequestKind>,

    /// Set by the presentation layer once a user has looked at the entry.
    #[serde(default)]
    pub is_read: bool,

    /// True when some part of the entry could not be interpreted.
    pub parsing_error: bool,

    /// Short diagnostic explaining `parsing_error`.
    pub parsing_error_message: Option<String>,
}

impl LogEntry {
    /// An entry with every parsed field empty. The parser fills in what
    /// it can recognise.
    pub fn unparsed(id: u64, line_number: u64, raw_message: String, line_count: usize) -> Self {
        Self {
            id,
            line_number,
            line_count,
            timestamp: None,
            level: None,
            section: Section::Other,
            message: String::new(),
            raw_message,
            has_json: false,
            json_body: None,
            tf_req_id: None,
            tf_resource_type: None,
            tf_rpc: None,
            tf_provider_addr: None,
            module: None,
            request_kind: None,
            is_read: false,
            parsing_error: false,
            parsing_error_message: None,
        }
    }

    /// Classify the resource operation this entry talks about from its
    /// message wording. Only meaningful for entries with a resource type.
    pub fn operation_kind(&self) -> OperationKind {
        if self.tf_resource_type.is_none() {
            return OperationKind::Unknown;
        }
        let msg = &self.message;
        let lower = msg.to_lowercase();
        if lower.contains("creating") || msg.contains("Create") {
            OperationKind::Create
        } else if lower.contains("updating") || msg.contains("Update") {
            OperationKind::Update
        } else if lower.contains("destroying") || msg.contains("Destroy") {
            OperationKind::Delete
        } else if lower.contains("reading") || msg.contains("Read") {
            OperationKind::Read
        } else {
            OperationKind::Unknown
        }
    }

    /// Rough importance score used to rank entries for triage.
    ///
    /// Level weight (ERROR 10, WARN 5, INFO 1, DEBUG 0), +2 for compute
    /// resources, +3 when the message mentions a failure.
    pub fn severity_score(&self) -> u32 {
        let mut score = match self.level {
            Some(Level::Error) => 10,
            Some(Level::Warn) => 5,
            Some(Level::Info) => 1,
            Some(Level::Debug) | None => 0,
        };
        if self
            .tf_resource_type
            .as_deref()
            .is_some_and(|t| t.contains("compute"))
        {
            score += 2;
        }
        let lower = self.message.to_lowercase();
        if lower.contains("failed") || lower.contains("error") {
            score += 3;
        }
        score
    }
}

// =============================================================================
// Level
// =============================================================================

/// Severity levels, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    /// Returns all variants in display order (most severe first).
    pub fn all() -> &'static [Level] {
        &[Level::Error, Level::Warn, Level::Info, Level::Debug]
    }

    /// Canonical upper-case label.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }

    /// Map a raw level token (case-insensitive) to a level.
    ///
    /// `WARNING` is an alias of `WARN`; Terraform's `TRACE` is folded into
    /// `DEBUG`. Anything else yields `None`.
    pub fn from_token(token: &str) -> Option<Level> {
        match token.trim().to_ascii_uppercase().as_str() {
            "ERROR" | "ERR" => Some(Level::Error),
            "WARN" | "WARNING" => Some(Level::Warn),
            "INFO" => Some(Level::Info),
            "DEBUG" | "TRACE" => Some(Level::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Section
// =============================================================================

/// Logical stage of a Terraform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Plan,
    Apply,
    #[default]
    Other,
}

impl Section {
    pub fn all() -> &'static [Section] {
        &[Section::Plan, Section::Apply, Section::Other]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Section::Plan => "plan",
            Section::Apply => "apply",
            Section::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Section> {
        match label.trim().to_ascii_lowercase().as_str() {
            "plan" => Some(Section::Plan),
            "apply" => Some(Section::Apply),
            "other" => Some(Section::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Request / operation classification
// =============================================================================

/// Which half of a provider RPC an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Request,
    Response,
}

/// Resource operation inferred from message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Read,
    Unknown,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Read => "read",
            OperationKind::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Phase periods
// =============================================================================

/// A contiguous run of entries sharing one section.
///
/// Times are `None` only when no entry up to and including this period
/// carried a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhasePeriod {
    pub section: Section,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub entry_count: usize,
}

// =============================================================================
// Parsing statistics
// =============================================================================

/// Per-file statistics. Always recomputed from the full entry set, never
/// patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsingStats {
    /// Total entries in the file.
    pub total_entries: usize,

    /// Entries per section.
    pub entries_by_section: BTreeMap<Section, usize>,

    /// Entries with level ERROR.
    pub error_count: usize,

    /// Entries with level WARN.
    pub warn_count: usize,

    /// Entries flagged with a parsing error.
    pub parse_error_count: usize,

    /// Entries carrying an embedded JSON payload.
    pub json_entry_count: usize,
}

impl ParsingStats {
    pub fn compute(entries: &[LogEntry]) -> Self {
        let mut stats = ParsingStats {
            total_entries: entries.len(),
            ..Default::default()
        };
        for section in Section::all() {
            stats.entries_by_section.insert(*section, 0);
        }
        for entry in entries {
            *stats.entries_by_section.entry(entry.section).or_insert(0) += 1;
            match entry.level {
                Some(Level::Error) => stats.error_count += 1,
                Some(Level::Warn) => stats.warn_count += 1,
                _ => {}
            }
            if entry.parsing_error {
                stats.parse_error_count += 1;
            }
            if entry.has_json {
                stats.json_entry_count += 1;
            }
        }
        stats
    }

    pub fn section_count(&self, section: Section) -> usize {
        self.entries_by_section.get(&section).copied().unwrap_or(0)
    }
}
