// TfScope - core/filter.rs
//
// Search and filter engine over a parsed entry set.
// All active filters are AND-combined; free text and regex are each
// OR-matched across message, raw text and JSON body.
// Core layer: pure logic, no I/O. The only mutation offered is `mark_read`.

use crate::core::model::{Level, LogEntry, Section};
use crate::core::parser::parse_timestamp;
use crate::util::constants;
use crate::util::error::FilterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Complete filter state. Every field defaults to "no constraint".
#[derive(Debug, Clone)]
pub struct SearchFilters {
    /// Case-insensitive substring. Empty = no filter.
    pub free_text: String,

    /// Exact resource type.
    pub tf_resource_type: Option<String>,

    /// Exact phase.
    pub section: Option<Section>,

    /// Exact request id.
    pub tf_req_id: Option<String>,

    /// Exact level.
    pub level: Option<Level>,

    /// Only entries not yet marked read.
    pub only_unread: bool,

    /// Inclusive lower time bound. Untimed entries never match a bound.
    pub timestamp_from: Option<DateTime<Utc>>,

    /// Inclusive upper time bound.
    pub timestamp_to: Option<DateTime<Utc>>,

    /// Restrict to entries with (true) or without (false) a parsing error.
    pub has_parsing_error: Option<bool>,

    /// Compiled regex search. Set through `set_regex`.
    pub regex: Option<Regex>,

    /// Zero-based page index.
    pub page: usize,

    /// Entries per page.
    pub size: usize,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            free_text: String::new(),
            tf_resource_type: None,
            section: None,
            tf_req_id: None,
            level: None,
            only_unread: false,
            timestamp_from: None,
            timestamp_to: None,
            has_parsing_error: None,
            regex: None,
            page: 0,
            size: constants::DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchFilters {
    /// Returns true if no filters are active. Paging is not a filter.
    pub fn is_empty(&self) -> bool {
        self.free_text.is_empty()
            && self.tf_resource_type.is_none()
            && self.section.is_none()
            && self.tf_req_id.is_none()
            && self.level.is_none()
            && !self.only_unread
            && self.timestamp_from.is_none()
            && self.timestamp_to.is_none()
            && self.has_parsing_error.is_none()
            && self.regex.is_none()
    }

    /// Set the regex search pattern, compiling it.
    /// An empty pattern clears the regex filter.
    pub fn set_regex(&mut self, pattern: &str) -> Result<(), FilterError> {
        if pattern.is_empty() {
            self.regex = None;
            return Ok(());
        }
        if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
            return Err(FilterError::RegexTooLong {
                length: pattern.len(),
                max_length: constants::MAX_REGEX_PATTERN_LENGTH,
            });
        }
        let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.regex = Some(regex);
        Ok(())
    }

    /// Quick filter: ERROR entries only.
    pub fn errors_only() -> Self {
        Self {
            level: Some(Level::Error),
            ..Default::default()
        }
    }

    fn has_contradictory_bounds(&self) -> bool {
        matches!(
            (self.timestamp_from, self.timestamp_to),
            (Some(from), Some(to)) if from > to
        )
    }
}

/// Parse a user-supplied time bound in any recognised log timestamp format.
pub fn parse_bound(raw: &str) -> Result<DateTime<Utc>, FilterError> {
    parse_timestamp(raw).ok_or_else(|| FilterError::InvalidTimestamp {
        raw: raw.to_string(),
    })
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage<'a> {
    pub entries: Vec<&'a LogEntry>,
    /// Matches across all pages.
    pub total_count: usize,
    pub page: usize,
    pub size: usize,
    pub total_pages: usize,
}

/// Search with the default page-size ceiling.
pub fn search<'a>(entries: &'a [LogEntry], filters: &SearchFilters) -> SearchPage<'a> {
    search_with_limit(entries, filters, constants::MAX_PAGE_SIZE)
}

/// Filter, order by line number and paginate.
///
/// The requested page size is clamped to `1..=max_size`. A page past the end
/// is empty but still reports the full `total_count`.
pub fn search_with_limit<'a>(
    entries: &'a [LogEntry],
    filters: &SearchFilters,
    max_size: usize,
) -> SearchPage<'a> {
    let size = filters.size.clamp(1, max_size.max(1));

    let mut matched = apply_filters(entries, filters);
    matched.sort_by_key(|&idx| entries[idx].line_number);

    let total_count = matched.len();
    let page_entries = matched
        .iter()
        .skip(filters.page.saturating_mul(size))
        .take(size)
        .map(|&idx| &entries[idx])
        .collect();

    SearchPage {
        entries: page_entries,
        total_count,
        page: filters.page,
        size,
        total_pages: total_count.div_ceil(size),
    }
}

/// Apply filters to a slice of entries, returning indices of matching entries.
///
/// Indices follow input order. This avoids copying entries and lets callers
/// build their own views (pagination, correlation of the filtered set).
pub fn apply_filters(entries: &[LogEntry], filters: &SearchFilters) -> Vec<usize> {
    if filters.is_empty() {
        return (0..entries.len()).collect();
    }
    if filters.has_contradictory_bounds() {
        return Vec::new();
    }

    let text_lower = filters.free_text.to_lowercase();

    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| matches_all(entry, filters, &text_lower))
        .map(|(idx, _)| idx)
        .collect()
}

/// Check if a single entry matches all active filters.
fn matches_all(entry: &LogEntry, filters: &SearchFilters, text_lower: &str) -> bool {
    if filters.level.is_some() && entry.level != filters.level {
        return false;
    }
    if filters.section.is_some_and(|s| s != entry.section) {
        return false;
    }
    if filters.tf_resource_type.is_some() && entry.tf_resource_type != filters.tf_resource_type {
        return false;
    }
    if filters.tf_req_id.is_some() && entry.tf_req_id != filters.tf_req_id {
        return false;
    }
    if filters.only_unread && entry.is_read {
        return false;
    }
    if filters
        .has_parsing_error
        .is_some_and(|flag| flag != entry.parsing_error)
    {
        return false;
    }

    // Time range filter
    if let Some(ref from) = filters.timestamp_from {
        match entry.timestamp {
            Some(ts) if ts < *from => return false,
            None => return false,
            _ => {}
        }
    }
    if let Some(ref to) = filters.timestamp_to {
        match entry.timestamp {
            Some(ts) if ts > *to => return false,
            None => return false,
            _ => {}
        }
    }

    if !text_lower.is_empty() && !text_targets(entry).any(|t| t.to_lowercase().contains(text_lower))
    {
        return false;
    }
    if let Some(ref regex) = filters.regex {
        if !text_targets(entry).any(|t| regex.is_match(t)) {
            return false;
        }
    }

    true
}

fn text_targets(entry: &LogEntry) -> impl Iterator<Item = &str> {
    [
        Some(entry.message.as_str()),
        Some(entry.raw_message.as_str()),
        entry.json_body.as_deref(),
    ]
    .into_iter()
    .flatten()
}

// =============================================================================
// Read state and distinct values
// =============================================================================

/// Mark the listed ids as read. Unknown ids are ignored; other entries and
/// other fields are untouched. Returns how many entries changed state.
pub fn mark_read(entries: &mut [LogEntry], ids: &[u64]) -> usize {
    let wanted: HashSet<u64> = ids.iter().copied().collect();
    let mut changed = 0;
    for entry in entries.iter_mut().filter(|e| wanted.contains(&e.id)) {
        if !entry.is_read {
            entry.is_read = true;
            changed += 1;
        }
    }
    changed
}

/// Entries not yet marked read.
pub fn unread_count(entries: &[LogEntry]) -> usize {
    entries.iter().filter(|e| !e.is_read).count()
}

/// Sorted distinct resource types.
pub fn distinct_resource_types(entries: &[LogEntry]) -> Vec<String> {
    distinct(entries.iter().filter_map(|e| e.tf_resource_type.as_deref()))
}

/// Sorted distinct request ids.
pub fn distinct_request_ids(entries: &[LogEntry]) -> Vec<String> {
    distinct(entries.iter().filter_map(|e| e.tf_req_id.as_deref()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_entry(id: u64, level: Level, message: &str) -> LogEntry {
        let mut entry = LogEntry::unparsed(id, id, message.to_string(), 1);
        entry.level = Some(level);
        entry.message = message.to_string();
        entry
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, secs).unwrap()
    }

    #[test]
    fn test_empty_filter_returns_all() {
        let entries = vec![
            make_entry(1, Level::Error, "Error 1"),
            make_entry(2, Level::Info, "Info 1"),
        ];
        let page = search(&entries, &SearchFilters::default());
        assert_eq!(page.total_count, 2);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_errors_unread() {
        let mut entries: Vec<LogEntry> = (1..=10)
            .map(|i| {
                let level = if i <= 4 { Level::Error } else { Level::Info };
                make_entry(i, level, &format!("entry {i}"))
            })
            .collect();
        mark_read(&mut entries, &[4]);
        let filters = SearchFilters {
            level: Some(Level::Error),
            only_unread: true,
            ..Default::default()
        };
        let page = search(&entries, &filters);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.entries.len(), 3);
    }

    #[test]
    fn test_free_text_matches_any_target() {
        let mut with_body = make_entry(1, Level::Debug, "Request body");
        with_body.json_body = Some("{\"Name\":\"WebServer\"}".to_string());
        with_body.has_json = true;
        let mut raw_only = make_entry(2, Level::Info, "decoded");
        raw_only.raw_message = "[INFO] webserver raw".to_string();
        let entries = vec![with_body, raw_only, make_entry(3, Level::Info, "other")];

        let filters = SearchFilters {
            free_text: "WEBSERVER".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_filters(&entries, &filters), vec![0, 1]);
    }

    #[test]
    fn test_regex_filter() {
        let entries = vec![
            make_entry(1, Level::Error, "Error code: 404"),
            make_entry(2, Level::Error, "Error code: 500"),
            make_entry(3, Level::Info, "Status OK"),
        ];
        let mut filters = SearchFilters::default();
        filters.set_regex(r"code:\s*5\d{2}").unwrap();
        assert_eq!(apply_filters(&entries, &filters), vec![1]);
    }

    #[test]
    fn test_invalid_regex() {
        let mut filters = SearchFilters::default();
        assert!(matches!(
            filters.set_regex("[invalid"),
            Err(FilterError::InvalidRegex { .. })
        ));
        let long = "a".repeat(constants::MAX_REGEX_PATTERN_LENGTH + 1);
        assert!(matches!(
            filters.set_regex(&long),
            Err(FilterError::RegexTooLong { .. })
        ));
    }

    #[test]
    fn test_time_bounds_inclusive_and_exclude_untimed() {
        let mut entries = vec![
            make_entry(1, Level::Info, "a"),
            make_entry(2, Level::Info, "b"),
            make_entry(3, Level::Info, "c"),
        ];
        entries[0].timestamp = Some(at(0));
        entries[1].timestamp = Some(at(5));
        let filters = SearchFilters {
            timestamp_from: Some(at(0)),
            timestamp_to: Some(at(5)),
            ..Default::default()
        };
        assert_eq!(apply_filters(&entries, &filters), vec![0, 1]);

        let only_from = SearchFilters {
            timestamp_from: Some(at(1)),
            ..Default::default()
        };
        assert_eq!(apply_filters(&entries, &only_from), vec![1]);
    }

    #[test]
    fn test_contradictory_bounds_empty() {
        let mut entries = vec![make_entry(1, Level::Info, "a")];
        entries[0].timestamp = Some(at(3));
        let filters = SearchFilters {
            timestamp_from: Some(at(5)),
            timestamp_to: Some(at(1)),
            ..Default::default()
        };
        let page = search(&entries, &filters);
        assert_eq!(page.total_count, 0);
        assert!(page.entries.is_empty());
    }

    #[test]
    fn test_exact_field_filters() {
        let mut a = make_entry(1, Level::Info, "a");
        a.tf_resource_type = Some("aws_instance".to_string());
        a.section = Section::Apply;
        a.tf_req_id = Some("r1".to_string());
        let mut b = a.clone();
        b.id = 2;
        b.line_number = 2;
        b.section = Section::Plan;
        let mut c = make_entry(3, Level::Info, "c");
        c.parsing_error = true;
        let entries = vec![a, b, c];

        let filters = SearchFilters {
            tf_resource_type: Some("aws_instance".to_string()),
            section: Some(Section::Apply),
            tf_req_id: Some("r1".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&entries, &filters), vec![0]);

        let broken = SearchFilters {
            has_parsing_error: Some(true),
            ..Default::default()
        };
        assert_eq!(apply_filters(&entries, &broken), vec![2]);
    }

    #[test]
    fn test_pagination_ordered_by_line() {
        let mut entries: Vec<LogEntry> = (1..=7)
            .map(|i| make_entry(i, Level::Info, &format!("m{i}")))
            .collect();
        entries.reverse();
        let filters = SearchFilters {
            page: 1,
            size: 3,
            ..Default::default()
        };
        let page = search(&entries, &filters);
        let lines: Vec<u64> = page.entries.iter().map(|e| e.line_number).collect();
        assert_eq!(lines, vec![4, 5, 6]);
        assert_eq!(page.total_pages, 3);

        let past_end = SearchFilters {
            page: 9,
            size: 3,
            ..Default::default()
        };
        let page = search(&entries, &past_end);
        assert!(page.entries.is_empty());
        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn test_page_size_clamped() {
        let entries: Vec<LogEntry> = (1..=5)
            .map(|i| make_entry(i, Level::Info, "x"))
            .collect();
        let filters = SearchFilters {
            size: 0,
            ..Default::default()
        };
        assert_eq!(search(&entries, &filters).size, 1);
        let huge = SearchFilters {
            size: usize::MAX,
            ..Default::default()
        };
        assert_eq!(search_with_limit(&entries, &huge, 2).size, 2);
    }

    #[test]
    fn test_search_idempotent() {
        let entries: Vec<LogEntry> = (1..=20)
            .map(|i| make_entry(i, if i % 3 == 0 { Level::Warn } else { Level::Info }, "x"))
            .collect();
        let filters = SearchFilters {
            level: Some(Level::Warn),
            size: 4,
            ..Default::default()
        };
        let first = search(&entries, &filters);
        let second = search(&entries, &filters);
        assert_eq!(first.total_count, second.total_count);
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_mark_read_isolated() {
        let mut entries = vec![
            make_entry(1, Level::Info, "a"),
            make_entry(2, Level::Info, "b"),
            make_entry(3, Level::Info, "c"),
        ];
        let before = entries.clone();
        assert_eq!(mark_read(&mut entries, &[2, 99]), 1);
        assert_eq!(mark_read(&mut entries, &[2]), 0);
        assert_eq!(entries[0], before[0]);
        assert_eq!(entries[2], before[2]);
        let mut expected = before[1].clone();
        expected.is_read = true;
        assert_eq!(entries[1], expected);
        assert_eq!(unread_count(&entries), 2);
    }

    #[test]
    fn test_distinct_values() {
        let mut a = make_entry(1, Level::Info, "a");
        a.tf_resource_type = Some("b_type".to_string());
        a.tf_req_id = Some("r2".to_string());
        let mut b = make_entry(2, Level::Info, "b");
        b.tf_resource_type = Some("a_type".to_string());
        b.tf_req_id = Some("r2".to_string());
        let mut c = make_entry(3, Level::Info, "c");
        c.tf_resource_type = Some("b_type".to_string());
        let entries = vec![a, b, c];
        assert_eq!(distinct_resource_types(&entries), vec!["a_type", "b_type"]);
        assert_eq!(distinct_request_ids(&entries), vec!["r2"]);
    }

    #[test]
    fn test_parse_bound() {
        assert_eq!(parse_bound("2024-01-01T10:00:05Z").unwrap(), at(5));
        assert!(matches!(
            parse_bound("yesterday"),
            Err(FilterError::InvalidTimestamp { .. })
        ));
    }
}
