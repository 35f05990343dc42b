// TfScope - core/correlate.rs
//
// Groups entries into chains: time-bounded runs of entries that share a
// correlation key and together describe one logical operation.
//
// Pure projection over an immutable entry slice. Chains borrow their
// entries, so recomputing them after every filter change costs one pass and
// no clones.

use crate::core::model::{Level, LogEntry, Section};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which attribute(s) entries are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKey {
    /// `tf_req_id`: one provider RPC round trip.
    #[default]
    #[serde(alias = "request_id")]
    Request,
    /// `tf_resource_type` + `section`: all work on one resource type in a phase.
    Resource,
}

impl ChainKey {
    pub fn label(&self) -> &'static str {
        match self {
            ChainKey::Request => "request",
            ChainKey::Resource => "resource",
        }
    }

    pub fn from_label(label: &str) -> Option<ChainKey> {
        match label.trim().to_ascii_lowercase().as_str() {
            "request" | "request_id" | "req" => Some(ChainKey::Request),
            "resource" | "resource_section" => Some(ChainKey::Resource),
            _ => None,
        }
    }

    /// Key value for `entry`, `None` when the entry lacks the attribute.
    pub fn key_of(&self, entry: &LogEntry) -> Option<String> {
        match self {
            ChainKey::Request => entry.tf_req_id.clone(),
            ChainKey::Resource => entry
                .tf_resource_type
                .as_deref()
                .map(|rt| composite_key(rt, entry.section)),
        }
    }
}

/// `"<resource type>|<section>"`.
pub fn composite_key(resource_type: &str, section: Section) -> String {
    format!("{resource_type}|{}", section.label())
}

/// Overall outcome of a chain, by the most severe level among its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChainStatus {
    Error,
    Warning,
    Success,
}

impl ChainStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChainStatus::Error => "ERROR",
            ChainStatus::Warning => "WARNING",
            ChainStatus::Success => "SUCCESS",
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A group of entries sharing a correlation key.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    pub key: String,
    /// Earliest timestamp among the members.
    pub start_time: DateTime<Utc>,
    /// Latest timestamp among the members.
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: ChainStatus,
    /// Member count per level; entries without a level are not counted.
    pub level_counts: BTreeMap<Level, usize>,
    /// Members in encounter order.
    pub entries: Vec<&'a LogEntry>,
}

impl<'a> Chain<'a> {
    /// Build a chain from its members. `None` when no member has a timestamp.
    fn from_members(key: String, entries: Vec<&'a LogEntry>) -> Option<Self> {
        let mut times = entries.iter().filter_map(|e| e.timestamp);
        let first = times.next()?;
        let (start_time, end_time) = times.fold((first, first), |(lo, hi), ts| {
            (lo.min(ts), hi.max(ts))
        });

        let mut level_counts = BTreeMap::new();
        for level in entries.iter().filter_map(|e| e.level) {
            *level_counts.entry(level).or_insert(0) += 1;
        }
        let status = if level_counts.contains_key(&Level::Error) {
            ChainStatus::Error
        } else if level_counts.contains_key(&Level::Warn) {
            ChainStatus::Warning
        } else {
            ChainStatus::Success
        };

        Some(Self {
            key,
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            status,
            level_counts,
            entries,
        })
    }

    /// Owned, serialisable description of the chain.
    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            key: self.key.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms,
            status: self.status,
            entry_count: self.entries.len(),
            level_counts: self.level_counts.clone(),
            entry_ids: self.entries.iter().map(|e| e.id).collect(),
        }
    }
}

/// Group `entries` by `key`.
///
/// Accepts any iterator of entry references, so a filtered subset can be
/// correlated without copying.
///
/// Entries without a key value are left out entirely, as are groups whose
/// members carry no timestamp. Chains come back in the order their first
/// member was encountered; members keep input order.
pub fn correlate<'a>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
    key: ChainKey,
) -> Vec<Chain<'a>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&'a LogEntry>)> = Vec::new();

    for entry in entries {
        let Some(value) = key.key_of(entry) else {
            continue;
        };
        match index.get(&value) {
            Some(&slot) => groups[slot].1.push(entry),
            None => {
                index.insert(value.clone(), groups.len());
                groups.push((value, vec![entry]));
            }
        }
    }

    let group_count = groups.len();
    let chains: Vec<Chain<'a>> = groups
        .into_iter()
        .filter_map(|(value, members)| Chain::from_members(value, members))
        .collect();

    tracing::debug!(
        mode = key.label(),
        groups = group_count,
        chains = chains.len(),
        "Correlation complete"
    );
    chains
}

// =============================================================================
// Summaries
// =============================================================================

/// Owned view of a chain, detached from the entry slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    pub key: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: ChainStatus,
    pub entry_count: usize,
    pub level_counts: BTreeMap<Level, usize>,
    pub entry_ids: Vec<u64>,
}

/// Aggregate figures over a set of chains.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChainOverview {
    pub total_chains: usize,
    pub error_chains: usize,
    pub warning_chains: usize,
    pub success_chains: usize,
    /// Mean duration, 0 for an empty set.
    pub avg_duration_ms: f64,
    pub max_duration_ms: i64,
}

impl ChainOverview {
    pub fn from_chains(chains: &[Chain<'_>]) -> Self {
        let mut overview = ChainOverview {
            total_chains: chains.len(),
            ..Default::default()
        };
        let mut total_ms: i64 = 0;
        for chain in chains {
            match chain.status {
                ChainStatus::Error => overview.error_chains += 1,
                ChainStatus::Warning => overview.warning_chains += 1,
                ChainStatus::Success => overview.success_chains += 1,
            }
            total_ms += chain.duration_ms;
            overview.max_duration_ms = overview.max_duration_ms.max(chain.duration_ms);
        }
        if !chains.is_empty() {
            overview.avg_duration_ms = total_ms as f64 / chains.len() as f64;
        }
        overview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_entry(id: u64, secs: Option<u32>, level: Level, req: Option<&str>) -> LogEntry {
        let mut entry = LogEntry::unparsed(id, id, format!("line {id}"), 1);
        entry.timestamp = secs.map(|s| Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, s).unwrap());
        entry.level = Some(level);
        entry.tf_req_id = req.map(str::to_string);
        entry
    }

    #[test]
    fn test_single_error_chain() {
        let entries = vec![
            make_entry(1, Some(0), Level::Info, None),
            make_entry(2, Some(1), Level::Error, Some("abc")),
        ];
        let chains = correlate(&entries, ChainKey::Request);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].status, ChainStatus::Error);
        assert_eq!(chains[0].entries.len(), 1);
        assert_eq!(chains[0].duration_ms, 0);
    }

    #[test]
    fn test_warning_chain_duration() {
        let entries = vec![
            make_entry(1, Some(0), Level::Info, Some("r1")),
            make_entry(2, Some(5), Level::Warn, Some("r1")),
        ];
        let chains = correlate(&entries, ChainKey::Request);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].duration_ms, 5000);
        assert_eq!(chains[0].status, ChainStatus::Warning);
        assert_eq!(chains[0].level_counts.get(&Level::Warn), Some(&1));
    }

    #[test]
    fn test_untimed_group_dropped_and_order_kept() {
        let entries = vec![
            make_entry(1, Some(3), Level::Info, Some("b")),
            make_entry(2, None, Level::Info, Some("none")),
            make_entry(3, Some(1), Level::Debug, Some("a")),
            make_entry(4, Some(2), Level::Info, Some("b")),
        ];
        let chains = correlate(&entries, ChainKey::Request);
        let keys: Vec<&str> = chains.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        let ids: Vec<u64> = chains[0].entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(chains[0].status, ChainStatus::Success);
    }

    #[test]
    fn test_every_request_entry_in_exactly_one_chain() {
        let entries: Vec<LogEntry> = (0..30)
            .map(|i| {
                let req = match i % 4 {
                    0 => None,
                    n => Some(format!("req-{n}")),
                };
                make_entry(i, Some(i as u32), Level::Info, req.as_deref())
            })
            .collect();
        let chains = correlate(&entries, ChainKey::Request);
        for entry in entries.iter().filter(|e| e.tf_req_id.is_some()) {
            let hits = chains
                .iter()
                .filter(|c| c.entries.iter().any(|m| m.id == entry.id))
                .count();
            assert_eq!(hits, 1, "entry {} should be in one chain", entry.id);
        }
    }

    #[test]
    fn test_resource_section_key() {
        let mut plan = make_entry(1, Some(0), Level::Info, None);
        plan.tf_resource_type = Some("aws_instance".to_string());
        plan.section = Section::Plan;
        let mut apply = plan.clone();
        apply.id = 2;
        apply.section = Section::Apply;
        let mut apply_again = apply.clone();
        apply_again.id = 3;

        let entries = vec![plan, apply, apply_again];
        let chains = correlate(&entries, ChainKey::Resource);
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].key, "aws_instance|plan");
        assert_eq!(chains[1].key, "aws_instance|apply");
        assert_eq!(chains[1].entries.len(), 2);
    }

    #[test]
    fn test_summary_and_overview() {
        let entries = vec![
            make_entry(1, Some(0), Level::Error, Some("x")),
            make_entry(2, Some(4), Level::Info, Some("x")),
            make_entry(3, Some(5), Level::Info, Some("y")),
            make_entry(4, Some(7), Level::Warn, Some("y")),
        ];
        let chains = correlate(&entries, ChainKey::Request);
        let summary = chains[0].summary();
        assert_eq!(summary.entry_ids, vec![1, 2]);
        assert_eq!(summary.entry_count, 2);

        let overview = ChainOverview::from_chains(&chains);
        assert_eq!(overview.total_chains, 2);
        assert_eq!(overview.error_chains, 1);
        assert_eq!(overview.warning_chains, 1);
        assert_eq!(overview.max_duration_ms, 4000);
        assert!((overview.avg_duration_ms - 3000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_chain_key_labels() {
        assert_eq!(ChainKey::from_label("Request"), Some(ChainKey::Request));
        assert_eq!(ChainKey::from_label("resource"), Some(ChainKey::Resource));
        assert_eq!(ChainKey::from_label("bogus"), None);
    }
}
