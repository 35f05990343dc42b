// TfScope - app/store.rs
//
// In-memory store of parsed logs keyed by an opaque log file id.
//
// Readers (search, correlation, plugin runs) share a read lock and see a
// consistent snapshot; `mark_read` is the only writer besides ingestion and
// applies each id's flag change under the write lock.

use crate::core::correlate::{correlate, ChainKey, ChainOverview, ChainSummary};
use crate::core::filter::{self, SearchFilters};
use crate::core::model::{LogEntry, ParsingStats, PhasePeriod};
use crate::core::parser::{self, ParseConfig, ParseResult};
use crate::core::plugin::{AnalysisInput, PluginRegistry};
use crate::util::constants;
use crate::util::error::{StoreError, TfScopeError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One parsed log file as held by the store.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub entries: Vec<LogEntry>,
    pub stats: ParsingStats,
    pub phases: Vec<PhasePeriod>,
    pub lines_processed: u64,
}

impl From<ParseResult> for ParsedLog {
    fn from(result: ParseResult) -> Self {
        Self {
            entries: result.entries,
            stats: result.stats,
            phases: result.phases,
            lines_processed: result.lines_processed,
        }
    }
}

/// A page of search results detached from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub entries: Vec<LogEntry>,
    pub total_count: usize,
    pub page: usize,
    pub size: usize,
    pub total_pages: usize,
}

/// Chains of one log plus aggregate figures over them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    pub mode: ChainKey,
    pub overview: ChainOverview,
    pub chains: Vec<ChainSummary>,
}

/// Thread-safe store of parsed logs.
#[derive(Debug)]
pub struct LogStore {
    logs: RwLock<HashMap<String, ParsedLog>>,
    max_page_size: usize,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(constants::MAX_PAGE_SIZE)
    }
}

impl LogStore {
    pub fn new(max_page_size: usize) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            max_page_size,
        }
    }

    // A panic while holding the lock cannot leave a `ParsedLog` half
    // written (every write is a single assignment), so poisoned guards are
    // recovered rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ParsedLog>> {
        self.logs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ParsedLog>> {
        self.logs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse raw bytes and store the result under `log_file_id`, replacing
    /// any previous content.
    pub fn ingest(
        &self,
        log_file_id: &str,
        bytes: &[u8],
        config: &ParseConfig,
    ) -> Result<ParsingStats, TfScopeError> {
        let result = parser::parse_bytes(bytes, config)?;
        Ok(self.ingest_result(log_file_id, result))
    }

    /// Store an already-parsed result.
    pub fn ingest_result(&self, log_file_id: &str, result: ParseResult) -> ParsingStats {
        let stats = result.stats.clone();
        let replaced = self
            .write()
            .insert(log_file_id.to_string(), ParsedLog::from(result))
            .is_some();
        tracing::debug!(
            log_file_id,
            entries = stats.total_entries,
            replaced,
            "Log stored"
        );
        stats
    }

    /// Drop a log. Returns whether it was present.
    pub fn remove(&self, log_file_id: &str) -> bool {
        self.write().remove(log_file_id).is_some()
    }

    /// Stored ids, sorted.
    pub fn log_file_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run `f` against one stored log under the read lock.
    fn with_log<T>(
        &self,
        log_file_id: &str,
        f: impl FnOnce(&ParsedLog) -> T,
    ) -> Result<T, StoreError> {
        let logs = self.read();
        let log = logs.get(log_file_id).ok_or_else(|| StoreError::UnknownLogFile {
            id: log_file_id.to_string(),
        })?;
        Ok(f(log))
    }

    pub fn stats(&self, log_file_id: &str) -> Result<ParsingStats, StoreError> {
        self.with_log(log_file_id, |log| log.stats.clone())
    }

    pub fn phases(&self, log_file_id: &str) -> Result<Vec<PhasePeriod>, StoreError> {
        self.with_log(log_file_id, |log| log.phases.clone())
    }

    pub fn lines_processed(&self, log_file_id: &str) -> Result<u64, StoreError> {
        self.with_log(log_file_id, |log| log.lines_processed)
    }

    pub fn unread_count(&self, log_file_id: &str) -> Result<usize, StoreError> {
        self.with_log(log_file_id, |log| filter::unread_count(&log.entries))
    }

    pub fn resource_types(&self, log_file_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_log(log_file_id, |log| filter::distinct_resource_types(&log.entries))
    }

    pub fn request_ids(&self, log_file_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_log(log_file_id, |log| filter::distinct_request_ids(&log.entries))
    }

    /// Search one log, returning an owned page.
    pub fn search(
        &self,
        log_file_id: &str,
        filters: &SearchFilters,
    ) -> Result<SearchResults, StoreError> {
        self.with_log(log_file_id, |log| {
            let page = filter::search_with_limit(&log.entries, filters, self.max_page_size);
            SearchResults {
                entries: page.entries.into_iter().cloned().collect(),
                total_count: page.total_count,
                page: page.page,
                size: page.size,
                total_pages: page.total_pages,
            }
        })
    }

    /// Correlate the entries of one log that pass `filters` (an empty
    /// filter correlates everything). Paging fields are ignored.
    pub fn chains(
        &self,
        log_file_id: &str,
        mode: ChainKey,
        filters: &SearchFilters,
    ) -> Result<ChainReport, StoreError> {
        self.with_log(log_file_id, |log| {
            let matched = filter::apply_filters(&log.entries, filters);
            let chains = correlate(matched.iter().map(|&idx| &log.entries[idx]), mode);
            ChainReport {
                mode,
                overview: ChainOverview::from_chains(&chains),
                chains: chains.iter().map(|c| c.summary()).collect(),
            }
        })
    }

    /// Mark entries read. Returns how many entries changed state.
    pub fn mark_read(&self, log_file_id: &str, ids: &[u64]) -> Result<usize, StoreError> {
        let mut logs = self.write();
        let log = logs
            .get_mut(log_file_id)
            .ok_or_else(|| StoreError::UnknownLogFile {
                id: log_file_id.to_string(),
            })?;
        Ok(filter::mark_read(&mut log.entries, ids))
    }

    /// Run a registered analyzer over one log.
    ///
    /// The analyzer sees the entries and request-id chain summaries under a
    /// single read lock, so a concurrent `mark_read` cannot tear the view.
    pub fn analyze(
        &self,
        log_file_id: &str,
        registry: &PluginRegistry,
        plugin: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<serde_json::Value, TfScopeError> {
        let logs = self.read();
        let log = logs
            .get(log_file_id)
            .ok_or_else(|| StoreError::UnknownLogFile {
                id: log_file_id.to_string(),
            })?;
        let input = AnalysisInput {
            log_file_id,
            entries: &log.entries,
            chains: correlate(&log.entries, ChainKey::Request)
                .iter()
                .map(|c| c.summary())
                .collect(),
        };
        Ok(registry.execute(plugin, &input, parameters)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Level;
    use crate::core::plugin::ERROR_AGGREGATOR_NAME;
    use std::sync::Arc;

    const LOG: &str = "2024-01-01T10:00:00Z [INFO] backend/local: starting Plan operation\n\
                       2024-01-01T10:00:01Z [DEBUG] read {\"tf_req_id\":\"r1\",\"tf_resource_type\":\"aws_s3_bucket\"}\n\
                       2024-01-01T10:00:03Z [ERROR] read timeout {\"tf_req_id\":\"r1\"}\n\
                       2024-01-01T10:00:04Z [INFO] backend/local: starting Apply operation\n\
                       2024-01-01T10:00:06Z [WARN] slow {\"tf_req_id\":\"r2\",\"tf_resource_type\":\"aws_s3_bucket\"}\n";

    fn store_with_log() -> LogStore {
        let store = LogStore::default();
        store
            .ingest("run-1", LOG.as_bytes(), &ParseConfig::default())
            .unwrap();
        store
    }

    #[test]
    fn test_ingest_and_stats() {
        let store = store_with_log();
        let stats = store.stats("run-1").unwrap();
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.error_count, 1);
        assert_eq!(store.phases("run-1").unwrap().len(), 2);
        assert_eq!(store.log_file_ids(), vec!["run-1".to_string()]);
        assert_eq!(store.resource_types("run-1").unwrap(), vec!["aws_s3_bucket"]);
        assert_eq!(store.request_ids("run-1").unwrap(), vec!["r1", "r2"]);
    }

    #[test]
    fn test_unknown_id() {
        let store = LogStore::default();
        assert!(matches!(
            store.stats("nope"),
            Err(StoreError::UnknownLogFile { .. })
        ));
        assert!(store.mark_read("nope", &[1]).is_err());
        assert!(!store.remove("nope"));
    }

    #[test]
    fn test_search_and_mark_read() {
        let store = store_with_log();
        let filters = SearchFilters {
            only_unread: true,
            ..Default::default()
        };
        assert_eq!(store.search("run-1", &filters).unwrap().total_count, 5);
        assert_eq!(store.mark_read("run-1", &[1, 2]).unwrap(), 2);
        let page = store.search("run-1", &filters).unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.entries[0].id, 3);
        assert_eq!(store.unread_count("run-1").unwrap(), 3);
    }

    #[test]
    fn test_page_size_capped_by_store() {
        let store = LogStore::new(2);
        store
            .ingest("run-1", LOG.as_bytes(), &ParseConfig::default())
            .unwrap();
        let page = store.search("run-1", &SearchFilters::default()).unwrap();
        assert_eq!(page.size, 2);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_chains_over_filtered_subset() {
        let store = store_with_log();
        let all = store
            .chains("run-1", ChainKey::Request, &SearchFilters::default())
            .unwrap();
        assert_eq!(all.chains.len(), 2);
        assert_eq!(all.overview.error_chains, 1);
        assert_eq!(all.chains[0].duration_ms, 2000);

        let errors_only = store
            .chains("run-1", ChainKey::Request, &SearchFilters::errors_only())
            .unwrap();
        assert_eq!(errors_only.chains.len(), 1);
        assert_eq!(errors_only.chains[0].entry_ids, vec![3]);

        let by_resource = store
            .chains("run-1", ChainKey::Resource, &SearchFilters::default())
            .unwrap();
        let keys: Vec<&str> = by_resource.chains.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["aws_s3_bucket|plan", "aws_s3_bucket|apply"]);
    }

    #[test]
    fn test_analyze_with_builtin() {
        let store = store_with_log();
        let registry = PluginRegistry::with_builtins();
        let result = store
            .analyze("run-1", &registry, ERROR_AGGREGATOR_NAME, &HashMap::new())
            .unwrap();
        assert_eq!(result["total_errors"], 1);
        assert_eq!(result["errors_by_class"]["timeout_error"], 1);
        assert_eq!(result["error_chains"], 1);
        assert!(store
            .analyze("run-1", &registry, "missing", &HashMap::new())
            .is_err());
    }

    #[test]
    fn test_concurrent_readers_and_marking() {
        let store = Arc::new(store_with_log());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.mark_read("run-1", &[i + 1]).unwrap();
                    store
                        .search(
                            "run-1",
                            &SearchFilters {
                                level: Some(Level::Error),
                                ..Default::default()
                            },
                        )
                        .unwrap()
                        .total_count
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(store.unread_count("run-1").unwrap(), 1);
    }
}
