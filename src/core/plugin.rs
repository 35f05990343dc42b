// TfScope - core/plugin.rs
//
// Analyzer plugin contract and registry.
//
// An analyzer describes itself and runs over an already-parsed entry set.
// The registry is the only place that dispatches over analyzer types;
// callers go through it by name. Results are opaque JSON to the core.

use crate::core::correlate::ChainSummary;
use crate::core::model::{Level, LogEntry};
use crate::util::constants;
use crate::util::error::PluginError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Self-description of an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub supported_parameters: Vec<String>,
}

/// A consistent snapshot handed to an analyzer.
#[derive(Debug, Clone)]
pub struct AnalysisInput<'a> {
    /// Opaque handle of the parsed file.
    pub log_file_id: &'a str,
    pub entries: &'a [LogEntry],
    pub chains: Vec<ChainSummary>,
}

/// An analyzer that can be run over a parsed log.
pub trait LogAnalyzer: Send + Sync {
    fn describe(&self) -> PluginInfo;

    fn execute(
        &self,
        input: &AnalysisInput<'_>,
        parameters: &HashMap<String, String>,
    ) -> Result<Value, PluginError>;
}

/// Analyzers keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn LogAnalyzer>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in analyzers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.plugins.insert(
            ERROR_AGGREGATOR_NAME.to_string(),
            Box::new(ErrorAggregator),
        );
        registry
    }

    /// Register an analyzer under the name it describes itself with.
    pub fn register(&mut self, plugin: Box<dyn LogAnalyzer>) -> Result<(), PluginError> {
        let name = plugin.describe().name;
        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyRegistered { name });
        }
        tracing::info!(plugin = %name, "Plugin registered");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Remove an analyzer. Returns whether one was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.plugins.remove(name).is_some();
        if removed {
            tracing::info!(plugin = %name, "Plugin unregistered");
        }
        removed
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn describe(&self, name: &str) -> Result<PluginInfo, PluginError> {
        self.get(name).map(|p| p.describe())
    }

    /// Descriptions of every registered analyzer, sorted by name.
    pub fn describe_all(&self) -> Vec<PluginInfo> {
        self.plugins.values().map(|p| p.describe()).collect()
    }

    pub fn execute(
        &self,
        name: &str,
        input: &AnalysisInput<'_>,
        parameters: &HashMap<String, String>,
    ) -> Result<Value, PluginError> {
        let plugin = self.get(name)?;
        tracing::debug!(
            plugin = %name,
            log_file_id = input.log_file_id,
            entries = input.entries.len(),
            "Executing plugin"
        );
        plugin.execute(input, parameters)
    }

    fn get(&self, name: &str) -> Result<&dyn LogAnalyzer, PluginError> {
        self.plugins
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| PluginError::NotFound {
                name: name.to_string(),
            })
    }
}

// =============================================================================
// Built-in: error aggregator
// =============================================================================

pub const ERROR_AGGREGATOR_NAME: &str = "error-aggregator";

/// Message keywords mapped to error classes, checked in order.
const ERROR_CLASSES: &[(&str, &str)] = &[
    ("timeout", "timeout_error"),
    ("connection", "connection_error"),
    ("permission", "permission_error"),
    ("not found", "not_found_error"),
];

const OTHER_ERROR_CLASS: &str = "other_error";

/// Counts ERROR entries by error class.
///
/// Parameters: `min_count` (classes seen fewer times are omitted).
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAggregator;

impl ErrorAggregator {
    fn classify(message: &str) -> &'static str {
        let lower = message.to_lowercase();
        ERROR_CLASSES
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map_or(OTHER_ERROR_CLASS, |(_, class)| class)
    }

    fn min_count(parameters: &HashMap<String, String>) -> Result<usize, PluginError> {
        let Some(raw) = parameters.get("min_count") else {
            return Ok(constants::DEFAULT_ERROR_AGGREGATOR_MIN_COUNT);
        };
        raw.trim()
            .parse::<usize>()
            .map_err(|e| PluginError::InvalidParameter {
                name: "min_count".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
    }
}

impl LogAnalyzer for ErrorAggregator {
    fn describe(&self) -> PluginInfo {
        PluginInfo {
            name: ERROR_AGGREGATOR_NAME.to_string(),
            version: "1.0".to_string(),
            description: "Counts ERROR entries by error class".to_string(),
            supported_parameters: vec!["min_count".to_string()],
        }
    }

    fn execute(
        &self,
        input: &AnalysisInput<'_>,
        parameters: &HashMap<String, String>,
    ) -> Result<Value, PluginError> {
        let min_count = Self::min_count(parameters)?;

        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut total_errors = 0;
        for entry in input
            .entries
            .iter()
            .filter(|e| e.level == Some(Level::Error))
        {
            total_errors += 1;
            *counts.entry(Self::classify(&entry.message)).or_insert(0) += 1;
        }
        counts.retain(|_, count| *count >= min_count);

        Ok(json!({
            "log_file_id": input.log_file_id,
            "total_errors": total_errors,
            "error_chains": input
                .chains
                .iter()
                .filter(|c| c.status == crate::core::correlate::ChainStatus::Error)
                .count(),
            "errors_by_class": counts,
        }))
    }
}
