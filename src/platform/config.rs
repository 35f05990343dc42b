// TfScope - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::correlate::ChainKey;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for TfScope configuration and data.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/tfscope/ or %APPDATA%\TfScope\config\)
    pub config_dir: PathBuf,

    /// Data directory for exports and caches.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Full path of `config.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so a newer config file still loads in
/// an older binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub parsing: ParsingSection,
    pub search: SearchSection,
    pub correlation: CorrelationSection,
    pub logging: LoggingSection,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Lines a JSON block may stay open before it is force-closed.
    pub max_json_block_lines: Option<usize>,
    /// Files above this size in bytes are memory-mapped.
    pub large_file_threshold_bytes: Option<u64>,
}

/// `[search]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub default_page_size: Option<usize>,
    pub max_page_size: Option<usize>,
}

/// `[correlation]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CorrelationSection {
    /// "request" or "resource".
    pub default_mode: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub max_json_block_lines: usize,
    pub large_file_threshold: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub default_chain_mode: ChainKey,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_json_block_lines: constants::DEFAULT_MAX_JSON_BLOCK_LINES,
            large_file_threshold: constants::DEFAULT_LARGE_FILE_THRESHOLD,
            default_page_size: constants::DEFAULT_PAGE_SIZE,
            max_page_size: constants::MAX_PAGE_SIZE,
            default_chain_mode: ChainKey::default(),
            log_level: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    load_config_file(&config_dir.join(constants::CONFIG_FILE_NAME))
}

/// Load and validate a specific config file.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings (first run). An unreadable
/// or unparseable file yields defaults plus a warning; the tool still runs.
pub fn load_config_file(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source,
            };
            warnings.push(format!("{err}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    tracing::debug!(path = %config_path.display(), "Loaded config.toml");
    let config = validate(raw, &mut warnings);
    (config, warnings)
}

fn out_of_range(
    field: &str,
    value: impl ToString,
    expected: String,
    default: impl std::fmt::Display,
) -> String {
    let err = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    };
    format!("{err}. Using default ({default}).")
}

/// Check each field against named constants, accumulating all problems.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Parsing: max_json_block_lines --
    if let Some(lines) = raw.parsing.max_json_block_lines {
        if (1..=constants::ABSOLUTE_MAX_JSON_BLOCK_LINES).contains(&lines) {
            config.max_json_block_lines = lines;
        } else {
            warnings.push(out_of_range(
                "[parsing] max_json_block_lines",
                lines,
                format!("1-{}", constants::ABSOLUTE_MAX_JSON_BLOCK_LINES),
                constants::DEFAULT_MAX_JSON_BLOCK_LINES,
            ));
        }
    }

    // -- Parsing: large_file_threshold_bytes --
    if let Some(bytes) = raw.parsing.large_file_threshold_bytes {
        if bytes > 0 {
            config.large_file_threshold = bytes;
        } else {
            warnings.push(out_of_range(
                "[parsing] large_file_threshold_bytes",
                bytes,
                "greater than 0".to_string(),
                constants::DEFAULT_LARGE_FILE_THRESHOLD,
            ));
        }
    }

    // -- Search: max_page_size first, default_page_size is bounded by it --
    if let Some(max) = raw.search.max_page_size {
        if (1..=constants::ABSOLUTE_MAX_PAGE_SIZE).contains(&max) {
            config.max_page_size = max;
        } else {
            warnings.push(out_of_range(
                "[search] max_page_size",
                max,
                format!("1-{}", constants::ABSOLUTE_MAX_PAGE_SIZE),
                constants::MAX_PAGE_SIZE,
            ));
        }
    }
    config.default_page_size = config.default_page_size.min(config.max_page_size);
    if let Some(size) = raw.search.default_page_size {
        if (1..=config.max_page_size).contains(&size) {
            config.default_page_size = size;
        } else {
            warnings.push(out_of_range(
                "[search] default_page_size",
                size,
                format!("1-{}", config.max_page_size),
                config.default_page_size,
            ));
        }
    }

    // -- Correlation: default_mode --
    if let Some(ref mode) = raw.correlation.default_mode {
        match ChainKey::from_label(mode) {
            Some(key) => config.default_chain_mode = key,
            None => warnings.push(format!(
                "[correlation] default_mode = \"{mode}\" is not recognised. \
                 Expected \"request\" or \"resource\". Using default (request).",
            )),
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(content: &str) -> (AppConfig, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(constants::CONFIG_FILE_NAME), content).unwrap();
        load_config(dir.path())
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_applied() {
        let (config, warnings) = load_str(
            r#"
            [parsing]
            max_json_block_lines = 500
            large_file_threshold_bytes = 1024

            [search]
            default_page_size = 20
            max_page_size = 200

            [correlation]
            default_mode = "resource"

            [logging]
            level = "DEBUG"

            [unknown]
            ignored = true
            "#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.max_json_block_lines, 500);
        assert_eq!(config.large_file_threshold, 1024);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 200);
        assert_eq!(config.default_chain_mode, ChainKey::Resource);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_values_fall_back_with_warnings() {
        let (config, warnings) = load_str(
            r#"
            [parsing]
            max_json_block_lines = 0

            [search]
            max_page_size = 10
            default_page_size = 11

            [correlation]
            default_mode = "sideways"

            [logging]
            level = "loud"
            "#,
        );
        assert_eq!(warnings.len(), 4, "{warnings:?}");
        assert_eq!(config.max_json_block_lines, constants::DEFAULT_MAX_JSON_BLOCK_LINES);
        assert_eq!(config.max_page_size, 10);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.default_chain_mode, ChainKey::Request);
        assert!(config.log_level.is_none());
        assert!(warnings[0].contains("max_json_block_lines"));
    }

    #[test]
    fn test_unparseable_file_warns() {
        let (config, warnings) = load_str("[parsing\nmax = ");
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Config parse error"));
    }
}
