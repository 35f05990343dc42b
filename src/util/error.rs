// TfScope - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation between layers.
// All errors preserve the causal chain for diagnostic logging.
//
// Note what is NOT here: a line that cannot be interpreted is never an
// error value. The parser turns it into an entry flagged with
// `parsing_error`; only whole-input failures surface as `ParseError`.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all TfScope operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum TfScopeError {
    /// Log input could not be turned into entries at all.
    Parse(ParseError),

    /// Filter construction failed.
    Filter(FilterError),

    /// Export operation failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Plugin registration or execution failed.
    Plugin(PluginError),

    /// Entry store lookup failed.
    Store(StoreError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for TfScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Filter(e) => write!(f, "Filter error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Plugin(e) => write!(f, "Plugin error: {e}"),
            Self::Store(e) => write!(f, "Store error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for TfScopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Filter(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Plugin(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Whole-input parse failures. There is nothing to recover into entries.
#[derive(Debug)]
pub enum ParseError {
    /// The input was empty or contained only whitespace.
    EmptyInput,

    /// The input contains NUL bytes and is treated as binary.
    NotText { offset: usize },

    /// The input is not valid UTF-8.
    InvalidEncoding { source: std::str::Utf8Error },

    /// I/O error while reading a log file.
    Io { file: PathBuf, source: io::Error },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "input is empty, nothing to parse"),
            Self::NotText { offset } => {
                write!(f, "input is not text (NUL byte at offset {offset})")
            }
            Self::InvalidEncoding { source } => {
                write!(f, "invalid UTF-8 encoding: {source}")
            }
            Self::Io { file, source } => {
                write!(f, "'{}': I/O error: {source}", file.display())
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidEncoding { source } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ParseError> for TfScopeError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Filter errors
// ---------------------------------------------------------------------------

/// Errors related to filter construction.
#[derive(Debug)]
pub enum FilterError {
    /// User-provided regex is invalid.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// Regex pattern exceeds the maximum allowed length.
    RegexTooLong { length: usize, max_length: usize },

    /// A timestamp bound could not be parsed.
    InvalidTimestamp { raw: String },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid filter regex '{pattern}': {source}")
            }
            Self::RegexTooLong { length, max_length } => write!(
                f,
                "Filter regex is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::InvalidTimestamp { raw } => {
                write!(f, "Cannot parse timestamp bound '{raw}' (expected RFC 3339)")
            }
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FilterError> for TfScopeError {
    fn from(e: FilterError) -> Self {
        Self::Filter(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for TfScopeError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for TfScopeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Plugin errors
// ---------------------------------------------------------------------------

/// Errors related to analyzer plugins.
#[derive(Debug)]
pub enum PluginError {
    /// No plugin is registered under this name.
    NotFound { name: String },

    /// A plugin with this name is already registered.
    AlreadyRegistered { name: String },

    /// A parameter passed to the plugin has an unusable value.
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    /// The plugin ran but reported a failure.
    Execution { plugin: String, reason: String },
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "Plugin not found: '{name}'"),
            Self::AlreadyRegistered { name } => {
                write!(f, "Plugin '{name}' is already registered")
            }
            Self::InvalidParameter {
                name,
                value,
                reason,
            } => write!(f, "Invalid plugin parameter {name}='{value}': {reason}"),
            Self::Execution { plugin, reason } => {
                write!(f, "Plugin '{plugin}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for PluginError {}

impl From<PluginError> for TfScopeError {
    fn from(e: PluginError) -> Self {
        Self::Plugin(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors related to the in-memory entry store.
#[derive(Debug)]
pub enum StoreError {
    /// No parsed log is held under this id.
    UnknownLogFile { id: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLogFile { id } => write!(f, "No parsed log with id '{id}'"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for TfScopeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Convenience type alias for TfScope results.
pub type Result<T> = std::result::Result<T, TfScopeError>;
