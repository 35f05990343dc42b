// TfScope - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "TfScope";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "TfScope";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Parsing limits
// =============================================================================

/// Maximum number of lines a JSON block may stay open before the classifier
/// force-closes it. Stops a single stray `{` from swallowing the rest of a
/// large log into one entry.
pub const DEFAULT_MAX_JSON_BLOCK_LINES: usize = 10_000;

/// Hard upper bound on the configurable JSON block line limit.
pub const ABSOLUTE_MAX_JSON_BLOCK_LINES: usize = 1_000_000;

/// File size threshold in bytes above which files are memory-mapped
/// instead of read into a heap buffer.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024; // 100 MB

/// First entry id assigned within a parsed file.
pub const FIRST_ENTRY_ID: u64 = 1;

/// Number of leading bytes inspected when deciding whether input is text.
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024; // 8 KB

// =============================================================================
// Search limits
// =============================================================================

/// Page size used when a search does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a single search call may return.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Hard upper bound on the configurable maximum page size.
pub const ABSOLUTE_MAX_PAGE_SIZE: usize = 100_000;

/// Maximum regex pattern length accepted by the search engine.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

// =============================================================================
// Ingestion retry policy
// =============================================================================

/// Retry limits for transient I/O errors while reading log files.
pub const MAX_READ_RETRIES: u32 = 3;

/// Backoff delays between read attempts (ms).
pub const READ_RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

// =============================================================================
// Plugins
// =============================================================================

/// Minimum count an error class needs before the built-in error aggregator
/// reports it, when the caller supplies no `min_count` parameter.
pub const DEFAULT_ERROR_AGGREGATOR_MIN_COUNT: usize = 1;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
