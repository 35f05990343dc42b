// TfScope - app/ingest.rs
//
// Reading Terraform log files from disk and parsing them.
//
// Each file gets its own parser invocation with no shared state, so a batch
// of files is parsed in parallel on the rayon pool. Results come back in the
// order the paths were given.

use crate::core::parser::{self, ParseConfig, ParseResult};
use crate::util::constants::{MAX_READ_RETRIES, READ_RETRY_DELAYS_MS};
use crate::util::error::ParseError;
use rayon::prelude::*;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for reading and parsing files.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub parse: ParseConfig,
    /// Files larger than this are memory-mapped.
    pub large_file_threshold: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            parse: ParseConfig::default(),
            large_file_threshold: crate::util::constants::DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

/// Raw file content, either mapped or read into memory.
pub enum LogBytes {
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl Deref for LogBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            LogBytes::Mapped(map) => map,
            LogBytes::Owned(buf) => buf,
        }
    }
}

/// Read a log file's bytes.
///
/// Files above `large_file_threshold` are memory-mapped; smaller ones are
/// read with retries on transient I/O errors. Permanent errors are returned
/// immediately.
pub fn read_log_file(path: &Path, large_file_threshold: u64) -> Result<LogBytes, ParseError> {
    let io_error = |source| ParseError::Io {
        file: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(io_error)?.len();

    if size > large_file_threshold {
        tracing::debug!(file = %path.display(), size, "Memory-mapping large log file");
        read_large_file(path).map_err(io_error)
    } else {
        read_small_file_with_retry(path)
            .map(LogBytes::Owned)
            .map_err(io_error)
    }
}

fn read_large_file(path: &Path) -> io::Result<LogBytes> {
    let file = std::fs::File::open(path)?;
    // SAFETY: the map is read-only and dropped before the parse result is
    // returned. A log rewritten underneath us while mapped is accepted risk
    // for files that are already written.
    let map = unsafe { memmap2::Mmap::map(&file)? };
    Ok(LogBytes::Mapped(map))
}

fn read_small_file_with_retry(path: &Path) -> io::Result<Vec<u8>> {
    let mut last_err: Option<io::Error> = None;

    for attempt in 0..MAX_READ_RETRIES {
        match std::fs::read(path) {
            Ok(content) => return Ok(content),
            Err(e) if is_transient_error(&e) => {
                tracing::debug!(
                    file = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "Transient I/O error, retrying"
                );
                std::thread::sleep(Duration::from_millis(READ_RETRY_DELAYS_MS[attempt as usize]));
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("Unknown read error")))
}

/// Returns true for transient I/O errors that are worth retrying.
fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

/// Read and parse one file.
pub fn parse_file(path: &Path, config: &IngestConfig) -> Result<ParseResult, ParseError> {
    let bytes = read_log_file(path, config.large_file_threshold)?;
    let result = parser::parse_bytes(&bytes, &config.parse)?;
    tracing::info!(
        file = %path.display(),
        entries = result.entries.len(),
        lines = result.lines_processed,
        parse_errors = result.stats.parse_error_count,
        "Parsed log file"
    );
    Ok(result)
}

/// Parse several files concurrently. One failed file never affects the
/// others; each result is paired with its path, in input order.
pub fn parse_files(
    paths: &[PathBuf],
    config: &IngestConfig,
) -> Vec<(PathBuf, Result<ParseResult, ParseError>)> {
    paths
        .par_iter()
        .map(|path| {
            let result = parse_file(path, config);
            if let Err(ref e) = result {
                tracing::warn!(file = %path.display(), error = %e, "Failed to parse log file");
            }
            (path.clone(), result)
        })
        .collect()
}
