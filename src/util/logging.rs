// TfScope - util/logging.rs
//
// Diagnostics for the CLI and library callers.
//
// Level selection, first match wins:
//   - RUST_LOG (full EnvFilter directives)
//   - --debug
//   - [logging] level in config.toml
//   - "info"
//
// Everything goes to stderr; stdout is reserved for command output (tables,
// JSON) so it can be piped. There is no log file. Terraform log lines can be
// huge JSON bodies, so diagnostics carry at most a `preview` of them.

use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
pub fn init(debug_flag: bool, config_level: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .init();

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        "Logging initialised"
    );
}

/// Shorten a raw log line for inclusion in diagnostic output.
pub fn preview(line: &str) -> &str {
    let max = super::constants::DEBUG_MAX_LINE_PREVIEW;
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        let long = "é".repeat(300);
        let cut = preview(&long);
        assert!(cut.len() <= crate::util::constants::DEBUG_MAX_LINE_PREVIEW);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_preview_short_line_unchanged() {
        assert_eq!(preview("short"), "short");
    }
}
