// TfScope - core/export.rs
//
// CSV and JSON export of entries and chain summaries.
// Core layer: writes to any Write trait object; the path is only used
// to give errors context.

use crate::core::correlate::ChainSummary;
use crate::core::model::LogEntry;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

const CSV_HEADER: [&str; 10] = [
    "id",
    "line",
    "timestamp",
    "level",
    "section",
    "tf_req_id",
    "tf_resource_type",
    "operation",
    "severity_score",
    "message",
];

/// Export entries to CSV, one row per entry, including the derived
/// operation kind and severity score.
pub fn export_csv<'a, W: Write>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_error = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER).map_err(csv_error)?;

    let mut count = 0;
    for entry in entries {
        let id = entry.id.to_string();
        let line = entry.line_number.to_string();
        let ts = entry
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let score = entry.severity_score().to_string();

        csv_writer
            .write_record([
                id.as_str(),
                line.as_str(),
                ts.as_str(),
                entry.level.map_or("", |l| l.label()),
                entry.section.label(),
                entry.tf_req_id.as_deref().unwrap_or(""),
                entry.tf_resource_type.as_deref().unwrap_or(""),
                entry.operation_kind().label(),
                score.as_str(),
                entry.message.as_str(),
            ])
            .map_err(csv_error)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    tracing::debug!(path = %export_path.display(), rows = count, "CSV export written");
    Ok(count)
}

/// Export entries to JSON format (array of objects).
pub fn export_json<W: Write>(
    entries: &[&LogEntry],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, entries).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(entries.len())
}

/// Export chain summaries to JSON format (array of objects).
pub fn export_chains_json<W: Write>(
    chains: &[ChainSummary],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, chains).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(chains.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correlate::{correlate, ChainKey};
    use crate::core::model::Level;
    use chrono::{TimeZone, Utc};

    fn make_entry(id: u64, message: &str) -> LogEntry {
        let mut entry = LogEntry::unparsed(id, id, message.to_string(), 1);
        entry.level = Some(Level::Error);
        entry.message = message.to_string();
        entry.timestamp = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap());
        entry
    }

    #[test]
    fn test_csv_export() {
        let mut create = make_entry(1, "Creating instance failed");
        create.tf_resource_type = Some("google_compute_instance".to_string());
        let entries = vec![create, make_entry(2, "Error two, with comma")];
        let mut buf = Vec::new();
        let count = export_csv(&entries, &mut buf, Path::new("out.csv")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("id,line,timestamp,level,section,tf_req_id,tf_resource_type,operation,severity_score,message")
        );
        let first = lines.next().unwrap();
        assert!(first.contains(",create,15,"));
        assert!(output.contains("\"Error two, with comma\""));
    }

    #[test]
    fn test_json_export() {
        let entries = vec![make_entry(1, "Test message")];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let mut buf = Vec::new();
        let count = export_json(&refs, &mut buf, Path::new("out.json")).unwrap();
        assert_eq!(count, 1);

        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0]["message"], "Test message");
        assert_eq!(parsed[0]["level"], "ERROR");
    }

    #[test]
    fn test_chain_export() {
        let mut a = make_entry(1, "a");
        a.tf_req_id = Some("r1".to_string());
        let entries = vec![a];
        let summaries: Vec<ChainSummary> = correlate(&entries, ChainKey::Request)
            .iter()
            .map(|c| c.summary())
            .collect();
        let mut buf = Vec::new();
        export_chains_json(&summaries, &mut buf, Path::new("chains.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0]["key"], "r1");
        assert_eq!(parsed[0]["status"], "ERROR");
        assert_eq!(parsed[0]["entry_ids"][0], 1);
    }
}
