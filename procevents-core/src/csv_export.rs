use crate::model::{cell_value, EventRecord};
use crate::summary::Summarizer;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const CSV_HEADER: [&str; 5] = ["timestamp", "type", "description", "summary", "details"];

/// Write the events of one process to `output_path`, one row per event.
///
/// Events are written in the order given; the source already sorts them
/// newest first. Returns the number of data rows written.
pub fn export_events(
    process_id: &str,
    events: &[EventRecord],
    output_path: &Path,
    summarizer: &Summarizer,
) -> Result<usize> {
    info!("Exporting {} events from process {} to {}", events.len(), process_id, output_path.display());

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create events file {}", output_path.display()))?;

    writer.write_record(CSV_HEADER)?;

    for event in events {
        let timestamp = event.timestamp().map(cell_value).unwrap_or_default();
        let event_type = event.get("event_type").map(cell_value).unwrap_or_default();
        let summary = summarizer.summarize(event);

        writer.write_record([
            timestamp.as_str(),
            event_type.as_str(),
            event.description().as_str(),
            summary.as_str(),
            event.to_details().as_str(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write events file {}", output_path.display()))?;
    debug!("Finished writing {}", output_path.display());

    Ok(events.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryConfig;
    use crate::transforms::TransformRegistry;
    use serde_json::json;
    use tempfile::tempdir;

    fn summarizer() -> Summarizer {
        let config: SummaryConfig = serde_json::from_value(json!({
            "types": {
                "netconn": ["netconn_remote_ipv4", "netconn_remote_port"],
                "modload": ["modload_name"]
            },
            "transforms": {"netconn_remote_ipv4": "int2ip"}
        }))
        .unwrap();
        Summarizer::new(config, TransformRegistry::builtin(), "test")
    }

    fn events() -> Vec<EventRecord> {
        vec![
            EventRecord::from_value(json!({
                "event_timestamp": "2022-03-01T10:00:02.000Z",
                "event_type": "netconn",
                "event_description": "Connected to 192.168.0.1:443",
                "netconn_remote_ipv4": 3232235521u64,
                "netconn_remote_port": 443,
            }))
            .unwrap(),
            EventRecord::from_value(json!({
                "event_timestamp": "2022-03-01T10:00:01.000Z",
                "event_type": "crossproc",
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0_guid.csv");

        let rows = export_events("guid", &events(), &path, &summarizer()).unwrap();
        assert_eq!(rows, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);

        assert_eq!(&records[0][0], "2022-03-01T10:00:02.000Z");
        assert_eq!(&records[0][1], "netconn");
        assert_eq!(&records[0][2], "Connected to 192.168.0.1:443");
        assert_eq!(&records[0][3], " netconn_remote_ipv4: 192.168.0.1 netconn_remote_port: 443");
        let details: serde_json::Value = serde_json::from_str(&records[0][4]).unwrap();
        assert_eq!(details["netconn_remote_port"], 443);

        // Unknown type keeps its row with an empty summary
        assert_eq!(&records[1][1], "crossproc");
        assert_eq!(&records[1][2], "");
        assert_eq!(&records[1][3], "");
    }

    #[test]
    fn test_null_fields_write_empty_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0_guid.csv");
        let event = EventRecord::from_value(json!({
            "event_timestamp": null,
            "event_type": null,
            "event_description": null,
        }))
        .unwrap();

        export_events("guid", &[event], &path, &summarizer()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "");
        assert_eq!(&record[1], "");
        assert_eq!(&record[2], "");
        assert_eq!(&record[3], "");
        assert!(record[4].contains("\"event_description\":null"));
    }

    #[test]
    fn test_export_overwrites_with_identical_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("0_guid.csv");

        export_events("guid", &events(), &path, &summarizer()).unwrap();
        let first = std::fs::read(&path).unwrap();
        export_events("guid", &events(), &path, &summarizer()).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }
}
