use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

/// A single event as returned by the event source.
///
/// The record is an opaque bag of fields. Only the timestamp, type and
/// description are interpreted by name; everything else is carried verbatim
/// into the `details` column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord {
    fields: Map<String, Value>,
}

impl EventRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value; non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn timestamp(&self) -> Option<&Value> {
        self.fields.get("event_timestamp")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.fields.get("event_type").and_then(Value::as_str)
    }

    /// The event description, empty when absent or null.
    pub fn description(&self) -> String {
        self.fields
            .get("event_description")
            .map(cell_value)
            .unwrap_or_default()
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Full original payload as one line of JSON.
    pub fn to_details(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

/// An immediate child process as reported by a child-process event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildProcess {
    pub parent_guid: String,
    pub guid: String,
    pub pid: Option<i64>,
    pub name: String,
}

impl ChildProcess {
    pub fn new(parent_guid: &str, guid: &str, pid: Option<i64>, name: &str) -> Self {
        Self {
            parent_guid: parent_guid.to_string(),
            guid: guid.to_string(),
            pid,
            name: name.to_string(),
        }
    }

    /// Extract the child descriptor from a `childproc` event.
    pub fn from_event(event: &EventRecord) -> Option<Self> {
        let guid = match event.get("childproc_process_guid").and_then(Value::as_str) {
            Some(guid) if !guid.is_empty() => guid.to_string(),
            _ => {
                debug!("Skipping childproc event without a child process guid");
                return None;
            }
        };

        let pid = event.get("childproc_pid").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        Some(Self {
            parent_guid: event
                .get("process_guid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            guid,
            pid,
            name: event
                .get("childproc_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Time range used for every query of one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeRange {
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Relative window ending now, e.g. `-2w`.
    Window(String),
}

const WINDOW_UNITS: &[char] = &['y', 'w', 'd', 'h', 'm', 's'];

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(anyhow::anyhow!(
                "Start timestamp {} is after end timestamp {}",
                format_timestamp(&start),
                format_timestamp(&end)
            ));
        }
        Ok(TimeRange::Between { start, end })
    }

    /// Parse a relative window such as `-2w` or `-36h`.
    pub fn window(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let body = expr.strip_prefix('-').unwrap_or(expr);
        let mut chars = body.chars();
        let unit = chars.next_back();
        let amount = chars.as_str();

        match unit {
            Some(u) if WINDOW_UNITS.contains(&u)
                && !amount.is_empty()
                && amount.chars().all(|c| c.is_ascii_digit()) =>
            {
                Ok(TimeRange::Window(format!("-{}{}", amount, u)))
            }
            _ => Err(anyhow::anyhow!(
                "Invalid time window '{}', expected e.g. -2w (units: y, w, d, h, m, s)",
                expr
            )),
        }
    }

    /// The `time_range` object of a search request.
    pub fn to_request_json(&self) -> Value {
        match self {
            TimeRange::Between { start, end } => json!({
                "start": format_timestamp(start),
                "end": format_timestamp(end),
            }),
            TimeRange::Window(window) => json!({ "window": window }),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeRange::Between { start, end } => {
                write!(f, "{} to {}", format_timestamp(start), format_timestamp(end))
            }
            TimeRange::Window(window) => write!(f, "window {}", window),
        }
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a field value for humans: strings raw, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Like [`display_value`], but a JSON null renders as an empty string.
pub fn cell_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => display_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(value: Value) -> EventRecord {
        EventRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_event_accessors() {
        let event = record(json!({
            "event_timestamp": "2022-03-01T10:00:00.000Z",
            "event_type": "modload",
            "modload_name": "kernel32.dll",
        }));

        assert_eq!(event.event_type(), Some("modload"));
        assert_eq!(event.timestamp(), Some(&json!("2022-03-01T10:00:00.000Z")));
        assert_eq!(event.description(), "");
        assert_eq!(event.get("modload_name"), Some(&json!("kernel32.dll")));
    }

    #[test]
    fn test_details_is_single_line() {
        let event = record(json!({
            "event_type": "netconn",
            "event_description": "multi\nline",
            "nested": {"a": [1, 2]},
        }));

        let details = event.to_details();
        assert!(!details.contains('\n'));
        let parsed: Value = serde_json::from_str(&details).unwrap();
        assert_eq!(parsed["nested"]["a"][1], 2);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(EventRecord::from_value(json!([1, 2])).is_none());
        assert!(EventRecord::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_child_from_event() {
        let event = record(json!({
            "process_guid": "ORG-0001-parent",
            "childproc_process_guid": "ORG-0002-child",
            "childproc_pid": 4242,
            "childproc_name": "c:\\windows\\system32\\cmd.exe",
        }));

        let child = ChildProcess::from_event(&event).unwrap();
        assert_eq!(child.parent_guid, "ORG-0001-parent");
        assert_eq!(child.guid, "ORG-0002-child");
        assert_eq!(child.pid, Some(4242));
        assert_eq!(child.name, "c:\\windows\\system32\\cmd.exe");
    }

    #[test]
    fn test_child_from_event_without_guid() {
        let event = record(json!({"process_guid": "p", "childproc_pid": 1}));
        assert!(ChildProcess::from_event(&event).is_none());
    }

    #[test]
    fn test_time_range_between() {
        let start = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 3, 2, 12, 30, 0).unwrap();

        let range = TimeRange::between(start, end).unwrap();
        assert_eq!(
            range.to_request_json(),
            json!({"start": "2022-03-01T00:00:00Z", "end": "2022-03-02T12:30:00Z"})
        );
        assert!(TimeRange::between(end, start).is_err());
    }

    #[test]
    fn test_time_range_window() {
        assert_eq!(TimeRange::window("-2w").unwrap(), TimeRange::Window("-2w".into()));
        assert_eq!(TimeRange::window("36h").unwrap(), TimeRange::Window("-36h".into()));
        assert!(TimeRange::window("-2x").is_err());
        assert!(TimeRange::window("-w").is_err());
        assert!(TimeRange::window("").is_err());
        assert_eq!(
            TimeRange::window("-1d").unwrap().to_request_json(),
            json!({"window": "-1d"})
        );
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("abc")), "abc");
        assert_eq!(display_value(&json!(12)), "12");
        assert_eq!(display_value(&json!(null)), "null");
        assert_eq!(display_value(&json!(["a", "b"])), "[\"a\",\"b\"]");
    }

    #[test]
    fn test_null_description_is_empty() {
        let event = record(json!({"event_type": "netconn", "event_description": null}));
        assert_eq!(event.description(), "");
        assert_eq!(cell_value(&json!(null)), "");
        assert_eq!(cell_value(&json!(7)), "7");
    }
}
