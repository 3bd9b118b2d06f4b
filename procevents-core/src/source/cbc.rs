use super::{EventSource, SourceError};
use crate::credentials::CbcCredentials;
use crate::model::{ChildProcess, EventRecord, TimeRange};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Hard cap on events returned for one process.
pub const MAX_EVENT_ROWS: usize = 10_000;
/// Hard cap on child-process events returned for one process.
pub const MAX_CHILD_ROWS: usize = 1_000;

const CHILD_FIELDS: [&str; 4] = ["process_guid", "childproc_process_guid", "childproc_pid", "childproc_name"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    num_available: Option<u64>,
}

/// Event source backed by the Carbon Black Cloud platform search API.
pub struct CbcEventSource {
    client: Client,
    credentials: CbcCredentials,
}

impl CbcEventSource {
    pub fn new(credentials: CbcCredentials) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .danger_accept_invalid_certs(!credentials.ssl_verify)
            .build()?;

        Ok(Self { client, credentials })
    }

    fn search_url(&self, process_guid: &str) -> String {
        format!(
            "{}/api/investigate/v2/orgs/{}/events/{}/_search",
            self.credentials.url, self.credentials.org_key, process_guid
        )
    }

    fn search(&self, process_guid: &str, body: Value, cap: usize) -> Result<Vec<EventRecord>, SourceError> {
        let url = self.search_url(process_guid);
        debug!("POST {} with {}", url, body);

        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", &self.credentials.token)
            .json(&body)
            .send()?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::AuthenticationError { status: status.as_u16() });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::StatusError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        if let Some(available) = parsed.num_available {
            if available as usize > cap {
                warn!(
                    "Process {} has {} matching rows; only the first {} are exported",
                    process_guid, available, cap
                );
            }
        }

        parsed
            .results
            .into_iter()
            .map(|value| {
                EventRecord::from_value(value)
                    .ok_or_else(|| SourceError::InvalidResponse("search result is not an object".to_string()))
            })
            .collect()
    }
}

/// Request body for one process's events.
pub fn events_request(range: &TimeRange) -> Value {
    json!({
        "query": "",
        "time_range": range.to_request_json(),
        "rows": MAX_EVENT_ROWS,
        "start": 0,
        "sort": [{"field": "event_timestamp", "order": "DESC"}],
    })
}

/// Request body for one process's child-process events.
pub fn children_request(range: &TimeRange) -> Value {
    json!({
        "query": "",
        "criteria": {"event_type": ["childproc"]},
        "time_range": range.to_request_json(),
        "rows": MAX_CHILD_ROWS,
        "start": 0,
        "fields": CHILD_FIELDS,
    })
}

impl EventSource for CbcEventSource {
    fn fetch_events(&self, process_guid: &str, range: &TimeRange) -> Result<Vec<EventRecord>, SourceError> {
        self.search(process_guid, events_request(range), MAX_EVENT_ROWS)
    }

    fn fetch_children(&self, process_guid: &str, range: &TimeRange) -> Result<Vec<ChildProcess>, SourceError> {
        let events = self.search(process_guid, children_request(range), MAX_CHILD_ROWS)?;
        Ok(events.iter().filter_map(ChildProcess::from_event).collect())
    }
}
