use crate::model::{ChildProcess, EventRecord, TimeRange};
use thiserror::Error;

pub mod cbc;
pub mod memory;

pub use memory::InMemorySource;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Authentication failed ({status})")]
    AuthenticationError { status: u16 },
    #[error("API returned status {status}: {body}")]
    StatusError { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Query for process {0} failed: {1}")]
    QueryFailed(String, String),
}

/// Where process events and child processes come from.
///
/// Calls block until the source answers. Results are bounded by the source's
/// own row caps and are never paginated or retried.
pub trait EventSource {
    /// Events of one process within `range`, newest first.
    fn fetch_events(&self, process_guid: &str, range: &TimeRange) -> Result<Vec<EventRecord>, SourceError>;

    /// Immediate children spawned by one process within `range`.
    fn fetch_children(&self, process_guid: &str, range: &TimeRange) -> Result<Vec<ChildProcess>, SourceError>;
}
