// Deterministic in-memory event source for tests and offline runs

use super::{EventSource, SourceError};
use crate::model::{ChildProcess, EventRecord, TimeRange};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Serves literal event and child lists keyed by process guid, and records
/// every call it receives.
#[derive(Debug, Default)]
pub struct InMemorySource {
    events: HashMap<String, Vec<EventRecord>>,
    children: HashMap<String, Vec<ChildProcess>>,
    failing: HashSet<String>,
    event_calls: RefCell<Vec<String>>,
    child_calls: RefCell<Vec<String>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, guid: &str, events: Vec<EventRecord>) -> Self {
        self.events.insert(guid.to_string(), events);
        self
    }

    /// Register `(guid, name, pid)` children for `parent`.
    pub fn with_children(mut self, parent: &str, children: &[(&str, &str, i64)]) -> Self {
        let children = children
            .iter()
            .map(|(guid, name, pid)| ChildProcess::new(parent, guid, Some(*pid), name))
            .collect();
        self.children.insert(parent.to_string(), children);
        self
    }

    /// Every query touching `guid` fails.
    pub fn failing_for(mut self, guid: &str) -> Self {
        self.failing.insert(guid.to_string());
        self
    }

    /// Guids whose events were fetched, in call order.
    pub fn event_calls(&self) -> Vec<String> {
        self.event_calls.borrow().clone()
    }

    /// Guids whose children were fetched, in call order.
    pub fn child_calls(&self) -> Vec<String> {
        self.child_calls.borrow().clone()
    }

    fn check(&self, guid: &str) -> Result<(), SourceError> {
        if self.failing.contains(guid) {
            return Err(SourceError::QueryFailed(guid.to_string(), "simulated failure".to_string()));
        }
        Ok(())
    }
}

impl EventSource for InMemorySource {
    fn fetch_events(&self, process_guid: &str, _range: &TimeRange) -> Result<Vec<EventRecord>, SourceError> {
        self.event_calls.borrow_mut().push(process_guid.to_string());
        self.check(process_guid)?;
        Ok(self.events.get(process_guid).cloned().unwrap_or_default())
    }

    fn fetch_children(&self, process_guid: &str, _range: &TimeRange) -> Result<Vec<ChildProcess>, SourceError> {
        self.child_calls.borrow_mut().push(process_guid.to_string());
        self.check(process_guid)?;
        Ok(self.children.get(process_guid).cloned().unwrap_or_default())
    }
}
