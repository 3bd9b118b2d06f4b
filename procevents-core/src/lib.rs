// Procevents Library - Core process event export functionality
//
// This library queries an event source for the events of a process, walks the
// process's descendant tree breadth-first up to a bounded depth, and exports
// each process's events to CSV plus the collected tree to JSON.

pub mod credentials;
pub mod csv_export;
pub mod model;
pub mod orchestrator;
pub mod source;
pub mod summary;
pub mod transforms;
pub mod tree;

pub use credentials::{CbcCredentials, CredentialsError};
pub use csv_export::{export_events, CSV_HEADER};
pub use model::{ChildProcess, EventRecord, TimeRange};
pub use orchestrator::{DepthMode, Exporter, TreeExport};
pub use source::cbc::CbcEventSource;
pub use source::{EventSource, InMemorySource, SourceError};
pub use summary::{ConfigError, Summarizer, Summary, SummaryConfig, SummaryIssue};
pub use transforms::{TransformError, TransformFn, TransformRegistry};
pub use tree::{export_tree, NodeId, ProcessNode, ProcessTree, TreeDocument};
