// Traversal orchestration: per-process event export and bounded process tree export

use crate::csv_export::export_events;
use crate::model::TimeRange;
use crate::source::EventSource;
use crate::summary::Summarizer;
use crate::tree::{export_tree, NodeId, ProcessTree};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How `max_depth` bounds the expansion loop of a tree export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthMode {
    /// Expand a node only while its level is below `max_depth`, so exactly
    /// `max_depth` levels have their children fetched.
    #[default]
    PerLevel,
    /// Legacy counting: one shared counter incremented per dequeued node.
    /// With more than one node per level fewer levels get expanded.
    PerNode,
}

/// What a tree export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeExport {
    pub tree_file: PathBuf,
    /// Event files actually written, in export order.
    pub event_files: Vec<PathBuf>,
    pub nodes: usize,
}

pub struct Exporter<S: EventSource> {
    source: S,
    summarizer: Summarizer,
}

impl<S: EventSource> Exporter<S> {
    pub fn new(source: S, summarizer: Summarizer) -> Self {
        Self { source, summarizer }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Export one process's events to `outfile`.
    ///
    /// Returns `None` without creating a file when the process has no events
    /// in range. Source failures propagate.
    pub fn export_process_events(&self, process_guid: &str, range: &TimeRange, outfile: &Path) -> Result<Option<usize>> {
        let events = self
            .source
            .fetch_events(process_guid, range)
            .with_context(|| format!("Failed to fetch events for process {}", process_guid))?;

        if events.is_empty() {
            info!("No events to export from process {} ({})", process_guid, range);
            return Ok(None);
        }

        let rows = export_events(process_guid, &events, outfile, &self.summarizer)?;
        Ok(Some(rows))
    }

    /// Breadth-first export of `root_guid` and its descendants.
    ///
    /// Every node taken off the queue gets an event file named
    /// `{level}_{guid}.csv` under `output_dir`; nodes left queued when the
    /// depth bound is reached are exported without being expanded. The tree
    /// itself goes to `{level}_{guid}-process_tree.json`.
    pub fn export_process_tree_events(
        &self,
        root_guid: &str,
        range: &TimeRange,
        output_dir: &Path,
        max_depth: u32,
        mode: DepthMode,
    ) -> Result<TreeExport> {
        info!(
            "Exporting process tree of {} ({}), max depth {}, {:?}",
            root_guid, range, max_depth, mode
        );

        let mut tree = ProcessTree::new(root_guid);
        let mut queue: VecDeque<NodeId> = VecDeque::from([tree.root()]);
        let mut event_files = Vec::new();
        let mut dequeued: u32 = 0;

        while let Some(&next) = queue.front() {
            let within_bound = match mode {
                DepthMode::PerLevel => tree.node(next).level < max_depth,
                DepthMode::PerNode => dequeued < max_depth,
            };
            if !within_bound {
                break;
            }
            queue.pop_front();

            self.export_node(&tree, next, range, output_dir, &mut event_files)?;
            dequeued += 1;

            let parent_guid = tree.node(next).identifier.clone();
            let children = self
                .source
                .fetch_children(&parent_guid, range)
                .with_context(|| format!("Failed to fetch child processes of {}", parent_guid))?;
            info!(
                "(Depth: {}) Found {} child processes of {}",
                tree.node(next).level + 1,
                children.len(),
                parent_guid
            );

            for child in children {
                let id = tree.add_child(next, &child.guid, &child.name, child.pid);
                debug!("Queued {} ({}) at level {}", child.guid, child.name, tree.node(id).level);
                queue.push_back(id);
            }
        }

        debug!("Draining {} remaining queued processes", queue.len());
        while let Some(node) = queue.pop_front() {
            self.export_node(&tree, node, range, output_dir, &mut event_files)?;
        }

        let root = tree.node(tree.root());
        let tree_file = output_dir.join(format!("{}_{}-process_tree.json", root.level, root.identifier));
        export_tree(&tree, &tree_file)?;
        info!("Process tree exported to {}", tree_file.display());

        Ok(TreeExport {
            tree_file,
            event_files,
            nodes: tree.len(),
        })
    }

    fn export_node(
        &self,
        tree: &ProcessTree,
        id: NodeId,
        range: &TimeRange,
        output_dir: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let node = tree.node(id);
        let outfile = output_dir.join(event_file_name(node.level, &node.identifier));
        if self.export_process_events(&node.identifier, range, &outfile)?.is_some() {
            written.push(outfile);
        }
        Ok(())
    }
}

pub fn event_file_name(level: u32, identifier: &str) -> String {
    format!("{}_{}.csv", level, identifier)
}
