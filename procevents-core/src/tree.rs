//! Process tree built during traversal and its JSON export.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], so the
//! parent/child links never form ownership cycles.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNode {
    pub identifier: String,
    pub display_name: String,
    pub pid: Option<i64>,
    /// Distance from the root; the root is level 0.
    pub level: u32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTree {
    nodes: Vec<ProcessNode>,
}

impl ProcessTree {
    /// A tree holding only the root process, with no name or pid yet.
    pub fn new(root_identifier: &str) -> Self {
        Self {
            nodes: vec![ProcessNode {
                identifier: root_identifier.to_string(),
                display_name: String::new(),
                pid: None,
                level: 0,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ProcessNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ProcessNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Append a child under `parent`, one level deeper.
    pub fn add_child(&mut self, parent: NodeId, identifier: &str, display_name: &str, pid: Option<i64>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let level = self.nodes[parent.0].level + 1;
        self.nodes.push(ProcessNode {
            identifier: identifier.to_string(),
            display_name: display_name.to_string(),
            pid,
            level,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn to_document(&self) -> TreeDocument {
        self.document_for(self.root())
    }

    fn document_for(&self, id: NodeId) -> TreeDocument {
        let node = self.node(id);
        TreeDocument {
            identifier: node.identifier.clone(),
            display_name: node.display_name.clone(),
            id: node.pid,
            level: node.level,
            children: node.children.iter().map(|child| self.document_for(*child)).collect(),
        }
    }

    /// Rebuild the arena from a document.
    ///
    /// Nodes are created breadth-first, the same order the traversal creates
    /// them, and levels are recomputed from the nesting.
    pub fn from_document(document: &TreeDocument) -> Self {
        let mut tree = ProcessTree::new(&document.identifier);
        tree.nodes[0].display_name = document.display_name.clone();
        tree.nodes[0].pid = document.id;

        let mut pending: VecDeque<(NodeId, &TreeDocument)> = VecDeque::from([(tree.root(), document)]);
        while let Some((parent, doc)) = pending.pop_front() {
            for child in &doc.children {
                let id = tree.add_child(parent, &child.identifier, &child.display_name, child.id);
                pending.push_back((id, child));
            }
        }
        tree
    }
}

/// Serialized view of one tree node and, recursively, its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub identifier: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub id: Option<i64>,
    pub level: u32,
    #[serde(default)]
    pub children: Vec<TreeDocument>,
}

impl TreeDocument {
    /// Number of node objects in this document, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeDocument::node_count).sum::<usize>()
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        Ok(String::from_utf8(buf)?)
    }
}

/// Write the whole tree as indented JSON, replacing any existing file.
pub fn export_tree(tree: &ProcessTree, output_path: &Path) -> Result<()> {
    let json = tree.to_document().to_pretty_json()?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }
    }
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write process tree {}", output_path.display()))?;

    debug!("Wrote process tree with {} nodes to {}", tree.len(), output_path.display());
    Ok(())
}
