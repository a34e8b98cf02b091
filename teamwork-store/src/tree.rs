// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::DfsPostOrder;
use tracing::debug;

use crate::traits::{StoreError, WorkspaceTree};
use crate::types::{Node, NodeId};

#[derive(Debug)]
struct Entry {
    /// Insertion sequence, used to keep sibling order stable.
    seq: u64,
    node: Node,
}

#[derive(Debug, Default)]
struct MemoryTreeInner {
    /// Edges point from parent to child.
    graph: StableDiGraph<Entry, ()>,
    index: HashMap<NodeId, NodeIndex>,
    next_seq: u64,
}

impl MemoryTreeInner {
    fn lookup(&self, id: &NodeId) -> Result<NodeIndex, StoreError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
    }

    fn sorted(&self, mut indices: Vec<NodeIndex>) -> Vec<NodeId> {
        indices.sort_by_key(|idx| self.graph[*idx].seq);
        indices
            .into_iter()
            .map(|idx| self.graph[idx].node.id.clone())
            .collect()
    }
}

/// In-memory content tree.
///
/// Cloned handles share the same tree.
#[derive(Clone, Debug, Default)]
pub struct MemoryTree {
    inner: Rc<RefCell<MemoryTreeInner>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node below `parent`, or at the site root when no parent is given.
    pub fn insert(&self, parent: Option<&NodeId>, node: Node) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if inner.index.contains_key(&node.id) {
            return Err(StoreError::Backend(format!("node {} already exists", node.id)));
        }
        let parent_idx = parent.map(|id| inner.lookup(id)).transpose()?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = node.id.clone();
        let idx = inner.graph.add_node(Entry { seq, node });
        inner.index.insert(id, idx);
        if let Some(parent_idx) = parent_idx {
            inner.graph.add_edge(parent_idx, idx, ());
        }
        Ok(())
    }

    /// Change the display title of a node, its identifier stays the same.
    pub fn rename(&self, id: &NodeId, title: impl Into<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        let idx = inner.lookup(id)?;
        inner.graph[idx].node.title = title.into();
        Ok(())
    }

    /// Move a node with its subtree below a new parent, or to the site root.
    pub fn move_node(&self, id: &NodeId, new_parent: Option<&NodeId>) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        let idx = inner.lookup(id)?;
        let new_parent_idx = new_parent.map(|id| inner.lookup(id)).transpose()?;

        // Refuse to move a node below itself.
        let mut cursor = new_parent_idx;
        while let Some(current) = cursor {
            if current == idx {
                return Err(StoreError::Backend(format!(
                    "can not move node {id} into its own subtree"
                )));
            }
            cursor = inner.parent_index(current);
        }

        if let Some(old_parent_idx) = inner.parent_index(idx) {
            if let Some(edge) = inner.graph.find_edge(old_parent_idx, idx) {
                inner.graph.remove_edge(edge);
            }
        }
        if let Some(new_parent_idx) = new_parent_idx {
            inner.graph.add_edge(new_parent_idx, idx, ());
        }
        debug!(%id, "moved node");
        Ok(())
    }

    /// Remove a node and its subtree, returning the removed nodes with children before their
    /// parents.
    pub fn remove(&self, id: &NodeId) -> Result<Vec<Node>, StoreError> {
        let mut inner = self.inner.borrow_mut();
        let idx = inner.lookup(id)?;

        let mut order = Vec::new();
        let mut dfs = DfsPostOrder::new(&inner.graph, idx);
        while let Some(nx) = dfs.next(&inner.graph) {
            order.push(nx);
        }

        let mut removed = Vec::with_capacity(order.len());
        for nx in order {
            if let Some(entry) = inner.graph.remove_node(nx) {
                inner.index.remove(&entry.node.id);
                removed.push(entry.node);
            }
        }
        debug!(%id, count = removed.len(), "removed subtree");
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkspaceTree for MemoryTree {
    fn node(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.borrow();
        Ok(inner
            .index
            .get(id)
            .map(|idx| inner.graph[*idx].node.clone()))
    }

    fn parent(&self, id: &NodeId) -> Result<Option<NodeId>, StoreError> {
        let inner = self.inner.borrow();
        let idx = inner.lookup(id)?;
        Ok(inner
            .parent_index(idx)
            .map(|parent| inner.graph[parent].node.id.clone()))
    }

    fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.borrow();
        let idx = inner.lookup(id)?;
        let children = inner
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        Ok(inner.sorted(children))
    }

    fn roots(&self) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.borrow();
        let roots = inner
            .graph
            .node_indices()
            .filter(|idx| inner.parent_index(*idx).is_none())
            .collect();
        Ok(inner.sorted(roots))
    }
}
