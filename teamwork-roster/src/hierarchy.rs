// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolve workspaces, projects and their nesting in the content tree.
//!
//! All lookups go to the tree on every call, results are never cached as recursive membership
//! propagation depends on the current shape of the tree.
use serde::{Deserialize, Serialize};
use teamwork_store::{Node, NodeId, NodeKind, StoreError, WorkspaceTree};

/// A content node with its own membership scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workspace {
    /// Durable identifier, also the namespace of the workspace's group names.
    pub id: NodeId,
    pub title: String,
    pub is_project: bool,
}

impl Workspace {
    pub fn from_node(node: Node) -> Option<Self> {
        match node.kind {
            NodeKind::Project | NodeKind::Workspace => Some(Self {
                is_project: node.is_project(),
                id: node.id,
                title: node.title,
            }),
            NodeKind::Content => None,
        }
    }

    pub fn namespace(&self) -> &NodeId {
        &self.id
    }
}

fn require<T: WorkspaceTree>(tree: &T, id: &NodeId) -> Result<Node, StoreError> {
    tree.node(id)?
        .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
}

/// Walk from `node` (inclusive) towards the root and return the first node matching `predicate`.
fn find_upwards<T, F>(tree: &T, node: &NodeId, predicate: F) -> Result<Option<Node>, StoreError>
where
    T: WorkspaceTree,
    F: Fn(&Node) -> bool,
{
    let mut cursor = Some(node.clone());
    while let Some(id) = cursor {
        let current = require(tree, &id)?;
        if predicate(&current) {
            return Ok(Some(current));
        }
        cursor = tree.parent(&id)?;
    }
    Ok(None)
}

/// Nearest workspace containing `node`, possibly the node itself.
pub fn find_workspace<T: WorkspaceTree>(
    tree: &T,
    node: &NodeId,
) -> Result<Option<Workspace>, StoreError> {
    Ok(find_upwards(tree, node, Node::is_workspace)?.and_then(Workspace::from_node))
}

/// Nearest project containing `node`, possibly the node itself.
pub fn find_project<T: WorkspaceTree>(
    tree: &T,
    node: &NodeId,
) -> Result<Option<Workspace>, StoreError> {
    Ok(find_upwards(tree, node, Node::is_project)?.and_then(Workspace::from_node))
}

/// Workspaces strictly above `node`, ordered from the root down to the immediate parent.
pub fn ancestor_workspaces<T: WorkspaceTree>(
    tree: &T,
    node: &NodeId,
) -> Result<Vec<Workspace>, StoreError> {
    let mut result = Vec::new();
    let mut cursor = tree.parent(node)?;
    while let Some(id) = cursor {
        if let Some(workspace) = Workspace::from_node(require(tree, &id)?) {
            result.push(workspace);
        }
        cursor = tree.parent(&id)?;
    }
    result.reverse();
    Ok(result)
}

/// Workspaces nested at any depth below `node`, in depth-first pre-order.
pub fn descendant_workspaces<T: WorkspaceTree>(
    tree: &T,
    node: &NodeId,
) -> Result<Vec<Workspace>, StoreError> {
    let mut result = Vec::new();
    let mut stack: Vec<NodeId> = tree.children(node)?.into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        if let Some(workspace) = Workspace::from_node(require(tree, &id)?) {
            result.push(workspace);
        }
        stack.extend(tree.children(&id)?.into_iter().rev());
    }
    Ok(result)
}

/// Every project in the site.
pub fn projects<T: WorkspaceTree>(tree: &T) -> Result<Vec<Workspace>, StoreError> {
    let mut result = Vec::new();
    let mut stack: Vec<NodeId> = tree.roots()?.into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        let node = require(tree, &id)?;
        if node.is_project() {
            result.extend(Workspace::from_node(node));
            // Projects are top-level, nothing below can be another project.
            continue;
        }
        stack.extend(tree.children(&id)?.into_iter().rev());
    }
    Ok(result)
}

/// Every workspace in the site, in depth-first pre-order.
pub fn workspaces<T: WorkspaceTree>(tree: &T) -> Result<Vec<Workspace>, StoreError> {
    let mut result = Vec::new();
    for root in tree.roots()? {
        result.extend(Workspace::from_node(require(tree, &root)?));
        result.extend(descendant_workspaces(tree, &root)?);
    }
    Ok(result)
}

/// Titles of all nodes from the root down to `node` (inclusive).
pub fn title_chain<T: WorkspaceTree>(tree: &T, node: &NodeId) -> Result<Vec<String>, StoreError> {
    let mut titles = Vec::new();
    let mut cursor = Some(node.clone());
    while let Some(id) = cursor {
        titles.push(require(tree, &id)?.title);
        cursor = tree.parent(&id)?;
    }
    titles.reverse();
    Ok(titles)
}

/// Workspaces which must also contain a principal added to `workspace`, nearest first.
pub fn upward_closure<T: WorkspaceTree>(
    tree: &T,
    workspace: &Workspace,
) -> Result<Vec<Workspace>, StoreError> {
    let mut ancestors = ancestor_workspaces(tree, &workspace.id)?;
    ancestors.reverse();
    Ok(ancestors)
}

/// Workspaces which must lose a principal removed from `workspace`.
pub fn downward_closure<T: WorkspaceTree>(
    tree: &T,
    workspace: &Workspace,
) -> Result<Vec<Workspace>, StoreError> {
    descendant_workspaces(tree, &workspace.id)
}
