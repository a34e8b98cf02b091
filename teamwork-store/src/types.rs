// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Canonical identifier of a principal (login name).
///
/// Values are expected to be produced by [`SiteMembers::normalize`](crate::SiteMembers::normalize)
/// so that differently cased spellings of the same login resolve to the same membership record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Wrap an already normalized identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PrincipalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Site user as seen by membership management.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub fullname: Option<String>,
    pub email: Option<String>,

    /// Names of groups the user belongs to, filled in by callers which know the relevant groups.
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl User {
    /// Name to show in listings, falls back to the login when no full name is known.
    pub fn display_name(&self) -> &str {
        self.fullname.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Attributes given when registering a new user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    pub fullname: Option<String>,
    pub email: Option<String>,
}

/// Title and description stored alongside a named group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMeta {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Durable identifier of a node in the content tree.
///
/// For workspaces this is the namespace token their group names are composed from, it never
/// changes on rename or move.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Kind of a content tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Top-level workspace.
    Project,

    /// Workspace nested in a project or another workspace (team, sub-team).
    Workspace,

    /// Any other content.
    Content,
}

/// A node in the host's content tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub title: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(id),
            title: title.into(),
            kind,
        }
    }

    /// Returns true if this node has its own membership scope.
    pub fn is_workspace(&self) -> bool {
        matches!(self.kind, NodeKind::Project | NodeKind::Workspace)
    }

    pub fn is_project(&self) -> bool {
        matches!(self.kind, NodeKind::Project)
    }
}
