// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait interfaces for interacting with the host platform.
use std::collections::BTreeSet;

use thiserror::Error;

use crate::types::{GroupMeta, Node, NodeId, PrincipalId, User, UserAttributes};

/// Persistent group-membership directory keyed by group name.
///
/// All methods take `&self`, implementations are expected to be cheap handles onto state owned by
/// the host and to be used from a single thread within one transaction.
pub trait GroupStore {
    /// Create a named group.
    ///
    /// Fails with [`StoreError::GroupExists`] if a group with this name is already present.
    fn create_group(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Remove a named group.
    ///
    /// Returns `true` when the removal occurred and `false` when the group was not found.
    fn remove_group(&self, name: &str) -> Result<bool, StoreError>;

    /// Rename a group, keeping its members and metadata.
    fn rename_group(&self, old: &str, new: &str) -> Result<(), StoreError>;

    /// Add a principal to a group.
    ///
    /// Returns `false` if the principal was already a member.
    fn add_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError>;

    /// Remove a principal from a group.
    ///
    /// Returns `false` if the principal was not a member.
    fn remove_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError>;

    /// Members of a group in the order the store reports them. May contain duplicates.
    fn list_principals(&self, name: &str) -> Result<Vec<PrincipalId>, StoreError>;

    /// Names of all groups.
    fn list_group_ids(&self) -> Result<Vec<String>, StoreError>;

    fn group_meta(&self, name: &str) -> Result<Option<GroupMeta>, StoreError>;

    /// Update title and/or description of a group, `None` leaves a value untouched.
    fn set_group_meta(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError>;

    fn has_group(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.group_meta(name)?.is_some())
    }
}

/// Site-wide user directory.
pub trait SiteMembers {
    /// Canonical form of a raw login, every entry point must pass identifiers through here.
    fn normalize(&self, raw: &str) -> PrincipalId;

    fn contains(&self, principal: &PrincipalId) -> Result<bool, StoreError>;

    fn get(&self, principal: &PrincipalId) -> Result<Option<User>, StoreError>;

    /// Register a new user, optionally sending a registration notification.
    fn register(
        &self,
        principal: &PrincipalId,
        attributes: UserAttributes,
        send_notification: bool,
    ) -> Result<User, StoreError>;

    /// Remove a user from the site entirely.
    fn delete(&self, principal: &PrincipalId) -> Result<(), StoreError>;

    /// Users whose login or full name contains the query, ignoring case.
    fn search(&self, query: &str) -> Result<Vec<User>, StoreError>;
}

/// Binds permission roles to group names within a content context.
pub trait LocalRoles {
    /// Replace the roles bound to `group_name` in `context`.
    fn bind_roles(
        &self,
        context: &NodeId,
        group_name: &str,
        roles: &BTreeSet<String>,
    ) -> Result<(), StoreError>;

    fn roles_for(&self, context: &NodeId, group_name: &str) -> Result<BTreeSet<String>, StoreError>;
}

/// Read access to the host's content tree.
///
/// Results must reflect the current state of the tree, recursive propagation relies on it.
pub trait WorkspaceTree {
    fn node(&self, id: &NodeId) -> Result<Option<Node>, StoreError>;

    fn parent(&self, id: &NodeId) -> Result<Option<NodeId>, StoreError>;

    /// Direct children of a node, in a stable order.
    fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, StoreError>;

    /// Nodes located directly in the site root.
    fn roots(&self) -> Result<Vec<NodeId>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("group {0} does not exist")]
    GroupNotFound(String),

    #[error("group {0} already exists")]
    GroupExists(String),

    #[error("principal {0} does not exist")]
    PrincipalNotFound(PrincipalId),

    #[error("principal {0} is already registered")]
    DuplicatePrincipal(PrincipalId),

    #[error("invalid principal identifier: {0}")]
    InvalidIdentifier(String),

    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("error occurred in store backend: {0}")]
    Backend(String),
}
