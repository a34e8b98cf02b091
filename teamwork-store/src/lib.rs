// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to the host platform consumed by workspace membership management, together with
//! in-memory implementations of each of them.
//!
//! The host is expected to provide a group directory ([`GroupStore`]), a site-wide user
//! directory ([`SiteMembers`]), a mechanism binding roles to group names in a content context
//! ([`LocalRoles`]) and the content tree containing workspaces ([`WorkspaceTree`]).
mod local_roles;
mod members;
mod memory_store;
mod traits;
mod tree;
mod types;

pub use local_roles::MemoryLocalRoles;
pub use members::MemoryMembers;
pub use memory_store::MemoryGroupStore;
pub use traits::{GroupStore, LocalRoles, SiteMembers, StoreError, WorkspaceTree};
pub use tree::MemoryTree;
pub use types::{GroupMeta, Node, NodeId, NodeKind, PrincipalId, User, UserAttributes};
