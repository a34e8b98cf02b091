// SPDX-License-Identifier: MIT OR Apache-2.0

//! Membership groups for nested workspaces.
//!
//! Every workspace (a top-level project, or a team or sub-team nested inside one) owns one group
//! per configured group type. Group names are composed from the durable workspace id and the
//! group type id (`<namespace>-<group id>`), so renaming or moving a workspace never orphans its
//! groups.
//!
//! ## Membership rules
//!
//! Membership in a workspace is membership in its base group ("viewers"). All other groups of a
//! workspace ("contributors", "managers", ...) are secondary groups and require base membership:
//!
//! - Adding a principal to a workspace adds it to every containing workspace as well.
//! - Removing a principal from a workspace removes it from every secondary group of the
//!   workspace and from all nested workspaces.
//! - Adding to a secondary group without base membership fails.
//!
//! [`WorkspaceRoster`] offers these operations for one workspace, [`MembershipModifications`]
//! buffers a batch of changes and applies them in a deterministic order, and
//! [`MembershipManager`] wraps both for a user acting through a management interface, reporting
//! a [`Receipt`] per affected principal.
//!
//! ## Host collaborators
//!
//! The group store, user directory, role bindings and content tree are provided by the host
//! through the traits of `teamwork-store` and bundled into a [`Site`] handle. Writes are
//! broadcast on the site's [`InvalidationBus`] so that cached membership reads never go stale
//! within a transaction, see [`Site::begin`].
pub mod cache;
pub mod config;
pub mod error;
pub mod group;
pub mod handlers;
pub mod hierarchy;
pub mod membership;
pub mod modifications;
pub mod roster;
pub mod site;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;
pub mod workgroup;

pub use cache::{Invalidate, InvalidationBus, Subscription};
pub use config::{
    BASE_GROUP_ID, ConfigError, GroupTypeConfig, GroupTypeRegistry, MembershipConfig, Scope,
    SelfRemovalPolicy,
};
pub use error::RosterError;
pub use group::GroupInfo;
pub use hierarchy::Workspace;
pub use membership::{
    GridColumn, GridRow, GridUpdate, MembershipGrid, MembershipManager, UserInfo,
};
pub use modifications::{Action, MembershipModifications, Outcome, Receipt};
pub use roster::WorkspaceRoster;
pub use site::{Site, group_name};
pub use workgroup::Workgroup;
