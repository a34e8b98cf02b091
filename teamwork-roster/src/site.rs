// SPDX-License-Identifier: MIT OR Apache-2.0

use std::rc::Rc;

use teamwork_store::{GroupStore, NodeId, PrincipalId, SiteMembers, WorkspaceTree};
use tracing::trace;

use crate::cache::InvalidationBus;
use crate::config::{GroupTypeConfig, GroupTypeRegistry, Scope};
use crate::error::RosterError;
use crate::group::GroupInfo;
use crate::hierarchy::{self, Workspace};
use crate::roster::WorkspaceRoster;

#[derive(Debug)]
struct SiteInner<G, M, T> {
    groups: G,
    members: M,
    tree: T,
    bus: InvalidationBus,
}

/// Handle onto the host collaborators, the group type registry and the cache invalidation bus.
///
/// Cloning is cheap, clones share collaborators and bus. The registry is shared until it is
/// modified through [`registry_mut`](Self::registry_mut), which only affects this handle and
/// handles cloned from it afterwards.
#[derive(Debug)]
pub struct Site<G, M, T> {
    inner: Rc<SiteInner<G, M, T>>,
    registry: Rc<GroupTypeRegistry>,
}

impl<G, M, T> Clone for Site<G, M, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<G, M, T> Site<G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    pub fn new(groups: G, members: M, tree: T, registry: GroupTypeRegistry) -> Self {
        Self {
            inner: Rc::new(SiteInner {
                groups,
                members,
                tree,
                bus: InvalidationBus::new(),
            }),
            registry: Rc::new(registry),
        }
    }

    pub fn groups(&self) -> &G {
        &self.inner.groups
    }

    pub fn members(&self) -> &M {
        &self.inner.members
    }

    pub fn tree(&self) -> &T {
        &self.inner.tree
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.inner.bus
    }

    pub fn registry(&self) -> &GroupTypeRegistry {
        &self.registry
    }

    /// Registry for runtime registration of group types.
    pub fn registry_mut(&mut self) -> &mut GroupTypeRegistry {
        Rc::make_mut(&mut self.registry)
    }

    /// Start a new logical transaction: every cached membership read is dropped.
    pub fn begin(&self) {
        trace!("begin membership transaction");
        self.inner.bus.clear();
    }

    pub fn normalize(&self, raw: &str) -> PrincipalId {
        self.inner.members.normalize(raw)
    }

    /// Group types instantiated in the given workspace, in registry order.
    pub fn group_types_for(&self, workspace: &Workspace) -> Vec<GroupTypeConfig> {
        self.registry
            .select(Some(Scope::of_workspace(workspace.is_project)))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Roster of the workspace containing `node` (possibly the node itself).
    pub fn roster(&self, node: &NodeId) -> Result<WorkspaceRoster<G, M, T>, RosterError> {
        let workspace = hierarchy::find_workspace(self.tree(), node)?
            .ok_or_else(|| RosterError::NotAWorkspace(node.clone()))?;
        WorkspaceRoster::new(self.clone(), workspace)
    }

    /// Roster of a resolved workspace.
    pub fn roster_for(
        &self,
        workspace: Workspace,
    ) -> Result<WorkspaceRoster<G, M, T>, RosterError> {
        WorkspaceRoster::new(self.clone(), workspace)
    }

    /// Workspaces in which the principal belongs to at least one group, in tree order.
    ///
    /// With `projects_only` only top-level projects are considered.
    pub fn user_workspaces(
        &self,
        principal: impl AsRef<str>,
        projects_only: bool,
    ) -> Result<Vec<Workspace>, RosterError> {
        let candidates = if projects_only {
            hierarchy::projects(self.tree())?
        } else {
            hierarchy::workspaces(self.tree())?
        };
        self.filter_member_workspaces(&self.normalize(principal.as_ref()), candidates)
    }

    /// Keep the workspaces in which the principal belongs to at least one group.
    pub(crate) fn filter_member_workspaces(
        &self,
        principal: &PrincipalId,
        candidates: Vec<Workspace>,
    ) -> Result<Vec<Workspace>, RosterError> {
        let mut result = Vec::new();
        'workspaces: for workspace in candidates {
            for config in self.group_types_for(&workspace) {
                let info =
                    GroupInfo::new(self.clone(), group_name(&workspace.id, &config.group_id));
                if info.exists()? && info.contains(principal)? {
                    result.push(workspace);
                    continue 'workspaces;
                }
            }
        }
        Ok(result)
    }
}

/// Full name of the group of type `group_id` in the workspace with the given namespace.
pub fn group_name(namespace: &NodeId, group_id: &str) -> String {
    format!("{}-{}", namespace, group_id)
}
